//! `SQLite` schema of the local backend.
//!
//! The local backend mirrors a browser key/value store: one table of string
//! keys and string values. Records live as a JSON array under a single key.

/// SQL statement to create the key/value table.
pub const CREATE_KV_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Read the value stored under a key.
pub const SELECT_VALUE: &str = "SELECT value FROM kv WHERE key = ?1";

/// Replace the value stored under a key.
pub const UPSERT_VALUE: &str = "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[CREATE_KV_TABLE];
