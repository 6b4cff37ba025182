//! Firestore REST implementation of [`DocumentCollection`].
//!
//! Documents are read with `runQuery` ordered by `createdAt` descending,
//! created through `commit` with a `REQUEST_TIME` transform on `createdAt`,
//! and deleted with a plain `DELETE`. Field values travel in Firestore's
//! typed-value encoding and are converted to and from plain JSON here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{json, Map, Number, Value};
use tracing::{debug, instrument};

use super::cloud::DocumentCollection;
use crate::config::CloudConfig;
use crate::error::{Error, Result};
use crate::record::{Record, CREATED_AT};

/// Characters used for generated document ids.
const AUTO_ID_ALPHABET: &[u8; 62] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of generated document ids.
const AUTO_ID_LEN: usize = 20;

/// A Firestore collection reached over REST.
#[derive(Debug)]
pub struct FirestoreCollection {
    client: reqwest::Client,
    base_url: String,
    /// `projects/{project}/databases/(default)/documents`
    documents_path: String,
    collection: String,
    api_key: String,
}

impl FirestoreCollection {
    /// Build the client for the configured collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CloudInit`] if the base URL is unusable or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &CloudConfig) -> Result<Self> {
        let base = reqwest::Url::parse(&config.base_url).map_err(|e| {
            Error::cloud_init(format!("invalid base url '{}': {e}", config.base_url))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::cloud_init(format!(
                "unsupported base url scheme '{}'",
                base.scheme()
            )));
        }
        if config.project_id.contains('/') || config.collection.contains('/') {
            return Err(Error::cloud_init(
                "project id and collection must not contain '/'",
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::cloud_init(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            documents_path: format!(
                "projects/{}/databases/(default)/documents",
                config.project_id
            ),
            collection: config.collection.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn documents_url(&self, suffix: &str) -> String {
        format!("{}/{}{suffix}", self.base_url, self.documents_path)
    }

    fn document_name(&self, id: &str) -> String {
        format!("{}/{}/{id}", self.documents_path, self.collection)
    }

    fn run_query_body(&self) -> Value {
        json!({
            "structuredQuery": {
                "from": [{"collectionId": self.collection}],
                "orderBy": [{
                    "field": {"fieldPath": CREATED_AT},
                    "direction": "DESCENDING"
                }]
            }
        })
    }

    fn commit_body(&self, id: &str, fields: &Map<String, Value>) -> Value {
        json!({
            "writes": [{
                "update": {
                    "name": self.document_name(id),
                    "fields": encode_fields(fields)
                },
                "currentDocument": {"exists": false},
                "updateTransforms": [{
                    "fieldPath": CREATED_AT,
                    "setToServerValue": "REQUEST_TIME"
                }]
            }]
        })
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::RemoteStatus {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl DocumentCollection for FirestoreCollection {
    #[instrument(skip(self), fields(collection = %self.collection))]
    async fn list_newest_first(&self) -> Result<Vec<Record>> {
        let response = self
            .client
            .post(self.documents_url(":runQuery"))
            .query(&[("key", &self.api_key)])
            .json(&self.run_query_body())
            .send()
            .await?;
        let rows: Vec<Value> = check(response).await?.json().await?;
        decode_query_rows(&rows)
    }

    #[instrument(skip(self, fields), fields(collection = %self.collection))]
    async fn create(&self, fields: Map<String, Value>) -> Result<String> {
        let id = auto_id();
        let response = self
            .client
            .post(self.documents_url(":commit"))
            .query(&[("key", &self.api_key)])
            .json(&self.commit_body(&id, &fields))
            .send()
            .await?;
        check(response).await?;
        debug!(%id, "document committed");
        Ok(id)
    }

    #[instrument(skip(self), fields(collection = %self.collection))]
    async fn delete(&self, id: &str) -> Result<()> {
        let url = self.documents_url(&format!("/{}/{id}", self.collection));
        let response = self
            .client
            .delete(url)
            .query(&[("key", &self.api_key)])
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

/// Generate a 20-character alphanumeric document id.
fn auto_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());

    hasher
        .finalize()
        .as_bytes()
        .iter()
        .take(AUTO_ID_LEN)
        .map(|b| char::from(AUTO_ID_ALPHABET[usize::from(*b) % AUTO_ID_ALPHABET.len()]))
        .collect()
}

/// Convert plain JSON into a Firestore typed value.
pub(crate) fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({"nullValue": null}),
        Value::Bool(b) => json!({"booleanValue": b}),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({"integerValue": i.to_string()})
            } else if let Some(u) = n.as_u64() {
                json!({"integerValue": u.to_string()})
            } else {
                json!({"doubleValue": n})
            }
        }
        Value::String(s) => json!({"stringValue": s}),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({"arrayValue": {"values": values}})
        }
        Value::Object(map) => json!({"mapValue": {"fields": encode_fields(map)}}),
    }
}

/// Encode every field of an object.
pub(crate) fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

/// Convert a Firestore typed value back into plain JSON.
///
/// Timestamps, references and bytes come back as their string forms.
pub(crate) fn decode_value(value: &Value) -> Result<Value> {
    let Some((kind, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return Err(malformed(format!("expected typed value, got {value}")));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| malformed("booleanValue is not a bool")),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                other => other.as_i64(),
            };
            parsed
                .map(Value::from)
                .ok_or_else(|| malformed(format!("bad integerValue {inner}")))
        }
        "doubleValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<f64>().ok(),
                other => other.as_f64(),
            };
            // NaN and infinities have no JSON form
            Ok(parsed
                .and_then(Number::from_f64)
                .map_or(Value::Null, Value::Number))
        }
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| malformed(format!("{kind} is not a string"))),
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => {
            let values = match inner.get("values") {
                Some(Value::Array(values)) => values
                    .iter()
                    .map(decode_value)
                    .collect::<Result<Vec<_>>>()?,
                _ => Vec::new(),
            };
            Ok(Value::Array(values))
        }
        "mapValue" => match inner.get("fields") {
            Some(Value::Object(fields)) => Ok(Value::Object(decode_fields(fields)?)),
            _ => Ok(Value::Object(Map::new())),
        },
        other => Err(malformed(format!("unknown value type {other}"))),
    }
}

/// Decode every field of a document.
pub(crate) fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>> {
    fields
        .iter()
        .map(|(k, v)| Ok((k.clone(), decode_value(v)?)))
        .collect()
}

/// Turn one Firestore document into a record; the id is the last name segment.
pub(crate) fn decode_document(document: &Value) -> Result<Record> {
    let name = document
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("document without name"))?;
    let id = name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| malformed(format!("bad document name {name}")))?;

    let fields = match document.get("fields") {
        Some(Value::Object(fields)) => decode_fields(fields)?,
        _ => Map::new(),
    };

    Ok(Record {
        id: id.to_string(),
        fields,
    })
}

/// Decode a `runQuery` response. Rows without a document (an empty result
/// still carries one `readTime` row) are skipped.
pub(crate) fn decode_query_rows(rows: &[Value]) -> Result<Vec<Record>> {
    rows.iter()
        .filter_map(|row| row.get("document"))
        .map(decode_document)
        .collect()
}

fn malformed(message: impl Into<String>) -> Error {
    Error::RemoteResponse(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CloudConfig {
        CloudConfig {
            api_key: "AIza-test".to_string(),
            project_id: "gps-registration".to_string(),
            ..CloudConfig::default()
        }
    }

    #[test]
    fn test_new_rejects_bad_base_url() {
        let mut cfg = config();
        cfg.base_url = "not a url".to_string();
        assert!(matches!(
            FirestoreCollection::new(&cfg),
            Err(Error::CloudInit(_))
        ));

        cfg.base_url = "ftp://example.com".to_string();
        assert!(matches!(
            FirestoreCollection::new(&cfg),
            Err(Error::CloudInit(_))
        ));
    }

    #[test]
    fn test_urls_and_names() {
        let mut cfg = config();
        cfg.base_url = "https://firestore.googleapis.com/v1/".to_string();
        let collection = FirestoreCollection::new(&cfg).unwrap();

        assert_eq!(
            collection.documents_url(":runQuery"),
            "https://firestore.googleapis.com/v1/projects/gps-registration/databases/(default)/documents:runQuery"
        );
        assert_eq!(
            collection.document_name("abc"),
            "projects/gps-registration/databases/(default)/documents/patients/abc"
        );
    }

    #[test]
    fn test_run_query_orders_by_created_at_desc() {
        let collection = FirestoreCollection::new(&config()).unwrap();
        let body = collection.run_query_body();

        assert_eq!(body["structuredQuery"]["from"][0]["collectionId"], "patients");
        let order = &body["structuredQuery"]["orderBy"][0];
        assert_eq!(order["field"]["fieldPath"], "createdAt");
        assert_eq!(order["direction"], "DESCENDING");
    }

    #[test]
    fn test_commit_body_stamps_server_time() {
        let collection = FirestoreCollection::new(&config()).unwrap();
        let mut fields = Map::new();
        fields.insert("name".to_string(), json!("홍길동"));

        let body = collection.commit_body("ID123", &fields);
        let write = &body["writes"][0];

        assert!(write["update"]["name"].as_str().unwrap().ends_with("/patients/ID123"));
        assert_eq!(write["update"]["fields"]["name"]["stringValue"], "홍길동");
        assert_eq!(write["currentDocument"]["exists"], false);
        assert_eq!(write["updateTransforms"][0]["fieldPath"], "createdAt");
        assert_eq!(write["updateTransforms"][0]["setToServerValue"], "REQUEST_TIME");
    }

    #[test]
    fn test_encode_value_variants() {
        assert_eq!(encode_value(&json!(null)), json!({"nullValue": null}));
        assert_eq!(encode_value(&json!(true)), json!({"booleanValue": true}));
        assert_eq!(encode_value(&json!(42)), json!({"integerValue": "42"}));
        assert_eq!(encode_value(&json!(1.5)), json!({"doubleValue": 1.5}));
        assert_eq!(
            encode_value(&json!(["a"])),
            json!({"arrayValue": {"values": [{"stringValue": "a"}]}})
        );
        assert_eq!(
            encode_value(&json!({"name": "c.pdf"})),
            json!({"mapValue": {"fields": {"name": {"stringValue": "c.pdf"}}}})
        );
    }

    #[test]
    fn test_decode_value_variants() {
        assert_eq!(decode_value(&json!({"integerValue": "7"})).unwrap(), json!(7));
        assert_eq!(decode_value(&json!({"doubleValue": 2.5})).unwrap(), json!(2.5));
        assert_eq!(decode_value(&json!({"doubleValue": "NaN"})).unwrap(), json!(null));
        assert_eq!(
            decode_value(&json!({"timestampValue": "2024-05-01T00:00:00Z"})).unwrap(),
            json!("2024-05-01T00:00:00Z")
        );
        assert_eq!(decode_value(&json!({"arrayValue": {}})).unwrap(), json!([]));
        assert_eq!(decode_value(&json!({"mapValue": {}})).unwrap(), json!({}));
        assert!(decode_value(&json!({"mysteryValue": 1})).is_err());
        assert!(decode_value(&json!("bare")).is_err());
    }

    #[test]
    fn test_decode_query_rows() {
        let rows = vec![
            json!({
                "document": {
                    "name": "projects/p/databases/(default)/documents/patients/abc",
                    "fields": {
                        "sequenceNumber": {"integerValue": "3"},
                        "centerName": {"stringValue": "광주광역시 동구 치매안심센터"},
                        "createdAt": {"timestampValue": "2024-05-01T00:00:00Z"}
                    }
                },
                "readTime": "2024-05-01T00:00:01Z"
            }),
            json!({"readTime": "2024-05-01T00:00:01Z"}),
        ];

        let records = decode_query_rows(&rows).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "abc");
        assert_eq!(records[0].sequence_number(), Some(3));
        assert_eq!(records[0].center_name(), Some("광주광역시 동구 치매안심센터"));
    }

    #[test]
    fn test_empty_query_result() {
        let rows = vec![json!({"readTime": "2024-05-01T00:00:01Z"})];
        assert!(decode_query_rows(&rows).unwrap().is_empty());
    }

    #[test]
    fn test_auto_id_shape() {
        let a = auto_id();
        let b = auto_id();
        assert_eq!(a.len(), AUTO_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
