//! CSV export of the registry.
//!
//! The export works on whatever record slice it is handed and never talks
//! to the store.

use std::path::Path;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::info;

use crate::error::Result;
use crate::form::UsageStatus;
use crate::record::Record;

/// Column headers, in file order.
pub const COLUMNS: [&str; 27] = [
    "보급기관",
    "식별번호",
    "기기상태",
    "신청일자",
    "개통일자",
    "만료일자",
    "이름",
    "성별",
    "생년월일",
    "주소",
    "상세주소",
    "연락처1",
    "연락처2",
    "실종경험",
    "횟수",
    "보호자명",
    "관계",
    "보호자성별",
    "보호자연락처1",
    "보호자연락처2",
    "비고",
    "전자동의서",
    "사용상태",
    "미사용사유",
    "대체수단",
    "대상자요청사항",
    "추후관리계획",
];

/// Record fields feeding the columns before the consent column.
const LEADING_FIELDS: [&str; 21] = [
    "centerName",
    "serialNumber",
    "deviceStatus",
    "applicationDate",
    "openingDate",
    "expirationDate",
    "name",
    "gender",
    "birthDate",
    "address",
    "detailAddress",
    "contact",
    "contact2",
    "missingExperience",
    "missingCount",
    "guardianName",
    "guardianRelationship",
    "guardianGender",
    "guardianContact1",
    "guardianContact2",
    "guardianNote",
];

/// Fields only exported for records whose device is not in use.
const NON_USAGE_FIELDS: [&str; 4] = [
    "nonUsageReason",
    "nonUsageAlternative",
    "patientRequest",
    "nonUsagePlan",
];

const BOM: char = '\u{FEFF}';

/// Default export file name for a given day.
#[must_use]
pub fn default_file_name(date: NaiveDate) -> String {
    format!("치매안심센터_통합보급명부_{}.csv", date.format("%Y-%m-%d"))
}

/// Render records as CSV text, BOM-prefixed, one line per record.
#[must_use]
pub fn to_csv(records: &[Record]) -> String {
    let mut out = String::new();
    out.push(BOM);
    out.push_str(&COLUMNS.join(","));
    for record in records {
        out.push('\n');
        out.push_str(&row(record).join(","));
    }
    out
}

/// Write the CSV to `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_csv(path: &Path, records: &[Record]) -> Result<()> {
    std::fs::write(path, to_csv(records))?;
    info!(path = %path.display(), rows = records.len(), "export written");
    Ok(())
}

fn row(record: &Record) -> Vec<String> {
    let mut cells: Vec<String> = LEADING_FIELDS
        .iter()
        .map(|key| cell(record.field(key)))
        .collect();

    let consent = if record.field("consentFile").is_some_and(|v| !v.is_null()) {
        "제출(O)"
    } else {
        "미제출(X)"
    };
    cells.push(consent.to_string());

    let usage = record.field("usageStatus");
    cells.push(cell(usage));
    let not_in_use = record.str_field("usageStatus") == Some(UsageStatus::NotInUse.label());
    for key in NON_USAGE_FIELDS {
        cells.push(if not_in_use {
            cell(record.field(key))
        } else {
            String::new()
        });
    }
    cells
}

fn cell(value: Option<&Value>) -> String {
    let text = match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    quote(&text)
}

/// Quote a field when it contains a delimiter, quote or line break.
fn quote(text: &str) -> String {
    if !text.contains([',', '"', '\n', '\r']) {
        return text.to_string();
    }
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if c == '"' {
            quoted.push('"');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// One-line summary used by the CLI after writing a file.
#[must_use]
pub fn describe(path: &Path, rows: usize) -> String {
    format!("{rows} rows written to {}", path.display())
}
