//! Assembly of patient registrations.
//!
//! [`FormAssembler`] turns loosely filled [`RegistrationInput`] into a
//! complete [`Record`]: it applies defaults, checks required fields, derives
//! the age from the birth date, normalizes phone numbers and embeds the
//! consent attachment.

use std::path::Path;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::Session;
use crate::error::{Error, Result};
use crate::record::Record;

/// Largest consent attachment accepted, in bytes.
pub const MAX_ATTACHMENT_BYTES: u64 = 2 * 1024 * 1024;

/// Longest accepted device serial number.
pub const MAX_SERIAL_DIGITS: usize = 7;

/// Placeholder stored for a mobile number nobody filled in.
const EMPTY_MOBILE: &str = "010--";

/// Option value that takes a free-text qualifier.
const OTHER: &str = "기타";

/// Sex of a patient or guardian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    /// 남
    #[default]
    #[serde(rename = "남")]
    Male,
    /// 여
    #[serde(rename = "여")]
    Female,
}

/// Whether the patient has gone missing before.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingExperience {
    /// 유
    #[serde(rename = "유")]
    Yes,
    /// 무
    #[default]
    #[serde(rename = "무")]
    No,
}

/// Whether the device is in use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageStatus {
    /// 사용중
    #[default]
    #[serde(rename = "사용중")]
    InUse,
    /// 미사용중
    #[serde(rename = "미사용중")]
    NotInUse,
}

impl UsageStatus {
    /// The persisted label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::InUse => "사용중",
            Self::NotInUse => "미사용중",
        }
    }
}

/// Whether staff encouraged a non-using patient to use the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encouragement {
    /// O
    #[serde(rename = "O")]
    Done,
    /// X
    #[default]
    #[serde(rename = "X")]
    NotDone,
}

/// A consent document embedded in the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name as attached.
    pub name: String,
    /// `data:` URL with base64 payload.
    pub data: String,
}

impl Attachment {
    /// Embed raw bytes under the given file name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegistration`] if the payload is larger than
    /// [`MAX_ATTACHMENT_BYTES`].
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let name = name.into();
        if bytes.len() as u64 > MAX_ATTACHMENT_BYTES {
            return Err(Error::invalid_registration(
                "consent file must be 2 MiB or smaller",
            ));
        }
        let data = format!("data:{};base64,{}", mime_for(&name), BASE64.encode(bytes));
        Ok(Self { name, data })
    }

    /// Read and embed a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is too large.
    pub fn from_path(path: &Path) -> Result<Self> {
        let size = std::fs::metadata(path)?.len();
        if size > MAX_ATTACHMENT_BYTES {
            return Err(Error::invalid_registration(
                "consent file must be 2 MiB or smaller",
            ));
        }
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map_or_else(|| "consent".to_string(), |n| n.to_string_lossy().into_owned());
        Self::from_bytes(name, &bytes)
    }
}

fn mime_for(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "hwp" => "application/x-hwp",
        _ => "application/octet-stream",
    }
}

/// Registration as entered. Unset fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistrationInput {
    /// Center to file under; ignored for scoped sessions.
    pub center_name: Option<String>,
    /// Device serial number (required).
    pub serial_number: String,
    /// Device condition.
    pub device_status: Option<String>,
    /// Application date, `YYYY-MM-DD`.
    pub application_date: Option<String>,
    /// Activation date.
    pub opening_date: String,
    /// Expiry date.
    pub expiration_date: String,

    /// Patient name (required).
    pub name: String,
    /// Patient sex.
    pub gender: Gender,
    /// Birth date, `YYYY-MM-DD`.
    pub birth_date: String,
    /// Used only when no birth date is given.
    pub age: Option<u32>,
    /// Street address.
    pub address: String,
    /// Unit or other address detail.
    pub detail_address: String,
    /// Primary phone, `a-b-c`.
    pub contact: Option<String>,
    /// Secondary phone.
    pub contact2: Option<String>,
    /// Diagnosis name.
    pub diagnosis: Option<String>,
    /// Whether the patient went missing before.
    pub missing_experience: MissingExperience,
    /// Number of missing incidents.
    pub missing_count: u32,

    /// Guardian name.
    pub guardian_name: String,
    /// Guardian relationship to the patient.
    pub guardian_relationship: Option<String>,
    /// Qualifier for a `기타` relationship.
    pub other_relationship: Option<String>,
    /// Guardian sex.
    pub guardian_gender: Gender,
    /// Guardian birth date.
    pub guardian_birth_date: String,
    /// Guardian primary phone.
    pub guardian_contact1: Option<String>,
    /// Guardian secondary phone.
    pub guardian_contact2: Option<String>,
    /// Free-form note.
    pub guardian_note: String,

    /// Whether the device is in use.
    pub usage_status: UsageStatus,
    /// Why the device is not used.
    pub non_usage_reason: String,
    /// Qualifier for a `기타` non-usage reason.
    pub other_non_usage_reason: Option<String>,
    /// Alternative the patient uses instead.
    pub non_usage_alternative: String,
    /// What the patient asked for.
    pub patient_request: String,
    /// Whether staff encouraged use.
    pub non_usage_encouragement: Encouragement,
    /// Follow-up plan.
    pub non_usage_plan: String,
}

/// A complete registration, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct Registration {
    sequence_number: i64,
    center_name: String,
    serial_number: String,
    device_status: String,
    application_date: String,
    opening_date: String,
    expiration_date: String,
    name: String,
    gender: Gender,
    birth_date: String,
    age: i64,
    address: String,
    detail_address: String,
    contact: String,
    contact2: String,
    diagnosis: String,
    missing_experience: MissingExperience,
    missing_count: u32,
    guardian_name: String,
    guardian_relationship: String,
    guardian_gender: Gender,
    guardian_birth_date: String,
    guardian_contact1: String,
    guardian_contact2: String,
    guardian_note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    consent_file: Option<Attachment>,
    usage_status: UsageStatus,
    non_usage_reason: String,
    non_usage_alternative: String,
    patient_request: String,
    non_usage_encouragement: Encouragement,
    non_usage_plan: String,
}

/// Builds records for one session.
#[derive(Debug, Clone)]
pub struct FormAssembler {
    forced_center: Option<String>,
    centers: Vec<String>,
    next_sequence: i64,
}

impl FormAssembler {
    /// Create an assembler.
    ///
    /// `centers` are the selectable centers in display order;
    /// `next_sequence` is the number the new record gets.
    #[must_use]
    pub fn new(session: &Session, centers: Vec<String>, next_sequence: i64) -> Self {
        Self {
            forced_center: session.scope().map(str::to_string),
            centers,
            next_sequence,
        }
    }

    /// The center a new record is filed under when none is requested.
    #[must_use]
    pub fn default_center(&self) -> Option<&str> {
        self.forced_center
            .as_deref()
            .or_else(|| self.centers.first().map(String::as_str))
    }

    /// Build the record.
    ///
    /// `today` fills the application date and anchors the age calculation;
    /// `now_millis` becomes the record id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegistration`] if the name or serial number is
    /// missing, the serial is not at most seven digits, the birth date is not
    /// `YYYY-MM-DD`, or the requested center is unknown.
    pub fn assemble(
        &self,
        input: RegistrationInput,
        consent: Option<Attachment>,
        today: NaiveDate,
        now_millis: i64,
    ) -> Result<Record> {
        let name = input.name.trim().to_string();
        let serial_number = input.serial_number.trim().to_string();
        if name.is_empty() || serial_number.is_empty() {
            return Err(Error::invalid_registration(
                "name and device serial number are required",
            ));
        }
        if serial_number.len() > MAX_SERIAL_DIGITS
            || !serial_number.chars().all(|c| c.is_ascii_digit())
        {
            return Err(Error::invalid_registration(format!(
                "device serial number must be at most {MAX_SERIAL_DIGITS} digits"
            )));
        }

        let center_name = self.resolve_center(input.center_name)?;
        let age = korean_age(&input.birth_date, today)?
            .unwrap_or_else(|| i64::from(input.age.unwrap_or(0)));

        let guardian_relationship = with_other(
            input
                .guardian_relationship
                .unwrap_or_else(|| "배우자".to_string()),
            input.other_relationship.as_deref(),
        );
        let non_usage_reason = match input.usage_status {
            UsageStatus::NotInUse => with_other(
                input.non_usage_reason,
                input.other_non_usage_reason.as_deref(),
            ),
            UsageStatus::InUse => input.non_usage_reason,
        };

        let registration = Registration {
            sequence_number: self.next_sequence,
            center_name,
            serial_number,
            device_status: input.device_status.unwrap_or_else(|| "정상".to_string()),
            application_date: input
                .application_date
                .unwrap_or_else(|| today.format("%Y-%m-%d").to_string()),
            opening_date: input.opening_date,
            expiration_date: input.expiration_date,
            name,
            gender: input.gender,
            birth_date: input.birth_date,
            age,
            address: input.address,
            detail_address: input.detail_address,
            contact: phone_or(input.contact.as_deref(), EMPTY_MOBILE),
            contact2: phone_or(input.contact2.as_deref(), ""),
            diagnosis: input.diagnosis.unwrap_or_else(|| "치매".to_string()),
            missing_experience: input.missing_experience,
            missing_count: input.missing_count,
            guardian_name: input.guardian_name,
            guardian_relationship,
            guardian_gender: input.guardian_gender,
            guardian_birth_date: input.guardian_birth_date,
            guardian_contact1: phone_or(input.guardian_contact1.as_deref(), EMPTY_MOBILE),
            guardian_contact2: phone_or(input.guardian_contact2.as_deref(), ""),
            guardian_note: input.guardian_note,
            consent_file: consent,
            usage_status: input.usage_status,
            non_usage_reason,
            non_usage_alternative: input.non_usage_alternative,
            patient_request: input.patient_request,
            non_usage_encouragement: input.non_usage_encouragement,
            non_usage_plan: input.non_usage_plan,
        };

        let serde_json::Value::Object(fields) = serde_json::to_value(&registration)? else {
            return Err(Error::internal("registration did not serialize to an object"));
        };
        debug!(sequence = self.next_sequence, "registration assembled");
        Ok(Record {
            id: now_millis.to_string(),
            fields,
        })
    }

    fn resolve_center(&self, requested: Option<String>) -> Result<String> {
        if let Some(forced) = &self.forced_center {
            return Ok(forced.clone());
        }
        match requested {
            Some(center) if self.centers.contains(&center) => Ok(center),
            Some(center) => Err(Error::invalid_registration(format!(
                "unknown center '{center}'"
            ))),
            None => self
                .centers
                .first()
                .cloned()
                .ok_or_else(|| Error::invalid_registration("no centers are configured")),
        }
    }
}

/// `기타` plus a non-empty qualifier becomes `기타(<qualifier>)`.
fn with_other(value: String, qualifier: Option<&str>) -> String {
    match qualifier.map(str::trim) {
        Some(q) if value == OTHER && !q.is_empty() => format!("{OTHER}({q})"),
        _ => value,
    }
}

/// Age counted the Korean way: current year minus birth year plus one.
fn korean_age(birth_date: &str, today: NaiveDate) -> Result<Option<i64>> {
    let birth_date = birth_date.trim();
    if birth_date.is_empty() {
        return Ok(None);
    }
    let born = NaiveDate::parse_from_str(birth_date, "%Y-%m-%d").map_err(|_| {
        Error::invalid_registration(format!("birth date '{birth_date}' is not YYYY-MM-DD"))
    })?;
    Ok(Some(i64::from(today.year()) - i64::from(born.year()) + 1))
}

fn non_digits() -> &'static Regex {
    static NON_DIGITS: OnceLock<Regex> = OnceLock::new();
    NON_DIGITS.get_or_init(|| Regex::new("[^0-9]").expect("Invalid regex pattern"))
}

/// Normalize a three-part phone number.
///
/// Parts are split on `-`, stripped of everything but digits and joined with
/// `-`. If every part ends up empty the number is the empty string.
#[must_use]
pub fn normalize_phone(raw: &str) -> String {
    let mut parts = raw.splitn(3, '-');
    let parts: Vec<String> = (0..3)
        .map(|_| {
            non_digits()
                .replace_all(parts.next().unwrap_or_default(), "")
                .into_owned()
        })
        .collect();

    if parts.iter().all(String::is_empty) {
        String::new()
    } else {
        parts.join("-")
    }
}

fn phone_or(raw: Option<&str>, default: &str) -> String {
    raw.map_or_else(|| default.to_string(), normalize_phone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DONGGU: &str = "광주광역시 동구 치매안심센터";
    const SEOGU: &str = "광주광역시 서구 치매안심센터";

    fn centers() -> Vec<String> {
        vec![DONGGU.to_string(), SEOGU.to_string()]
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn minimal() -> RegistrationInput {
        RegistrationInput {
            name: "홍길동".to_string(),
            serial_number: "1234567".to_string(),
            ..RegistrationInput::default()
        }
    }

    #[test]
    fn test_defaults_applied() {
        let assembler = FormAssembler::new(&Session::admin(), centers(), 4);
        let record = assembler
            .assemble(minimal(), None, today(), 1_717_200_000_000)
            .unwrap();

        assert_eq!(record.id, "1717200000000");
        assert_eq!(record.sequence_number(), Some(4));
        assert_eq!(record.center_name(), Some(DONGGU));
        assert_eq!(record.str_field("deviceStatus"), Some("정상"));
        assert_eq!(record.str_field("applicationDate"), Some("2025-06-01"));
        assert_eq!(record.str_field("gender"), Some("남"));
        assert_eq!(record.str_field("contact"), Some("010--"));
        assert_eq!(record.str_field("contact2"), Some(""));
        assert_eq!(record.str_field("missingExperience"), Some("무"));
        assert_eq!(record.int_field("missingCount"), Some(0));
        assert_eq!(record.str_field("diagnosis"), Some("치매"));
        assert_eq!(record.str_field("guardianRelationship"), Some("배우자"));
        assert_eq!(record.str_field("guardianContact1"), Some("010--"));
        assert_eq!(record.str_field("usageStatus"), Some("사용중"));
        assert_eq!(record.str_field("nonUsageEncouragement"), Some("X"));
        assert_eq!(record.int_field("age"), Some(0));
        assert!(record.field("consentFile").is_none());
    }

    #[test]
    fn test_name_and_serial_required() {
        let assembler = FormAssembler::new(&Session::admin(), centers(), 1);

        let mut input = minimal();
        input.name = "  ".to_string();
        assert!(matches!(
            assembler.assemble(input, None, today(), 0),
            Err(Error::InvalidRegistration { .. })
        ));

        let mut input = minimal();
        input.serial_number = String::new();
        assert!(assembler.assemble(input, None, today(), 0).is_err());
    }

    #[test]
    fn test_serial_must_be_short_digits() {
        let assembler = FormAssembler::new(&Session::admin(), centers(), 1);

        let mut input = minimal();
        input.serial_number = "12345678".to_string();
        assert!(assembler.assemble(input, None, today(), 0).is_err());

        let mut input = minimal();
        input.serial_number = "12a4".to_string();
        assert!(assembler.assemble(input, None, today(), 0).is_err());
    }

    #[test]
    fn test_scoped_session_forces_center() {
        let assembler = FormAssembler::new(&Session::center(SEOGU), centers(), 1);
        let mut input = minimal();
        input.center_name = Some(DONGGU.to_string());

        let record = assembler.assemble(input, None, today(), 0).unwrap();
        assert_eq!(record.center_name(), Some(SEOGU));
        assert_eq!(assembler.default_center(), Some(SEOGU));
    }

    #[test]
    fn test_admin_center_must_be_known() {
        let assembler = FormAssembler::new(&Session::admin(), centers(), 1);

        let mut input = minimal();
        input.center_name = Some(SEOGU.to_string());
        let record = assembler.assemble(input, None, today(), 0).unwrap();
        assert_eq!(record.center_name(), Some(SEOGU));

        let mut input = minimal();
        input.center_name = Some("부산 센터".to_string());
        assert!(assembler.assemble(input, None, today(), 0).is_err());
    }

    #[test]
    fn test_age_from_birth_date() {
        let assembler = FormAssembler::new(&Session::admin(), centers(), 1);
        let mut input = minimal();
        input.birth_date = "1945-12-31".to_string();
        input.age = Some(10);

        let record = assembler.assemble(input, None, today(), 0).unwrap();
        assert_eq!(record.int_field("age"), Some(81));
    }

    #[test]
    fn test_bad_birth_date_rejected() {
        let assembler = FormAssembler::new(&Session::admin(), centers(), 1);
        let mut input = minimal();
        input.birth_date = "1945/12/31".to_string();
        assert!(assembler.assemble(input, None, today(), 0).is_err());
    }

    #[test]
    fn test_other_relationship_qualified() {
        let assembler = FormAssembler::new(&Session::admin(), centers(), 1);
        let mut input = minimal();
        input.guardian_relationship = Some("기타".to_string());
        input.other_relationship = Some("조카".to_string());

        let record = assembler.assemble(input, None, today(), 0).unwrap();
        assert_eq!(record.str_field("guardianRelationship"), Some("기타(조카)"));
    }

    #[test]
    fn test_other_without_qualifier_kept() {
        assert_eq!(with_other("기타".to_string(), Some(" ")), "기타");
        assert_eq!(with_other("아들".to_string(), Some("조카")), "아들");
    }

    #[test]
    fn test_non_usage_reason_qualified_only_when_not_in_use() {
        let assembler = FormAssembler::new(&Session::admin(), centers(), 1);

        let mut input = minimal();
        input.usage_status = UsageStatus::NotInUse;
        input.non_usage_reason = "기타".to_string();
        input.other_non_usage_reason = Some("입원".to_string());
        let record = assembler.assemble(input, None, today(), 0).unwrap();
        assert_eq!(record.str_field("nonUsageReason"), Some("기타(입원)"));
        assert_eq!(record.str_field("usageStatus"), Some("미사용중"));

        let mut input = minimal();
        input.non_usage_reason = "기타".to_string();
        input.other_non_usage_reason = Some("입원".to_string());
        let record = assembler.assemble(input, None, today(), 0).unwrap();
        assert_eq!(record.str_field("nonUsageReason"), Some("기타"));
    }

    #[test]
    fn test_phone_normalization() {
        assert_eq!(normalize_phone("010-12a34-5678"), "010-1234-5678");
        assert_eq!(normalize_phone("--"), "");
        assert_eq!(normalize_phone(""), "");
        assert_eq!(normalize_phone("062-123"), "062-123-");
        assert_eq!(normalize_phone("010--"), "010--");
    }

    #[test]
    fn test_input_from_json() {
        let input: RegistrationInput = serde_json::from_value(json!({
            "name": "김영희",
            "serialNumber": "7654321",
            "gender": "여",
            "missingExperience": "유",
            "missingCount": 2,
            "contact": "010-9999-8888"
        }))
        .unwrap();

        let assembler = FormAssembler::new(&Session::admin(), centers(), 1);
        let record = assembler.assemble(input, None, today(), 0).unwrap();
        assert_eq!(record.str_field("gender"), Some("여"));
        assert_eq!(record.str_field("missingExperience"), Some("유"));
        assert_eq!(record.int_field("missingCount"), Some(2));
        assert_eq!(record.str_field("contact"), Some("010-9999-8888"));
    }

    #[test]
    fn test_attachment_embedded() {
        let attachment = Attachment::from_bytes("동의서.pdf", b"%PDF").unwrap();
        assert_eq!(attachment.data, "data:application/pdf;base64,JVBERg==");

        let assembler = FormAssembler::new(&Session::admin(), centers(), 1);
        let record = assembler
            .assemble(minimal(), Some(attachment), today(), 0)
            .unwrap();
        assert_eq!(record.field("consentFile").unwrap()["name"], "동의서.pdf");
    }

    #[test]
    fn test_attachment_size_limit() {
        let big = vec![0u8; usize::try_from(MAX_ATTACHMENT_BYTES).unwrap() + 1];
        assert!(Attachment::from_bytes("big.png", &big).is_err());
    }

    #[test]
    fn test_attachment_from_path() {
        let dir = crate::store::testing::TempDb::new("attach");
        let path = dir.dir().join("scan.JPG");
        std::fs::write(&path, [0xFF, 0xD8]).unwrap();

        let attachment = Attachment::from_path(&path).unwrap();
        assert_eq!(attachment.name, "scan.JPG");
        assert!(attachment.data.starts_with("data:image/jpeg;base64,"));
    }
}
