//! AI-written narrative summary of the registry.
//!
//! Only a de-identified projection of each record leaves the process. The
//! summary is best-effort: every failure becomes a fixed, user-facing
//! sentence rather than an error.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::SummaryConfig;
use crate::error::{Error, Result};
use crate::record::Record;

/// Shown when no API key is configured.
pub const NOT_CONFIGURED: &str = "API Key가 설정되지 않았습니다. 환경 변수를 확인해주세요.";

/// Shown when the request fails.
pub const REQUEST_FAILED: &str = "AI 분석 중 오류가 발생했습니다. 잠시 후 다시 시도해주세요.";

/// Shown when the model returns no text.
pub const EMPTY_RESPONSE: &str = "분석 결과를 생성하지 못했습니다.";

/// The fields of a record sent for analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientProfile {
    /// Center name.
    pub center: Option<String>,
    /// Age.
    pub age: Option<i64>,
    /// Sex.
    pub gender: Option<String>,
    /// Diagnosis.
    pub diagnosis: Option<String>,
    /// Number of missing incidents.
    pub missing_count: Option<i64>,
}

/// Strip a record down to what the model may see.
#[must_use]
pub fn deidentify(record: &Record) -> PatientProfile {
    let text = |key: &str| record.str_field(key).map(str::to_string);
    PatientProfile {
        center: text("centerName"),
        age: record.int_field("age"),
        gender: text("gender"),
        diagnosis: text("diagnosis"),
        missing_count: record.int_field("missingCount"),
    }
}

/// Build the analysis prompt for a record set.
///
/// # Errors
///
/// Returns an error if the projection cannot be serialized.
pub fn build_prompt(records: &[Record]) -> Result<String> {
    let profiles: Vec<PatientProfile> = records.iter().map(deidentify).collect();
    let data = serde_json::to_string(&profiles)?;
    Ok(format!(
        "다음은 치매안심센터에서 보급한 배회감지기(GPS) 대상자 데이터입니다.\n\
         데이터 JSON: {data}\n\n\
         이 데이터를 바탕으로 다음 세 가지를 한국어로 분석해 요약해 주세요.\n\
         1. 전체 연령대 및 성별 분포 경향\n\
         2. 실종 횟수(missing_count)가 1 이상인 고위험군의 특징\n\
         3. 치매안심센터 운영 관점의 제언\n\n\
         전문적이고 정중한 어조의 마크다운으로 작성해 주세요."
    ))
}

/// Client for a `generateContent`-style text endpoint.
#[derive(Debug)]
pub struct SummaryClient {
    config: SummaryConfig,
    client: Option<reqwest::Client>,
}

impl SummaryClient {
    /// Create a client. An unusable HTTP client leaves summaries disabled.
    #[must_use]
    pub fn new(config: SummaryConfig) -> Self {
        let client = if config.is_configured() {
            match reqwest::Client::builder()
                .timeout(config.request_timeout())
                .build()
            {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!(error = %e, "failed to build summary HTTP client");
                    None
                }
            }
        } else {
            None
        };
        Self { config, client }
    }

    /// Whether requests will be attempted.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Summarize the records, falling back to a fixed sentence on failure.
    pub async fn summarize(&self, records: &[Record]) -> String {
        let Some(client) = &self.client else {
            return NOT_CONFIGURED.to_string();
        };
        match self.request(client, records).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => EMPTY_RESPONSE.to_string(),
            Err(e) => {
                warn!(error = %e, "summary request failed");
                REQUEST_FAILED.to_string()
            }
        }
    }

    async fn request(&self, client: &reqwest::Client, records: &[Record]) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let body = json!({
            "contents": [{"parts": [{"text": build_prompt(records)?}]}]
        });
        debug!(records = records.len(), model = %self.config.model, "requesting summary");

        let response = client
            .post(url)
            .query(&[("key", &self.config.api_key)])
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::RemoteStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let payload: Value = response.json().await?;
        Ok(response_text(&payload))
    }
}

/// Concatenate the text parts of the first candidate.
fn response_text(payload: &Value) -> String {
    payload["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}
