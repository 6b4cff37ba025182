//! Dashboard figures over the visible record set.

use serde::Serialize;

use crate::record::Record;

/// Suffix dropped from center names in the per-center breakdown.
const CENTER_SUFFIX: &str = " 치매안심센터";

/// How many centers the per-center breakdown keeps.
const TOP_CENTERS: usize = 7;

/// Label for records without a diagnosis.
const UNKNOWN_DIAGNOSIS: &str = "미상";

/// A label with the number of records carrying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Count {
    /// Category label.
    pub name: String,
    /// Number of records.
    pub count: u32,
}

/// Figures shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    /// Number of records.
    pub total: u32,
    /// Records with a missing-person history.
    pub high_risk: u32,
    /// `high_risk` as a percentage of `total`, one decimal.
    pub high_risk_rate: f64,
    /// Mean age, one decimal.
    pub average_age: f64,
    /// Largest centers first, at most seven.
    pub by_center: Vec<Count>,
    /// Diagnoses in order of first appearance.
    pub by_diagnosis: Vec<Count>,
}

impl DashboardStats {
    /// Aggregate a record set.
    #[must_use]
    pub fn compute(records: &[Record]) -> Self {
        let total = u32::try_from(records.len()).unwrap_or(u32::MAX);
        let high_risk = u32::try_from(records.iter().filter(|r| is_high_risk(r)).count())
            .unwrap_or(u32::MAX);

        let (high_risk_rate, average_age) = if total == 0 {
            (0.0, 0.0)
        } else {
            let age_sum: f64 = records
                .iter()
                .filter_map(|r| r.int_field("age"))
                .filter_map(|age| i32::try_from(age).ok())
                .map(f64::from)
                .sum();
            (
                round1(f64::from(high_risk) * 100.0 / f64::from(total)),
                round1(age_sum / f64::from(total)),
            )
        };

        let mut by_center = tally(records.iter().map(|r| {
            r.center_name()
                .unwrap_or_default()
                .replace(CENTER_SUFFIX, "")
        }));
        // stable: ties keep first-appearance order
        by_center.sort_by(|a, b| b.count.cmp(&a.count));
        by_center.truncate(TOP_CENTERS);

        let by_diagnosis = tally(records.iter().map(|r| {
            r.str_field("diagnosis")
                .filter(|d| !d.is_empty())
                .unwrap_or(UNKNOWN_DIAGNOSIS)
                .to_string()
        }));

        Self {
            total,
            high_risk,
            high_risk_rate,
            average_age,
            by_center,
            by_diagnosis,
        }
    }
}

/// A record is high-risk if the patient went missing before.
#[must_use]
pub fn is_high_risk(record: &Record) -> bool {
    record.str_field("missingExperience") == Some("유")
        || record.int_field("missingCount").is_some_and(|n| n > 0)
}

fn tally(labels: impl Iterator<Item = String>) -> Vec<Count> {
    let mut counts: Vec<Count> = Vec::new();
    for label in labels {
        match counts.iter_mut().find(|c| c.name == label) {
            Some(entry) => entry.count += 1,
            None => counts.push(Count {
                name: label,
                count: 1,
            }),
        }
    }
    counts
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
