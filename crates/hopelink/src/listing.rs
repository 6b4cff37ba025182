//! Search over the visible record set.

use crate::record::Record;

/// Search term and center filter of the list screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Substring matched against name, serial number and guardian name.
    pub search: String,
    /// Exact center to restrict to.
    pub center: Option<String>,
}

impl ListFilter {
    /// Whether a record passes the filter.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        let matches_search = self.search.is_empty()
            || ["name", "serialNumber", "guardianName"]
                .iter()
                .filter_map(|key| record.str_field(key))
                .any(|value| value.contains(self.search.as_str()));
        let matches_center = self
            .center
            .as_deref()
            .map_or(true, |center| record.center_name() == Some(center));
        matches_search && matches_center
    }

    /// Records passing the filter, in input order.
    #[must_use]
    pub fn apply(&self, records: &[Record]) -> Vec<Record> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

/// Distinct center names in order of first appearance.
#[must_use]
pub fn unique_centers(records: &[Record]) -> Vec<String> {
    let mut centers: Vec<String> = Vec::new();
    for center in records.iter().filter_map(Record::center_name) {
        if !centers.iter().any(|c| c == center) {
            centers.push(center.to_string());
        }
    }
    centers
}
