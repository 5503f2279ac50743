#![forbid(unsafe_code)]

//! Formatting used when a snapshot is shown as a table.

use crate::sentiment::SentimentSnapshot;

/// Status of where the displayed data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSourceStatus {
    Network,
    Error,
}

impl DataSourceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSourceStatus::Network => "Network",
            DataSourceStatus::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRow {
    pub title: String,
    pub count: u64,
    pub formatted_count: String,
}

/// "very positive" -> "Very Positive".
pub fn title_case(label: &str) -> String {
    label
        .to_lowercase()
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// 1234567 -> "1,234,567".
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn snapshot_rows(snapshot: &SentimentSnapshot) -> Vec<SnapshotRow> {
    snapshot
        .counts()
        .iter()
        .map(|(label, count)| SnapshotRow {
            title: title_case(label),
            count: *count,
            formatted_count: format_count(*count),
        })
        .collect()
}
