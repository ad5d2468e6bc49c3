use std::collections::BTreeMap;

use serde::Deserialize;

/// A single table as extracted from the DOM: ordered header cells and
/// ordered body rows (each row is a vector of cell texts aligned to
/// `headers`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTable {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    #[must_use]
    pub fn new(headers: Vec<&str>, rows: Vec<Vec<&str>>) -> Self {
        Self {
            headers: headers.into_iter().map(str::to_string).collect(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(str::to_string).collect())
                .collect(),
        }
    }

    pub fn column_index(&self, matches: impl Fn(&str) -> bool) -> Option<usize> {
        self.headers
            .iter()
            .position(|header| matches(&normalize_header(header)))
    }

    pub fn cell(&self, row: &[String], index: Option<usize>) -> Option<String> {
        let index = index?;
        row.get(index).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
    }
}

/// Lowercases and collapses whitespace in a header cell for token matching.
#[must_use]
pub fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase()
}

/// Everything the DOM extraction step hands the parser for one order block:
/// label/value pairs, the ordered tables on the block, the structured
/// "summary" currency spans, the parsed `.check-server-details` lines, and
/// the free-text body (used for regex probing as a last resort).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DetailPayload {
    #[serde(default)]
    pub pairs: BTreeMap<String, String>,
    #[serde(default)]
    pub tables: Vec<RawTable>,
    #[serde(default)]
    pub summary: BTreeMap<String, String>,
    #[serde(default)]
    pub summary_details: BTreeMap<String, String>,
    #[serde(default)]
    pub body_text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl DetailPayload {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_pair(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_summary(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.summary.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_summary_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.summary_details.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_table(mut self, table: RawTable) -> Self {
        self.tables.push(table);
        self
    }

    #[must_use]
    pub fn with_body_text(mut self, text: impl Into<String>) -> Self {
        self.body_text = text.into();
        self
    }
}
