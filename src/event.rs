//! Data model shared by the parser, the workers and the aggregator.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::Serialize;
use xxhash_rust::xxh3::xxh3_64;

/// A raw line pulled from the source file together with the byte range it occupied
/// (`end` is the offset just past the line terminator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub text: String,
    pub start: u64,
    pub end: u64,
}

impl LogLine {
    pub fn new(text: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }
}

/// Content hash used by the dedup window.
pub fn content_hash(line: &str) -> u64 {
    xxh3_64(line.as_bytes())
}

/// Category name mapped to the raw lines that matched it, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EventBucket {
    categories: IndexMap<String, Vec<String>>,
}

impl EventBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, category: &str, line: impl Into<String>) {
        match self.categories.get_mut(category) {
            Some(lines) => lines.push(line.into()),
            None => {
                self.categories
                    .insert(category.to_string(), vec![line.into()]);
            }
        }
    }

    pub fn get(&self, category: &str) -> Option<&[String]> {
        self.categories.get(category).map(|lines| lines.as_slice())
    }

    /// Number of lines recorded for `category`, zero when it was never seen.
    pub fn count(&self, category: &str) -> usize {
        self.categories.get(category).map_or(0, Vec::len)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.categories
            .iter()
            .map(|(category, lines)| (category.as_str(), lines.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }
}

/// Message carried by a timeline entry. Workers emit `Raw`; the aggregator
/// rewrites it to `Templated` before the entry is persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    Raw {
        msg: String,
    },
    Templated {
        msg_id: u64,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        msg_values: Vec<String>,
    },
}

/// One structured occurrence extracted from a line.
///
/// At most one of `value` and `message` is populated; an entry with neither
/// is a bare category hit. Use the constructors to keep that invariant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    #[serde(rename = "time", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
    #[serde(rename = "event")]
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(flatten)]
    pub message: Option<Message>,
}

impl TimelineEntry {
    pub fn occurrence(timestamp: Option<NaiveDateTime>, category: impl Into<String>) -> Self {
        Self {
            timestamp,
            category: category.into(),
            value: None,
            message: None,
        }
    }

    pub fn with_value(
        timestamp: Option<NaiveDateTime>,
        category: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            value: Some(value),
            ..Self::occurrence(timestamp, category)
        }
    }

    pub fn with_message(
        timestamp: Option<NaiveDateTime>,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: Some(Message::Raw {
                msg: message.into(),
            }),
            ..Self::occurrence(timestamp, category)
        }
    }

    pub fn raw_message(&self) -> Option<&str> {
        match &self.message {
            Some(Message::Raw { msg }) => Some(msg),
            _ => None,
        }
    }
}

/// Everything one source line contributed: the categories whose buckets receive
/// the raw line (one push per hit) and the timeline entries, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub hash: u64,
    pub raw: String,
    pub categories: Vec<String>,
    pub entries: Vec<TimelineEntry>,
}

/// Output of parsing one batch. Only lines that matched at least one category
/// are kept, in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutput {
    pub lines: Vec<ParsedLine>,
    pub stats: crate::stats::ParseStats,
}

impl ParseOutput {
    pub fn entry_count(&self) -> usize {
        self.lines.iter().map(|line| line.entries.len()).sum()
    }
}

#[cfg(test)]
impl ParseOutput {
    /// The batch's event-bucket delta.
    pub fn events(&self) -> EventBucket {
        let mut bucket = EventBucket::new();
        for line in &self.lines {
            for category in &line.categories {
                bucket.push(category, line.raw.clone());
            }
        }
        bucket
    }

    /// The batch's timeline delta, in line order.
    pub fn timeline(&self) -> impl Iterator<Item = &TimelineEntry> {
        self.lines.iter().flat_map(|line| line.entries.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
