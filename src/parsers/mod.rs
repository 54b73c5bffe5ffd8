//! Line parsing: turns a batch of raw lines into an event-bucket delta and a
//! timeline delta. Parsing is pure and holds no mutable state, so one parser
//! is shared by every worker.

mod extract;

pub use extract::{parse_numeric, Extractor, KeyValueMode, VariableMatch, VariableRule};

use crate::config::ExtractionConfig;
use crate::event::{content_hash, LogLine, ParseOutput, ParsedLine, TimelineEntry};
use crate::timestamp::extract_leading_timestamp;

#[derive(Debug, Clone)]
pub struct LineParser {
    keywords: Vec<String>,
    extractor: Extractor,
    capture_messages: bool,
}

impl LineParser {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            keywords: config.keywords.clone(),
            extractor: Extractor::new(config.rules.clone(), config.key_values),
            capture_messages: config.capture_messages,
        }
    }

    /// Parse a batch read from the source file.
    pub fn parse(&self, lines: &[LogLine]) -> ParseOutput {
        let mut output = ParseOutput::default();
        for line in lines {
            self.parse_line(&line.text, &mut output);
        }
        output
    }

    /// Parse plain strings; convenient when there are no byte offsets to carry.
    pub fn parse_lines<S: AsRef<str>>(&self, lines: &[S]) -> ParseOutput {
        let mut output = ParseOutput::default();
        for line in lines {
            self.parse_line(line.as_ref(), &mut output);
        }
        output
    }

    fn parse_line(&self, text: &str, output: &mut ParseOutput) {
        let line = text.trim();
        if line.is_empty() {
            return;
        }
        output.stats.lines_read += 1;

        let timestamp = extract_leading_timestamp(line);
        if timestamp.is_none() {
            output.stats.timestamp_misses += 1;
        }

        let mut categories = Vec::new();
        let mut entries = Vec::new();

        for keyword in &self.keywords {
            if !line.contains(keyword.as_str()) {
                continue;
            }
            categories.push(keyword.clone());
            entries.push(if self.capture_messages {
                TimelineEntry::with_message(timestamp, keyword.as_str(), line)
            } else {
                TimelineEntry::occurrence(timestamp, keyword.as_str())
            });
        }

        for found in self.extractor.matches(line) {
            match parse_numeric(found.value) {
                Some(value) => {
                    categories.push(found.category.to_string());
                    entries.push(TimelineEntry::with_value(timestamp, found.category, value));
                }
                None => output.stats.value_errors += 1,
            }
        }

        if categories.is_empty() {
            return;
        }

        output.stats.lines_matched += 1;
        output.lines.push(ParsedLine {
            hash: content_hash(line),
            raw: line.to_string(),
            categories,
            entries,
        });
    }
}
