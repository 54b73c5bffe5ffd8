use std::time::Duration;

/// Counters produced by a worker while parsing one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub lines_read: usize,
    pub lines_matched: usize,
    pub timestamp_misses: usize,
    pub value_errors: usize,
}

impl ParseStats {
    pub fn merge(&mut self, other: &ParseStats) {
        self.lines_read += other.lines_read;
        self.lines_matched += other.lines_matched;
        self.timestamp_misses += other.timestamp_misses;
        self.value_errors += other.value_errors;
    }
}

/// Statistics for a whole ingestion run. Parse counters are merged by the
/// aggregator as deltas arrive; delivery counters come from the workers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    pub parse: ParseStats,
    pub batches_dispatched: u64,
    pub deltas_merged: u64,
    pub deltas_dropped: u64,
    pub lines_dropped: u64,
    pub duplicates_skipped: u64,
    pub entries_written: u64,
    pub templates_created: u64,
    pub flushes: u64,
    pub checkpoints: u64,
    pub processing_time: Duration,
}

impl PipelineStats {
    pub fn format_stats(&self) -> String {
        let mut output = format!(
            "Lines processed: {} total, {} matched",
            self.parse.lines_read, self.parse.lines_matched
        );

        if self.duplicates_skipped > 0 {
            output.push_str(&format!(", {} duplicates skipped", self.duplicates_skipped));
        }

        output.push_str(&format!(
            "; Batches: {} dispatched, {} merged",
            self.batches_dispatched, self.deltas_merged
        ));

        if self.deltas_dropped > 0 {
            output.push_str(&format!(
                ", {} dropped ({} lines)",
                self.deltas_dropped, self.lines_dropped
            ));
        }

        output.push_str(&format!(
            "; Entries written: {}, templates: {}",
            self.entries_written, self.templates_created
        ));

        if self.parse.timestamp_misses > 0 || self.parse.value_errors > 0 {
            output.push_str(&format!(
                "; {} lines without timestamp, {} non-numeric values",
                self.parse.timestamp_misses, self.parse.value_errors
            ));
        }

        let processing_time_ms = self.processing_time.as_millis();
        if processing_time_ms > 0 {
            let lines_per_sec =
                (self.parse.lines_read as f64 / self.processing_time.as_secs_f64()) as u64;
            output.push_str(&format!(
                "; Time: {}ms ({} lines/s)",
                processing_time_ms, lines_per_sec
            ));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stats_merge() {
        let mut total = ParseStats::default();
        total.merge(&ParseStats {
            lines_read: 3,
            lines_matched: 2,
            timestamp_misses: 1,
            value_errors: 0,
        });
        total.merge(&ParseStats {
            lines_read: 1,
            lines_matched: 1,
            timestamp_misses: 0,
            value_errors: 2,
        });

        assert_eq!(total.lines_read, 4);
        assert_eq!(total.lines_matched, 3);
        assert_eq!(total.timestamp_misses, 1);
        assert_eq!(total.value_errors, 2);
    }

    #[test]
    fn test_format_stats_mentions_drops_only_when_present() {
        let mut stats = PipelineStats {
            batches_dispatched: 4,
            deltas_merged: 4,
            ..Default::default()
        };
        stats.parse.lines_read = 10;
        assert!(!stats.format_stats().contains("dropped"));

        stats.deltas_dropped = 1;
        stats.lines_dropped = 3;
        let formatted = stats.format_stats();
        assert!(formatted.starts_with("Lines processed: 10 total"));
        assert!(formatted.contains("1 dropped (3 lines)"));
    }
}
