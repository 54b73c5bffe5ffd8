#![no_main]

use libfuzzer_sys::fuzz_target;
use logtally::aggregate::templatize;
use logtally::config::ExtractionConfig;
use logtally::parsers::{KeyValueMode, LineParser};

const MAX_LINES: usize = 64;

fuzz_target!(|data: &[u8]| {
    let Some((&flags, rest)) = data.split_first() else {
        return;
    };
    let Ok(text) = std::str::from_utf8(rest) else {
        return;
    };

    let config = ExtractionConfig {
        key_values: if flags & 0x1 == 0x1 {
            KeyValueMode::Always
        } else {
            KeyValueMode::Auto
        },
        capture_messages: flags & 0x2 == 0x2,
        ..ExtractionConfig::default()
    };
    let parser = LineParser::new(&config);

    let lines: Vec<&str> = text.lines().take(MAX_LINES).collect();
    let output = parser.parse_lines(&lines);

    assert!(output.stats.lines_read <= lines.len());
    assert!(output.stats.lines_matched <= output.stats.lines_read);
    for line in &output.lines {
        assert!(!line.categories.is_empty());
        assert_eq!(line.categories.len(), line.entries.len());
        let templated = templatize(&line.raw);
        assert_eq!(templatize(&templated.template).template, templated.template);
    }
});
