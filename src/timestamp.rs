use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;

/// Layout of the timestamp that may open a log line.
pub const LEADING_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const LEADING_TS_LEN: usize = 19;

// The timestamp must be followed by a space or end the line.
static LEADING_TS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?: |$)")
        .expect("valid leading timestamp regex")
});

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp at the very start of `line`.
///
/// Returns `None` for lines that are too short, start with anything else,
/// run the timestamp into the next word, or carry an impossible date; callers
/// treat that as "no timestamp", not an error.
pub fn extract_leading_timestamp(line: &str) -> Option<NaiveDateTime> {
    if !LEADING_TS_RE.is_match(line) {
        return None;
    }
    let prefix = line.get(..LEADING_TS_LEN)?;
    NaiveDateTime::parse_from_str(prefix, LEADING_TS_FORMAT).ok()
}

/// Drop a leading `YYYY-MM-DD HH:MM:SS ` prefix (with its separating space) if present.
pub fn strip_leading_timestamp(line: &str) -> &str {
    match LEADING_TS_RE.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}
