use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Stand-in for every number lifted out of a message.
pub const NUMBER_PLACEHOLDER: &str = "{num}";

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+\b").expect("valid number token regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Templated {
    pub template: String,
    pub values: Vec<String>,
}

/// Replace each standalone run of digits with the placeholder, returning the
/// template and the digit strings in order of appearance.
pub fn templatize(message: &str) -> Templated {
    let values = NUMBER_RE
        .find_iter(message)
        .map(|m| m.as_str().to_string())
        .collect();
    let template = NUMBER_RE
        .replace_all(message, NUMBER_PLACEHOLDER)
        .into_owned();
    Templated { template, values }
}

/// One line of the template store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: u64,
    pub template: String,
}

/// In-memory map from template text to its id. Ids start at 0 and grow by one.
#[derive(Debug, Default)]
pub struct TemplateTable {
    ids: HashMap<String, u64>,
    next_id: u64,
}

impl TemplateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted records; the next id continues after the largest seen.
    pub fn from_records(records: impl IntoIterator<Item = TemplateRecord>) -> Self {
        let mut table = Self::new();
        for record in records {
            table.next_id = table.next_id.max(record.id + 1);
            table.ids.entry(record.template).or_insert(record.id);
        }
        table
    }

    /// Id for `template`, assigning a fresh one if unseen. The flag is true when
    /// the template was just added.
    pub fn lookup_or_insert(&mut self, template: &str) -> (u64, bool) {
        if let Some(&id) = self.ids.get(template) {
            return (id, false);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(template.to_string(), id);
        (id, true)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Append-only JSONL file of [`TemplateRecord`]s.
pub struct TemplateStore {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl TemplateStore {
    /// Open (creating if needed) and read back the existing records.
    /// Undecodable lines are skipped with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Result<(Self, TemplateTable)> {
        let path = path.into();
        let records = read_records(&path)?;
        let table = TemplateTable::from_records(records);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open template store: {}", path.display()))?;

        Ok((
            Self {
                path,
                writer: BufWriter::new(file),
            },
            table,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, record: &TemplateRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)
            .with_context(|| format!("Failed to write template store: {}", self.path.display()))?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush template store: {}", self.path.display()))
    }
}

fn read_records(path: &Path) -> Result<Vec<TemplateRecord>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read template store: {}", path.display()))
        }
    };

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TemplateRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                path = %path.display(),
                line = index + 1,
                error = %e,
                "skipping undecodable template record"
            ),
        }
    }
    Ok(records)
}

/// Ensure the file at `path`, if any, ends with a newline so appended records
/// never join a partially written one.
pub(crate) fn terminate_partial_line(path: &Path) -> Result<()> {
    let mut file = match OpenOptions::new().read(true).append(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("Failed to open {}", path.display())),
    };
    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    if len == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        warn!(path = %path.display(), "terminating partially written record");
        file.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_templatize_replaces_numbers() {
        let templated = templatize("ERROR retry 3 of 10 for user42");
        assert_eq!(templated.template, "ERROR retry {num} of {num} for user42");
        assert_eq!(templated.values, vec!["3", "10"]);

        let plain = templatize("ERROR Database connection failed");
        assert_eq!(plain.template, "ERROR Database connection failed");
        assert!(plain.values.is_empty());
    }

    #[test]
    fn test_templatize_keeps_leading_zeros_as_strings() {
        let templated = templatize("code 007 at 1.5");
        assert_eq!(templated.template, "code {num} at {num}.{num}");
        assert_eq!(templated.values, vec!["007", "1", "5"]);
    }

    #[test]
    fn test_table_assigns_sequential_ids() {
        let mut table = TemplateTable::new();
        assert_eq!(table.lookup_or_insert("a {num}"), (0, true));
        assert_eq!(table.lookup_or_insert("b"), (1, true));
        assert_eq!(table.lookup_or_insert("a {num}"), (0, false));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_table_from_records_continues_after_max() {
        let mut table = TemplateTable::from_records(vec![
            TemplateRecord {
                id: 4,
                template: "x".to_string(),
            },
            TemplateRecord {
                id: 2,
                template: "y".to_string(),
            },
        ]);
        assert_eq!(table.lookup_or_insert("y"), (2, false));
        assert_eq!(table.lookup_or_insert("z"), (5, true));
    }

    #[test]
    fn test_store_round_trip_skips_bad_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages.jsonl");

        {
            let (mut store, mut table) = TemplateStore::open(&path).unwrap();
            assert!(table.is_empty());
            let (id, _) = table.lookup_or_insert("ERROR {num}");
            store
                .append(&TemplateRecord {
                    id,
                    template: "ERROR {num}".to_string(),
                })
                .unwrap();
            store.flush().unwrap();
        }

        let mut raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "{\"id\":0,\"template\":\"ERROR {num}\"}\n");
        raw.push_str("garbage\n");
        fs::write(&path, raw).unwrap();

        let (_store, mut table) = TemplateStore::open(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup_or_insert("ERROR {num}"), (0, false));
        assert_eq!(table.lookup_or_insert("WARNING"), (1, true));
    }

    #[test]
    fn test_terminate_partial_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        terminate_partial_line(&path).unwrap();
        assert!(!path.exists());

        fs::write(&path, "{\"event\":\"ERROR\"}\n{\"ev").unwrap();
        terminate_partial_line(&path).unwrap();
        terminate_partial_line(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{\"event\":\"ERROR\"}\n{\"ev\n"
        );
    }
}
