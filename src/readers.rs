use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::event::LogLine;

/// One call's worth of lines plus the offset reading stopped at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub lines: Vec<LogLine>,
    /// Next unread byte offset in the source file.
    pub position: u64,
    /// The file shrank or was replaced; reading restarts at offset 0.
    pub rotated: bool,
}

impl Chunk {
    fn empty(position: u64) -> Self {
        Self {
            lines: Vec::new(),
            position,
            rotated: false,
        }
    }
}

/// Reads a growing file in bounded batches of lines, starting at a byte offset.
///
/// A trailing line without its newline is left unread until the newline arrives,
/// except by [`ChunkReader::read_chunk_final`]. A missing file is treated as
/// "no data yet".
pub struct ChunkReader {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    position: u64,
    chunk_size: usize,
    accept_partial: bool,
    #[cfg(unix)]
    inode: Option<u64>,
}

impl ChunkReader {
    pub fn new(path: impl Into<PathBuf>, position: u64, chunk_size: usize) -> Self {
        Self {
            path: path.into(),
            reader: None,
            position,
            chunk_size: chunk_size.max(1),
            accept_partial: false,
            #[cfg(unix)]
            inode: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read up to `chunk_size` complete lines.
    ///
    /// An empty chunk means no new data; when the file has been truncated or
    /// replaced the empty chunk has `position == 0` and `rotated == true`.
    pub fn read_chunk(&mut self) -> Result<Chunk> {
        if !self.ensure_open()? {
            return Ok(Chunk::empty(self.position));
        }

        let lines = self.read_lines()?;
        if lines.is_empty() && self.detect_rotation()? {
            self.reader = None;
            self.position = 0;
            return Ok(Chunk {
                lines,
                position: 0,
                rotated: true,
            });
        }

        Ok(Chunk {
            lines,
            position: self.position,
            rotated: false,
        })
    }

    /// Like [`ChunkReader::read_chunk`], but a trailing line without its
    /// newline is consumed too. Used once the writer is known to be done.
    pub fn read_chunk_final(&mut self) -> Result<Chunk> {
        self.accept_partial = true;
        let chunk = self.read_chunk();
        self.accept_partial = false;
        chunk
    }

    fn ensure_open(&mut self) -> Result<bool> {
        if self.reader.is_some() {
            return Ok(true);
        }

        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "input file not present yet");
                return Ok(false);
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to open input file: {}", self.path.display()))
            }
        };

        let size = file
            .metadata()
            .with_context(|| format!("Failed to stat input file: {}", self.path.display()))?
            .len();
        if size < self.position {
            warn!(
                path = %self.path.display(),
                previous_offset = self.position,
                current_size = size,
                "input smaller than resume offset; starting from the beginning"
            );
            self.position = 0;
        }

        file.seek(SeekFrom::Start(self.position))
            .with_context(|| format!("Failed to seek in input file: {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            self.inode = file.metadata().ok().map(|meta| meta.ino());
        }

        info!(path = %self.path.display(), offset = self.position, "reading input");
        self.reader = Some(BufReader::new(file));
        Ok(true)
    }

    fn read_lines(&mut self) -> Result<Vec<LogLine>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(Vec::new());
        };

        let mut lines = Vec::with_capacity(self.chunk_size.min(1024));
        let mut buffer = Vec::new();

        while lines.len() < self.chunk_size {
            buffer.clear();
            let read = reader
                .read_until(b'\n', &mut buffer)
                .with_context(|| format!("Failed to read input file: {}", self.path.display()))?;
            if read == 0 {
                break;
            }

            if buffer.last() != Some(&b'\n') && !self.accept_partial {
                // Incomplete line still being written: rewind and wait for the rest.
                reader.seek(SeekFrom::Start(self.position))?;
                break;
            }

            let start = self.position;
            self.position += read as u64;
            let text = String::from_utf8_lossy(&buffer);
            let text = text.trim_end_matches(['\n', '\r']);
            lines.push(LogLine::new(text, start, self.position));
        }

        Ok(lines)
    }

    /// True when the path now refers to a shorter or different file.
    fn detect_rotation(&self) -> Result<bool> {
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            // Moved away and not yet recreated: keep draining the old handle.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to stat input file: {}", self.path.display()))
            }
        };

        if meta.len() < self.position {
            warn!(
                path = %self.path.display(),
                previous_offset = self.position,
                current_size = meta.len(),
                "input truncated; resetting to offset 0"
            );
            return Ok(true);
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            if self.inode.is_some_and(|inode| inode != meta.ino()) {
                warn!(
                    path = %self.path.display(),
                    previous_offset = self.position,
                    "input replaced; resetting to offset 0"
                );
                return Ok(true);
            }
        }

        Ok(false)
    }
}
