//! Topic corpus resolution and partitioned line reading.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use topicscore_types::{Partition, Record, Topic};

use crate::config::types::StorageConfig;

const FILE_SCHEME: &str = "file://";

/// Storage-side failures. All are terminal for the request.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("corpus not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unsupported storage scheme in '{uri}' (expected a path or file:// URI)")]
    UnsupportedScheme { uri: String },
}

impl SourceError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Resolve a storage base URI to a local directory.
///
/// # Errors
///
/// Returns [`SourceError::UnsupportedScheme`] for any scheme other than `file://`.
pub fn parse_base_uri(uri: &str) -> Result<PathBuf, SourceError> {
    let trimmed = uri.trim();
    if let Some(rest) = trimmed.strip_prefix(FILE_SCHEME) {
        return Ok(PathBuf::from(rest));
    }
    if trimmed.contains("://") {
        return Err(SourceError::UnsupportedScheme {
            uri: trimmed.to_string(),
        });
    }
    Ok(PathBuf::from(trimmed))
}

/// Resolves topics to lazily-read, partitioned record sequences.
pub trait SourceReader: Send + Sync {
    /// Open the corpus for `topic`. No records are read yet.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotFound`] if the corpus is missing and
    /// [`SourceError::Io`] if it cannot be opened.
    fn open(&self, topic: &Topic) -> Result<RecordSource, SourceError>;
}

/// Lazy iterator over the partitions of one corpus.
///
/// Reads at most `partition_lines` lines per call to `next`. After the
/// first error the iterator is exhausted.
pub struct RecordSource {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
    partition_lines: usize,
    skip_blank_lines: bool,
    next_line: u64,
    next_index: usize,
    done: bool,
}

impl RecordSource {
    pub fn from_reader(
        path: impl Into<PathBuf>,
        reader: Box<dyn BufRead + Send>,
        partition_lines: usize,
        skip_blank_lines: bool,
    ) -> Self {
        Self {
            path: path.into(),
            reader,
            partition_lines: partition_lines.max(1),
            skip_blank_lines,
            next_line: 0,
            next_index: 0,
            done: false,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_line(&mut self) -> Result<Option<String>, SourceError> {
        let mut buf = Vec::new();
        let n = self
            .reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| SourceError::from_io(&self.path, e))?;
        if n == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        let line = String::from_utf8(buf).map_err(|e| SourceError::Io {
            path: self.path.clone(),
            source: io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line {} is not valid UTF-8: {e}", self.next_line + 1),
            ),
        })?;
        Ok(Some(line))
    }
}

impl Iterator for RecordSource {
    type Item = Result<Partition, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut records = Vec::with_capacity(self.partition_lines);
        while records.len() < self.partition_lines {
            match self.read_line() {
                Ok(Some(text)) => {
                    let line = self.next_line;
                    self.next_line += 1;
                    if self.skip_blank_lines && text.trim().is_empty() {
                        continue;
                    }
                    records.push(Record::new(line, text));
                }
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        if records.is_empty() {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;
        Some(Ok(Partition { index, records }))
    }
}

/// Reads `<base>/<topic>.txt` from a local or mounted filesystem.
#[derive(Debug, Clone)]
pub struct FsSourceReader {
    base: PathBuf,
    partition_lines: usize,
    skip_blank_lines: bool,
}

impl FsSourceReader {
    /// # Errors
    ///
    /// Fails if `storage.base_uri` uses an unsupported scheme.
    pub fn new(storage: &StorageConfig) -> Result<Self, SourceError> {
        Ok(Self {
            base: parse_base_uri(&storage.base_uri)?,
            partition_lines: storage.partition_lines,
            skip_blank_lines: storage.skip_blank_lines,
        })
    }

    /// Path the corpus for `topic` resolves to.
    #[must_use]
    pub fn corpus_path(&self, topic: &Topic) -> PathBuf {
        self.base.join(topic.file_name())
    }
}

impl SourceReader for FsSourceReader {
    fn open(&self, topic: &Topic) -> Result<RecordSource, SourceError> {
        let path = self.corpus_path(topic);
        let metadata = std::fs::metadata(&path).map_err(|e| SourceError::from_io(&path, e))?;
        if !metadata.is_file() {
            return Err(SourceError::Io {
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
                path,
            });
        }
        let file = File::open(&path).map_err(|e| SourceError::from_io(&path, e))?;
        tracing::debug!(path = %path.display(), bytes = metadata.len(), "Opened corpus");
        Ok(RecordSource::from_reader(
            path,
            Box::new(BufReader::new(file)),
            self.partition_lines,
            self.skip_blank_lines,
        ))
    }
}
