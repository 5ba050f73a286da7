use std::path::{Path, PathBuf};
use async_trait::async_trait;
use tokio::fs::{self as async_fs, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use crate::error::{Error, Result};
use crate::events::base::LogEntry;
use crate::interfaces::event_log::EventLog;

/// File-backed alert log.
///
/// ## Format
/// - One JSON object per line (`LogEntry`), sequence numbers start at 1
/// - Each entry carries a SHA-256 checksum over its content
///
/// ## Durability
/// - `append` writes the whole line, flushes and calls `sync_data` before
///   returning, so a returned sequence survives a crash
/// - Appends are serialized behind one async mutex; the sequence is assigned
///   under that lock, so file order equals sequence order
///
/// ## Recovery
/// - A final line that is truncated, not valid UTF-8 or fails its checksum
///   is the trace of a crash mid-append: it is dropped and the file truncated
///   back to the last good entry
/// - A failed `append` truncates the file back to its length before the
///   write, so partial bytes never sit in front of later entries
/// - A bad line anywhere else is `Error::CorruptLog`
pub struct FileEventLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
}

struct LogWriter {
    file: File,
    next_sequence: u64,
}

impl FileEventLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                async_fs::create_dir_all(parent).await?;
            }
        }

        let contents = match async_fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::IoError(e)),
        };

        let scan = scan_entries(&contents)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        if scan.valid_len < contents.len() {
            tracing::warn!(
                "Dropping torn tail of alert log {:?} ({} bytes)",
                path,
                contents.len() - scan.valid_len
            );
            file.set_len(scan.valid_len as u64).await?;
            file.sync_data().await?;
        } else if scan.needs_newline {
            file.write_all(b"\n").await?;
            file.sync_data().await?;
        }

        tracing::info!(
            "Opened alert log {:?} with {} entries",
            path,
            scan.entries.len()
        );

        Ok(FileEventLog {
            path,
            writer: Mutex::new(LogWriter {
                file,
                next_sequence: scan.entries.len() as u64 + 1,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventLog for FileEventLog {
    async fn append(&self, mut entry: LogEntry) -> Result<u64> {
        let mut writer = self.writer.lock().await;

        let sequence = writer.next_sequence;
        entry.seal(sequence)?;

        let mut line = serde_json::to_vec(&entry)
            .map_err(|e| Error::SerializationError(e.to_string()))?;
        line.push(b'\n');

        writer.write_line(&line).await?;

        writer.next_sequence += 1;
        Ok(sequence)
    }

    async fn read_all(&self) -> Result<Vec<LogEntry>> {
        // Hold the writer lock so we never observe a half-written line
        let _writer = self.writer.lock().await;

        let contents = async_fs::read(&self.path).await?;
        Ok(scan_entries(&contents)?.entries)
    }
}

impl LogWriter {
    /// Write and sync one line, or leave the file as it was.
    async fn write_line(&mut self, line: &[u8]) -> Result<()> {
        let len = self.file.metadata().await?.len();

        if let Err(e) = self.write_synced(line).await {
            tracing::error!("Alert log append failed, rolling back to {} bytes: {}", len, e);
            if let Err(rollback) = self.truncate_to(len).await {
                tracing::error!("Alert log rollback failed: {}", rollback);
            }
            return Err(Error::IoError(e));
        }
        Ok(())
    }

    async fn write_synced(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line).await?;
        self.file.flush().await?;
        self.file.sync_data().await
    }

    async fn truncate_to(&mut self, len: u64) -> std::io::Result<()> {
        self.file.set_len(len).await?;
        self.file.sync_data().await
    }
}

struct ScanResult {
    entries: Vec<LogEntry>,
    /// Byte length of the prefix made of good entries.
    valid_len: usize,
    /// The last good entry is missing its trailing newline.
    needs_newline: bool,
}

fn scan_entries(contents: &[u8]) -> Result<ScanResult> {
    let mut entries = Vec::new();
    let mut offset = 0usize;
    let mut valid_len = 0usize;
    let mut needs_newline = false;

    let lines: Vec<&[u8]> = contents.split_inclusive(|b| *b == b'\n').collect();
    let line_count = lines.len();

    for (index, raw) in lines.into_iter().enumerate() {
        let line_no = index + 1;
        let is_last = line_no == line_count;
        let terminated = raw.ends_with(b"\n");
        offset += raw.len();

        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim_end_matches('\n').trim_end_matches('\r'),
            Err(e) if is_last => {
                tracing::warn!("Ignoring torn final log line {}: {}", line_no, e);
                continue;
            }
            Err(e) => {
                return Err(Error::CorruptLog {
                    line: line_no,
                    details: e.to_string(),
                });
            }
        };

        if line.trim().is_empty() {
            if !is_last || terminated {
                valid_len = offset;
            }
            continue;
        }

        match parse_line(line, entries.len() as u64 + 1) {
            Ok(entry) => {
                entries.push(entry);
                valid_len = offset;
                needs_newline = !terminated;
            }
            Err(Error::UnsupportedLogVersion { version, max_supported }) => {
                return Err(Error::UnsupportedLogVersion { version, max_supported });
            }
            Err(e) if is_last => {
                tracing::warn!("Ignoring torn final log line {}: {}", line_no, e);
            }
            Err(e) => {
                return Err(Error::CorruptLog {
                    line: line_no,
                    details: e.to_string(),
                });
            }
        }
    }

    Ok(ScanResult {
        entries,
        valid_len,
        needs_newline,
    })
}

fn parse_line(line: &str, expected_sequence: u64) -> Result<LogEntry> {
    let entry: LogEntry = serde_json::from_str(line)
        .map_err(|e| Error::DeserializationError(e.to_string()))?;

    if entry.version > crate::LOG_FORMAT_VERSION {
        return Err(Error::UnsupportedLogVersion {
            version: entry.version,
            max_supported: crate::LOG_FORMAT_VERSION,
        });
    }

    if !entry.verify_checksum() {
        return Err(Error::InvalidChecksum {
            sequence: entry.sequence,
        });
    }

    if entry.sequence != expected_sequence {
        return Err(Error::DeserializationError(format!(
            "sequence gap: expected {}, got {}",
            expected_sequence, entry.sequence
        )));
    }

    Ok(entry)
}
