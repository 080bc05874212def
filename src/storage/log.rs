//! Durable append-only record log
//!
//! Every mutation appends one framed record to a single log file. Opening the
//! store replays the log front to back, last write wins.
//!
//! # Format
//!
//! ```text
//! [4-byte LE length][JSON record][4-byte LE checksum]
//! [4-byte LE length][JSON record][4-byte LE checksum]
//! ...
//! ```
//!
//! A record cut short by a crash, or one whose checksum does not match, ends
//! replay. The file is truncated back to the last good record so later
//! appends are not hidden behind the damaged tail.

use crate::error::{Error, Result};
use crate::storage::engine::StorageEngine;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// File name inside the data directory
pub const LOG_FILE_NAME: &str = "pageindex.log";

const FRAME_OVERHEAD: usize = 8;

/// A single logged mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogOp {
    Put { key: String, value: Value },
    Delete { key: String },
}

/// One framed entry of the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Monotonically increasing within one log generation
    pub sequence: u64,
    /// Milliseconds since epoch
    pub timestamp_ms: i64,
    pub op: LogOp,
}

impl LogRecord {
    pub fn new(sequence: u64, op: LogOp) -> Self {
        Self {
            sequence,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            op,
        }
    }

    /// Serialize with length prefix and checksum suffix
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize log record: {}", e)))?;

        let len = u32::try_from(json.len())
            .map_err(|_| Error::Storage(format!("Log record too large: {} bytes", json.len())))?;

        let mut result = Vec::with_capacity(json.len() + FRAME_OVERHEAD);
        result.extend_from_slice(&len.to_le_bytes());
        result.extend_from_slice(&json);
        result.extend_from_slice(&checksum(&json).to_le_bytes());

        Ok(result)
    }

    /// Decode the frame at the start of `bytes`
    ///
    /// Returns the record and the number of bytes it occupied.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < FRAME_OVERHEAD {
            return Err(Error::Storage("Record frame too short".to_string()));
        }

        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let total = len + FRAME_OVERHEAD;
        if bytes.len() < total {
            return Err(Error::Storage(format!(
                "Incomplete record: expected {} bytes, got {}",
                total,
                bytes.len()
            )));
        }

        let json = &bytes[4..4 + len];
        let stored = u32::from_le_bytes([
            bytes[4 + len],
            bytes[5 + len],
            bytes[6 + len],
            bytes[7 + len],
        ]);
        if stored != checksum(json) {
            return Err(Error::Storage("Checksum mismatch".to_string()));
        }

        let record = serde_json::from_slice(json)
            .map_err(|e| Error::Serialization(format!("Failed to deserialize log record: {}", e)))?;

        Ok((record, total))
    }
}

/// FNV-1a over the record body
fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(0x811c_9dc5u32, |hash, &b| {
        (hash ^ b as u32).wrapping_mul(0x0100_0193)
    })
}

struct LogWriter {
    file: File,
    next_sequence: u64,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
}

/// Durable key-value storage backed by a single record log
///
/// File writes and fsyncs run on the calling thread, including from the
/// async `StorageEngine` methods. Callers on a shared runtime should move
/// heavy use onto `tokio::task::spawn_blocking`.
pub struct LogStorage {
    log_path: PathBuf,
    /// Live values rebuilt from the log
    state: RwLock<HashMap<String, Value>>,
    writer: Mutex<LogWriter>,
    sync_writes: bool,
}

impl std::fmt::Debug for LogStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStorage")
            .field("log_path", &self.log_path)
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl LogStorage {
    /// Create or open the log in `base_path`
    pub fn open<P: AsRef<Path>>(base_path: P, sync_writes: bool) -> Result<Self> {
        let base_path = base_path.as_ref();
        std::fs::create_dir_all(base_path)
            .map_err(|e| Error::Storage(format!("Failed to create data dir: {}", e)))?;

        let log_path = base_path.join(LOG_FILE_NAME);
        let (state, next_sequence) = Self::recover(&log_path)?;

        let file = open_append(&log_path)?;

        Ok(Self {
            log_path,
            state: RwLock::new(state),
            writer: Mutex::new(LogWriter {
                file,
                next_sequence,
                poisoned: false,
            }),
            sync_writes,
        })
    }

    /// Replay the log and cut off any damaged tail
    fn recover(log_path: &Path) -> Result<(HashMap<String, Value>, u64)> {
        if !log_path.exists() {
            info!(path = ?log_path, "No log found, starting fresh");
            return Ok((HashMap::new(), 0));
        }

        let bytes = std::fs::read(log_path)
            .map_err(|e| Error::Storage(format!("Failed to read log: {}", e)))?;

        let mut state = HashMap::new();
        let mut offset = 0usize;
        let mut max_sequence = None;
        let mut records = 0usize;

        while offset < bytes.len() {
            match LogRecord::from_bytes(&bytes[offset..]) {
                Ok((record, used)) => {
                    let sequence = record.sequence;
                    match record.op {
                        LogOp::Put { key, value } => {
                            state.insert(key, value);
                        }
                        LogOp::Delete { key } => {
                            state.remove(&key);
                        }
                    }
                    max_sequence = Some(max_sequence.map_or(sequence, |m: u64| m.max(sequence)));
                    offset += used;
                    records += 1;
                }
                Err(e) => {
                    warn!(
                        offset,
                        dropped_bytes = bytes.len() - offset,
                        error = %e,
                        "Damaged log tail, truncating"
                    );
                    let file = OpenOptions::new()
                        .write(true)
                        .open(log_path)
                        .map_err(|e| Error::Storage(format!("Failed to open log: {}", e)))?;
                    file.set_len(offset as u64)
                        .map_err(|e| Error::Storage(format!("Failed to truncate log: {}", e)))?;
                    file.sync_all()
                        .map_err(|e| Error::Storage(format!("Failed to sync log: {}", e)))?;
                    break;
                }
            }
        }

        let next_sequence = max_sequence.map_or(0, |m| m + 1);
        info!(records, keys = state.len(), next_sequence, "Log recovery complete");

        Ok((state, next_sequence))
    }

    /// Append one mutation, then apply it to the live state
    fn append(&self, op: LogOp) -> Result<()> {
        let sync_writes = self.sync_writes;
        self.append_with(op, |file, bytes| {
            file.write_all(bytes)?;
            if sync_writes {
                file.sync_data()?;
            }
            Ok(())
        })
    }

    /// Append through `write`, cutting the file back to its previous length
    /// if the write fails so no partial record is left ahead of later ones.
    fn append_with<F>(&self, op: LogOp, write: F) -> Result<()>
    where
        F: FnOnce(&mut File, &[u8]) -> std::io::Result<()>,
    {
        let mut writer = self.writer.lock();
        if writer.poisoned {
            return Err(Error::Storage(
                "Log writer poisoned by an earlier failed append; reopen the store".to_string(),
            ));
        }

        let record = LogRecord::new(writer.next_sequence, op);
        let bytes = record.to_bytes()?;

        let start = writer
            .file
            .metadata()
            .map_err(|e| Error::Storage(format!("Failed to stat log: {}", e)))?
            .len();

        if let Err(e) = write(&mut writer.file, &bytes) {
            if let Err(rollback) = writer.file.set_len(start) {
                writer.poisoned = true;
                error!(error = %rollback, offset = start, "Failed to roll back partial append");
            } else {
                warn!(error = %e, offset = start, "Append failed, log rolled back");
            }
            return Err(Error::Storage(format!("Failed to append record: {}", e)));
        }
        writer.next_sequence += 1;

        // Applied under the writer lock so state order matches log order.
        let mut state = self.state.write();
        match record.op {
            LogOp::Put { key, value } => {
                state.insert(key, value);
            }
            LogOp::Delete { key } => {
                state.remove(&key);
            }
        }

        debug!(sequence = record.sequence, bytes = bytes.len(), "Appended log record");
        Ok(())
    }

    /// Rewrite the log with one record per live key
    ///
    /// Returns the number of keys written.
    pub fn vacuum(&self) -> Result<usize> {
        let mut writer = self.writer.lock();
        let snapshot = self.state.read().clone();

        info!(path = ?self.log_path, keys = snapshot.len(), "Vacuuming log");

        let temp_path = self.log_path.with_extension("log.tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| Error::Storage(format!("Failed to create temp log: {}", e)))?;

        let mut keys: Vec<_> = snapshot.into_iter().collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0));
        let written = keys.len();

        for (sequence, (key, value)) in keys.into_iter().enumerate() {
            let record = LogRecord::new(sequence as u64, LogOp::Put { key, value });
            file.write_all(&record.to_bytes()?)
                .map_err(|e| Error::Storage(format!("Failed to write vacuumed log: {}", e)))?;
        }
        file.sync_all()
            .map_err(|e| Error::Storage(format!("Failed to sync vacuumed log: {}", e)))?;

        std::fs::rename(&temp_path, &self.log_path)
            .map_err(|e| Error::Storage(format!("Failed to rename log: {}", e)))?;

        writer.file = open_append(&self.log_path)?;
        writer.next_sequence = written as u64;
        writer.poisoned = false;

        info!(keys = written, "Log vacuum complete");
        Ok(written)
    }

    /// Size of the log file in bytes
    pub fn log_size(&self) -> Result<u64> {
        std::fs::metadata(&self.log_path)
            .map(|m| m.len())
            .map_err(|e| Error::Storage(format!("Failed to stat log: {}", e)))
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Sorted live keys
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::Storage(format!("Failed to open log: {}", e)))
}

#[async_trait]
impl StorageEngine for LogStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.state.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        self.append(LogOp::Put {
            key: key.to_string(),
            value,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if !self.state.read().contains_key(key) {
            return Ok(());
        }
        self.append(LogOp::Delete {
            key: key.to_string(),
        })
    }
}
