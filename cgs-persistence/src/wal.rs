//! Append-only, CRC-guarded write-ahead log.

use std::convert::TryInto;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use slog::{o, warn, Logger};

use crate::error::{PersistenceError, PersistenceResult};

/// Default WAL segment size budget (§4.8a); advisory only — the snapshot
/// cadence is what actually keeps the file small via truncation.
pub const DEFAULT_MAX_FILE_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalOperation {
    PlayerJoin = 1,
    PlayerLeave = 2,
    StateUpdate = 3,
    InventoryChange = 4,
    QuestUpdate = 5,
}

impl WalOperation {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(WalOperation::PlayerJoin),
            2 => Some(WalOperation::PlayerLeave),
            3 => Some(WalOperation::StateUpdate),
            4 => Some(WalOperation::InventoryChange),
            5 => Some(WalOperation::QuestUpdate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    pub sequence: u64,
    pub timestamp_us: u64,
    pub player_id: u64,
    pub operation: WalOperation,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct WalConfig {
    pub directory: PathBuf,
    pub max_file_size: usize,
    pub sync_on_write: bool,
}

impl WalConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        WalConfig {
            directory: directory.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            sync_on_write: true,
        }
    }
}

const HEADER_LEN: usize = 8 + 8 + 8 + 1 + 4; // sequence+timestamp+playerId+op+dataSize
const CRC_LEN: usize = 4;

/// Append-only log of WAL entries with CRC32-guarded frames.
pub struct WriteAheadLog {
    config: WalConfig,
    path: PathBuf,
    file: File,
    index: Vec<WalEntry>,
    next_sequence: u64,
    bytes_written: usize,
    logger: Logger,
}

impl WriteAheadLog {
    pub fn open(config: WalConfig, logger: impl Into<Option<Logger>>) -> PersistenceResult<Self> {
        let logger = logger.into().unwrap_or_else(|| Logger::root(slog::Discard, o!()));
        fs::create_dir_all(&config.directory)
            .map_err(|e| PersistenceError::WalReadFailed(e.to_string()))?;
        let path = config.directory.join("wal.log");

        let (entries, valid_len, file_existed) = Self::rebuild_index(&path, &logger)?;

        if file_existed {
            let f = OpenOptions::new()
                .write(true)
                .open(&path)
                .map_err(|e| PersistenceError::WalTruncateFailed(e.to_string()))?;
            f.set_len(valid_len as u64)
                .map_err(|e| PersistenceError::WalTruncateFailed(e.to_string()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PersistenceError::WalWriteFailed(e.to_string()))?;

        let next_sequence = entries.last().map(|e| e.sequence + 1).unwrap_or(1);
        let bytes_written = entries
            .iter()
            .map(|e| HEADER_LEN + e.data.len() + CRC_LEN + 4)
            .sum();

        Ok(WriteAheadLog {
            config,
            path,
            file,
            index: entries,
            next_sequence,
            bytes_written,
            logger,
        })
    }

    /// Reads frames until EOF or the first corrupt/truncated frame, which is
    /// treated as the logical end of the log. Returns the parsed entries and
    /// the byte offset of the last valid frame boundary (used to physically
    /// truncate away any trailing garbage so future appends stay readable).
    fn rebuild_index(path: &Path, logger: &Logger) -> PersistenceResult<(Vec<WalEntry>, usize, bool)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0, false)),
            Err(e) => return Err(PersistenceError::WalReadFailed(e.to_string())),
        };
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut valid_len: usize = 0;

        loop {
            let mut size_buf = [0u8; 4];
            match reader.read_exact(&mut size_buf) {
                Ok(()) => {}
                Err(_) => break, // clean EOF between frames
            }
            let total_size = u32::from_le_bytes(size_buf) as usize;
            if total_size < HEADER_LEN + CRC_LEN {
                warn!(logger, "wal frame size below minimum, treating as corruption"; "at" => valid_len);
                break;
            }
            let mut frame = vec![0u8; total_size];
            if reader.read_exact(&mut frame).is_err() {
                warn!(logger, "wal frame truncated, treating as EOF"; "at" => valid_len);
                break;
            }

            let body = &frame[..total_size - CRC_LEN];
            let crc_bytes = &frame[total_size - CRC_LEN..];
            let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
            let computed_crc = crc32fast::hash(body);
            if stored_crc != computed_crc {
                warn!(logger, "wal crc mismatch, treating as corruption"; "at" => valid_len);
                break;
            }

            let sequence = u64::from_le_bytes(body[0..8].try_into().unwrap());
            let timestamp_us = u64::from_le_bytes(body[8..16].try_into().unwrap());
            let player_id = u64::from_le_bytes(body[16..24].try_into().unwrap());
            let op = match WalOperation::from_u8(body[24]) {
                Some(op) => op,
                None => {
                    warn!(logger, "wal unknown operation byte, treating as corruption"; "at" => valid_len);
                    break;
                }
            };
            let data_size = u32::from_le_bytes(body[25..29].try_into().unwrap()) as usize;
            if body.len() != 29 + data_size {
                warn!(logger, "wal data size mismatch, treating as corruption"; "at" => valid_len);
                break;
            }
            let data = body[29..].to_vec();

            entries.push(WalEntry { sequence, timestamp_us, player_id, operation: op, data });
            valid_len += 4 + total_size;
        }

        Ok((entries, valid_len, true))
    }

    /// Appends an entry, assigning its sequence number and timestamp.
    /// Returns the assigned sequence.
    pub fn append(
        &mut self,
        player_id: u64,
        operation: WalOperation,
        data: Vec<u8>,
    ) -> PersistenceResult<u64> {
        let sequence = self.next_sequence;
        let timestamp_us = now_micros();

        let mut body = Vec::with_capacity(HEADER_LEN + data.len());
        body.extend_from_slice(&sequence.to_le_bytes());
        body.extend_from_slice(&timestamp_us.to_le_bytes());
        body.extend_from_slice(&player_id.to_le_bytes());
        body.push(operation as u8);
        body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        body.extend_from_slice(&data);

        let crc = crc32fast::hash(&body);
        let total_size = (body.len() + CRC_LEN) as u32;

        self.file
            .write_all(&total_size.to_le_bytes())
            .and_then(|_| self.file.write_all(&body))
            .and_then(|_| self.file.write_all(&crc.to_le_bytes()))
            .map_err(|e| PersistenceError::WalWriteFailed(e.to_string()))?;

        if self.config.sync_on_write {
            self.file
                .sync_data()
                .map_err(|e| PersistenceError::WalWriteFailed(e.to_string()))?;
        } else {
            self.file
                .flush()
                .map_err(|e| PersistenceError::WalWriteFailed(e.to_string()))?;
        }

        self.bytes_written += 4 + total_size as usize;
        if self.bytes_written > self.config.max_file_size {
            warn!(self.logger, "wal exceeded configured max file size ahead of next snapshot";
                "bytes_written" => self.bytes_written, "max_file_size" => self.config.max_file_size);
        }

        self.next_sequence += 1;
        self.index.push(WalEntry { sequence, timestamp_us, player_id, operation, data });
        Ok(sequence)
    }

    /// Invokes `callback` for every entry with `sequence > after_sequence`,
    /// in sequence order.
    pub fn replay(&self, after_sequence: u64, mut callback: impl FnMut(&WalEntry)) {
        for entry in &self.index {
            if entry.sequence > after_sequence {
                callback(entry);
            }
        }
    }

    /// Drops entries with `sequence <= before_seq` and rewrites the file
    /// from the remaining entries. The file handle is reopened in append
    /// mode afterward regardless of whether the rewrite succeeded.
    pub fn truncate_before(&mut self, before_seq: u64) -> PersistenceResult<()> {
        self.index.retain(|e| e.sequence > before_seq);
        let result = self.rewrite_file();
        let reopened = OpenOptions::new().create(true).append(true).open(&self.path);
        match reopened {
            Ok(f) => self.file = f,
            Err(e) => return Err(PersistenceError::WalTruncateFailed(e.to_string())),
        }
        result
    }

    fn rewrite_file(&mut self) -> PersistenceResult<()> {
        let tmp_path = self.path.with_extension("log.tmp");
        let mut written = 0usize;
        {
            let mut f = File::create(&tmp_path)
                .map_err(|e| PersistenceError::WalTruncateFailed(e.to_string()))?;
            for entry in &self.index {
                let mut body = Vec::with_capacity(HEADER_LEN + entry.data.len());
                body.extend_from_slice(&entry.sequence.to_le_bytes());
                body.extend_from_slice(&entry.timestamp_us.to_le_bytes());
                body.extend_from_slice(&entry.player_id.to_le_bytes());
                body.push(entry.operation as u8);
                body.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
                body.extend_from_slice(&entry.data);
                let crc = crc32fast::hash(&body);
                let total_size = (body.len() + CRC_LEN) as u32;
                f.write_all(&total_size.to_le_bytes())
                    .and_then(|_| f.write_all(&body))
                    .and_then(|_| f.write_all(&crc.to_le_bytes()))
                    .map_err(|e| PersistenceError::WalTruncateFailed(e.to_string()))?;
                written += 4 + total_size as usize;
            }
            f.flush().map_err(|e| PersistenceError::WalTruncateFailed(e.to_string()))?;
        }
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| PersistenceError::WalTruncateFailed(e.to_string()))?;
        self.bytes_written = written;
        Ok(())
    }

    pub fn flush(&mut self) -> PersistenceResult<()> {
        self.file
            .flush()
            .map_err(|e| PersistenceError::WalWriteFailed(e.to_string()))
    }

    pub fn current_sequence(&self) -> u64 {
        if self.next_sequence > 0 {
            self.next_sequence - 1
        } else {
            0
        }
    }

    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub fn should_rotate(&self) -> bool {
        self.bytes_written > self.config.max_file_size
    }
}

fn now_micros() -> u64 {
    chrono::Utc::now().timestamp_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_reopen_replays_in_sequence_order() {
        let dir = tempdir().unwrap();
        let config = WalConfig::new(dir.path());
        {
            let mut wal = WriteAheadLog::open(config.clone(), None).unwrap();
            wal.append(1, WalOperation::PlayerJoin, b"a".to_vec()).unwrap();
            wal.append(1, WalOperation::StateUpdate, b"b".to_vec()).unwrap();
            wal.append(2, WalOperation::PlayerJoin, b"c".to_vec()).unwrap();
        }

        let wal = WriteAheadLog::open(config, None).unwrap();
        let mut seen = Vec::new();
        wal.replay(0, |e| seen.push((e.sequence, e.player_id, e.data.clone())));
        assert_eq!(
            seen,
            vec![
                (1, 1, b"a".to_vec()),
                (2, 1, b"b".to_vec()),
                (3, 2, b"c".to_vec()),
            ]
        );
    }

    #[test]
    fn replay_after_sequence_skips_earlier_entries() {
        let dir = tempdir().unwrap();
        let mut wal = WriteAheadLog::open(WalConfig::new(dir.path()), None).unwrap();
        wal.append(1, WalOperation::PlayerJoin, vec![]).unwrap();
        wal.append(1, WalOperation::PlayerLeave, vec![]).unwrap();

        let mut seen = Vec::new();
        wal.replay(1, |e| seen.push(e.sequence));
        assert_eq!(seen, vec![2]);
    }

    #[test]
    fn truncate_before_drops_old_entries_and_stays_appendable() {
        let dir = tempdir().unwrap();
        let mut wal = WriteAheadLog::open(WalConfig::new(dir.path()), None).unwrap();
        wal.append(1, WalOperation::PlayerJoin, vec![]).unwrap();
        wal.append(1, WalOperation::StateUpdate, vec![]).unwrap();
        wal.truncate_before(1).unwrap();
        assert_eq!(wal.entry_count(), 1);

        wal.append(2, WalOperation::PlayerJoin, vec![]).unwrap();
        let mut seen = Vec::new();
        wal.replay(0, |e| seen.push(e.sequence));
        assert_eq!(seen, vec![2, 3]);
    }

    #[test]
    fn corrupted_trailing_frame_is_treated_as_eof() {
        let dir = tempdir().unwrap();
        let config = WalConfig::new(dir.path());
        {
            let mut wal = WriteAheadLog::open(config.clone(), None).unwrap();
            wal.append(1, WalOperation::PlayerJoin, b"ok".to_vec()).unwrap();
        }
        // Append garbage bytes simulating a torn write.
        {
            let mut f = OpenOptions::new().append(true).open(dir.path().join("wal.log")).unwrap();
            f.write_all(&[1, 2, 3]).unwrap();
        }

        let wal = WriteAheadLog::open(config, None).unwrap();
        assert_eq!(wal.entry_count(), 1);
        assert_eq!(wal.current_sequence(), 1);
    }
}
