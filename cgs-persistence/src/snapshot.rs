//! Periodic full-world snapshotting with retention pruning.

use std::convert::TryInto;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

use crate::error::{PersistenceError, PersistenceResult};

pub const DEFAULT_MAX_RETAINED: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub player_id: u64,
    pub instance_id: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub wal_sequence: u64,
    pub timestamp_us: u64,
    pub players: Vec<PlayerSnapshot>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SnapshotConfig {
    pub directory: PathBuf,
    pub max_retained: usize,
}

impl SnapshotConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        SnapshotConfig { directory: directory.into(), max_retained: DEFAULT_MAX_RETAINED }
    }
}

const HEADER_LEN: usize = 8 + 8 + 4;
const PLAYER_HEADER_LEN: usize = 8 + 4 + 4;

pub struct SnapshotManager {
    config: SnapshotConfig,
}

impl SnapshotManager {
    pub fn open(config: SnapshotConfig) -> PersistenceResult<Self> {
        fs::create_dir_all(&config.directory)
            .map_err(|e| PersistenceError::SnapshotWriteFailed(e.to_string()))?;
        Ok(SnapshotManager { config })
    }

    fn filename(timestamp_us: u64) -> String {
        format!("snapshot_{:020}.bin", timestamp_us)
    }

    /// Serialises `snap` to `snapshot_<timestampUs>.bin`, then prunes the
    /// oldest files until at most `max_retained` remain.
    pub fn save(&self, snap: &Snapshot) -> PersistenceResult<()> {
        let path = self.config.directory.join(Self::filename(snap.timestamp_us));
        let mut buf = Vec::new();
        buf.extend_from_slice(&snap.wal_sequence.to_le_bytes());
        buf.extend_from_slice(&snap.timestamp_us.to_le_bytes());
        buf.extend_from_slice(&(snap.players.len() as u32).to_le_bytes());
        for p in &snap.players {
            buf.extend_from_slice(&p.player_id.to_le_bytes());
            buf.extend_from_slice(&p.instance_id.to_le_bytes());
            buf.extend_from_slice(&(p.data.len() as u32).to_le_bytes());
            buf.extend_from_slice(&p.data);
        }

        let mut f = File::create(&path)
            .map_err(|e| PersistenceError::SnapshotWriteFailed(e.to_string()))?;
        f.write_all(&buf)
            .map_err(|e| PersistenceError::SnapshotWriteFailed(e.to_string()))?;
        f.flush().map_err(|e| PersistenceError::SnapshotWriteFailed(e.to_string()))?;
        drop(f);

        self.prune_old_snapshots()
    }

    fn list_snapshot_files(&self) -> PersistenceResult<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.config.directory)
            .map_err(|e| PersistenceError::SnapshotReadFailed(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("snapshot_") && n.ends_with(".bin"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn prune_old_snapshots(&self) -> PersistenceResult<()> {
        let files = self.list_snapshot_files()?;
        if files.len() <= self.config.max_retained {
            return Ok(());
        }
        let excess = files.len() - self.config.max_retained;
        for path in &files[..excess] {
            let _ = fs::remove_file(path);
        }
        Ok(())
    }

    /// Loads the lexicographically greatest (= most recent) snapshot file,
    /// if any exist.
    pub fn load_latest(&self) -> PersistenceResult<Option<Snapshot>> {
        let files = self.list_snapshot_files()?;
        let path = match files.last() {
            Some(p) => p,
            None => return Ok(None),
        };

        let mut buf = Vec::new();
        File::open(path)
            .and_then(|mut f| f.read_to_end(&mut buf))
            .map_err(|e| PersistenceError::SnapshotReadFailed(e.to_string()))?;

        if buf.len() < HEADER_LEN {
            return Err(PersistenceError::SnapshotCorrupted("header too short".into()));
        }

        let wal_sequence = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let timestamp_us = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        let player_count = u32::from_le_bytes(buf[16..20].try_into().unwrap()) as usize;

        let mut offset = HEADER_LEN;
        let mut players = Vec::with_capacity(player_count);
        for _ in 0..player_count {
            if buf.len() < offset + PLAYER_HEADER_LEN {
                return Err(PersistenceError::SnapshotCorrupted("truncated player header".into()));
            }
            let player_id = u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap());
            let instance_id = u32::from_le_bytes(buf[offset + 8..offset + 12].try_into().unwrap());
            let data_size = u32::from_le_bytes(buf[offset + 12..offset + 16].try_into().unwrap()) as usize;
            offset += PLAYER_HEADER_LEN;
            if buf.len() < offset + data_size {
                return Err(PersistenceError::SnapshotCorrupted("truncated player data".into()));
            }
            let data = buf[offset..offset + data_size].to_vec();
            offset += data_size;
            players.push(PlayerSnapshot { player_id, instance_id, data });
        }

        Ok(Some(Snapshot { wal_sequence, timestamp_us, players }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn snap(ts: u64, seq: u64) -> Snapshot {
        Snapshot {
            wal_sequence: seq,
            timestamp_us: ts,
            players: vec![
                PlayerSnapshot { player_id: 1, instance_id: 7, data: b"X".to_vec() },
                PlayerSnapshot { player_id: 2, instance_id: 7, data: b"Y".to_vec() },
            ],
        }
    }

    #[test]
    fn save_then_load_latest_round_trips() {
        let dir = tempdir().unwrap();
        let mgr = SnapshotManager::open(SnapshotConfig::new(dir.path())).unwrap();
        mgr.save(&snap(1000, 3)).unwrap();

        let loaded = mgr.load_latest().unwrap().unwrap();
        assert_eq!(loaded, snap(1000, 3));
    }

    #[test]
    fn load_latest_picks_most_recent_by_timestamp() {
        let dir = tempdir().unwrap();
        let mgr = SnapshotManager::open(SnapshotConfig::new(dir.path())).unwrap();
        mgr.save(&snap(1000, 1)).unwrap();
        mgr.save(&snap(2000, 2)).unwrap();

        let loaded = mgr.load_latest().unwrap().unwrap();
        assert_eq!(loaded.wal_sequence, 2);
    }

    #[test]
    fn prunes_down_to_max_retained() {
        let dir = tempdir().unwrap();
        let mut config = SnapshotConfig::new(dir.path());
        config.max_retained = 2;
        let mgr = SnapshotManager::open(config).unwrap();
        for i in 0..5u64 {
            mgr.save(&snap(1000 + i, i)).unwrap();
        }
        assert_eq!(mgr.list_snapshot_files().unwrap().len(), 2);
    }

    #[test]
    fn load_latest_returns_none_when_empty() {
        let dir = tempdir().unwrap();
        let mgr = SnapshotManager::open(SnapshotConfig::new(dir.path())).unwrap();
        assert!(mgr.load_latest().unwrap().is_none());
    }
}
