//! Persistence coordinator: startup recovery, periodic snapshotting, shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use slog::{o, warn, Logger};

use crate::error::{PersistenceError, PersistenceResult};
use crate::snapshot::{PlayerSnapshot, Snapshot, SnapshotConfig, SnapshotManager};
use crate::wal::{WalConfig, WalEntry, WalOperation, WriteAheadLog};

pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);
const TIMER_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub wal: WalConfig,
    pub snapshot: SnapshotConfig,
    pub snapshot_interval: Duration,
}

impl PersistenceConfig {
    pub fn new(wal: WalConfig, snapshot: SnapshotConfig) -> Self {
        PersistenceConfig { wal, snapshot, snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL }
    }
}

/// Deserializable wire shape of `PersistenceConfig` (§6): `Duration` has no
/// canonical external representation, so the interval travels as plain
/// seconds and is converted once at load time.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PersistenceConfigDto {
    pub wal: WalConfig,
    pub snapshot: SnapshotConfig,
    pub snapshot_interval_secs: u64,
}

impl From<PersistenceConfigDto> for PersistenceConfig {
    fn from(dto: PersistenceConfigDto) -> Self {
        PersistenceConfig {
            wal: dto.wal,
            snapshot: dto.snapshot,
            snapshot_interval: Duration::from_secs(dto.snapshot_interval_secs),
        }
    }
}

type Collector = Arc<dyn Fn() -> Vec<PlayerSnapshot> + Send + Sync>;

struct RunningState {
    wal: WriteAheadLog,
    snapshots: SnapshotManager,
    last_snapshot_timestamp: u64,
}

/// Coordinates the WAL and snapshot store: startup recovery replay, a
/// background snapshot timer, and the fast `record_change` append path.
pub struct PersistenceManager {
    config: PersistenceConfig,
    logger: Logger,
    state: Mutex<Option<Arc<Mutex<RunningState>>>>,
    collector: Mutex<Option<Collector>>,
    running_flag: Arc<AtomicBool>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceManager {
    pub fn new(config: PersistenceConfig, logger: impl Into<Option<Logger>>) -> Self {
        let logger = logger.into().unwrap_or_else(|| Logger::root(slog::Discard, o!()));
        PersistenceManager {
            config,
            logger,
            state: Mutex::new(None),
            collector: Mutex::new(None),
            running_flag: Arc::new(AtomicBool::new(false)),
            timer_handle: Mutex::new(None),
        }
    }

    /// Opens WAL and snapshot store, recovers from the latest snapshot (if
    /// any) plus the WAL tail beyond it, then spawns the background
    /// snapshot timer.
    pub fn start<C, R, A>(&self, collector: C, mut restorer: R, mut applier: A) -> PersistenceResult<()>
    where
        C: Fn() -> Vec<PlayerSnapshot> + Send + Sync + 'static,
        R: FnMut(&Snapshot),
        A: FnMut(&WalEntry),
    {
        let mut guard = self.state.lock().unwrap();
        if guard.is_some() {
            return Err(PersistenceError::PersistenceAlreadyStarted);
        }

        let wal = WriteAheadLog::open(self.config.wal.clone(), self.logger.clone())?;
        let snapshots = SnapshotManager::open(self.config.snapshot.clone())?;

        let mut last_snapshot_sequence = 0u64;
        let mut last_snapshot_timestamp = 0u64;
        if let Some(snap) = snapshots.load_latest()? {
            last_snapshot_sequence = snap.wal_sequence;
            last_snapshot_timestamp = snap.timestamp_us;
            restorer(&snap);
        }
        wal.replay(last_snapshot_sequence, |entry| applier(entry));

        let running_state = Arc::new(Mutex::new(RunningState { wal, snapshots, last_snapshot_timestamp }));
        *guard = Some(running_state.clone());
        drop(guard);

        let collector: Collector = Arc::new(collector);
        *self.collector.lock().unwrap() = Some(collector.clone());

        self.running_flag.store(true, Ordering::SeqCst);
        let running_flag = self.running_flag.clone();
        let interval = self.config.snapshot_interval;
        let logger = self.logger.clone();

        let handle = thread::spawn(move || {
            let mut elapsed = Duration::from_secs(0);
            while running_flag.load(Ordering::SeqCst) {
                thread::sleep(TIMER_POLL_INTERVAL);
                elapsed += TIMER_POLL_INTERVAL;
                if elapsed >= interval {
                    elapsed = Duration::from_secs(0);
                    do_snapshot_locked(&running_state, &collector, &logger);
                }
            }
        });
        *self.timer_handle.lock().unwrap() = Some(handle);

        Ok(())
    }

    /// Manually triggers a snapshot cycle using the collector bound at
    /// `start`. Errors if persistence has not been started.
    pub fn take_snapshot(&self) -> PersistenceResult<()> {
        let state = self
            .state
            .lock()
            .unwrap()
            .as_ref()
            .cloned()
            .ok_or(PersistenceError::PersistenceNotStarted)?;
        let collector = self
            .collector
            .lock()
            .unwrap()
            .as_ref()
            .cloned()
            .ok_or(PersistenceError::PersistenceNotStarted)?;
        do_snapshot_locked(&state, &collector, &self.logger);
        Ok(())
    }

    /// Fast path for game systems to journal a player-state mutation.
    pub fn record_change(
        &self,
        player_id: u64,
        operation: WalOperation,
        data: Vec<u8>,
    ) -> PersistenceResult<u64> {
        let guard = self.state.lock().unwrap();
        let state = guard.as_ref().ok_or(PersistenceError::PersistenceNotStarted)?;
        let mut inner = state.lock().unwrap();
        inner.wal.append(player_id, operation, data)
    }

    pub fn is_running(&self) -> bool {
        self.running_flag.load(Ordering::SeqCst)
    }

    pub fn pending_wal_entries(&self) -> PersistenceResult<usize> {
        let guard = self.state.lock().unwrap();
        let state = guard.as_ref().ok_or(PersistenceError::PersistenceNotStarted)?;
        let result = state.lock().unwrap().wal.entry_count();
        Ok(result)
    }

    pub fn current_wal_sequence(&self) -> PersistenceResult<u64> {
        let guard = self.state.lock().unwrap();
        let state = guard.as_ref().ok_or(PersistenceError::PersistenceNotStarted)?;
        let result = state.lock().unwrap().wal.current_sequence();
        Ok(result)
    }

    pub fn last_snapshot_timestamp(&self) -> PersistenceResult<u64> {
        let guard = self.state.lock().unwrap();
        let state = guard.as_ref().ok_or(PersistenceError::PersistenceNotStarted)?;
        let result = state.lock().unwrap().last_snapshot_timestamp;
        Ok(result)
    }

    /// Stops the timer thread, takes one final snapshot, and flushes the WAL.
    pub fn stop(&self) -> PersistenceResult<()> {
        if !self.is_running() {
            return Err(PersistenceError::PersistenceNotStarted);
        }
        self.running_flag.store(false, Ordering::SeqCst);
        if let Some(handle) = self.timer_handle.lock().unwrap().take() {
            let _ = handle.join();
        }

        let state = self.state.lock().unwrap().take();
        let collector = self.collector.lock().unwrap().take();
        if let (Some(state), Some(collector)) = (state, collector) {
            do_snapshot_locked(&state, &collector, &self.logger);
            let mut inner = state.lock().unwrap();
            inner.wal.flush()?;
        }
        Ok(())
    }
}

fn do_snapshot_locked(state: &Arc<Mutex<RunningState>>, collector: &Collector, logger: &Logger) {
    let mut inner = state.lock().unwrap();
    let players = collector();
    let snap = Snapshot {
        wal_sequence: inner.wal.current_sequence(),
        timestamp_us: now_micros(),
        players,
    };
    match inner.snapshots.save(&snap) {
        Ok(()) => {
            inner.last_snapshot_timestamp = snap.timestamp_us;
            if let Err(e) = inner.wal.truncate_before(snap.wal_sequence) {
                warn!(logger, "wal truncate after snapshot failed, next snapshot will retry"; "error" => %e);
            }
        }
        Err(e) => {
            warn!(logger, "snapshot save failed"; "error" => %e);
        }
    }
}

fn now_micros() -> u64 {
    chrono::Utc::now().timestamp_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> PersistenceConfig {
        let mut cfg = PersistenceConfig::new(WalConfig::new(dir.join("wal")), SnapshotConfig::new(dir.join("snap")));
        cfg.snapshot_interval = Duration::from_secs(3600); // timer thread effectively disabled in tests
        cfg
    }

    #[test]
    fn s4_crash_recovery_replays_all_entries_without_a_snapshot() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());

        {
            let mgr = PersistenceManager::new(cfg.clone(), None);
            mgr.start(|| Vec::new(), |_: &Snapshot| {}, |_: &WalEntry| {}).unwrap();
            mgr.record_change(1, WalOperation::PlayerJoin, b"a".to_vec()).unwrap();
            mgr.record_change(1, WalOperation::StateUpdate, b"b".to_vec()).unwrap();
            mgr.record_change(2, WalOperation::PlayerJoin, b"c".to_vec()).unwrap();
            // No stop() -- simulates a crash.
        }

        let restorer_calls = Arc::new(StdMutex::new(0));
        let applied = Arc::new(StdMutex::new(Vec::new()));
        {
            let restorer_calls = restorer_calls.clone();
            let applied = applied.clone();
            let mgr = PersistenceManager::new(cfg, None);
            mgr.start(
                || Vec::new(),
                move |_s: &Snapshot| {
                    *restorer_calls.lock().unwrap() += 1;
                },
                move |e: &WalEntry| {
                    applied.lock().unwrap().push((e.sequence, e.data.clone()));
                },
            )
            .unwrap();
        }

        assert_eq!(*restorer_calls.lock().unwrap(), 0);
        let applied = applied.lock().unwrap();
        assert_eq!(applied.len(), 3);
        assert_eq!(applied[0], (1, b"a".to_vec()));
        assert_eq!(applied[1], (2, b"b".to_vec()));
        assert_eq!(applied[2], (3, b"c".to_vec()));
    }

    #[test]
    fn s5_snapshot_then_truncation_then_recovery() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());

        {
            let mgr = PersistenceManager::new(cfg.clone(), None);
            mgr.start(
                || {
                    vec![
                        PlayerSnapshot { player_id: 1, instance_id: 7, data: b"X".to_vec() },
                        PlayerSnapshot { player_id: 2, instance_id: 7, data: b"Y".to_vec() },
                    ]
                },
                |_: &Snapshot| {},
                |_: &WalEntry| {},
            )
            .unwrap();
            mgr.record_change(1, WalOperation::PlayerJoin, b"a".to_vec()).unwrap();
            mgr.record_change(1, WalOperation::StateUpdate, b"b".to_vec()).unwrap();
            mgr.record_change(2, WalOperation::PlayerJoin, b"c".to_vec()).unwrap();
            mgr.take_snapshot().unwrap();
            mgr.record_change(2, WalOperation::PlayerLeave, vec![]).unwrap();
            // No stop() -- simulates a crash after the snapshot.
        }

        let restored = Arc::new(StdMutex::new(Vec::new()));
        let applied = Arc::new(StdMutex::new(Vec::new()));
        {
            let restored = restored.clone();
            let applied = applied.clone();
            let mgr = PersistenceManager::new(cfg, None);
            mgr.start(
                || Vec::new(),
                move |s: &Snapshot| restored.lock().unwrap().push(s.clone()),
                move |e: &WalEntry| applied.lock().unwrap().push(e.sequence),
            )
            .unwrap();
        }

        let restored = restored.lock().unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].wal_sequence, 3);
        assert_eq!(restored[0].players.len(), 2);
        assert_eq!(*applied.lock().unwrap(), vec![4]);
    }

    #[test]
    fn record_change_before_start_errors() {
        let dir = tempdir().unwrap();
        let mgr = PersistenceManager::new(config(dir.path()), None);
        let err = mgr.record_change(1, WalOperation::PlayerJoin, vec![]).unwrap_err();
        assert!(matches!(err, PersistenceError::PersistenceNotStarted));
    }
}
