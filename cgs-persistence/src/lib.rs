//! Crash-safe persistence: write-ahead log, periodic snapshotting, and the
//! coordinator that ties recovery and the background snapshot timer together.

pub mod error;
pub mod manager;
pub mod snapshot;
pub mod wal;

pub use error::{PersistenceError, PersistenceResult};
pub use manager::{PersistenceConfig, PersistenceConfigDto, PersistenceManager};
pub use snapshot::{PlayerSnapshot, Snapshot, SnapshotConfig, SnapshotManager};
pub use wal::{WalConfig, WalEntry, WalOperation, WriteAheadLog};
