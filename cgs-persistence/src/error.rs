//! Persistence domain errors, categorised per the 0x0Fxx range.

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("wal write failed: {0}")]
    WalWriteFailed(String),
    #[error("wal read failed: {0}")]
    WalReadFailed(String),
    #[error("wal corrupted: {0}")]
    WalCorrupted(String),
    #[error("wal truncate failed: {0}")]
    WalTruncateFailed(String),
    #[error("snapshot write failed: {0}")]
    SnapshotWriteFailed(String),
    #[error("snapshot read failed: {0}")]
    SnapshotReadFailed(String),
    #[error("snapshot corrupted: {0}")]
    SnapshotCorrupted(String),
    #[error("recovery failed: {0}")]
    RecoveryFailed(String),
    #[error("persistence not started")]
    PersistenceNotStarted,
    #[error("persistence already started")]
    PersistenceAlreadyStarted,
}

impl PersistenceError {
    pub fn code(&self) -> u16 {
        match self {
            PersistenceError::WalWriteFailed(_) => 0x0F00,
            PersistenceError::WalReadFailed(_) => 0x0F01,
            PersistenceError::WalCorrupted(_) => 0x0F02,
            PersistenceError::WalTruncateFailed(_) => 0x0F03,
            PersistenceError::SnapshotWriteFailed(_) => 0x0F04,
            PersistenceError::SnapshotReadFailed(_) => 0x0F05,
            PersistenceError::SnapshotCorrupted(_) => 0x0F06,
            PersistenceError::RecoveryFailed(_) => 0x0F07,
            PersistenceError::PersistenceNotStarted => 0x0F08,
            PersistenceError::PersistenceAlreadyStarted => 0x0F09,
        }
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
