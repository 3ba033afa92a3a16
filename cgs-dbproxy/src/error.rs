//! DBProxy domain errors, categorised per the 0x0Dxx range.

#[derive(Debug, thiserror::Error)]
pub enum DbProxyError {
    #[error("cache miss")]
    CacheMiss,
    #[error("replica unavailable: {0}")]
    ReplicaUnavailable(String),
    #[error("primary unavailable: {0}")]
    PrimaryUnavailable(String),
    #[error("dbproxy not started")]
    DbProxyNotStarted,
}

impl DbProxyError {
    pub fn code(&self) -> u16 {
        match self {
            DbProxyError::CacheMiss => 0x0D00,
            DbProxyError::ReplicaUnavailable(_) => 0x0D01,
            DbProxyError::PrimaryUnavailable(_) => 0x0D02,
            DbProxyError::DbProxyNotStarted => 0x0D03,
        }
    }
}

pub type DbProxyResult<T> = Result<T, DbProxyError>;
