//! GameServer domain errors, categorised per the 0x0Bxx range.

#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    #[error("map instance not found: {0}")]
    MapInstanceNotFound(u32),
    #[error("map instance limit reached")]
    MapInstanceLimitReached,
    #[error("invalid instance state transition")]
    MapInstanceInvalidState,
    #[error("game loop already running")]
    GameLoopAlreadyRunning,
    #[error("game loop not running")]
    GameLoopNotRunning,
    #[error("player already in world")]
    PlayerAlreadyInWorld,
    #[error("player not in world")]
    PlayerNotInWorld,
    #[error("instance full")]
    InstanceFull,
    #[error("system scheduler build failed: {0}")]
    SystemSchedulerBuildFailed(String),
}

impl GameServerError {
    pub fn code(&self) -> u16 {
        match self {
            GameServerError::MapInstanceNotFound(_) => 0x0B00,
            GameServerError::MapInstanceLimitReached => 0x0B01,
            GameServerError::MapInstanceInvalidState => 0x0B02,
            GameServerError::GameLoopAlreadyRunning => 0x0B03,
            GameServerError::GameLoopNotRunning => 0x0B04,
            GameServerError::PlayerAlreadyInWorld => 0x0B05,
            GameServerError::PlayerNotInWorld => 0x0B06,
            GameServerError::InstanceFull => 0x0B07,
            GameServerError::SystemSchedulerBuildFailed(_) => 0x0B08,
        }
    }
}

pub type GameServerResult<T> = Result<T, GameServerError>;
