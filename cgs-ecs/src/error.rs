//! Domain errors for the ECS crate, categorised per the 0x03xx range.

use std::any::Any;
use std::fmt;

/// 16-bit categorised error code. The ECS range is 0x03xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    #[error("entity not found")]
    EntityNotFound,
    #[error("component not found")]
    ComponentNotFound,
    #[error("system error")]
    SystemError,
}

impl EcsError {
    pub fn code(self) -> u16 {
        match self {
            EcsError::EntityNotFound => 0x0300,
            EcsError::ComponentNotFound => 0x0301,
            EcsError::SystemError => 0x0302,
        }
    }
}

/// Error carrying a code, a message, and an optional type-erased diagnostic
/// context payload, mirroring the reference `GameError` shape.
pub struct GameError {
    code: u16,
    message: String,
    context: Option<Box<dyn Any + Send + Sync>>,
}

impl GameError {
    pub fn new(err: EcsError, message: impl Into<String>) -> Self {
        GameError {
            code: err.code(),
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context<T: Any + Send + Sync>(mut self, ctx: T) -> Self {
        self.context = Some(Box::new(ctx));
        self
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context<T: Any>(&self) -> Option<&T> {
        self.context.as_ref().and_then(|c| c.downcast_ref::<T>())
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }
}

impl fmt::Debug for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameError")
            .field("code", &format_args!("{:#06x}", self.code))
            .field("message", &self.message)
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#06x}] {}", self.code, self.message)
    }
}

impl std::error::Error for GameError {}

/// Result alias used throughout the ECS crate.
pub type GameResult<T> = Result<T, GameError>;
