//! Sparse-set ECS runtime: entities, component storage, queries, and the
//! staged system scheduler.

pub mod component_storage;
pub mod entity;
pub mod error;
pub mod query;
pub mod registry;
pub mod scheduler;

pub use component_storage::{ComponentStorage, ErasedStorage};
pub use entity::Entity;
pub use error::{EcsError, GameError, GameResult};
pub use query::{IncludeTuple, OptionalSet, Query};
pub use registry::EntityRegistry;
pub use scheduler::{System, SystemAccessInfo, SystemScheduler, SystemStage};
