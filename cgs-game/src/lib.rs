//! Game-logic layer built on `cgs_ecs`: the world of component storages,
//! the six game systems, spatial interest management, map-instance
//! lifecycle, and the pacing game loop.

pub mod components;
pub mod config;
pub mod error;
pub mod game_loop;
pub mod map_instance;
pub mod server;
pub mod spatial;
pub mod storage_ptr;
pub mod systems;
pub mod world;
pub mod world_system;

pub use config::GameConfig;
pub use error::{GameServerError, GameServerResult};
pub use game_loop::{GameLoop, TickMetrics};
pub use map_instance::{InstanceState, InstanceType, MapInstanceInfo, MapInstanceManager};
pub use server::{GameServer, PlayerSession};
pub use spatial::{CellCoord, SpatialIndex};
pub use world::World;
pub use world_system::{TransitionResult, WorldSystem};
