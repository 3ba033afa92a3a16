//! External config surface (§6): tick rate, spatial cell size, and the AI
//! tick interval default. Loadable from whatever format an out-of-scope
//! external loader chooses (YAML/TOML/env).

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GameConfig {
    pub tick_rate_hz: f64,
    pub spatial_cell_size: f32,
    pub ai_tick_interval_secs: f32,
    pub max_instances: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            tick_rate_hz: crate::game_loop::DEFAULT_TICK_RATE_HZ,
            spatial_cell_size: crate::spatial::DEFAULT_CELL_SIZE,
            ai_tick_interval_secs: crate::systems::ai::DEFAULT_AI_TICK_INTERVAL,
            max_instances: 64,
        }
    }
}
