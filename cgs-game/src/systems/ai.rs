//! Throttled per-entity AI tick shell (§4.7a). No behavior-tree interpreter
//! is implemented; ticking an entity only advances its state-machine stub.

use cgs_ecs::scheduler::{System, SystemStage};

use crate::components::{AIBrain, AIState, Stats, ThreatList, Transform};
use crate::storage_ptr::StoragePtr;

pub const DEFAULT_AI_TICK_INTERVAL: f32 = 0.5;

pub struct AISystem {
    brains: StoragePtr<AIBrain>,
    transforms: StoragePtr<Transform>,
    stats: StoragePtr<Stats>,
    threat_lists: StoragePtr<ThreatList>,
}

impl AISystem {
    /// Safety: every handle must outlive this system.
    pub unsafe fn new(
        brains: StoragePtr<AIBrain>,
        transforms: StoragePtr<Transform>,
        stats: StoragePtr<Stats>,
        threat_lists: StoragePtr<ThreatList>,
    ) -> Self {
        AISystem { brains, transforms, stats, threat_lists }
    }

    fn tick_entity(&mut self, entity: cgs_ecs::Entity) {
        let alive = self.stats.get(entity).map(|s| s.is_alive()).unwrap_or(true);
        let brain = match self.brains.get_mut(entity) {
            Some(b) => b,
            None => return,
        };
        if !alive {
            brain.state = AIState::Idle;
            brain.target = cgs_ecs::Entity::INVALID;
            return;
        }
        let threat_target = self.threat_lists.get(entity).and_then(|t| t.top());
        match threat_target {
            Some(target) => {
                brain.target = target;
                brain.state = AIState::Combat;
            }
            None if brain.state == AIState::Combat => {
                brain.target = cgs_ecs::Entity::INVALID;
                brain.state = AIState::Returning;
            }
            None => {}
        }
        if brain.state == AIState::Returning {
            let at_home = self
                .transforms
                .get(entity)
                .map(|t| t.position.distance_xz(&brain.home_position) < 0.5)
                .unwrap_or(true);
            if at_home {
                brain.state = AIState::Idle;
            }
        }
    }
}

impl System for AISystem {
    fn execute(&mut self, delta_time: f32) {
        let due: Vec<cgs_ecs::Entity> = self
            .brains
            .iter_mut()
            .filter_map(|(entity, brain)| {
                brain.time_since_last_tick += delta_time;
                if brain.time_since_last_tick >= brain.tick_interval {
                    brain.time_since_last_tick = 0.0;
                    Some(entity)
                } else {
                    None
                }
            })
            .collect();
        for entity in due {
            self.tick_entity(entity);
        }
    }

    fn stage(&self) -> SystemStage {
        SystemStage::Update
    }

    fn name(&self) -> &'static str {
        "AISystem"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
