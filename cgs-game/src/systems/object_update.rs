//! Integrates position from `Movement` every tick, skipping idle entities.

use cgs_ecs::scheduler::{System, SystemStage};

use crate::components::MovementState;
use crate::storage_ptr::StoragePtr;

pub struct ObjectUpdateSystem {
    transforms: StoragePtr<crate::components::Transform>,
    movements: StoragePtr<crate::components::Movement>,
}

impl ObjectUpdateSystem {
    /// Safety: both handles must outlive this system, per `StoragePtr`'s
    /// contract.
    pub unsafe fn new(
        transforms: StoragePtr<crate::components::Transform>,
        movements: StoragePtr<crate::components::Movement>,
    ) -> Self {
        ObjectUpdateSystem { transforms, movements }
    }
}

impl System for ObjectUpdateSystem {
    fn execute(&mut self, delta_time: f32) {
        for (entity, movement) in self.movements.iter() {
            if movement.state == MovementState::Idle {
                continue;
            }
            if let Some(transform) = self.transforms.get_mut(entity) {
                transform.position.x += movement.direction.x * movement.speed * delta_time;
                transform.position.y += movement.direction.y * movement.speed * delta_time;
                transform.position.z += movement.direction.z * movement.speed * delta_time;
            }
        }
    }

    fn stage(&self) -> SystemStage {
        SystemStage::Update
    }

    fn name(&self) -> &'static str {
        "ObjectUpdateSystem"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
