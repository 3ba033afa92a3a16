//! WorldSystem (§4.7): keeps each map's `SpatialIndex` in sync with live
//! `Transform`s every tick (PreUpdate), and answers interest-management
//! queries with exact XZ distance filtering on top of the index's
//! cell-level candidates.

use std::collections::HashMap;

use cgs_ecs::scheduler::{System, SystemStage};
use cgs_ecs::Entity;

use crate::components::{MapMembership, Transform, DEFAULT_VISIBILITY_RANGE};
use crate::spatial::{SpatialIndex, DEFAULT_CELL_SIZE};
use crate::storage_ptr::StoragePtr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    Success,
    SourceNotFound,
    TargetNotFound,
}

pub struct WorldSystem {
    transforms: StoragePtr<Transform>,
    map_memberships: StoragePtr<MapMembership>,
    maps: HashMap<Entity, SpatialIndex>,
    cell_size: f32,
}

impl WorldSystem {
    /// Safety: every handle must outlive this system.
    pub unsafe fn new(
        transforms: StoragePtr<Transform>,
        map_memberships: StoragePtr<MapMembership>,
    ) -> Self {
        WorldSystem { transforms, map_memberships, maps: HashMap::new(), cell_size: DEFAULT_CELL_SIZE }
    }

    pub fn register_map(&mut self, map_entity: Entity) {
        let cell_size = self.cell_size;
        self.maps.entry(map_entity).or_insert_with(|| SpatialIndex::new(cell_size));
    }

    pub fn unregister_map(&mut self, map_entity: Entity) {
        self.maps.remove(&map_entity);
    }

    /// Evicts `entity` from `from_map`'s index and inserts it into
    /// `to_map`'s at `new_position`, ahead of the next tick's position sync.
    pub fn transfer_entity(
        &mut self,
        entity: Entity,
        from_map: Entity,
        to_map: Entity,
        new_position: &crate::components::Vec3,
    ) -> TransitionResult {
        if !self.maps.contains_key(&from_map) {
            return TransitionResult::SourceNotFound;
        }
        if !self.maps.contains_key(&to_map) {
            return TransitionResult::TargetNotFound;
        }
        self.maps.get_mut(&from_map).unwrap().remove(entity);
        self.maps.get_mut(&to_map).unwrap().insert(entity, new_position);
        TransitionResult::Success
    }

    /// `QueryRadius(center, r)` plus exact XZ distance filtering, scoped to
    /// the given map.
    pub fn query_radius_exact(
        &self,
        map_entity: Entity,
        center: &crate::components::Vec3,
        radius: f32,
    ) -> Vec<Entity> {
        let index = match self.maps.get(&map_entity) {
            Some(i) => i,
            None => return Vec::new(),
        };
        index
            .query_radius(center, radius)
            .into_iter()
            .filter(|&e| {
                self.transforms
                    .get(e)
                    .map(|t| t.position.distance_xz(center) <= radius)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// `GetVisibleEntities(viewer)`: `QueryRadius` at the viewer's own
    /// visibility range (default 100), restricted to its current map. The
    /// viewer itself is included when it falls within its own range, which
    /// it always does at distance zero.
    pub fn get_visible_entities(&self, viewer: Entity) -> Vec<Entity> {
        let membership = match self.map_memberships.get(viewer) {
            Some(m) => *m,
            None => return Vec::new(),
        };
        let position = match self.transforms.get(viewer) {
            Some(t) => t.position,
            None => return Vec::new(),
        };
        let range = if membership.visibility_range > 0.0 {
            membership.visibility_range
        } else {
            DEFAULT_VISIBILITY_RANGE
        };
        self.query_radius_exact(membership.map_entity, &position, range)
    }
}

impl System for WorldSystem {
    fn execute(&mut self, _delta_time: f32) {
        let updates: Vec<(Entity, Entity, crate::components::Vec3)> = self
            .map_memberships
            .iter()
            .filter_map(|(entity, membership)| {
                self.transforms.get(entity).map(|t| (entity, membership.map_entity, t.position))
            })
            .collect();
        for (entity, map_entity, position) in updates {
            if let Some(index) = self.maps.get_mut(&map_entity) {
                index.update(entity, &position);
            }
        }
    }

    fn stage(&self) -> SystemStage {
        SystemStage::PreUpdate
    }

    fn name(&self) -> &'static str {
        "WorldSystem"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Vec3;
    use crate::world::World;

    #[test]
    fn s6_visible_entities_uses_exact_distance_not_just_cell_membership() {
        let mut world = World::new();
        let map = world.registry.create();

        let viewer = world.registry.create();
        world.transforms.add(viewer, Transform { position: Vec3::new(0.0, 0.0, 0.0), ..Transform::default() });
        world
            .map_memberships
            .add(viewer, MapMembership { map_entity: map, visibility_range: 100.0 });

        let near = world.registry.create();
        world.transforms.add(near, Transform { position: Vec3::new(10.0, 0.0, 10.0), ..Transform::default() });
        world.map_memberships.add(near, MapMembership { map_entity: map, visibility_range: 100.0 });

        let far = world.registry.create();
        world.transforms.add(far, Transform { position: Vec3::new(500.0, 0.0, 500.0), ..Transform::default() });
        world.map_memberships.add(far, MapMembership { map_entity: map, visibility_range: 100.0 });

        let mut system = unsafe {
            WorldSystem::new(world.transforms_ptr(), world.map_memberships_ptr())
        };
        system.register_map(map);
        System::execute(&mut system, 0.0);

        let visible = system.get_visible_entities(viewer);
        assert!(visible.contains(&viewer));
        assert!(visible.contains(&near));
        assert!(!visible.contains(&far));
        assert_eq!(visible.len(), 2);
    }
}
