//! GameServer: orchestrates the map instance manager, the ECS world, the
//! system scheduler, and the game loop (§4.6 last paragraph).

use std::collections::HashMap;

use cgs_ecs::{Entity, SystemScheduler};
use slog::Logger;

use crate::error::{GameServerError, GameServerResult};
use crate::game_loop::{GameLoop, DEFAULT_TICK_RATE_HZ};
use crate::map_instance::{InstanceType, MapInstanceManager};
use crate::systems::{AISystem, CombatSystem, InventorySystem, ObjectUpdateSystem, QuestSystem};
use crate::world::World;
use crate::world_system::WorldSystem;

pub struct PlayerSession {
    pub player_id: u64,
    pub entity: Entity,
    pub instance_id: u32,
}

pub struct GameServer {
    pub world: World,
    pub scheduler: SystemScheduler,
    pub instances: MapInstanceManager,
    pub game_loop: GameLoop,
    instance_map_entities: HashMap<u32, Entity>,
    sessions: HashMap<u64, PlayerSession>,
}

impl GameServer {
    pub fn new(max_instances: usize, logger: impl Into<Option<Logger>>) -> Self {
        let logger = logger.into();
        let mut world = World::new();
        let mut scheduler = SystemScheduler::new(logger.clone());

        unsafe {
            scheduler.register(WorldSystem::new(world.transforms_ptr(), world.map_memberships_ptr()));
            scheduler.register(ObjectUpdateSystem::new(world.transforms_ptr(), world.movements_ptr()));
            scheduler.register(AISystem::new(
                world.ai_brains_ptr(),
                world.transforms_ptr(),
                world.stats_ptr(),
                world.threat_lists_ptr(),
            ));
            scheduler.register(CombatSystem::new(
                world.spell_casts_ptr(),
                world.aura_holders_ptr(),
                world.damage_events_ptr(),
                world.stats_ptr(),
            ));
            scheduler.register(InventorySystem::new(
                world.equipment_ptr(),
                world.enchants_ptr(),
                world.durability_events_ptr(),
            ));
            scheduler.register(QuestSystem::new(world.quest_logs_ptr(), world.quest_events_ptr()));
        }

        GameServer {
            world,
            scheduler,
            instances: MapInstanceManager::new(max_instances),
            game_loop: GameLoop::new(DEFAULT_TICK_RATE_HZ, logger),
            instance_map_entities: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    /// Precondition: call once after construction, before `start`/`tick`.
    pub fn build_scheduler(&mut self) -> GameServerResult<()> {
        if self.scheduler.build() {
            Ok(())
        } else {
            Err(GameServerError::SystemSchedulerBuildFailed(
                self.scheduler.get_last_error().unwrap_or("unknown").to_string(),
            ))
        }
    }

    pub fn create_instance(
        &mut self,
        map_id: u32,
        instance_type: InstanceType,
        max_players: u32,
    ) -> GameServerResult<u32> {
        let id = self.instances.create_instance(map_id, instance_type, max_players)?;
        let map_entity = self.world.registry.create();
        self.instance_map_entities.insert(id, map_entity);
        if let Some(world_system) = self.scheduler.get_mut::<WorldSystem>() {
            world_system.register_map(map_entity);
        }
        Ok(id)
    }

    pub fn destroy_instance(&mut self, id: u32) -> GameServerResult<()> {
        self.instances.destroy_instance(id)?;
        if let Some(map_entity) = self.instance_map_entities.remove(&id) {
            if let Some(world_system) = self.scheduler.get_mut::<WorldSystem>() {
                world_system.unregister_map(map_entity);
            }
            self.world.registry.destroy(map_entity);
        }
        Ok(())
    }

    pub fn add_player(&mut self, player_id: u64, instance_id: u32, name: String) -> GameServerResult<Entity> {
        if self.sessions.contains_key(&player_id) {
            return Err(GameServerError::PlayerAlreadyInWorld);
        }
        self.instances.add_player(instance_id)?;
        let map_entity = *self
            .instance_map_entities
            .get(&instance_id)
            .ok_or(GameServerError::MapInstanceNotFound(instance_id))?;
        let entity = self.world.spawn_player(name, map_entity);
        self.sessions.insert(player_id, PlayerSession { player_id, entity, instance_id });
        Ok(entity)
    }

    pub fn remove_player(&mut self, player_id: u64) -> GameServerResult<()> {
        let session = self.sessions.remove(&player_id).ok_or(GameServerError::PlayerNotInWorld)?;
        self.instances.remove_player(session.instance_id)?;
        self.world.registry.destroy(session.entity);
        Ok(())
    }

    /// Atomically reserves capacity in the target instance, releases the
    /// source, rewrites `MapMembership`; position sync is left to the next
    /// tick's `WorldSystem` pass.
    pub fn transfer_player(&mut self, player_id: u64, target_instance_id: u32) -> GameServerResult<()> {
        let session = self
            .sessions
            .get(&player_id)
            .ok_or(GameServerError::PlayerNotInWorld)?;
        let entity = session.entity;
        let source_instance_id = session.instance_id;

        self.instances.add_player(target_instance_id)?;
        if let Err(e) = self.instances.remove_player(source_instance_id) {
            // roll back the reservation made above
            let _ = self.instances.remove_player(target_instance_id);
            return Err(e);
        }

        let target_map_entity = *self
            .instance_map_entities
            .get(&target_instance_id)
            .ok_or(GameServerError::MapInstanceNotFound(target_instance_id))?;
        if let Some(membership) = self.world.map_memberships.get_mut(entity) {
            membership.map_entity = target_map_entity;
        }
        if let Some(session) = self.sessions.get_mut(&player_id) {
            session.instance_id = target_instance_id;
        }
        Ok(())
    }

    /// Single-step entry point for test contexts; production use goes
    /// through `game_loop.start`.
    pub fn tick(&mut self, delta_time: f32) {
        self.scheduler.execute(delta_time);
        self.world.registry.flush_deferred();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_instance_add_player_and_tick() {
        let mut server = GameServer::new(4, None);
        server.build_scheduler().unwrap();

        let instance_id = server.create_instance(1, InstanceType::Open, 10).unwrap();
        let entity = server.add_player(42, instance_id, "hero".to_string()).unwrap();
        assert!(server.world.registry.is_alive(entity));

        server.tick(1.0 / 20.0);

        assert_eq!(server.instances.get(instance_id).unwrap().player_count, 1);
    }

    #[test]
    fn add_player_twice_errors() {
        let mut server = GameServer::new(4, None);
        server.build_scheduler().unwrap();
        let instance_id = server.create_instance(1, InstanceType::Open, 10).unwrap();
        server.add_player(1, instance_id, "a".to_string()).unwrap();
        let err = server.add_player(1, instance_id, "a".to_string()).unwrap_err();
        assert!(matches!(err, GameServerError::PlayerAlreadyInWorld));
    }

    #[test]
    fn transfer_player_moves_instance_membership() {
        let mut server = GameServer::new(4, None);
        server.build_scheduler().unwrap();
        let source = server.create_instance(1, InstanceType::Open, 10).unwrap();
        let target = server.create_instance(2, InstanceType::Open, 10).unwrap();
        server.add_player(7, source, "p".to_string()).unwrap();

        server.transfer_player(7, target).unwrap();

        assert_eq!(server.instances.get(source).unwrap().player_count, 0);
        assert_eq!(server.instances.get(target).unwrap().player_count, 1);
    }

    #[test]
    fn remove_player_releases_instance_capacity() {
        let mut server = GameServer::new(4, None);
        server.build_scheduler().unwrap();
        let instance_id = server.create_instance(1, InstanceType::Open, 1).unwrap();
        server.add_player(1, instance_id, "a".to_string()).unwrap();
        server.remove_player(1).unwrap();
        assert_eq!(server.instances.get(instance_id).unwrap().player_count, 0);
        server.add_player(2, instance_id, "b".to_string()).unwrap();
    }
}
