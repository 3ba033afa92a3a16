//! Map Instance Manager (§4.6): mutex-guarded instance bookkeeping, safe to
//! call from any thread. Instance IDs are never reused within a process
//! lifetime.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{GameServerError, GameServerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Active,
    Draining,
    ShuttingDown,
}

impl InstanceState {
    fn can_transition_to(self, next: InstanceState) -> bool {
        matches!(
            (self, next),
            (InstanceState::Active, InstanceState::Draining)
                | (InstanceState::Draining, InstanceState::ShuttingDown)
                | (InstanceState::Active, InstanceState::ShuttingDown)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceType {
    Open,
    Instanced,
    Raid,
}

#[derive(Debug, Clone)]
pub struct MapInstanceInfo {
    pub id: u32,
    pub map_id: u32,
    pub instance_type: InstanceType,
    pub max_players: u32,
    pub player_count: u32,
    pub state: InstanceState,
}

struct Inner {
    instances: HashMap<u32, MapInstanceInfo>,
    next_id: u32,
    max_instances: usize,
}

pub struct MapInstanceManager {
    inner: Mutex<Inner>,
}

impl MapInstanceManager {
    pub fn new(max_instances: usize) -> Self {
        MapInstanceManager {
            inner: Mutex::new(Inner { instances: HashMap::new(), next_id: 1, max_instances }),
        }
    }

    pub fn create_instance(
        &self,
        map_id: u32,
        instance_type: InstanceType,
        max_players: u32,
    ) -> GameServerResult<u32> {
        let mut inner = self.inner.lock().unwrap();
        if inner.instances.len() >= inner.max_instances {
            return Err(GameServerError::MapInstanceLimitReached);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.instances.insert(
            id,
            MapInstanceInfo {
                id,
                map_id,
                instance_type,
                max_players,
                player_count: 0,
                state: InstanceState::Active,
            },
        );
        Ok(id)
    }

    pub fn destroy_instance(&self, id: u32) -> GameServerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let info = inner
            .instances
            .get(&id)
            .ok_or(GameServerError::MapInstanceNotFound(id))?;
        if info.player_count > 0 {
            return Err(GameServerError::MapInstanceInvalidState);
        }
        inner.instances.remove(&id);
        Ok(())
    }

    pub fn set_instance_state(&self, id: u32, state: InstanceState) -> GameServerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let info = inner
            .instances
            .get_mut(&id)
            .ok_or(GameServerError::MapInstanceNotFound(id))?;
        if info.state == state {
            return Ok(());
        }
        if !info.state.can_transition_to(state) {
            return Err(GameServerError::MapInstanceInvalidState);
        }
        info.state = state;
        Ok(())
    }

    pub fn add_player(&self, id: u32) -> GameServerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let info = inner
            .instances
            .get_mut(&id)
            .ok_or(GameServerError::MapInstanceNotFound(id))?;
        if info.state != InstanceState::Active {
            return Err(GameServerError::MapInstanceInvalidState);
        }
        if info.player_count >= info.max_players {
            return Err(GameServerError::InstanceFull);
        }
        info.player_count += 1;
        Ok(())
    }

    pub fn remove_player(&self, id: u32) -> GameServerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let info = inner
            .instances
            .get_mut(&id)
            .ok_or(GameServerError::MapInstanceNotFound(id))?;
        info.player_count = info.player_count.saturating_sub(1);
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<MapInstanceInfo> {
        self.inner.lock().unwrap().instances.get(&id).cloned()
    }

    pub fn instances_by_state(&self, state: InstanceState) -> Vec<MapInstanceInfo> {
        self.inner
            .lock()
            .unwrap()
            .instances
            .values()
            .filter(|i| i.state == state)
            .cloned()
            .collect()
    }

    pub fn instances_by_map(&self, map_id: u32) -> Vec<MapInstanceInfo> {
        self.inner
            .lock()
            .unwrap()
            .instances
            .values()
            .filter(|i| i.map_id == map_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_destroy_roundtrip() {
        let mgr = MapInstanceManager::new(4);
        let id = mgr.create_instance(1, InstanceType::Open, 10).unwrap();
        assert!(mgr.destroy_instance(id).is_ok());
        assert!(mgr.get(id).is_none());
    }

    #[test]
    fn create_instance_limit_reached() {
        let mgr = MapInstanceManager::new(1);
        mgr.create_instance(1, InstanceType::Open, 10).unwrap();
        let err = mgr.create_instance(1, InstanceType::Open, 10).unwrap_err();
        assert!(matches!(err, GameServerError::MapInstanceLimitReached));
    }

    #[test]
    fn instance_ids_are_never_reused() {
        let mgr = MapInstanceManager::new(4);
        let id1 = mgr.create_instance(1, InstanceType::Open, 10).unwrap();
        mgr.destroy_instance(id1).unwrap();
        let id2 = mgr.create_instance(1, InstanceType::Open, 10).unwrap();
        assert_ne!(id1, id2);
    }

    #[test]
    fn state_transitions_are_forward_only() {
        let mgr = MapInstanceManager::new(4);
        let id = mgr.create_instance(1, InstanceType::Open, 10).unwrap();
        mgr.set_instance_state(id, InstanceState::Draining).unwrap();
        let err = mgr.set_instance_state(id, InstanceState::Active).unwrap_err();
        assert!(matches!(err, GameServerError::MapInstanceInvalidState));
        mgr.set_instance_state(id, InstanceState::ShuttingDown).unwrap();
    }

    #[test]
    fn add_player_rejects_when_full_or_not_active() {
        let mgr = MapInstanceManager::new(4);
        let id = mgr.create_instance(1, InstanceType::Open, 1).unwrap();
        mgr.add_player(id).unwrap();
        assert!(matches!(mgr.add_player(id).unwrap_err(), GameServerError::InstanceFull));

        let id2 = mgr.create_instance(1, InstanceType::Open, 10).unwrap();
        mgr.set_instance_state(id2, InstanceState::Draining).unwrap();
        assert!(matches!(mgr.add_player(id2).unwrap_err(), GameServerError::MapInstanceInvalidState));
    }

    #[test]
    fn destroy_fails_while_populated() {
        let mgr = MapInstanceManager::new(4);
        let id = mgr.create_instance(1, InstanceType::Open, 10).unwrap();
        mgr.add_player(id).unwrap();
        assert!(mgr.destroy_instance(id).is_err());
    }
}
