//! Owns the entity registry and every component storage the game systems
//! operate over. Storages are boxed so their heap address is stable; the
//! `World` must outlive every `StoragePtr` handed to a registered system.

use cgs_ecs::{ComponentStorage, Entity, EntityRegistry};

use crate::components::*;
use crate::storage_ptr::StoragePtr;

pub struct World {
    pub registry: EntityRegistry,
    pub transforms: Box<ComponentStorage<Transform>>,
    pub identities: Box<ComponentStorage<Identity>>,
    pub stats: Box<ComponentStorage<Stats>>,
    pub movements: Box<ComponentStorage<Movement>>,
    pub map_memberships: Box<ComponentStorage<MapMembership>>,
    pub ai_brains: Box<ComponentStorage<AIBrain>>,
    pub spell_casts: Box<ComponentStorage<SpellCast>>,
    pub aura_holders: Box<ComponentStorage<AuraHolder>>,
    pub damage_events: Box<ComponentStorage<DamageEvent>>,
    pub threat_lists: Box<ComponentStorage<ThreatList>>,
    pub inventories: Box<ComponentStorage<Inventory>>,
    pub equipment: Box<ComponentStorage<Equipment>>,
    pub enchants: Box<ComponentStorage<Enchant>>,
    pub durability_events: Box<ComponentStorage<DurabilityEvent>>,
    pub quest_logs: Box<ComponentStorage<QuestLog>>,
    pub quest_events: Box<ComponentStorage<QuestEvent>>,
}

impl World {
    pub fn new() -> Self {
        let mut world = World {
            registry: EntityRegistry::new(),
            transforms: Box::new(ComponentStorage::new()),
            identities: Box::new(ComponentStorage::new()),
            stats: Box::new(ComponentStorage::new()),
            movements: Box::new(ComponentStorage::new()),
            map_memberships: Box::new(ComponentStorage::new()),
            ai_brains: Box::new(ComponentStorage::new()),
            spell_casts: Box::new(ComponentStorage::new()),
            aura_holders: Box::new(ComponentStorage::new()),
            damage_events: Box::new(ComponentStorage::new()),
            threat_lists: Box::new(ComponentStorage::new()),
            inventories: Box::new(ComponentStorage::new()),
            equipment: Box::new(ComponentStorage::new()),
            enchants: Box::new(ComponentStorage::new()),
            durability_events: Box::new(ComponentStorage::new()),
            quest_logs: Box::new(ComponentStorage::new()),
            quest_events: Box::new(ComponentStorage::new()),
        };
        unsafe {
            world.registry.register_storage(&mut *world.transforms);
            world.registry.register_storage(&mut *world.identities);
            world.registry.register_storage(&mut *world.stats);
            world.registry.register_storage(&mut *world.movements);
            world.registry.register_storage(&mut *world.map_memberships);
            world.registry.register_storage(&mut *world.ai_brains);
            world.registry.register_storage(&mut *world.spell_casts);
            world.registry.register_storage(&mut *world.aura_holders);
            world.registry.register_storage(&mut *world.damage_events);
            world.registry.register_storage(&mut *world.threat_lists);
            world.registry.register_storage(&mut *world.inventories);
            world.registry.register_storage(&mut *world.equipment);
            world.registry.register_storage(&mut *world.enchants);
            world.registry.register_storage(&mut *world.durability_events);
            world.registry.register_storage(&mut *world.quest_logs);
            world.registry.register_storage(&mut *world.quest_events);
        }
        world
    }

    /// Creates a fresh player entity carrying the standard bundle named in
    /// §4.6: Transform, Identity, Stats, Movement, MapMembership, QuestLog,
    /// Inventory, Equipment.
    pub fn spawn_player(&mut self, name: String, map_entity: Entity) -> Entity {
        let e = self.registry.create();
        self.transforms.add(e, Transform::default());
        self.identities.add(
            e,
            Identity { guid: e.raw() as u64, name, object_type: 1, entry: 0 },
        );
        self.stats.add(
            e,
            Stats { health: 100, max_health: 100, mana: 100, max_mana: 100, attributes: [0; 16] },
        );
        self.movements.add(
            e,
            Movement {
                speed: 0.0,
                base_speed: 7.0,
                direction: Vec3::ZERO,
                state: MovementState::Idle,
            },
        );
        self.map_memberships.add(
            e,
            MapMembership { map_entity, visibility_range: DEFAULT_VISIBILITY_RANGE },
        );
        self.quest_logs.add(e, QuestLog::default());
        self.inventories.add(e, Inventory::default());
        self.equipment.add(e, Equipment::default());
        e
    }

    /// Safety: the returned handle is only valid while `self` is alive and
    /// the targeted storage is not relocated (it never is: storages are
    /// boxed for the lifetime of the `World`).
    pub unsafe fn transforms_ptr(&mut self) -> StoragePtr<Transform> {
        StoragePtr::new(&mut self.transforms)
    }
    pub unsafe fn stats_ptr(&mut self) -> StoragePtr<Stats> {
        StoragePtr::new(&mut self.stats)
    }
    pub unsafe fn movements_ptr(&mut self) -> StoragePtr<Movement> {
        StoragePtr::new(&mut self.movements)
    }
    pub unsafe fn map_memberships_ptr(&mut self) -> StoragePtr<MapMembership> {
        StoragePtr::new(&mut self.map_memberships)
    }
    pub unsafe fn ai_brains_ptr(&mut self) -> StoragePtr<AIBrain> {
        StoragePtr::new(&mut self.ai_brains)
    }
    pub unsafe fn threat_lists_ptr(&mut self) -> StoragePtr<ThreatList> {
        StoragePtr::new(&mut self.threat_lists)
    }
    pub unsafe fn spell_casts_ptr(&mut self) -> StoragePtr<SpellCast> {
        StoragePtr::new(&mut self.spell_casts)
    }
    pub unsafe fn aura_holders_ptr(&mut self) -> StoragePtr<AuraHolder> {
        StoragePtr::new(&mut self.aura_holders)
    }
    pub unsafe fn damage_events_ptr(&mut self) -> StoragePtr<DamageEvent> {
        StoragePtr::new(&mut self.damage_events)
    }
    pub unsafe fn inventories_ptr(&mut self) -> StoragePtr<Inventory> {
        StoragePtr::new(&mut self.inventories)
    }
    pub unsafe fn equipment_ptr(&mut self) -> StoragePtr<Equipment> {
        StoragePtr::new(&mut self.equipment)
    }
    pub unsafe fn enchants_ptr(&mut self) -> StoragePtr<Enchant> {
        StoragePtr::new(&mut self.enchants)
    }
    pub unsafe fn durability_events_ptr(&mut self) -> StoragePtr<DurabilityEvent> {
        StoragePtr::new(&mut self.durability_events)
    }
    pub unsafe fn quest_logs_ptr(&mut self) -> StoragePtr<QuestLog> {
        StoragePtr::new(&mut self.quest_logs)
    }
    pub unsafe fn quest_events_ptr(&mut self) -> StoragePtr<QuestEvent> {
        StoragePtr::new(&mut self.quest_events)
    }
}

impl Default for World {
    fn default() -> Self {
        World::new()
    }
}
