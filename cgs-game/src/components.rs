//! Plain-data components. Business logic lives in the systems that consume
//! these, not here; setters here only ever clamp, matching the reference
//! headers this crate is grounded on.

use cgs_ecs::Entity;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Vec3 { x, y, z }
    }

    pub fn distance_xz(&self, other: &Vec3) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: f32,
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Transform { position: Vec3::ZERO, rotation: 0.0, scale: 1.0 }
    }
}

#[derive(Debug, Clone)]
pub struct Identity {
    pub guid: u64,
    pub name: String,
    pub object_type: u32,
    pub entry: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub health: i32,
    pub max_health: i32,
    pub mana: i32,
    pub max_mana: i32,
    pub attributes: [i32; 16],
}

impl Stats {
    pub fn apply_damage(&mut self, amount: i32) {
        self.health = (self.health - amount).max(0);
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementState {
    Idle,
    Moving,
}

#[derive(Debug, Clone, Copy)]
pub struct Movement {
    pub speed: f32,
    pub base_speed: f32,
    pub direction: Vec3,
    pub state: MovementState,
}

/// Links an entity to the map-instance entity it currently belongs to, and
/// the interest radius the WorldSystem uses for `GetVisibleEntities`.
#[derive(Debug, Clone, Copy)]
pub struct MapMembership {
    pub map_entity: Entity,
    pub visibility_range: f32,
}

pub const DEFAULT_VISIBILITY_RANGE: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AIState {
    Idle,
    Alert,
    Combat,
    Returning,
}

#[derive(Debug, Clone)]
pub struct AIBrain {
    pub state: AIState,
    pub home_position: Vec3,
    pub target: Entity,
    pub time_since_last_tick: f32,
    pub tick_interval: f32,
}

impl Default for AIBrain {
    fn default() -> Self {
        AIBrain {
            state: AIState::Idle,
            home_position: Vec3::ZERO,
            target: Entity::INVALID,
            time_since_last_tick: 0.0,
            tick_interval: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastState {
    Casting,
    Completed,
    Interrupted,
}

#[derive(Debug, Clone, Copy)]
pub struct SpellCast {
    pub spell_id: u32,
    pub caster: Entity,
    pub target: Entity,
    pub remaining_time: f32,
    pub state: CastState,
}

#[derive(Debug, Clone, Copy)]
pub struct AuraInstance {
    pub aura_id: u32,
    pub remaining_time: f32,
    pub stacks: u8,
}

#[derive(Debug, Clone, Default)]
pub struct AuraHolder {
    pub auras: Vec<AuraInstance>,
}

#[derive(Debug, Clone, Copy)]
pub struct DamageEvent {
    pub source: Entity,
    pub target: Entity,
    pub final_damage: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct ThreatEntry {
    pub entity: Entity,
    pub amount: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ThreatList {
    pub entries: Vec<ThreatEntry>,
}

impl ThreatList {
    pub fn top(&self) -> Option<Entity> {
        self.entries
            .iter()
            .max_by(|a, b| a.amount.partial_cmp(&b.amount).unwrap())
            .map(|e| e.entity)
    }
}

pub const INDESTRUCTIBLE_DURABILITY: i32 = -1;

#[derive(Debug, Clone, Copy)]
pub struct InventorySlot {
    pub item_id: u32,
    pub stack_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub slots: Vec<Option<InventorySlot>>,
}

#[derive(Debug, Clone, Copy)]
pub struct EquipmentSlot {
    pub item_id: u32,
    pub durability: i32,
    pub max_durability: i32,
}

#[derive(Debug, Clone, Default)]
pub struct Equipment {
    pub slots: Vec<Option<EquipmentSlot>>,
}

impl Equipment {
    pub fn apply_durability_loss(&mut self, slot_index: usize, amount: i32) {
        if let Some(Some(slot)) = self.slots.get_mut(slot_index) {
            if slot.durability != INDESTRUCTIBLE_DURABILITY {
                slot.durability = (slot.durability - amount).max(0);
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Enchant {
    pub enchant_id: u32,
    pub slot_index: usize,
    pub duration_remaining: f32,
}

#[derive(Debug, Clone)]
pub struct ItemTemplate {
    pub item_id: u32,
    pub name: String,
    pub max_durability: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct DurabilityEvent {
    pub owner: Entity,
    pub slot_index: usize,
    pub amount: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestStatus {
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct QuestObjective {
    pub objective_id: u32,
    pub required_count: u32,
    pub current_count: u32,
}

impl QuestObjective {
    pub fn is_met(&self) -> bool {
        self.current_count >= self.required_count
    }
}

#[derive(Debug, Clone)]
pub struct QuestEntry {
    pub quest_id: u32,
    pub status: QuestStatus,
    pub objectives: Vec<QuestObjective>,
    pub elapsed_time: f32,
    pub time_limit: Option<f32>,
}

impl QuestEntry {
    pub fn all_objectives_met(&self) -> bool {
        self.objectives.iter().all(|o| o.is_met())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuestLog {
    pub entries: Vec<QuestEntry>,
}

#[derive(Debug, Clone)]
pub struct QuestTemplate {
    pub quest_id: u32,
    pub name: String,
    pub objectives: Vec<QuestObjective>,
    pub time_limit: Option<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct QuestEvent {
    pub owner: Entity,
    pub objective_id: u32,
    pub progress: u32,
}
