//! Inventory shell (§4.7a): durability loss from combat events, enchant
//! expiry, and an in-memory item-template registry. Runs in PostUpdate so
//! Update-stage combat damage is visible as `DurabilityEvent`s the same tick.

use std::collections::HashMap;

use cgs_ecs::scheduler::{System, SystemStage};

use crate::components::{DurabilityEvent, Enchant, Equipment, ItemTemplate};
use crate::storage_ptr::StoragePtr;

pub struct InventorySystem {
    equipment: StoragePtr<Equipment>,
    enchants: StoragePtr<Enchant>,
    durability_events: StoragePtr<DurabilityEvent>,
    templates: HashMap<u32, ItemTemplate>,
}

impl InventorySystem {
    /// Safety: every handle must outlive this system.
    pub unsafe fn new(
        equipment: StoragePtr<Equipment>,
        enchants: StoragePtr<Enchant>,
        durability_events: StoragePtr<DurabilityEvent>,
    ) -> Self {
        InventorySystem { equipment, enchants, durability_events, templates: HashMap::new() }
    }

    pub fn register_template(&mut self, template: ItemTemplate) {
        self.templates.insert(template.item_id, template);
    }

    pub fn get_template(&self, item_id: u32) -> Option<&ItemTemplate> {
        self.templates.get(&item_id)
    }

    fn process_durability_events(&mut self) {
        let entities: Vec<cgs_ecs::Entity> = (0..self.durability_events.size())
            .map(|i| self.durability_events.entity_at(i))
            .collect();
        for entity in entities {
            if let Some(event) = self.durability_events.get(entity).copied() {
                if let Some(equipment) = self.equipment.get_mut(event.owner) {
                    equipment.apply_durability_loss(event.slot_index, event.amount);
                }
            }
        }
        self.durability_events.clear_storage();
    }

    fn update_enchants(&mut self, dt: f32) {
        for (_, enchant) in self.enchants.iter_mut() {
            enchant.duration_remaining -= dt;
        }
        let expired: Vec<cgs_ecs::Entity> = (0..self.enchants.size())
            .map(|i| self.enchants.entity_at(i))
            .filter(|&e| self.enchants.get(e).map(|en| en.duration_remaining <= 0.0).unwrap_or(false))
            .collect();
        for entity in expired {
            self.enchants.remove(entity);
        }
    }
}

impl System for InventorySystem {
    fn execute(&mut self, delta_time: f32) {
        self.process_durability_events();
        self.update_enchants(delta_time);
    }

    fn stage(&self) -> SystemStage {
        SystemStage::PostUpdate
    }

    fn name(&self) -> &'static str {
        "InventorySystem"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
