//! Combat shell (§4.7a): spell-cast timers, aura expiry, and damage-event
//! application. Damage-formula computation is explicitly out of scope;
//! `DamageEvent::final_damage` is taken as already computed upstream.

use cgs_ecs::scheduler::{System, SystemStage};

use crate::components::{AuraHolder, CastState, DamageEvent, SpellCast, Stats};
use crate::storage_ptr::StoragePtr;

pub struct CombatSystem {
    spell_casts: StoragePtr<SpellCast>,
    aura_holders: StoragePtr<AuraHolder>,
    damage_events: StoragePtr<DamageEvent>,
    stats: StoragePtr<Stats>,
}

impl CombatSystem {
    /// Safety: every handle must outlive this system.
    pub unsafe fn new(
        spell_casts: StoragePtr<SpellCast>,
        aura_holders: StoragePtr<AuraHolder>,
        damage_events: StoragePtr<DamageEvent>,
        stats: StoragePtr<Stats>,
    ) -> Self {
        CombatSystem { spell_casts, aura_holders, damage_events, stats }
    }

    fn update_spell_casts(&mut self, dt: f32) {
        for (_, cast) in self.spell_casts.iter_mut() {
            if cast.state != CastState::Casting {
                continue;
            }
            cast.remaining_time -= dt;
            if cast.remaining_time <= 0.0 {
                cast.remaining_time = 0.0;
                cast.state = CastState::Completed;
            }
        }
    }

    fn update_auras(&mut self, dt: f32) {
        for (_, holder) in self.aura_holders.iter_mut() {
            holder.auras.iter_mut().for_each(|a| a.remaining_time -= dt);
            holder.auras.retain(|a| a.remaining_time > 0.0);
        }
    }

    fn process_damage_events(&mut self) {
        let entities: Vec<cgs_ecs::Entity> =
            (0..self.damage_events.size()).map(|i| self.damage_events.entity_at(i)).collect();
        for entity in entities {
            if let Some(event) = self.damage_events.get(entity).copied() {
                if let Some(stats) = self.stats.get_mut(event.target) {
                    stats.apply_damage(event.final_damage);
                }
            }
        }
        self.damage_events.clear_storage();
    }
}

impl System for CombatSystem {
    fn execute(&mut self, delta_time: f32) {
        self.update_spell_casts(delta_time);
        self.update_auras(delta_time);
        self.process_damage_events();
    }

    fn stage(&self) -> SystemStage {
        SystemStage::Update
    }

    fn name(&self) -> &'static str {
        "CombatSystem"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
