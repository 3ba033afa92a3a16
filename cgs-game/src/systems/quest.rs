//! Quest shell (§4.7a): timer expiry and event-driven objective progress.
//! Runs in PostUpdate for the same event-visibility reason as
//! `InventorySystem`.

use std::collections::HashMap;

use cgs_ecs::scheduler::{System, SystemStage};

use crate::components::{QuestEvent, QuestLog, QuestStatus, QuestTemplate};
use crate::storage_ptr::StoragePtr;

pub struct QuestSystem {
    quest_logs: StoragePtr<QuestLog>,
    quest_events: StoragePtr<QuestEvent>,
    templates: HashMap<u32, QuestTemplate>,
}

impl QuestSystem {
    /// Safety: every handle must outlive this system.
    pub unsafe fn new(quest_logs: StoragePtr<QuestLog>, quest_events: StoragePtr<QuestEvent>) -> Self {
        QuestSystem { quest_logs, quest_events, templates: HashMap::new() }
    }

    pub fn register_template(&mut self, template: QuestTemplate) {
        self.templates.insert(template.quest_id, template);
    }

    pub fn get_template(&self, quest_id: u32) -> Option<&QuestTemplate> {
        self.templates.get(&quest_id)
    }

    fn update_timers(&mut self, dt: f32) {
        for (_, log) in self.quest_logs.iter_mut() {
            for entry in log.entries.iter_mut() {
                if entry.status != QuestStatus::Active {
                    continue;
                }
                entry.elapsed_time += dt;
                if let Some(limit) = entry.time_limit {
                    if entry.elapsed_time >= limit {
                        entry.status = QuestStatus::Failed;
                    }
                }
            }
        }
    }

    fn process_events(&mut self) {
        let events: Vec<QuestEvent> =
            (0..self.quest_events.size()).map(|i| self.quest_events.entity_at(i)).filter_map(|e| self.quest_events.get(e).copied()).collect();
        for event in events {
            if let Some(log) = self.quest_logs.get_mut(event.owner) {
                for entry in log.entries.iter_mut() {
                    if entry.status != QuestStatus::Active {
                        continue;
                    }
                    for objective in entry.objectives.iter_mut() {
                        if objective.objective_id == event.objective_id {
                            objective.current_count =
                                (objective.current_count + event.progress).min(objective.required_count);
                        }
                    }
                    if entry.all_objectives_met() {
                        entry.status = QuestStatus::Completed;
                    }
                }
            }
        }
        self.quest_events.clear_storage();
    }
}

impl System for QuestSystem {
    fn execute(&mut self, delta_time: f32) {
        self.update_timers(delta_time);
        self.process_events();
    }

    fn stage(&self) -> SystemStage {
        SystemStage::PostUpdate
    }

    fn name(&self) -> &'static str {
        "QuestSystem"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
