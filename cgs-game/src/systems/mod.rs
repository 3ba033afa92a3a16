pub mod ai;
pub mod combat;
pub mod inventory;
pub mod object_update;
pub mod quest;

pub use ai::AISystem;
pub use combat::CombatSystem;
pub use inventory::InventorySystem;
pub use object_update::ObjectUpdateSystem;
pub use quest::QuestSystem;
