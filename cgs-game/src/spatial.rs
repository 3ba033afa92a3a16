//! Grid-based spatial index for interest management (§4.7). Cells are keyed
//! by `floor(x/cellSize), floor(z/cellSize)` — Y is ignored. `QueryRadius`
//! only returns cell-level candidates; exact distance filtering is the
//! caller's job (`WorldSystem::get_visible_entities`).

use std::collections::HashMap;

use cgs_ecs::Entity;

use crate::components::Vec3;

pub const DEFAULT_CELL_SIZE: f32 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellCoord {
    pub cx: i32,
    pub cz: i32,
}

pub struct SpatialIndex {
    cell_size: f32,
    cells: HashMap<CellCoord, Vec<Entity>>,
    entity_cell: HashMap<Entity, CellCoord>,
}

impl SpatialIndex {
    pub fn new(cell_size: f32) -> Self {
        SpatialIndex { cell_size, cells: HashMap::new(), entity_cell: HashMap::new() }
    }

    pub fn world_to_cell(&self, position: &Vec3) -> CellCoord {
        CellCoord {
            cx: (position.x / self.cell_size).floor() as i32,
            cz: (position.z / self.cell_size).floor() as i32,
        }
    }

    pub fn insert(&mut self, entity: Entity, position: &Vec3) {
        let cell = self.world_to_cell(position);
        self.cells.entry(cell).or_insert_with(Vec::new).push(entity);
        self.entity_cell.insert(entity, cell);
    }

    /// No-op if the entity's cell is unchanged; otherwise removes it from
    /// the old cell's bucket and re-inserts it into the new one.
    pub fn update(&mut self, entity: Entity, position: &Vec3) {
        let new_cell = self.world_to_cell(position);
        if let Some(&old_cell) = self.entity_cell.get(&entity) {
            if old_cell == new_cell {
                return;
            }
            if let Some(bucket) = self.cells.get_mut(&old_cell) {
                bucket.retain(|&e| e != entity);
            }
        }
        self.cells.entry(new_cell).or_insert_with(Vec::new).push(entity);
        self.entity_cell.insert(entity, new_cell);
    }

    pub fn remove(&mut self, entity: Entity) {
        if let Some(cell) = self.entity_cell.remove(&entity) {
            if let Some(bucket) = self.cells.get_mut(&cell) {
                bucket.retain(|&e| e != entity);
            }
        }
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.entity_cell.clear();
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.entity_cell.contains_key(&entity)
    }

    pub fn query_cell(&self, cell: CellCoord) -> &[Entity] {
        self.cells.get(&cell).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Candidates within the integer cell range covering the bounding
    /// square `[center ± radius]`; false positives beyond `radius` are
    /// expected and filtered by the caller.
    pub fn query_radius(&self, center: &Vec3, radius: f32) -> Vec<Entity> {
        let min = self.world_to_cell(&Vec3::new(center.x - radius, 0.0, center.z - radius));
        let max = self.world_to_cell(&Vec3::new(center.x + radius, 0.0, center.z + radius));
        let mut out = Vec::new();
        for cx in min.cx..=max.cx {
            for cz in min.cz..=max.cz {
                if let Some(bucket) = self.cells.get(&CellCoord { cx, cz }) {
                    out.extend_from_slice(bucket);
                }
            }
        }
        out
    }

    pub fn query_position(&self, entity: Entity) -> Option<CellCoord> {
        self.entity_cell.get(&entity).copied()
    }
}
