//! Entity registry: allocation, versioned recycling, and deferred destruction.

use crate::component_storage::ErasedStorage;
use crate::entity::Entity;
use std::ptr::NonNull;

/// A non-owning handle to a registered storage.
///
/// # Safety
/// The referenced storage must outlive the registry; the registry never
/// drops or frees it, only calls `remove_erased`/`clear` through the
/// pointer. This mirrors the raw-pointer ownership the registry holds in
/// the reference implementation: storages are owned elsewhere (typically a
/// `World`/`Registry` aggregate with the storages as sibling fields) and
/// registered here purely for destruction fan-out.
pub struct RegisteredStorage(NonNull<dyn ErasedStorage>);

impl RegisteredStorage {
    /// # Safety
    /// `storage` must remain valid for as long as this handle is registered.
    pub unsafe fn new(storage: &mut dyn ErasedStorage) -> Self {
        // Safety: caller guarantees `storage` outlives this handle (see the
        // struct-level contract); the struct holds no lifetime parameter, so
        // the borrow's lifetime must be erased to construct the `NonNull`.
        let storage: &mut (dyn ErasedStorage + 'static) = std::mem::transmute(storage);
        RegisteredStorage(NonNull::new_unchecked(storage as *mut dyn ErasedStorage))
    }

    fn as_mut(&mut self) -> &mut dyn ErasedStorage {
        // Safety: contract guarantees the pointee is still alive.
        unsafe { self.0.as_mut() }
    }
}

#[derive(Default)]
pub struct EntityRegistry {
    versions: Vec<u8>,
    alive: Vec<bool>,
    free_list: std::collections::VecDeque<u32>,
    pending_destroy: Vec<Entity>,
    storages: Vec<RegisteredStorage>,
    count: usize,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a storage for destruction fan-out.
    ///
    /// # Safety
    /// `storage` must outlive this registry (or be deregistered before it
    /// is dropped, which this API does not currently support — callers
    /// must guarantee lifetime, matching the reference contract).
    pub unsafe fn register_storage(&mut self, storage: &mut dyn ErasedStorage) {
        self.storages.push(RegisteredStorage::new(storage));
    }

    pub fn create(&mut self) -> Entity {
        if let Some(index) = self.free_list.pop_front() {
            self.alive[index as usize] = true;
            self.count += 1;
            Entity::new(index, self.versions[index as usize])
        } else {
            let index = self.versions.len() as u32;
            self.versions.push(0);
            self.alive.push(true);
            self.count += 1;
            Entity::new(index, 0)
        }
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        let index = entity.index() as usize;
        index < self.alive.len()
            && self.alive[index]
            && self.versions[index] == entity.version()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.versions.len()
    }

    /// Destroys `entity` immediately: removes its component from every
    /// registered storage, frees the index, and bumps its version so stale
    /// handles can never resolve to a live entity again. No-op if not alive.
    pub fn destroy(&mut self, entity: Entity) {
        if !self.is_alive(entity) {
            return;
        }
        let index = entity.index() as usize;
        for storage in self.storages.iter_mut() {
            storage.as_mut().remove_erased(entity);
        }
        self.alive[index] = false;
        self.count -= 1;
        // Wrap 0xFF -> 0x00. The max-index + version-0xFF combination is the
        // INVALID sentinel, but that only collides with index == MAX_INDEX,
        // which Entity::new never produces for registry-managed indices
        // below u32 index capacity, so the wraparound is safe in practice.
        self.versions[index] = self.versions[index].wrapping_add(1);
        self.free_list.push_back(index as u32);
    }

    /// Queues `entity` for destruction without any side effects yet.
    pub fn destroy_deferred(&mut self, entity: Entity) {
        self.pending_destroy.push(entity);
    }

    /// Snapshots and clears the deferred queue, destroying each entry that
    /// is still alive exactly once.
    pub fn flush_deferred(&mut self) {
        let queue = std::mem::take(&mut self.pending_destroy);
        for entity in queue {
            self.destroy(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component_storage::ComponentStorage;

    #[test]
    fn create_allocates_fresh_indices() {
        let mut reg = EntityRegistry::new();
        let a = reg.create();
        let b = reg.create();
        assert_ne!(a.index(), b.index());
        assert_eq!(reg.count(), 2);
    }

    #[test]
    fn destroy_then_create_never_repeats_index_version_pair() {
        let mut reg = EntityRegistry::new();
        let a = reg.create();
        reg.destroy(a);
        assert!(!reg.is_alive(a));
        let b = reg.create();
        // Same index recycled, but the (index, version) pair must differ.
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
    }

    #[test]
    fn destroy_removes_from_registered_storages() {
        let mut reg = EntityRegistry::new();
        let mut storage: ComponentStorage<i32> = ComponentStorage::new();
        let e = reg.create();
        storage.add(e, 7);
        unsafe {
            reg.register_storage(&mut storage);
        }
        reg.destroy(e);
        assert!(!storage.has(e));
    }

    #[test]
    fn flush_deferred_destroys_each_entry_once() {
        let mut reg = EntityRegistry::new();
        let e = reg.create();
        reg.destroy_deferred(e);
        reg.destroy_deferred(e);
        reg.flush_deferred();
        assert!(!reg.is_alive(e));
        assert_eq!(reg.count(), 0);
    }
}
