//! Non-owning handle systems use to reach into `World`'s component storages,
//! mirroring `cgs_ecs::registry::RegisteredStorage`'s raw-pointer contract
//! (§9): systems are constructed once, wired against storages that live for
//! the lifetime of the `World`, and run on the single tick thread.

use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use cgs_ecs::ComponentStorage;

pub struct StoragePtr<T>(NonNull<ComponentStorage<T>>);

unsafe impl<T> Send for StoragePtr<T> {}

impl<T> StoragePtr<T> {
    /// Safety: `storage` must outlive every use of the returned handle.
    /// `World` boxes every storage precisely so its address is stable
    /// across `World` moves; callers must not drop or relocate the boxed
    /// storage while a `StoragePtr` to it is alive.
    pub unsafe fn new(storage: &mut ComponentStorage<T>) -> Self {
        StoragePtr(NonNull::new_unchecked(storage as *mut _))
    }
}

impl<T> Deref for StoragePtr<T> {
    type Target = ComponentStorage<T>;
    fn deref(&self) -> &Self::Target {
        unsafe { self.0.as_ref() }
    }
}

impl<T> DerefMut for StoragePtr<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { self.0.as_mut() }
    }
}
