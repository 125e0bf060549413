/// Descriptor rebinding after buffer migrations
///
/// When a [`BufferHandle`](crate::memory::BufferHandle) grows, every
/// descriptor set pointing into it still references the old native buffer.
/// The buffer notifies its [`MigrationListener`]s; the
/// [`DescriptorBindingRegistry`] is the stock listener. It remembers which
/// suballocation is bound at which (set, binding, array element) and, after
/// a migration, yields the descriptor writes the backend has to perform.

use std::sync::{Arc, Mutex};
use slotmap::SlotMap;
use crate::error::{Error, Result};
use crate::memory::SuballocationHandle;
use crate::engine_debug;

/// Notification sent after a buffer moved to new storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferMigration {
    pub buffer_name: String,
    /// Native handle of the storage that was replaced
    pub old_buffer: u64,
    /// Native handle of the new storage
    pub new_buffer: u64,
    pub old_size: u64,
    pub new_size: u64,
}

/// Hook invoked by a buffer after every resize
pub trait MigrationListener: Send + Sync {
    fn on_buffer_migrated(&self, migration: &BufferMigration);
}

/// Descriptor type of a buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    UniformBuffer,
    StorageBuffer,
}

slotmap::new_key_type! {
    /// Key of a registered descriptor binding
    pub struct BindingKey;
}

/// A descriptor write the backend must apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorUpdate {
    /// Native descriptor set handle
    pub set: u64,
    pub binding: u32,
    pub array_element: u32,
    pub kind: DescriptorKind,
    /// Native buffer handle
    pub buffer: u64,
    pub offset: u64,
    pub range: u64,
}

struct Binding {
    set: u64,
    binding: u32,
    array_element: u32,
    kind: DescriptorKind,
    suballocation: Arc<SuballocationHandle>,
    dirty: bool,
}

#[derive(Default)]
pub struct DescriptorBindingRegistry {
    bindings: Mutex<SlotMap<BindingKey, Binding>>,
}

impl DescriptorBindingRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Track a buffer binding of a descriptor set
    ///
    /// New bindings start dirty so the first `take_updates` writes them.
    pub fn bind(
        self: &Arc<Self>,
        set: u64,
        binding: u32,
        array_element: u32,
        kind: DescriptorKind,
        suballocation: Arc<SuballocationHandle>,
    ) -> Result<BindingKey> {
        let listener: Arc<dyn MigrationListener> = self.clone();
        suballocation.buffer().add_migration_listener(&listener);

        let mut bindings = self.lock()?;
        Ok(bindings.insert(Binding {
            set,
            binding,
            array_element,
            kind,
            suballocation,
            dirty: true,
        }))
    }

    /// Stop tracking a binding; false if the key is stale
    pub fn unbind(&self, key: BindingKey) -> bool {
        let removed = match self.bindings.lock() {
            Ok(mut bindings) => bindings.remove(key),
            Err(_) => None,
        };
        removed.is_some()
    }

    /// Collect and clear all pending descriptor writes
    pub fn take_updates(&self) -> Vec<DescriptorUpdate> {
        let Ok(mut bindings) = self.bindings.lock() else {
            return Vec::new();
        };
        bindings
            .values_mut()
            .filter(|binding| binding.dirty)
            .map(|binding| {
                binding.dirty = false;
                DescriptorUpdate {
                    set: binding.set,
                    binding: binding.binding,
                    array_element: binding.array_element,
                    kind: binding.kind,
                    buffer: binding.suballocation.native_buffer(),
                    offset: binding.suballocation.offset(),
                    range: binding.suballocation.size(),
                }
            })
            .collect()
    }

    pub fn is_dirty(&self, key: BindingKey) -> bool {
        self.bindings
            .lock()
            .ok()
            .and_then(|bindings| bindings.get(key).map(|binding| binding.dirty))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.bindings.lock().map(|bindings| bindings.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SlotMap<BindingKey, Binding>>> {
        self.bindings
            .lock()
            .map_err(|_| Error::BackendError("Descriptor registry mutex poisoned".to_string()))
    }
}

impl MigrationListener for DescriptorBindingRegistry {
    fn on_buffer_migrated(&self, migration: &BufferMigration) {
        let Ok(mut bindings) = self.bindings.lock() else {
            return;
        };
        let mut marked = 0;
        for binding in bindings.values_mut() {
            if binding.suballocation.native_buffer() == migration.new_buffer {
                binding.dirty = true;
                marked += 1;
            }
        }
        if marked > 0 {
            engine_debug!("galaxy3d::memory::Buffer", "{} descriptor bindings into '{}' need rewriting",
                marked, migration.buffer_name);
        }
    }
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
