//! Opaque handles for native tensors owned by the bridge.
//!
//! A handle packs `tag:16 | generation:16 | slot+1:32` into a `u64`. The tag identifies the
//! registry that minted it, the generation invalidates handles once their slot is reused, and
//! the `+1` keeps `0` from ever being a valid handle.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::backend::spec::BackendError;
use crate::error::{BridgeError, BridgeResult};

/// Opaque token handed to managed callers.
pub type Handle = u64;

const SLOT_BITS: u32 = 32;
const GENERATION_BITS: u32 = 16;
const MAX_SLOTS: usize = u32::MAX as usize - 1;

static TAG_SEED: OnceLock<u16> = OnceLock::new();
static TAG_COUNTER: AtomicU16 = AtomicU16::new(0);

fn next_registry_tag() -> u16 {
    let seed = *TAG_SEED.get_or_init(|| {
        let mut hasher = RandomState::new().build_hasher();
        hasher.write_u32(std::process::id());
        hasher.finish() as u16
    });
    seed.wrapping_add(TAG_COUNTER.fetch_add(1, Ordering::Relaxed))
}

fn encode(tag: u16, generation: u16, slot: u32) -> Handle {
    (u64::from(tag) << (SLOT_BITS + GENERATION_BITS))
        | (u64::from(generation) << SLOT_BITS)
        | (u64::from(slot) + 1)
}

fn decode(handle: Handle) -> Option<(u16, u16, u32)> {
    let tag = (handle >> (SLOT_BITS + GENERATION_BITS)) as u16;
    let generation = (handle >> SLOT_BITS) as u16;
    let slot = (handle as u32).checked_sub(1)?;
    Some((tag, generation, slot))
}

struct Slot<T> {
    generation: u16,
    value: Option<Arc<T>>,
}

struct Slots<T> {
    entries: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

/// Slot table mapping handles to shared native values.
///
/// Lookups hand out an `Arc`, so a release racing with an in-flight reader only drops the
/// native value once that reader is done.
pub struct HandleRegistry<T> {
    tag: u16,
    capacity: Option<usize>,
    slots: RwLock<Slots<T>>,
}

impl<T> HandleRegistry<T> {
    pub fn new() -> Self {
        Self::with_capacity_limit(None)
    }

    /// Registry that refuses to hold more than `limit` live values.
    pub fn with_capacity_limit(limit: Option<usize>) -> Self {
        HandleRegistry {
            tag: next_registry_tag(),
            capacity: limit,
            slots: RwLock::new(Slots {
                entries: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    /// Moves `value` into a slot and returns its handle.
    pub fn wrap(&self, value: T) -> BridgeResult<Handle> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(limit) = self.capacity {
            if slots.live >= limit {
                return Err(BridgeError::Native(BackendError::execution(format!(
                    "handle registry exhausted: {limit} live tensors"
                ))));
            }
        }

        let value = Some(Arc::new(value));
        let (slot, generation) = match slots.free.pop() {
            Some(slot) => {
                let entry = &mut slots.entries[slot as usize];
                entry.value = value;
                (slot, entry.generation)
            }
            None => {
                if slots.entries.len() >= MAX_SLOTS {
                    return Err(BridgeError::Native(BackendError::execution(
                        "handle registry exhausted: no free slots",
                    )));
                }
                let slot = slots.entries.len() as u32;
                slots.entries.push(Slot {
                    generation: 0,
                    value,
                });
                (slot, 0)
            }
        };
        slots.live += 1;

        let handle = encode(self.tag, generation, slot);
        tracing::trace!(handle, "wrapped tensor");
        Ok(handle)
    }

    /// Checked lookup; unknown, released, stale or foreign handles are rejected.
    pub fn get(&self, handle: Handle) -> BridgeResult<Arc<T>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        self.locate(&slots, handle)
            .and_then(|slot| slots.entries[slot].value.clone())
            .ok_or(BridgeError::InvalidHandle(handle))
    }

    /// Removes the value behind `handle`. The handle is invalid afterwards.
    pub fn release(&self, handle: Handle) -> BridgeResult<()> {
        let released = {
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            let slot = self
                .locate(&slots, handle)
                .ok_or(BridgeError::InvalidHandle(handle))?;
            let entry = &mut slots.entries[slot];
            let value = entry.value.take().ok_or(BridgeError::InvalidHandle(handle))?;
            // A slot whose generation would wrap is retired instead of reused.
            let reusable = entry.generation < u16::MAX;
            if reusable {
                entry.generation += 1;
                slots.free.push(slot as u32);
            }
            slots.live -= 1;
            value
        };
        tracing::trace!(handle, "released tensor");
        drop(released);
        Ok(())
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_ok()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn locate(&self, slots: &Slots<T>, handle: Handle) -> Option<usize> {
        let (tag, generation, slot) = decode(handle)?;
        if tag != self.tag {
            return None;
        }
        let entry = slots.entries.get(slot as usize)?;
        (entry.generation == generation && entry.value.is_some()).then_some(slot as usize)
    }
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn zero_is_never_a_handle() {
        let registry = HandleRegistry::new();
        let handle = registry.wrap(1u32).unwrap();
        assert_ne!(handle, 0);
        assert_eq!(registry.get(0).unwrap_err().kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn released_handles_are_rejected() {
        let registry = HandleRegistry::new();
        let handle = registry.wrap("a").unwrap();
        assert_eq!(*registry.get(handle).unwrap(), "a");
        registry.release(handle).unwrap();
        assert_eq!(
            registry.get(handle).unwrap_err(),
            BridgeError::InvalidHandle(handle)
        );
        assert_eq!(
            registry.release(handle).unwrap_err().kind(),
            ErrorKind::InvalidHandle
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn reused_slots_do_not_revive_stale_handles() {
        let registry = HandleRegistry::new();
        let first = registry.wrap(1).unwrap();
        registry.release(first).unwrap();
        let second = registry.wrap(2).unwrap();
        assert_ne!(first, second);
        assert!(!registry.contains(first));
        assert_eq!(*registry.get(second).unwrap(), 2);
    }

    #[test]
    fn handles_are_scoped_to_their_registry() {
        let a = HandleRegistry::new();
        let b = HandleRegistry::new();
        let handle = a.wrap(7).unwrap();
        b.wrap(8).unwrap();
        assert!(!b.contains(handle));
    }

    #[test]
    fn capacity_limit_is_a_native_fault() {
        let registry = HandleRegistry::with_capacity_limit(Some(1));
        let handle = registry.wrap(()).unwrap();
        assert_eq!(registry.wrap(()).unwrap_err().kind(), ErrorKind::Native);
        registry.release(handle).unwrap();
        registry.wrap(()).unwrap();
    }

    #[test]
    fn readers_keep_released_values_alive() {
        let registry = HandleRegistry::new();
        let handle = registry.wrap(vec![1, 2, 3]).unwrap();
        let reader = registry.get(handle).unwrap();
        registry.release(handle).unwrap();
        assert_eq!(*reader, vec![1, 2, 3]);
    }
}
