//! # Generation-Checked Arena
//!
//! Descriptors (threads, queues, devices) live in slots addressed by
//! [`Handle`]s. Removing a value bumps its slot's generation, so every
//! handle minted before the removal stops resolving instead of dangling.

use crate::{ExecError, ExecResult};
use alloc::vec::Vec;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

/// Typed, generation-checked index into an [`Arena`]
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// A handle no arena ever hands out
    pub(crate) const fn dangling() -> Self {
        Self::new(u32::MAX, u32::MAX)
    }

    #[cfg(test)]
    pub(crate) const fn from_raw(index: u32, generation: u32) -> Self {
        Self::new(index, generation)
    }

    /// Slot index
    pub fn index(self) -> u32 {
        self.index
    }

    /// Slot generation this handle was minted for
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot arena with a free list
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    /// Create an empty arena
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Make sure the next insert cannot fail
    pub fn reserve(&mut self) -> ExecResult<()> {
        if !self.free.is_empty() {
            return Ok(());
        }
        if u32::try_from(self.slots.len()).is_err() {
            return Err(ExecError::OutOfResources);
        }
        self.slots.try_reserve(1).map_err(|_| ExecError::OutOfResources)?;
        // The free list can always absorb every slot, so remove never allocates
        self.free
            .try_reserve(self.slots.len() + 1 - self.free.len())
            .map_err(|_| ExecError::OutOfResources)
    }

    /// Insert a value, reusing a free slot when one exists
    pub fn insert(&mut self, value: T) -> ExecResult<Handle<T>> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            self.len += 1;
            return Ok(Handle::new(index, slot.generation));
        }

        self.reserve()?;
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        self.len += 1;
        Ok(Handle::new(index, 0))
    }

    /// Remove a value; the handle (and all copies) go stale
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Resolve a handle
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Resolve a handle mutably
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Check whether a handle still resolves
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the arena is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over live values in slot order
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Handle::new(index as u32, slot.generation), value))
        })
    }

    /// Iterate mutably over live values in slot order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (Handle::new(index as u32, generation), value))
        })
    }
}

impl<T> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("len", &self.len)
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_insert_and_get() {
        let mut arena = Arena::new();
        let a = arena.insert("a").unwrap();
        let b = arena.insert("b").unwrap();

        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_stale_handle_after_remove() {
        let mut arena = Arena::new();
        let a = arena.insert(1).unwrap();
        assert_eq!(arena.remove(a), Some(1));

        assert!(!arena.contains(a));
        assert_eq!(arena.remove(a), None);

        // Slot is reused under a new generation; the old handle stays dead
        let b = arena.insert(2).unwrap();
        assert_eq!(b.index(), a.index());
        assert_ne!(b.generation(), a.generation());
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&2));
    }

    #[test]
    fn test_iteration_skips_free_slots() {
        let mut arena = Arena::new();
        let handles: Vec<_> = (0..4).map(|n| arena.insert(n).unwrap()).collect();
        arena.remove(handles[1]);

        let values: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 2, 3]);

        for (_, value) in arena.iter_mut() {
            *value *= 10;
        }
        assert_eq!(arena.get(handles[3]), Some(&30));
        assert!(!arena.is_empty());
    }
}
