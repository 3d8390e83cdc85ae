//! Generational slot storage.
//!
//! Slots are recycled through a free list. Every recycle bumps the slot's
//! generation, so a [`Handle`] to a removed value never resolves to whatever
//! took its place. Each arena also carries a process-unique [`ArenaId`]: a
//! handle minted by one arena is rejected by every other arena.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(0);

/// Generation counter to detect stale handles.
/// Incremented each time a slot is recycled.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Generation(u32);

impl Generation {
    /// Create a new generation (starts at 0).
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Increment the generation counter.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Get the raw generation value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// Identity of one arena instance.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ArenaId(u32);

impl ArenaId {
    fn fresh() -> Self {
        Self(NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Stable reference to a value stored in an [`Arena`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    arena: ArenaId,
    index: u32,
    generation: Generation,
}

impl Handle {
    /// The arena that minted this handle.
    #[must_use]
    pub const fn arena(self) -> ArenaId {
        self.arena
    }

    /// Slot index inside the arena.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when the handle was minted.
    #[must_use]
    pub const fn generation(self) -> Generation {
        self.generation
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}@{}", self.index, self.generation.0, self.arena.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation.0)
    }
}

struct Slot<T> {
    generation: Generation,
    value: Option<T>,
}

/// Generational storage with slot reuse.
pub struct Arena<T> {
    id: ArenaId,
    slots: Vec<Slot<T>>,
    /// Free list of vacant slot indices.
    free_list: Vec<u32>,
    /// Number of occupied slots.
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Create an empty arena with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ArenaId::fresh(),
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Identity shared by every handle this arena mints.
    #[must_use]
    pub const fn id(&self) -> ArenaId {
        self.id
    }

    /// Store a value, reusing a vacant slot when one is available.
    pub fn insert(&mut self, value: T) -> Handle {
        self.len += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            Handle {
                arena: self.id,
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: Generation::new(),
                value: Some(value),
            });
            Handle {
                arena: self.id,
                index,
                generation: Generation::new(),
            }
        }
    }

    /// Remove and return the value behind `handle`.
    ///
    /// Returns `None` for stale or foreign handles.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        if !self.contains(handle) {
            return None;
        }

        let slot = &mut self.slots[handle.index as usize];
        let value = slot.value.take();
        // Invalidate every outstanding handle to this slot
        slot.generation = slot.generation.next();
        self.free_list.push(handle.index);
        self.len -= 1;
        value
    }

    /// Check whether `handle` still refers to a live value in this arena.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        handle.arena == self.id
            && self
                .slots
                .get(handle.index as usize)
                .is_some_and(|slot| slot.generation == handle.generation && slot.value.is_some())
    }

    /// Borrow the value behind `handle`.
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&T> {
        if handle.arena != self.id {
            return None;
        }
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Mutably borrow the value behind `handle`.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        if handle.arena != self.id {
            return None;
        }
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Number of live values.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the arena holds no live values.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over live values together with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    Handle {
                        arena: self.id,
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}

impl<T> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("len", &self.len)
            .field("capacity", &self.slots.len())
            .finish()
    }
}
