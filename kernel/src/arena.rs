//! Generation-checked arenas
//!
//! Kernel records (threads, pipes, sockets, file control blocks, connection
//! requests) live in arenas and are named by [`Handle`]s. Every removal bumps
//! the slot generation, so a handle kept across a blocking wait is re-resolved
//! afterwards and a record released in the meantime is reported as missing
//! instead of being confused with whatever reused the slot.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

/// Index plus generation naming one arena slot occupant
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Pack into a non-zero integer: generation in the high half, slot + 1 in the low half
    pub fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64 + 1)
    }

    /// Inverse of [`Handle::to_raw`]; zero and other malformed values yield `None`
    pub fn from_raw(raw: u64) -> Option<Self> {
        let low = raw as u32;
        if low == 0 {
            return None;
        }
        Some(Self::new(low - 1, (raw >> 32) as u32))
    }
}

// Manual impls: derives would put bounds on `T`.
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
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot pool with a LIFO free list
pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    free_list: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    /// Create an empty arena
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store a value, reusing the most recently freed slot if there is one
    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let entry = &mut self.entries[index as usize];
            entry.value = Some(value);
            return Handle::new(index, entry.generation);
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 0,
            value: Some(value),
        });
        Handle::new(index, 0)
    }

    /// Take the value out and invalidate every handle to it
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let entry = self.entries.get_mut(handle.index())?;
        if entry.generation != handle.generation {
            return None;
        }
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.entries
            .get(handle.index())
            .filter(|e| e.generation == handle.generation)
            .and_then(|e| e.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.entries
            .get_mut(handle.index())
            .filter(|e| e.generation == handle.generation)
            .and_then(|e| e.value.as_mut())
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Scoped interests
// ============================================================================

/// An outstanding interest in an arena record, held across a blocking wait.
///
/// The holder incremented the record's interest count when creating this
/// value and must hand it back through the owning module on every exit path.
/// Dropping it silently is a kernel bug and trips a debug assertion.
#[must_use = "interests must be released explicitly"]
pub struct Interest<T> {
    handle: Handle<T>,
}

impl<T> Interest<T> {
    pub fn new(handle: Handle<T>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> Handle<T> {
        self.handle
    }

    /// Consume the interest; the caller then drops the record's count
    pub fn into_handle(self) -> Handle<T> {
        let handle = self.handle;
        core::mem::forget(self);
        handle
    }
}

impl<T> Drop for Interest<T> {
    fn drop(&mut self) {
        debug_assert!(
            std::thread::panicking(),
            "interest in {:?} dropped without release",
            self.handle
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.remove(a), None);
        assert!(arena.contains(b));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_reused_slot_rejects_stale_handle() {
        let mut arena = Arena::new();
        let old = arena.insert(1);
        arena.remove(old);
        let new = arena.insert(2);
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert_eq!(arena.get(old), None);
        assert_eq!(arena.get(new), Some(&2));
    }

    #[test]
    fn test_raw_round_trip_is_never_zero() {
        let mut arena = Arena::new();
        let h = arena.insert(());
        assert_ne!(h.to_raw(), 0);
        assert_eq!(Handle::<()>::from_raw(h.to_raw()), Some(h));
        assert_eq!(Handle::<()>::from_raw(0), None);
        assert_eq!(Handle::<()>::from_raw(7 << 32), None);
    }

    #[test]
    fn test_interest_hands_back_handle() {
        let mut arena = Arena::new();
        let h = arena.insert(0u8);
        let interest = Interest::new(h);
        assert_eq!(interest.handle(), h);
        assert_eq!(interest.into_handle(), h);
    }
}
