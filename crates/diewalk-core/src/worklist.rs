//! Deferred macro import offsets.

use tracing::trace;

/// Insertion-ordered list of `.debug_macro` offsets queued by import
/// operations.
///
/// Duplicates are kept. Storage doubles whenever a push finds the list full,
/// so the capacity is always a power-of-two multiple of the initial one.
#[derive(Debug, Clone)]
pub struct OffsetWorklist
{
    offsets: Vec<u64>,
}

impl OffsetWorklist
{
    /// Create an empty list able to hold `capacity` offsets (at least one).
    pub fn with_capacity(capacity: usize) -> Self
    {
        Self {
            offsets: Vec::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, offset: u64)
    {
        if self.offsets.len() == self.offsets.capacity() {
            let grow_by = self.offsets.capacity().max(1);
            self.offsets.reserve_exact(grow_by);
            trace!(capacity = self.offsets.capacity(), "grew import worklist");
        }
        self.offsets.push(offset);
    }

    pub fn get(&self, index: usize) -> Option<u64>
    {
        self.offsets.get(index).copied()
    }

    pub fn len(&self) -> usize
    {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.offsets.is_empty()
    }

    pub fn capacity(&self) -> usize
    {
        self.offsets.capacity()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_
    {
        self.offsets.iter().copied()
    }
}

impl Default for OffsetWorklist
{
    fn default() -> Self
    {
        Self::with_capacity(1)
    }
}
