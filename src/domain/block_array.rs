//! Growable array with contiguous block insert/remove.
//!
//! Inserting or removing `k` elements moves the tail exactly once, so a block
//! operation costs O(n + k) instead of the O(n * k) of k single-element shifts.
//! Capacity grows by a factor that starts at 2 and tapers off for large arrays.

use std::mem;
use std::ops::Range;

use tracing::trace;

use crate::domain::error::{DomainError, DomainResult};

/// Smallest capacity allocated once the array holds anything.
const MIN_CAPACITY: usize = 16;
/// Lower bound on the number of slots added per reallocation.
const MIN_INCREMENT: usize = 16;
/// Capacity below which the array doubles.
const TAPER_START: usize = 4096;
/// Smallest growth factor; keeps the number of reallocations logarithmic.
pub const GROWTH_FLOOR: f64 = 1.125;

/// Growth factor applied to `capacity` when more room is needed.
///
/// 2.0 below [`TAPER_START`], then 0.25 less for every doubling beyond it,
/// bottoming out at [`GROWTH_FLOOR`].
pub fn growth_factor(capacity: usize) -> f64 {
    if capacity < TAPER_START {
        return 2.0;
    }
    let doublings = (capacity as f64 / TAPER_START as f64).log2();
    (2.0 - 0.25 * doublings).max(GROWTH_FLOOR)
}

/// Capacity to reallocate to when `needed` slots are required and `current` are available.
pub fn next_capacity(current: usize, needed: usize, max_len: usize) -> DomainResult<usize> {
    if needed > max_len {
        return Err(DomainError::CapacityExhausted {
            requested: needed,
            max: max_len,
        });
    }
    let grown = (current as f64 * growth_factor(current)) as usize;
    let target = needed
        .max(grown)
        .max(current.saturating_add(MIN_INCREMENT))
        .max(MIN_CAPACITY);
    Ok(target.min(max_len))
}

/// Index-addressable sequence with O(k) block operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockArray<T> {
    items: Vec<T>,
    max_len: usize,
}

impl<T> Default for BlockArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockArray<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            max_len: Self::addressable_max(),
        }
    }

    pub fn with_capacity(capacity: usize) -> DomainResult<Self> {
        let mut array = Self::new();
        array.ensure_capacity(capacity)?;
        Ok(array)
    }

    /// Caps the number of elements this array may ever hold.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len.min(Self::addressable_max());
        self
    }

    fn addressable_max() -> usize {
        isize::MAX as usize / mem::size_of::<T>().max(1)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> DomainResult<&T> {
        self.items
            .get(index)
            .ok_or_else(|| DomainError::index(index, self.items.len()))
    }

    pub fn get_mut(&mut self, index: usize) -> DomainResult<&mut T> {
        let len = self.items.len();
        self.items
            .get_mut(index)
            .ok_or_else(|| DomainError::index(index, len))
    }

    /// Replaces the element at `index`, returning the previous one.
    pub fn set(&mut self, index: usize, value: T) -> DomainResult<T> {
        let slot = self.get_mut(index)?;
        Ok(mem::replace(slot, value))
    }

    pub fn push(&mut self, value: T) -> DomainResult<()> {
        let len = self.items.len();
        self.insert(len, value)
    }

    pub fn insert(&mut self, index: usize, value: T) -> DomainResult<()> {
        self.insert_block(index, std::iter::once(value)).map(|_| ())
    }

    pub fn remove(&mut self, index: usize) -> DomainResult<T> {
        let len = self.items.len();
        if index >= len {
            return Err(DomainError::index(index, len));
        }
        Ok(self.items.remove(index))
    }

    /// Inserts `items` so that the first lands at `index`. `index == len` appends.
    ///
    /// Returns the range now occupied by the inserted items.
    pub fn insert_block<I>(&mut self, index: usize, items: I) -> DomainResult<Range<usize>>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        if index > self.items.len() {
            return Err(DomainError::index(index, self.items.len()));
        }
        let items = items.into_iter();
        let count = items.len();
        self.ensure_capacity(count)?;
        // splice moves the tail once when the iterator length is exact
        self.items.splice(index..index, items);
        Ok(index..index + count)
    }

    /// Removes the half-open range `[from, to)` and returns the removed items in order.
    pub fn remove_block(&mut self, from: usize, to: usize) -> DomainResult<Vec<T>> {
        if to < from {
            return Err(DomainError::InvalidRange { from, to });
        }
        if to > self.items.len() {
            return Err(DomainError::index(to, self.items.len()));
        }
        Ok(self.items.drain(from..to).collect())
    }

    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Makes room for `additional` more elements using the tapering growth policy.
    pub fn ensure_capacity(&mut self, additional: usize) -> DomainResult<()> {
        let needed = self
            .items
            .len()
            .checked_add(additional)
            .ok_or(DomainError::CapacityExhausted {
                requested: usize::MAX,
                max: self.max_len,
            })?;
        if needed <= self.items.capacity() {
            return Ok(());
        }
        let target = next_capacity(self.items.capacity(), needed, self.max_len)?;
        self.items
            .try_reserve_exact(target - self.items.len())
            .map_err(|_| DomainError::CapacityExhausted {
                requested: target,
                max: self.max_len,
            })?;
        trace!(needed, capacity = self.items.capacity(), "block array grown");
        Ok(())
    }
}

impl<T> FromIterator<T> for BlockArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
            max_len: Self::addressable_max(),
        }
    }
}

impl<T> From<Vec<T>> for BlockArray<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            items,
            max_len: Self::addressable_max(),
        }
    }
}

impl<'a, T> IntoIterator for &'a BlockArray<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
