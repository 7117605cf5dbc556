//! # Pooled Array
//!
//! Growable array with an explicit geometric growth policy, used for
//! registry bookkeeping (archetype lists, per-archetype chunk lists).

use std::ops::{Deref, DerefMut};

/// Growth factor applied when the array runs out of capacity.
pub const GROWTH_FACTOR: f32 = 1.6;

/// Smallest capacity ever allocated.
pub const MIN_ALLOCATION: usize = 16;

/// A growable array with a predictable growth curve.
///
/// When full, a new backing array of `max(MIN_ALLOCATION, capacity * 1.6)`
/// elements is allocated, existing elements are moved over, and the old
/// array is freed.
pub struct PooledArray<T> {
    /// Backing storage. Its capacity is managed exclusively by `resize_and_grow`.
    items: Vec<T>,
}

impl<T> PooledArray<T> {
    /// Creates an empty array. Nothing is allocated.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Number of elements the array can hold without reallocating.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Appends an element, growing if needed.
    pub fn push(&mut self, value: T) {
        if self.items.len() == self.items.capacity() {
            self.resize_and_grow(self.items.len() + 1);
        }
        self.items.push(value);
    }

    /// Removes and returns the last element.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Ensures room for at least `required` elements in total.
    pub fn reserve_total(&mut self, required: usize) {
        if required > self.items.capacity() {
            self.resize_and_grow(required);
        }
    }

    /// Removes every element, keeping the allocation.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Removes every element, handing each one to `f`.
    pub fn drain_into(&mut self, mut f: impl FnMut(T)) {
        for item in self.items.drain(..) {
            f(item);
        }
    }

    fn resize_and_grow(&mut self, required: usize) {
        let grown = next_capacity(self.items.capacity());
        let new_capacity = grown.max(required);

        let mut items = Vec::with_capacity(new_capacity);
        items.extend(self.items.drain(..));
        self.items = items;
    }
}

/// Capacity the array grows to from `current`.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn next_capacity(current: usize) -> usize {
    let grown = (current as f32 * GROWTH_FACTOR).ceil() as usize;
    grown.max(MIN_ALLOCATION)
}

impl<T> Default for PooledArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for PooledArray<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> DerefMut for PooledArray<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_curve() {
        assert_eq!(next_capacity(0), 16);
        assert_eq!(next_capacity(16), 26);
        assert_eq!(next_capacity(26), 42);
        assert_eq!(next_capacity(100), 160);
    }

    #[test]
    fn test_push_keeps_order_across_growth() {
        let mut array = PooledArray::new();
        assert_eq!(array.capacity(), 0);

        for i in 0..100u32 {
            array.push(i);
        }

        assert_eq!(array.len(), 100);
        assert!(array.capacity() >= 100);
        assert!(array.iter().copied().eq(0..100));
        assert_eq!(array.pop(), Some(99));
    }

    #[test]
    fn test_first_push_allocates_min() {
        let mut array = PooledArray::new();
        array.push(String::from("a"));
        assert!(array.capacity() >= MIN_ALLOCATION);
    }

    #[test]
    fn test_reserve_total() {
        let mut array: PooledArray<u8> = PooledArray::new();
        array.reserve_total(40);
        assert!(array.capacity() >= 40);
        assert!(array.is_empty());
    }

    #[test]
    fn test_drain_into() {
        let mut array = PooledArray::new();
        array.push(1);
        array.push(2);

        let mut seen = Vec::new();
        array.drain_into(|v| seen.push(v));
        assert_eq!(seen, vec![1, 2]);
        assert!(array.is_empty());
    }
}
