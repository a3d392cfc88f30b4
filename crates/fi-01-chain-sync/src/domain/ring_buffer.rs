//! # Block Ring Buffer
//!
//! Fixed-size circular log. The slot count is a power of two and one slot is
//! always left empty, so `front == back` means empty and the usable capacity
//! is `slots - 1`. All index arithmetic is a mask with `slots - 1`.

use super::errors::RingBufferError;

/// Circular buffer that overwrites its oldest entry once full.
#[derive(Debug, Clone)]
pub struct BlockRingBuffer<T> {
    slots: Vec<Option<T>>,
    mask: usize,
    /// Next slot to write.
    front: usize,
    /// Oldest occupied slot.
    back: usize,
}

impl<T> BlockRingBuffer<T> {
    /// Create a buffer with `slots` slots (`slots - 1` usable entries).
    ///
    /// `slots` must be a power of two and at least 2.
    pub fn with_slots(slots: usize) -> Result<Self, RingBufferError> {
        if slots < 2 || !slots.is_power_of_two() {
            return Err(RingBufferError::InvalidCapacity(slots));
        }
        Ok(Self {
            slots: (0..slots).map(|_| None).collect(),
            mask: slots - 1,
            front: 0,
            back: 0,
        })
    }

    /// Maximum number of entries held.
    pub fn capacity(&self) -> usize {
        self.mask
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.front.wrapping_sub(self.back) & self.mask
    }

    /// Whether the buffer holds nothing.
    pub fn is_empty(&self) -> bool {
        self.front == self.back
    }

    /// Whether the next push will overwrite the oldest entry.
    pub fn is_full(&self) -> bool {
        (self.front + 1) & self.mask == self.back
    }

    /// Append `item` as the newest entry, dropping the oldest when full.
    pub fn push(&mut self, item: T) {
        self.slots[self.front] = Some(item);
        self.front = (self.front + 1) & self.mask;
        if self.front == self.back {
            self.slots[self.back] = None;
            self.back = (self.back + 1) & self.mask;
        }
    }

    /// Remove and return the newest entry.
    pub fn pop_front(&mut self) -> Result<T, RingBufferError> {
        if self.is_empty() {
            return Err(RingBufferError::Empty);
        }
        self.front = (self.front + self.mask) & self.mask;
        self.slots[self.front].take().ok_or(RingBufferError::Empty)
    }

    /// Remove and return the oldest entry.
    pub fn pop_back(&mut self) -> Result<T, RingBufferError> {
        if self.is_empty() {
            return Err(RingBufferError::Empty);
        }
        let item = self.slots[self.back].take();
        self.back = (self.back + 1) & self.mask;
        item.ok_or(RingBufferError::Empty)
    }

    /// Newest entry.
    pub fn peek_front(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.slots[(self.front + self.mask) & self.mask].as_ref()
    }

    /// Oldest entry.
    pub fn peek_back(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.back].as_ref()
    }

    /// Entry `i` counting forward from the oldest (`i >= 0`) or backward
    /// from the newest (`i < 0`, `-1` is the newest).
    pub fn get(&self, i: isize) -> Option<&T> {
        let len = self.len();
        let offset = i.unsigned_abs();
        let slot = if i >= 0 {
            if offset >= len {
                return None;
            }
            (self.back + offset) & self.mask
        } else {
            if offset > len {
                return None;
            }
            (self.front + self.slots.len() - offset) & self.mask
        };
        self.slots[slot].as_ref()
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len()).filter_map(move |i| self.slots[(self.back + i) & self.mask].as_ref())
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.front = 0;
        self.back = 0;
    }
}
