//! # Recent Block Window
//!
//! The last few indexed block headers, used only to decide whether an
//! incoming block continues the tip, leaves a gap, or lands at or behind
//! the tip. Storage stays authoritative; the window is rebuilt from the
//! newest stored block at start-up.

use super::errors::{RingBufferError, WindowError};
use super::ring_buffer::BlockRingBuffer;
use shared_types::BlockHeader;

/// Default slot count (255 usable entries).
pub const DEFAULT_WINDOW_SLOTS: usize = 256;

/// How an incoming block relates to the window tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockPlacement {
    /// Parent is the tip.
    Continuation,
    /// Heights `from..=to` are missing before the incoming block.
    Gap {
        /// First missing height.
        from: u64,
        /// Last missing height.
        to: u64,
    },
    /// At or behind the tip, or ahead by one with a different parent.
    Behind,
    /// The window is empty.
    Unanchored,
}

/// Contiguous run of recently indexed headers.
#[derive(Debug, Clone)]
pub struct RecentBlockWindow {
    buffer: BlockRingBuffer<BlockHeader>,
}

impl RecentBlockWindow {
    /// Create an empty window with `slots` slots.
    pub fn new(slots: usize) -> Result<Self, WindowError> {
        Ok(Self {
            buffer: BlockRingBuffer::with_slots(slots)?,
        })
    }

    /// Newest header.
    pub fn tip(&self) -> Option<&BlockHeader> {
        self.buffer.peek_front()
    }

    /// Oldest header still held.
    pub fn oldest(&self) -> Option<&BlockHeader> {
        self.buffer.peek_back()
    }

    /// Header `i` (see [`BlockRingBuffer::get`]).
    pub fn get(&self, i: isize) -> Option<&BlockHeader> {
        self.buffer.get(i)
    }

    /// Number of headers held.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Classify an incoming header against the tip.
    pub fn classify(&self, header: &BlockHeader) -> BlockPlacement {
        let Some(tip) = self.tip() else {
            return BlockPlacement::Unanchored;
        };
        if header.previous_hash == tip.hash && header.height == tip.height + 1 {
            BlockPlacement::Continuation
        } else if header.height > tip.height + 1 {
            BlockPlacement::Gap {
                from: tip.height + 1,
                to: header.height - 1,
            }
        } else {
            BlockPlacement::Behind
        }
    }

    /// Append a header directly above the tip.
    pub fn push(&mut self, header: BlockHeader) -> Result<(), WindowError> {
        if let Some(tip) = self.tip() {
            if header.height != tip.height + 1 {
                return Err(WindowError::NotContiguous {
                    tip: tip.height,
                    got: header.height,
                });
            }
        }
        self.buffer.push(header);
        Ok(())
    }

    /// Remove the tip.
    pub fn pop_tip(&mut self) -> Result<BlockHeader, RingBufferError> {
        self.buffer.pop_front()
    }

    /// Replace the contents with a single anchor header.
    pub fn seed(&mut self, header: BlockHeader) {
        self.buffer.clear();
        self.buffer.push(header);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(height: u64, hash: &str, prev: &str) -> BlockHeader {
        BlockHeader {
            height,
            hash: hash.into(),
            previous_hash: prev.into(),
            timestamp: height * 40,
        }
    }

    #[test]
    fn test_classify() {
        let mut window = RecentBlockWindow::new(8).unwrap();
        assert_eq!(window.classify(&header(1, "a", "")), BlockPlacement::Unanchored);

        window.seed(header(10, "h10", "h9"));
        assert_eq!(
            window.classify(&header(11, "h11", "h10")),
            BlockPlacement::Continuation
        );
        assert_eq!(
            window.classify(&header(15, "h15", "h14")),
            BlockPlacement::Gap { from: 11, to: 14 }
        );
        assert_eq!(window.classify(&header(10, "x10", "h9")), BlockPlacement::Behind);
        assert_eq!(window.classify(&header(11, "x11", "x10")), BlockPlacement::Behind);
    }

    #[test]
    fn test_push_requires_contiguity() {
        let mut window = RecentBlockWindow::new(8).unwrap();
        window.push(header(5, "h5", "h4")).unwrap();
        assert_eq!(
            window.push(header(7, "h7", "h6")),
            Err(WindowError::NotContiguous { tip: 5, got: 7 })
        );
        window.push(header(6, "h6", "h5")).unwrap();
        assert_eq!(window.tip().map(|h| h.height), Some(6));
        assert_eq!(window.oldest().map(|h| h.height), Some(5));
    }

    #[test]
    fn test_pop_until_empty() {
        let mut window = RecentBlockWindow::new(4).unwrap();
        window.seed(header(1, "h1", "h0"));
        assert_eq!(window.pop_tip().unwrap().height, 1);
        assert_eq!(window.pop_tip(), Err(RingBufferError::Empty));
    }
}
