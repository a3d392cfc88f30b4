//! # Domain Layer
//!
//! Pure in-memory chain-tracking types.

pub mod errors;
pub mod ring_buffer;
pub mod window;

pub use errors::{ChainSyncError, RingBufferError, WindowError};
pub use ring_buffer::BlockRingBuffer;
pub use window::{BlockPlacement, RecentBlockWindow, DEFAULT_WINDOW_SLOTS};
