//! Cross-crate integration flows.

pub mod harness;
pub mod multipart_flow;
pub mod sync_flow;
