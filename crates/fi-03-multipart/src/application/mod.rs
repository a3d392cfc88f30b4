//! # Application Layer
//!
//! Services wiring the domain to the ports.

pub mod publisher;
pub mod reassembler;

pub use publisher::MultipartPublisher;
pub use reassembler::MultipartReassembler;
