//! # Application Layer

pub mod registry;

pub use registry::{AncestryRegistry, TrackerHandle};
