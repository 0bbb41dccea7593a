//! Render Graph System
//!
//! Passes declare the images they read and write; the graph derives the ordering
//! constraints from those declarations and produces an execution order. Recording and
//! barrier emission are left to the caller.

pub mod graph;
pub mod pass;
pub mod resource;

pub use graph::*;
pub use pass::*;
pub use resource::*;
