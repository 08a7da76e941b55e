//! Domain types and pure logic for the renderbox generation service.
//!
//! Holds the ComfyUI workflow graph model, the template store with node
//! role discovery, and per-request parameter injection. Nothing in this
//! crate performs I/O beyond the initial template read.

pub mod error;
pub mod template;
pub mod workflow;
