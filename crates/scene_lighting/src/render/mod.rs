//! Render interface module
//!
//! The lighting core does not talk to a graphics API directly; it consumes
//! the narrow [`device::GraphicsDevice`] trait for capability queries and
//! uniform-block introspection.

pub mod device;

pub use device::{GraphicsDevice, ProgramHandle, UniformBlockLayout};
