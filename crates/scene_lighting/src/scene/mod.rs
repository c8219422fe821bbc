//! Scene module - traversal surface the lighting core plugs into
//!
//! This is the thin collaborator layer: cameras, traversal masks, a node
//! arena with update/cull traversals, and the cull-visitor context. It is
//! deliberately minimal; the lighting subsystem is the consumer, not a
//! general scene-graph framework.

pub mod camera;
pub mod cull;
pub mod graph;

pub use camera::{Camera, REFLECTION_CAMERA_NAME};
pub use cull::{CullVisitor, CullingVolume};
pub use graph::{NodeKey, SceneGraph};

bitflags::bitflags! {
    /// Bit mask deciding which traversals visit a node
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TraversalMask: u32 {
        /// Regular scene rendering
        const SCENE = 1;
        /// Lighting collection and state assignment
        const LIGHTING = 1 << 1;
        /// Reflection / render-to-texture passes
        const REFLECTION = 1 << 2;
    }
}

impl Default for TraversalMask {
    fn default() -> Self {
        Self::all()
    }
}
