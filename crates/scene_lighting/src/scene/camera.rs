//! Camera handles
//!
//! The lighting manager caches view-space bounds per camera. It holds the
//! cameras weakly; scene code owns them through `Rc`.

use std::rc::Rc;

/// Name identifying the reflection render-to-texture camera
///
/// Distance fade is skipped for this camera so the water reflection does
/// not flicker out of sync with the main view.
pub const REFLECTION_CAMERA_NAME: &str = "ReflectionCamera";

/// A named camera
#[derive(Debug)]
pub struct Camera {
    name: String,
}

impl Camera {
    /// Create a camera handle
    pub fn new(name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self { name: name.into() })
    }

    /// Camera name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the reflection pass camera
    pub fn is_reflection(&self) -> bool {
        self.name == REFLECTION_CAMERA_NAME
    }
}
