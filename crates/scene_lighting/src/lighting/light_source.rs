//! Dynamic light source
//!
//! A light source lives in the scene graph and owns two copies of its light
//! parameters, indexed by frame parity. The render of frame N reads copy
//! `N % 2` while the update for frame N+1 writes the other copy, so update
//! and render never tear each other's data.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::foundation::id::{LightId, LightIdAllocator};
use crate::foundation::math::Vec4;

/// Mutable light parameters, one copy per frame parity
#[derive(Debug, Clone)]
pub struct LightData {
    /// Diffuse color; may be negative for light-subtracting sources
    pub diffuse: Vec4,
    /// Ambient color
    pub ambient: Vec4,
    /// Specular color
    pub specular: Vec4,
    /// Position, world space while collected (w = 1 for point lights)
    pub position: Vec4,
    /// Constant attenuation factor
    pub constant_attenuation: f32,
    /// Linear attenuation factor
    pub linear_attenuation: f32,
    /// Quadratic attenuation factor
    pub quadratic_attenuation: f32,
}

impl Default for LightData {
    fn default() -> Self {
        Self {
            diffuse: Vec4::new(1.0, 1.0, 1.0, 1.0),
            ambient: Vec4::new(0.0, 0.0, 0.0, 1.0),
            specular: Vec4::new(0.0, 0.0, 0.0, 1.0),
            position: Vec4::new(0.0, 0.0, 0.0, 1.0),
            constant_attenuation: 1.0,
            linear_attenuation: 0.0,
            quadratic_attenuation: 0.0,
        }
    }
}

/// Scene-graph node payload for one dynamic light
///
/// Identifiers come from the injected [`LightIdAllocator`] and stay unique
/// per process, which keeps them valid as state-set cache keys.
#[derive(Debug)]
pub struct LightSource {
    id: LightId,
    radius: Cell<f32>,
    actor_fade: Cell<f32>,
    buffers: [RefCell<LightData>; 2],
}

impl LightSource {
    /// Create a light source with a fresh identifier
    pub fn new(ids: &LightIdAllocator) -> Rc<Self> {
        Rc::new(Self {
            id: ids.allocate(),
            radius: Cell::new(0.0),
            actor_fade: Cell::new(1.0),
            buffers: [
                RefCell::new(LightData::default()),
                RefCell::new(LightData::default()),
            ],
        })
    }

    /// Unique identifier of this light
    pub fn id(&self) -> LightId {
        self.id
    }

    /// Culling radius in scene units
    pub fn radius(&self) -> f32 {
        self.radius.get()
    }

    /// Set the culling radius
    pub fn set_radius(&self, radius: f32) {
        self.radius.set(radius);
    }

    /// Fade factor applied when the owning actor fades in or out
    pub fn actor_fade(&self) -> f32 {
        self.actor_fade.get()
    }

    /// Set the actor fade factor
    pub fn set_actor_fade(&self, fade: f32) {
        self.actor_fade.set(fade);
    }

    /// Light parameters for the given frame's parity
    pub fn light(&self, frame: usize) -> Ref<'_, LightData> {
        self.buffers[frame % 2].borrow()
    }

    /// Mutable light parameters for the given frame's parity
    pub fn light_mut(&self, frame: usize) -> RefMut<'_, LightData> {
        self.buffers[frame % 2].borrow_mut()
    }

    /// Overwrite both parity copies at once
    ///
    /// Used when a light's static parameters are (re)initialized outside
    /// the frame loop.
    pub fn set_light(&self, data: &LightData) {
        for buffer in &self.buffers {
            *buffer.borrow_mut() = data.clone();
        }
    }
}
