//! Cull traversal context
//!
//! Carries the per-camera state a cull pass accumulates while walking the
//! graph: the model-view matrix stack, the view-frustum culling stack, the
//! render state stack, and the owning light manager once the traversal has
//! entered its subgraph.

use std::cell::RefCell;
use std::rc::Rc;

use crate::foundation::math::{BoundingSphere, Mat4, Plane};
use crate::lighting::generators::StateSetRef;
use crate::lighting::manager::LightManager;
use crate::scene::camera::Camera;
use crate::scene::TraversalMask;

/// Convex culling volume in view space
#[derive(Debug, Clone, Default)]
pub struct CullingVolume {
    planes: Vec<Plane>,
}

impl CullingVolume {
    /// Volume bounded by the given view-space planes
    ///
    /// Plane normals point into the volume.
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    /// Unbounded volume that culls nothing
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Whether the sphere lies fully outside the volume
    pub fn is_culled(&self, sphere: &BoundingSphere) -> bool {
        if !sphere.valid() {
            return true;
        }
        self.planes
            .iter()
            .any(|plane| plane.distance_to_point(sphere.center) < -sphere.radius)
    }
}

/// Traversal context for one camera's cull pass
pub struct CullVisitor {
    camera: Rc<Camera>,
    traversal_number: usize,
    traversal_mask: TraversalMask,
    initial_view_matrix: Mat4,
    model_view_stack: Vec<Mat4>,
    culling_stack: Vec<CullingVolume>,
    state_stack: Vec<StateSetRef>,
    drawable_states: Vec<Option<StateSetRef>>,
    light_manager: Option<Rc<RefCell<LightManager>>>,
}

impl CullVisitor {
    /// Start a cull pass for `camera` at the given frame number
    ///
    /// `view_matrix` must be the render stage's initial view matrix, not a
    /// matrix relative to another camera.
    pub fn new(camera: Rc<Camera>, view_matrix: Mat4, traversal_number: usize) -> Self {
        Self {
            camera,
            traversal_number,
            traversal_mask: TraversalMask::default(),
            initial_view_matrix: view_matrix,
            model_view_stack: vec![view_matrix],
            culling_stack: vec![CullingVolume::unbounded()],
            state_stack: Vec::new(),
            drawable_states: Vec::new(),
            light_manager: None,
        }
    }

    /// Camera driving this pass
    pub fn camera(&self) -> &Rc<Camera> {
        &self.camera
    }

    /// Frame number of this traversal
    pub fn traversal_number(&self) -> usize {
        self.traversal_number
    }

    /// Active traversal mask
    pub fn traversal_mask(&self) -> TraversalMask {
        self.traversal_mask
    }

    /// Restrict the traversal mask
    pub fn set_traversal_mask(&mut self, mask: TraversalMask) {
        self.traversal_mask = mask;
    }

    /// The camera's view matrix, unaffected by model transforms
    pub fn initial_view_matrix(&self) -> &Mat4 {
        &self.initial_view_matrix
    }

    /// Current composed model-view matrix
    pub fn model_view(&self) -> &Mat4 {
        self.model_view_stack
            .last()
            .unwrap_or(&self.initial_view_matrix)
    }

    /// Enter a transform node
    pub fn push_model_view(&mut self, matrix: &Mat4) {
        let composed = self.model_view() * matrix;
        self.model_view_stack.push(composed);
    }

    /// Leave a transform node
    pub fn pop_model_view(&mut self) {
        self.model_view_stack.pop();
    }

    /// Push a view-space culling volume for a subtree
    pub fn push_culling_volume(&mut self, volume: CullingVolume) {
        self.culling_stack.push(volume);
    }

    /// Pop the innermost culling volume
    pub fn pop_culling_volume(&mut self) {
        if self.culling_stack.len() > 1 {
            self.culling_stack.pop();
        }
    }

    /// Test a view-space sphere against every culling volume on the stack
    ///
    /// The stack base is unbounded; the camera frustum and any tighter
    /// subtree volumes arrive via [`Self::push_culling_volume`], and a
    /// sphere is culled as soon as any of them fully excludes it.
    pub fn is_culled(&self, sphere: &BoundingSphere) -> bool {
        self.culling_stack
            .iter()
            .any(|volume| volume.is_culled(sphere))
    }

    /// Scope a render state to the current subtree
    pub fn push_state_set(&mut self, state: StateSetRef) {
        self.state_stack.push(state);
    }

    /// Unscope the innermost render state
    pub fn pop_state_set(&mut self) {
        self.state_stack.pop();
    }

    /// Innermost active render state, if any
    pub fn current_state(&self) -> Option<&StateSetRef> {
        self.state_stack.last()
    }

    /// Record a render command for a drawable under the current state
    ///
    /// Stands in for attaching the state to the drawable's draw call.
    pub fn record_drawable(&mut self) {
        self.drawable_states.push(self.state_stack.last().cloned());
    }

    /// States recorded per drawable, in traversal order
    pub fn drawable_states(&self) -> &[Option<StateSetRef>] {
        &self.drawable_states
    }

    /// Light manager owning the current subtree, if inside one
    pub fn light_manager(&self) -> Option<&Rc<RefCell<LightManager>>> {
        self.light_manager.as_ref()
    }

    /// Enter a light manager's subtree; returns the previous manager
    pub fn set_light_manager(
        &mut self,
        manager: Option<Rc<RefCell<LightManager>>>,
    ) -> Option<Rc<RefCell<LightManager>>> {
        std::mem::replace(&mut self.light_manager, manager)
    }
}
