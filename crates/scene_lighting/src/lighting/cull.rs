//! Cull-time light state assignment
//!
//! Two callbacks hook into the cull traversal: [`ManagerCullCallback`] on
//! the light root stages per-frame resources once per frame, and
//! [`LightListCallback`] on individual drawables intersects the node's
//! bound with the frame's lights and pushes the matching cached state set.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::foundation::id::LightId;
use crate::foundation::math::BoundingSphere;
use crate::lighting::manager::{LightManager, LightSourceViewBound};
use crate::scene::cull::CullVisitor;

/// Illumination bias favoring large-radius lights in the proximity sort
const RADIUS_BIAS: f32 = 81.0;

/// Per-drawable callback resolving the node's affecting light list
///
/// Holds the resolved manager handle and the last computed list so repeated
/// cull visits within one frame (multiple cameras) reuse the intersection
/// work and hit the same state-set cache entries.
#[derive(Default)]
pub struct LightListCallback {
    manager: Option<Rc<RefCell<LightManager>>>,
    last_frame_number: Option<usize>,
    light_list: Vec<LightSourceViewBound>,
    ignored: HashSet<LightId>,
}

impl LightListCallback {
    /// Create a callback with no lights ignored
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude a light from this node's lists (e.g. a torch carried by the
    /// node itself)
    pub fn ignore(&mut self, id: LightId) {
        self.ignored.insert(id);
    }

    /// Stop excluding a light
    pub fn unignore(&mut self, id: LightId) {
        self.ignored.remove(&id);
    }

    /// Lights the last traversal assigned to this node
    pub fn light_list(&self) -> &[LightSourceViewBound] {
        &self.light_list
    }

    /// Intersect the node's bound with the frame's lights and push state
    ///
    /// Returns whether a state set was pushed; the traversal must pop it
    /// after visiting the subtree. Returns `false` without touching the
    /// visitor when no manager is reachable, the traversal mask excludes
    /// lighting, or no light overlaps the node.
    pub fn push_light_state(
        &mut self,
        node_bound: &BoundingSphere,
        cv: &mut CullVisitor,
    ) -> bool {
        if self.manager.is_none() {
            self.manager = cv.light_manager().cloned();
        }
        let Some(manager) = self.manager.clone() else {
            return false;
        };

        let mut manager = manager.borrow_mut();
        if (manager.lighting_mask() & cv.traversal_mask()).is_empty() {
            return false;
        }

        let frame = cv.traversal_number();
        if self.last_frame_number != Some(frame) {
            self.last_frame_number = Some(frame);

            let mut bound = *node_bound;
            crate::foundation::math::transform_bounding_sphere(cv.model_view(), &mut bound);

            let camera = Rc::clone(cv.camera());
            let in_view =
                manager.lights_in_view_space(&camera, cv.initial_view_matrix(), frame);

            self.light_list.clear();
            for entry in in_view {
                if self.ignored.contains(&entry.light.id()) {
                    continue;
                }
                if entry.view_bound.intersects(&bound) {
                    self.light_list.push(entry.clone());
                }
            }
        }

        if self.light_list.is_empty() {
            return false;
        }

        let budget = manager.max_lights() - manager.start_light();
        let state = if self.light_list.len() > budget {
            let mut culled = self.light_list.clone();

            // Give frustum culling a chance before the proximity sort: a
            // light touching the node but far outside the view cone loses
            // its slot first.
            let mut i = 0;
            while i < culled.len() && culled.len() > budget {
                let mut extended = culled[i].view_bound;
                extended.radius *= 2.0;
                if cv.is_culled(&extended) {
                    culled.remove(i);
                } else {
                    i += 1;
                }
            }

            culled.sort_by(|left, right| {
                let illumination = |bound: &LightSourceViewBound| {
                    bound.view_bound.center.norm_squared()
                        - bound.view_bound.radius2() * RADIUS_BIAS
                };
                illumination(left).total_cmp(&illumination(right))
            });
            culled.truncate(budget);

            manager.light_list_state_set(&culled, frame, cv.initial_view_matrix())
        } else {
            manager.light_list_state_set(&self.light_list, frame, cv.initial_view_matrix())
        };
        drop(manager);

        cv.push_state_set(state);
        true
    }
}

/// Light-root callback staging per-frame lighting resources
///
/// Runs once per cull visit of the root. Frame-gated work (layout polling,
/// sun staging) happens on the first camera of the frame; the sun's
/// view-space transform runs for every camera, since each applies its own
/// view matrix.
#[derive(Default)]
pub struct ManagerCullCallback {
    last_frame_number: Option<usize>,
}

impl ManagerCullCallback {
    /// Create a callback that has not seen any frame yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage frame resources and the camera's sun transform
    pub fn stage(&mut self, manager: &mut LightManager, cv: &CullVisitor) {
        let frame = cv.traversal_number();
        if self.last_frame_number != Some(frame) {
            self.last_frame_number = Some(frame);

            manager.ensure_buffer_layout();
            manager.stage_sunlight(frame);
        }

        manager.upload_sun(frame, cv.initial_view_matrix());
    }
}
