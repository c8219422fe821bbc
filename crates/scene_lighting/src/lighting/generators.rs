//! Per-tier GPU state generation
//!
//! One generator per lighting tier turns an ordered light list into the
//! render state bound for a drawable. The shared-buffer tier additionally
//! supports cheap revalidation of cached state, since buffer slot indices
//! are reassigned first-come-first-served every frame.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::foundation::id::LightId;
use crate::foundation::math::{Mat4, Vec4};
use crate::lighting::light_source::LightSource;
use crate::lighting::manager::LightSourceViewBound;

/// Opaque render state bound for one drawable's light set
///
/// Comparing two state sets is intentionally unsupported; they are cached
/// by the identity of the light list that produced them.
#[derive(Debug)]
pub enum StateSet {
    /// Fixed-function light unit bindings
    Ffp {
        /// First hardware light unit used
        start_unit: usize,
        /// Lights bound to consecutive units from `start_unit`
        lights: Vec<Rc<LightSource>>,
        /// Units that must be reset to an inert default when this state
        /// pops, because shaders ignore disabled light unit toggles
        disabled_units: Vec<usize>,
    },
    /// Per-drawable uniform matrix array
    PerObjectUniform {
        /// Lights packed into `matrices`, element 0 excluded (sun)
        lights: Vec<Rc<LightSource>>,
        /// Packed light matrices; element 0 is the sun
        matrices: Vec<Mat4>,
        /// Active element count, sun included
        count: i32,
    },
    /// Shared uniform buffer, slot-indexed
    SingleUbo {
        /// Buffer slot per bound light
        indices: Vec<i32>,
        /// Number of valid entries in `indices`
        count: i32,
    },
}

/// Shared handle to a cached state set
pub type StateSetRef = Rc<RefCell<StateSet>>;

/// Per-call data the generators need from the manager
pub struct GeneratorContext<'a> {
    /// First light unit / reserved slot count
    pub start_light: usize,
    /// Per-drawable light cap
    pub max_lights: usize,
    /// This frame's light id to buffer slot assignments
    pub index_map: &'a HashMap<LightId, usize>,
    /// View matrix of the current render stage
    pub view_matrix: &'a Mat4,
    /// Packed sun matrix for the current frame parity
    pub sun_buffer: &'a Mat4,
}

/// Tier-specific state generation strategy
///
/// A tagged variant rather than trait objects: the tier is fixed for the
/// manager's lifetime once capability negotiation picks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSetGenerator {
    /// Fixed-function light units
    Ffp,
    /// Per-drawable uniform matrix array
    PerObjectUniform,
    /// Shared uniform buffer
    SingleUbo,
}

impl StateSetGenerator {
    /// Produce fresh render state for an ordered, capacity-bounded list
    pub fn generate(
        &self,
        light_list: &[LightSourceViewBound],
        frame: usize,
        ctx: &GeneratorContext<'_>,
    ) -> StateSet {
        match self {
            Self::Ffp => StateSet::Ffp {
                start_unit: ctx.start_light,
                lights: light_list
                    .iter()
                    .map(|entry| Rc::clone(&entry.light))
                    .collect(),
                // Compensating records so popping this state restores the
                // remaining in-use units to an inert default.
                disabled_units: (1..light_list.len())
                    .map(|i| ctx.start_light + i)
                    .collect(),
            },
            Self::PerObjectUniform => {
                let mut matrices = Vec::with_capacity(light_list.len() + 1);
                matrices.push(view_adjusted_sun(ctx.sun_buffer, ctx.view_matrix));

                for entry in light_list {
                    let light = entry.light.light(frame);
                    let mut mat = Mat4::zeros();
                    configure_position(&mut mat, &(ctx.view_matrix * light.position));
                    configure_ambient(&mut mat, &light.ambient);
                    configure_diffuse(&mut mat, &light.diffuse);
                    configure_attenuation(
                        &mut mat,
                        light.constant_attenuation,
                        light.linear_attenuation,
                        light.quadratic_attenuation,
                        entry.light.radius(),
                    );
                    matrices.push(mat);
                }

                StateSet::PerObjectUniform {
                    lights: light_list
                        .iter()
                        .map(|entry| Rc::clone(&entry.light))
                        .collect(),
                    matrices,
                    count: light_list.len() as i32 + 1,
                }
            }
            Self::SingleUbo => {
                let mut indices = vec![0i32; ctx.max_lights];
                let mut count = 0;
                for entry in light_list {
                    if let Some(&slot) = ctx.index_map.get(&entry.light.id()) {
                        indices[count] = slot as i32;
                        count += 1;
                    }
                }
                StateSet::SingleUbo {
                    indices,
                    count: count as i32,
                }
            }
        }
    }

    /// Revalidate a cached state whose slot assignments may have shifted
    ///
    /// There is no lasting link between a light's id and the buffer slot it
    /// is assigned to, so shared-buffer state must be remapped through the
    /// current frame's index map on every cache hit.
    pub fn update(
        &self,
        state: &mut StateSet,
        light_list: &[LightSourceViewBound],
        _frame: usize,
        ctx: &GeneratorContext<'_>,
    ) {
        if let StateSet::SingleUbo { indices, count } = state {
            // The light cap can change at runtime.
            let old_count = (*count).min(ctx.max_lights as i32).max(0) as usize;
            let mut new_count = 0;
            for entry in light_list.iter().take(old_count) {
                if let Some(&slot) = ctx.index_map.get(&entry.light.id()) {
                    indices[new_count] = slot as i32;
                    new_count += 1;
                }
            }
            *count = new_count as i32;
        }
    }
}

/// Write a position into the first matrix row
pub(crate) fn configure_position(mat: &mut Mat4, pos: &Vec4) {
    mat[(0, 0)] = pos.x;
    mat[(0, 1)] = pos.y;
    mat[(0, 2)] = pos.z;
}

/// Write an ambient color into the second matrix row
pub(crate) fn configure_ambient(mat: &mut Mat4, color: &Vec4) {
    mat[(1, 0)] = color.x;
    mat[(1, 1)] = color.y;
    mat[(1, 2)] = color.z;
}

/// Write a diffuse color into the third matrix row
pub(crate) fn configure_diffuse(mat: &mut Mat4, color: &Vec4) {
    mat[(2, 0)] = color.x;
    mat[(2, 1)] = color.y;
    mat[(2, 2)] = color.z;
}

/// Write a specular color into the fourth matrix row
pub(crate) fn configure_specular(mat: &mut Mat4, color: &Vec4) {
    mat[(3, 0)] = color.x;
    mat[(3, 1)] = color.y;
    mat[(3, 2)] = color.z;
    mat[(3, 3)] = color.w;
}

/// Write attenuation factors and radius into the fourth matrix column
pub(crate) fn configure_attenuation(mat: &mut Mat4, c: f32, l: f32, q: f32, r: f32) {
    mat[(0, 3)] = c;
    mat[(1, 3)] = l;
    mat[(2, 3)] = q;
    mat[(3, 3)] = r;
}

/// Sun matrix with its position moved into view space
fn view_adjusted_sun(sun: &Mat4, view_matrix: &Mat4) -> Mat4 {
    let world_pos = Vec4::new(sun[(0, 0)], sun[(0, 1)], sun[(0, 2)], 0.0);
    let mut adjusted = *sun;
    configure_position(&mut adjusted, &(view_matrix * world_pos));
    adjusted
}
