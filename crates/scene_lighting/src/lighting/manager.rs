//! Per-scene dynamic light manager
//!
//! Collects visible lights every frame, computes per-camera view-space
//! bounds, and produces cached GPU state for the set of lights affecting a
//! drawable. Caches and GPU buffers are double-buffered by frame parity so
//! rendering frame N can proceed while frame N+1 is being collected.

use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::Once;

use crate::config::LightingSettings;
use crate::foundation::id::LightId;
use crate::foundation::math::{transform_bounding_sphere, BoundingSphere, Mat4, Vec3, Vec4};
use crate::lighting::buffer::{LightBuffer, MAX_UBO_BYTES};
use crate::lighting::generators::{
    configure_ambient, configure_diffuse, configure_position, configure_specular,
    GeneratorContext, StateSet, StateSetGenerator, StateSetRef,
};
use crate::lighting::light_source::{LightData, LightSource};
use crate::render::device::{probe_shader_source, GraphicsDevice, ProgramHandle};
use crate::scene::camera::Camera;
use crate::scene::TraversalMask;

/// Smallest configurable per-drawable light cap
pub const MAX_LIGHTS_LOWER_LIMIT: usize = 2;
/// Largest configurable per-drawable light cap
pub const MAX_LIGHTS_UPPER_LIMIT: usize = 64;
/// Light cap in fixed-function mode (hardware light unit count)
pub const FFP_MAX_LIGHTS: usize = 8;

/// State-set cache size that triggers wholesale orphan cleanup
const STATE_SET_CACHE_LIMIT: usize = 5000;

/// GPU lighting tier, fixed for the manager's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightingMethod {
    /// Fixed-function hardware light units
    Ffp,
    /// Per-drawable uniform matrix array
    PerObjectUniform,
    /// One shared uniform buffer for the whole scene
    SingleUbo,
}

impl LightingMethod {
    /// Parse a settings string; `None` for unknown values
    pub fn from_setting(value: &str) -> Option<Self> {
        match value {
            "legacy" => Some(Self::Ffp),
            "shaders compatibility" => Some(Self::PerObjectUniform),
            "shaders" => Some(Self::SingleUbo),
            _ => None,
        }
    }

    /// Settings string for this method
    pub fn as_setting(self) -> &'static str {
        match self {
            Self::Ffp => "legacy",
            Self::PerObjectUniform => "shaders compatibility",
            Self::SingleUbo => "shaders",
        }
    }
}

/// A collected light with its world transform for the current frame
///
/// Rebuilt from scratch every frame; holds no state across frames.
#[derive(Debug, Clone)]
pub struct LightSourceTransform {
    /// The collected light
    pub light: Rc<LightSource>,
    /// World transform resolved during collection
    pub world_matrix: Mat4,
}

/// A light's bounding sphere in one camera's view space
#[derive(Debug, Clone)]
pub struct LightSourceViewBound {
    /// The bounded light
    pub light: Rc<LightSource>,
    /// Bounding sphere in the camera's view space
    pub view_bound: BoundingSphere,
}

struct ViewBoundCacheEntry {
    /// Weak so a cache entry never keeps a destroyed camera alive.
    camera: Weak<Camera>,
    bounds: Vec<LightSourceViewBound>,
}

/// Per-scene dynamic light manager
///
/// Owns the per-frame light list, the per-camera view-bound cache, the
/// state-set caches, and (in the shared-buffer tier) both GPU buffer
/// generations. Light sources themselves are owned by the scene graph.
pub struct LightManager {
    device: Rc<dyn GraphicsDevice>,
    method: LightingMethod,
    generator: StateSetGenerator,
    supported: [bool; 3],

    max_lights: usize,
    start_light: usize,
    lighting_mask: TraversalMask,
    ffp_default_disabled: Vec<usize>,

    lights: Vec<LightSourceTransform>,
    view_bound_cache: HashMap<usize, ViewBoundCacheEntry>,
    state_set_cache: [HashMap<u64, StateSetRef>; 2],
    light_index_map: [HashMap<LightId, usize>; 2],

    light_buffers: Option<[LightBuffer; 2]>,
    probe_program: Option<ProgramHandle>,
    layout_initialized: bool,

    sun: Option<Rc<RefCell<LightData>>>,
    sun_buffer: [Mat4; 2],

    point_light_radius_multiplier: f32,
    point_light_fade_end: f32,
    point_light_fade_start: f32,
}

impl LightManager {
    /// Create a manager, negotiating the lighting tier
    ///
    /// Order of precedence: an explicit `force_ffp` request, then driver
    /// capability shortfall (which downgrades the shared-buffer tier to
    /// per-object uniforms), then the configured preference. Unknown
    /// lighting-method strings fall back to per-object uniforms.
    pub fn new(
        device: Rc<dyn GraphicsDevice>,
        settings: &LightingSettings,
        force_ffp: bool,
    ) -> Self {
        let supports_ubo = device.supports_uniform_buffer_objects();
        let supports_gpu4 = device.supports_gpu_shader4();

        let mut manager = Self {
            device,
            method: LightingMethod::Ffp,
            generator: StateSetGenerator::Ffp,
            supported: [true, true, supports_ubo && supports_gpu4],
            max_lights: FFP_MAX_LIGHTS,
            start_light: 0,
            lighting_mask: TraversalMask::default(),
            ffp_default_disabled: Vec::new(),
            lights: Vec::new(),
            view_bound_cache: HashMap::new(),
            state_set_cache: [HashMap::new(), HashMap::new()],
            light_index_map: [HashMap::new(), HashMap::new()],
            light_buffers: None,
            probe_program: None,
            layout_initialized: false,
            sun: None,
            sun_buffer: [Mat4::zeros(), Mat4::zeros()],
            point_light_radius_multiplier: 1.0,
            point_light_fade_end: 0.0,
            point_light_fade_start: 0.0,
        };

        if force_ffp {
            manager.init_ffp(FFP_MAX_LIGHTS);
            return manager;
        }

        let requested = LightingMethod::from_setting(&settings.lighting_method)
            .unwrap_or_else(|| {
                log::warn!(
                    "Unknown lighting method '{}', falling back to '{}'",
                    settings.lighting_method,
                    LightingMethod::PerObjectUniform.as_setting()
                );
                LightingMethod::PerObjectUniform
            });

        if requested == LightingMethod::SingleUbo && (!supports_ubo || !supports_gpu4) {
            static CAPABILITY_WARNING: Once = Once::new();
            CAPABILITY_WARNING.call_once(|| {
                if !supports_ubo {
                    log::warn!(
                        "Uniform buffer objects not supported: switching to shader compatibility lighting mode"
                    );
                }
                if !supports_gpu4 {
                    log::warn!(
                        "Extended GPU shader feature set not supported: switching to shader compatibility lighting mode"
                    );
                }
            });
        }

        let target = clamp_max_lights(settings.max_lights);

        match requested {
            LightingMethod::Ffp => manager.init_ffp(FFP_MAX_LIGHTS),
            LightingMethod::SingleUbo if supports_ubo && supports_gpu4 => {
                manager.init_single_ubo(target);
            }
            _ => manager.init_per_object_uniform(target),
        }

        manager.update_settings(settings);
        manager
    }

    fn init_ffp(&mut self, target_lights: usize) {
        self.method = LightingMethod::Ffp;
        self.generator = StateSetGenerator::Ffp;
        self.max_lights = target_lights;
    }

    fn init_per_object_uniform(&mut self, target_lights: usize) {
        self.method = LightingMethod::PerObjectUniform;
        self.generator = StateSetGenerator::PerObjectUniform;
        self.max_lights = target_lights;
    }

    fn init_single_ubo(&mut self, target_lights: usize) {
        self.method = LightingMethod::SingleUbo;
        self.generator = StateSetGenerator::SingleUbo;
        self.max_lights = target_lights;

        let capacity = Self::max_lights_in_scene();
        self.light_buffers = Some([LightBuffer::new(capacity), LightBuffer::new(capacity)]);
        self.probe_program = Some(
            self.device
                .compile_program(&probe_shader_source(capacity)),
        );
    }

    /// Active lighting tier
    pub fn lighting_method(&self) -> LightingMethod {
        self.method
    }

    /// Whether the fixed-function tier is active
    pub fn uses_ffp(&self) -> bool {
        self.method == LightingMethod::Ffp
    }

    /// Whether a tier is supported by the driver
    pub fn is_supported(&self, method: LightingMethod) -> bool {
        self.supported[method as usize]
    }

    /// Per-drawable light cap
    pub fn max_lights(&self) -> usize {
        self.max_lights
    }

    /// Largest number of lights the shared scene buffer can hold
    ///
    /// Bounded by the smallest uniform block size the tier relies on.
    pub const fn max_lights_in_scene() -> usize {
        MAX_UBO_BYTES / LightBuffer::query_block_size(1)
    }

    /// First light unit / number of reserved leading slots
    pub fn start_light(&self) -> usize {
        self.start_light
    }

    /// Reserve leading light units
    ///
    /// In fixed-function mode the reserved-and-beyond units also get inert
    /// default records: shaders do not respect disabled light units, so a
    /// unit left untouched would keep stale data visible.
    pub fn set_start_light(&mut self, start: usize) {
        self.start_light = start;

        if !self.uses_ffp() {
            return;
        }
        self.ffp_default_disabled = (start..self.max_lights).collect();
    }

    /// Light units holding inert defaults in fixed-function mode
    pub fn ffp_default_disabled(&self) -> &[usize] {
        &self.ffp_default_disabled
    }

    /// Mask deciding which cull traversals receive light state
    pub fn lighting_mask(&self) -> TraversalMask {
        self.lighting_mask
    }

    /// Restrict lighting to matching traversals
    pub fn set_lighting_mask(&mut self, mask: TraversalMask) {
        self.lighting_mask = mask;
    }

    /// Re-read the tunable settings, clamping to engine limits
    pub fn update_settings(&mut self, settings: &LightingSettings) {
        if self.uses_ffp() {
            return;
        }

        self.point_light_radius_multiplier = settings.light_bounds_multiplier.clamp(0.0, 5.0);

        self.point_light_fade_end = settings.maximum_light_distance.max(0.0);
        if self.point_light_fade_end > 0.0 {
            self.point_light_fade_start =
                self.point_light_fade_end * settings.light_fade_start.clamp(0.0, 1.0);
        }
    }

    /// Apply a changed light cap at runtime
    ///
    /// Shrinks every cached state set in both generations so no entry keeps
    /// slot indices or matrix elements beyond the new cap, then drops the
    /// caches entirely.
    pub fn update_max_lights(&mut self, settings: &LightingSettings) {
        if self.uses_ffp() {
            return;
        }

        let target = clamp_max_lights(settings.max_lights);
        self.max_lights = target;

        for cache in &mut self.state_set_cache {
            for state in cache.values() {
                match &mut *state.borrow_mut() {
                    StateSet::PerObjectUniform {
                        lights,
                        matrices,
                        count,
                    } => {
                        lights.truncate(target);
                        matrices.truncate(target + 1);
                        *count = (*count).min(target as i32 + 1);
                    }
                    StateSet::SingleUbo { indices, count } => {
                        *count = (*count).min(target as i32);
                        indices.truncate(target);
                    }
                    StateSet::Ffp { .. } => {}
                }
            }
            cache.clear();
        }
    }

    /// Frame boundary reset
    ///
    /// Must run exactly once before any collection for the frame. Clears
    /// the frame's slot assignments, the collected list, and the view-bound
    /// cache for every camera (dropping entries whose camera died), and
    /// wholesale-clears a state-set cache generation that has grown past
    /// the orphan threshold.
    pub fn update(&mut self, frame: usize) {
        self.light_index_map[frame % 2].clear();
        self.lights.clear();
        self.view_bound_cache.clear();

        for cache in &mut self.state_set_cache {
            if cache.len() > STATE_SET_CACHE_LIMIT {
                cache.clear();
            }
        }
    }

    /// Register a light as visible this frame
    ///
    /// Writes the resolved world position into the light's parity copy.
    /// Multiple registrations of the same light in one frame (instancing)
    /// are allowed and deliberately not deduplicated here.
    pub fn add_light(&mut self, light: &Rc<LightSource>, world_matrix: Mat4, frame: usize) {
        let pos = Vec3::new(world_matrix.m14, world_matrix.m24, world_matrix.m34);
        light.light_mut(frame).position = Vec4::new(pos.x, pos.y, pos.z, 1.0);

        self.lights.push(LightSourceTransform {
            light: Rc::clone(light),
            world_matrix,
        });
    }

    /// Lights collected so far this frame
    pub fn lights(&self) -> &[LightSourceTransform] {
        &self.lights
    }

    /// Set the sun light (ignored in fixed-function mode)
    pub fn set_sunlight(&mut self, sun: Option<Rc<RefCell<LightData>>>) {
        if self.uses_ffp() {
            return;
        }
        self.sun = sun;
    }

    /// View-space bounds of all registered lights for one camera
    ///
    /// Cached per (camera, frame); the per-frame reset drops all entries.
    /// Applies distance fade by scaling the parity copy's diffuse color (a
    /// deliberate side effect, so fully faded lights simply vanish from the
    /// result), skipping the reflection camera to avoid flicker mismatches
    /// between passes. In the shared-buffer tier an oversized result is
    /// partially sorted by proximity (slot 0 reserved for the sun) and
    /// truncated to scene capacity.
    pub fn lights_in_view_space(
        &mut self,
        camera: &Rc<Camera>,
        view_matrix: &Mat4,
        frame: usize,
    ) -> &[LightSourceViewBound] {
        let key = Rc::as_ptr(camera) as usize;

        // An allocator may hand a new camera the address of a dead one
        // within a single frame; the weak reference catches that.
        let fresh = self.view_bound_cache.get(&key).is_some_and(|entry| {
            entry
                .camera
                .upgrade()
                .is_some_and(|cached| Rc::ptr_eq(&cached, camera))
        });

        if !fresh {
            let bounds = self.collect_view_bounds(camera, view_matrix, frame);
            self.view_bound_cache.insert(
                key,
                ViewBoundCacheEntry {
                    camera: Rc::downgrade(camera),
                    bounds,
                },
            );
        }

        let capacity = Self::max_lights_in_scene();
        let single_ubo = self.method == LightingMethod::SingleUbo;
        let Some(entry) = self.view_bound_cache.get_mut(&key) else {
            return &[];
        };

        if single_ubo && entry.bounds.len() > capacity - 1 {
            // Slot 0 is the sun; it never competes for capacity.
            entry.bounds[1..].sort_by(|left, right| {
                let proximity = |bound: &LightSourceViewBound| {
                    bound.view_bound.center.norm_squared() - bound.view_bound.radius2()
                };
                proximity(left).total_cmp(&proximity(right))
            });
            entry.bounds.truncate(capacity - 1);
        }

        &entry.bounds
    }

    fn collect_view_bounds(
        &self,
        camera: &Rc<Camera>,
        view_matrix: &Mat4,
        frame: usize,
    ) -> Vec<LightSourceViewBound> {
        let fade_end = self.point_light_fade_end;
        let fade_start = self.point_light_fade_start;
        let apply_fade = !camera.is_reflection() && fade_end != 0.0;

        let mut bounds = Vec::with_capacity(self.lights.len());
        for transform in &self.lights {
            let world_view = view_matrix * transform.world_matrix;
            let radius = transform.light.radius();

            let mut view_bound = BoundingSphere::new(
                Vec3::zeros(),
                radius * self.point_light_radius_multiplier,
            );
            transform_bounding_sphere(&world_view, &mut view_bound);

            if apply_fade {
                let fade_delta = fade_end - fade_start;
                let fade =
                    1.0 - ((view_bound.center.norm() - fade_start) / fade_delta).clamp(0.0, 1.0);
                if fade == 0.0 {
                    continue;
                }

                transform.light.light_mut(frame).diffuse *= fade;
            }

            bounds.push(LightSourceViewBound {
                light: Rc::clone(&transform.light),
                view_bound,
            });
        }
        bounds
    }

    /// Cached or freshly generated render state for an ordered light list
    ///
    /// The cache key is an order-dependent hash of the light identifiers:
    /// two permutations of the same set are cached separately. That is kept
    /// as-is; fixed-function state is order-sensitive, and the cost is only
    /// a few redundant cache entries. In the shared-buffer tier any light
    /// not yet assigned a slot this frame gets the next free one and its
    /// packed data written into the active buffer generation.
    pub fn light_list_state_set(
        &mut self,
        light_list: &[LightSourceViewBound],
        frame: usize,
        view_matrix: &Mat4,
    ) -> StateSetRef {
        let parity = frame % 2;

        let mut hasher = DefaultHasher::new();
        for entry in light_list {
            let id = entry.light.id();
            id.hash(&mut hasher);

            if self.method != LightingMethod::SingleUbo
                || self.light_index_map[parity].contains_key(&id)
            {
                continue;
            }

            // Slot 0 is reserved for the sun.
            let slot = self.light_index_map[parity].len() + 1;
            self.update_gpu_point_light(slot, &entry.light, frame, view_matrix);
            self.light_index_map[parity].insert(id, slot);
        }
        let hash = hasher.finish();

        let ctx = GeneratorContext {
            start_light: self.start_light,
            max_lights: self.max_lights,
            index_map: &self.light_index_map[parity],
            view_matrix,
            sun_buffer: &self.sun_buffer[parity],
        };

        if let Some(state) = self.state_set_cache[parity].get(&hash) {
            self.generator
                .update(&mut state.borrow_mut(), light_list, frame, &ctx);
            return Rc::clone(state);
        }

        let state = Rc::new(RefCell::new(self.generator.generate(light_list, frame, &ctx)));
        self.state_set_cache[parity].insert(hash, Rc::clone(&state));
        state
    }

    /// This frame's light id to buffer slot assignments
    pub fn light_index_map(&self, frame: usize) -> &HashMap<LightId, usize> {
        &self.light_index_map[frame % 2]
    }

    /// The packed GPU buffer for a frame's parity, if the tier has one
    pub fn light_buffer(&self, frame: usize) -> Option<&LightBuffer> {
        self.light_buffers
            .as_ref()
            .map(|buffers| &buffers[frame % 2])
    }

    /// Adopt the driver-reported buffer layout once the probe compiled
    ///
    /// Polled each frame; does nothing until the probe program reports at
    /// least one active uniform block, then reconfigures both buffer
    /// generations exactly once.
    pub fn ensure_buffer_layout(&mut self) {
        if self.layout_initialized || self.method != LightingMethod::SingleUbo {
            return;
        }
        let Some(program) = self.probe_program else {
            return;
        };
        if self.device.active_uniform_blocks(program) == 0 {
            return;
        }

        let layout = self.device.light_block_layout(program);
        if let Some(buffers) = &mut self.light_buffers {
            for buffer in buffers.iter_mut() {
                buffer.configure_layout(
                    layout.offset_colors,
                    layout.offset_position,
                    layout.offset_attenuation_radius,
                    layout.total_size,
                    layout.array_stride,
                );
            }
        }
        self.layout_initialized = true;
    }

    /// Stage the sun into the frame's parity resources
    ///
    /// The position transform to view space is deferred so every camera of
    /// the frame (main, reflection) applies its own view matrix.
    pub fn stage_sunlight(&mut self, frame: usize) {
        let Some(sun) = &self.sun else {
            return;
        };
        let sun = sun.borrow();
        let parity = frame % 2;

        match self.method {
            LightingMethod::PerObjectUniform => {
                let mut mat = Mat4::zeros();
                configure_position(&mut mat, &sun.position);
                configure_ambient(&mut mat, &sun.ambient);
                configure_diffuse(&mut mat, &sun.diffuse);
                configure_specular(&mut mat, &sun.specular);
                self.sun_buffer[parity] = mat;
            }
            LightingMethod::SingleUbo => {
                if let Some(buffers) = &mut self.light_buffers {
                    let buffer = &mut buffers[parity];
                    buffer.set_cached_sun_pos(sun.position);
                    buffer.set_ambient(0, &sun.ambient);
                    buffer.set_diffuse(0, &sun.diffuse);
                    buffer.set_specular(0, &sun.specular);
                }
            }
            LightingMethod::Ffp => {}
        }
    }

    /// Finish the sun's late view-space transform for one camera
    pub fn upload_sun(&mut self, frame: usize, view_matrix: &Mat4) {
        if self.method != LightingMethod::SingleUbo {
            return;
        }
        if let Some(buffers) = &mut self.light_buffers {
            buffers[frame % 2].upload_cached_sun_pos(view_matrix);
        }
    }

    /// Packed sun matrix for a frame's parity (per-object-uniform tier)
    pub fn sunlight_buffer(&self, frame: usize) -> &Mat4 {
        &self.sun_buffer[frame % 2]
    }

    /// Named defines the lighting shader templates consume
    pub fn light_defines(&self) -> HashMap<String, String> {
        let mut defines = HashMap::new();

        let single_ubo = self.method == LightingMethod::SingleUbo;

        defines.insert("maxLights".into(), self.max_lights.to_string());
        defines.insert(
            "maxLightsInScene".into(),
            Self::max_lights_in_scene().to_string(),
        );
        defines.insert(
            "lightingMethodFFP".into(),
            flag(self.method == LightingMethod::Ffp),
        );
        defines.insert(
            "lightingMethodPerObjectUniform".into(),
            flag(self.method == LightingMethod::PerObjectUniform),
        );
        defines.insert("lightingMethodUBO".into(), flag(single_ubo));
        defines.insert("useUBO".into(), flag(single_ubo));
        // Exposes bitwise operators in the shader.
        defines.insert("useGPUShader4".into(), flag(single_ubo));
        defines.insert(
            "getLight".into(),
            if self.uses_ffp() {
                "gl_LightSource".into()
            } else {
                "LightBuffer".into()
            },
        );
        defines.insert(
            "startLight".into(),
            if single_ubo { "0".into() } else { "1".into() },
        );
        defines.insert(
            "endLight".into(),
            if self.uses_ffp() {
                self.max_lights.to_string()
            } else {
                "PointLightCount".into()
            },
        );

        defines
    }

    /// Number of state-set cache entries in a frame parity's generation
    pub fn state_set_cache_len(&self, frame: usize) -> usize {
        self.state_set_cache[frame % 2].len()
    }

    fn update_gpu_point_light(
        &mut self,
        slot: usize,
        light_source: &Rc<LightSource>,
        frame: usize,
        view_matrix: &Mat4,
    ) {
        let light = light_source.light(frame);
        let Some(buffers) = &mut self.light_buffers else {
            return;
        };
        let buffer = &mut buffers[frame % 2];

        buffer.set_diffuse(slot, &light.diffuse);
        buffer.set_ambient(slot, &light.ambient);
        buffer.set_attenuation_radius(
            slot,
            &Vec4::new(
                light.constant_attenuation,
                light.linear_attenuation,
                light.quadratic_attenuation,
                light_source.radius(),
            ),
        );
        buffer.set_position(slot, &(view_matrix * light.position));
    }
}

/// Clamp a configured light cap to the engine limits
fn clamp_max_lights(value: i32) -> usize {
    (value.max(0) as usize).clamp(MAX_LIGHTS_LOWER_LIMIT, MAX_LIGHTS_UPPER_LIMIT)
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::id::LightIdAllocator;
    use crate::render::device::testing::MockDevice;
    use approx::assert_relative_eq;

    fn settings(method: &str) -> LightingSettings {
        LightingSettings {
            lighting_method: method.to_string(),
            max_lights: 8,
            light_bounds_multiplier: 1.0,
            maximum_light_distance: 0.0,
            light_fade_start: 0.0,
        }
    }

    fn manager(method: &str) -> LightManager {
        LightManager::new(
            Rc::new(MockDevice::with_full_support(LightManager::max_lights_in_scene())),
            &settings(method),
            false,
        )
    }

    fn light_at(ids: &LightIdAllocator, mgr: &mut LightManager, pos: Vec3, frame: usize) -> Rc<LightSource> {
        let light = LightSource::new(ids);
        light.set_radius(10.0);
        mgr.add_light(&light, Mat4::new_translation(&pos), frame);
        light
    }

    #[test]
    fn test_tier_selection_prefers_configured_method() {
        assert_eq!(
            manager("shaders").lighting_method(),
            LightingMethod::SingleUbo
        );
        assert_eq!(
            manager("shaders compatibility").lighting_method(),
            LightingMethod::PerObjectUniform
        );
        assert_eq!(manager("legacy").lighting_method(), LightingMethod::Ffp);
    }

    #[test]
    fn test_unknown_method_falls_back_to_per_object_uniform() {
        assert_eq!(
            manager("ultra quality").lighting_method(),
            LightingMethod::PerObjectUniform
        );
    }

    #[test]
    fn test_capability_shortfall_downgrades_tier() {
        let mgr = LightManager::new(
            Rc::new(MockDevice::without_ubo()),
            &settings("shaders"),
            false,
        );
        assert_eq!(mgr.lighting_method(), LightingMethod::PerObjectUniform);
        assert!(!mgr.is_supported(LightingMethod::SingleUbo));
    }

    #[test]
    fn test_forced_ffp_wins_over_settings() {
        let mgr = LightManager::new(
            Rc::new(MockDevice::with_full_support(0)),
            &settings("shaders"),
            true,
        );
        assert_eq!(mgr.lighting_method(), LightingMethod::Ffp);
        assert_eq!(mgr.max_lights(), FFP_MAX_LIGHTS);
    }

    #[test]
    fn test_settings_are_clamped() {
        let mut cfg = settings("shaders compatibility");
        cfg.max_lights = 1000;
        cfg.light_bounds_multiplier = 7.0;
        cfg.maximum_light_distance = 100.0;
        cfg.light_fade_start = 2.0;

        let mgr = LightManager::new(
            Rc::new(MockDevice::with_full_support(0)),
            &cfg,
            false,
        );
        assert_eq!(mgr.max_lights(), MAX_LIGHTS_UPPER_LIMIT);
        assert_relative_eq!(mgr.point_light_radius_multiplier, 5.0);
        assert_relative_eq!(mgr.point_light_fade_start, 100.0);
    }

    #[test]
    fn test_max_lights_in_scene_respects_block_limit() {
        assert_eq!(LightManager::max_lights_in_scene(), 16384 / 48);
    }

    #[test]
    fn test_fade_scales_and_excludes_lights() {
        let ids = LightIdAllocator::new();
        let mut cfg = settings("shaders compatibility");
        cfg.maximum_light_distance = 100.0;
        cfg.light_fade_start = 0.5;
        let mut mgr = LightManager::new(
            Rc::new(MockDevice::with_full_support(0)),
            &cfg,
            false,
        );

        let frame = 0;
        let near = light_at(&ids, &mut mgr, Vec3::new(50.0, 0.0, 0.0), frame);
        let mid = light_at(&ids, &mut mgr, Vec3::new(75.0, 0.0, 0.0), frame);
        let far = light_at(&ids, &mut mgr, Vec3::new(100.0, 0.0, 0.0), frame);

        let camera = Camera::new("MainCamera");
        let view = Mat4::identity();
        let bounds: Vec<_> = mgr
            .lights_in_view_space(&camera, &view, frame)
            .to_vec();

        // The fully faded light is dropped from the result.
        assert_eq!(bounds.len(), 2);
        assert!(bounds.iter().all(|b| b.light.id() != far.id()));

        assert_relative_eq!(near.light(frame).diffuse.x, 1.0);
        assert_relative_eq!(mid.light(frame).diffuse.x, 0.5);
    }

    #[test]
    fn test_reflection_camera_skips_fade() {
        let ids = LightIdAllocator::new();
        let mut cfg = settings("shaders compatibility");
        cfg.maximum_light_distance = 100.0;
        cfg.light_fade_start = 0.5;
        let mut mgr = LightManager::new(
            Rc::new(MockDevice::with_full_support(0)),
            &cfg,
            false,
        );

        let frame = 0;
        let far = light_at(&ids, &mut mgr, Vec3::new(200.0, 0.0, 0.0), frame);

        let camera = Camera::new(crate::scene::REFLECTION_CAMERA_NAME);
        let view = Mat4::identity();
        let bounds: Vec<_> = mgr
            .lights_in_view_space(&camera, &view, frame)
            .to_vec();

        assert_eq!(bounds.len(), 1);
        assert_relative_eq!(far.light(frame).diffuse.x, 1.0);
    }

    #[test]
    fn test_view_bounds_cached_per_camera_until_reset() {
        let ids = LightIdAllocator::new();
        let mut mgr = manager("shaders compatibility");

        let frame = 0;
        light_at(&ids, &mut mgr, Vec3::new(1.0, 0.0, 0.0), frame);

        let camera = Camera::new("MainCamera");
        let view = Mat4::identity();
        assert_eq!(mgr.lights_in_view_space(&camera, &view, frame).len(), 1);

        // A light collected after the cache was built is not seen by the
        // same camera until the next frame reset.
        light_at(&ids, &mut mgr, Vec3::new(2.0, 0.0, 0.0), frame);
        assert_eq!(mgr.lights_in_view_space(&camera, &view, frame).len(), 1);

        let other = Camera::new("OtherCamera");
        assert_eq!(mgr.lights_in_view_space(&other, &view, frame).len(), 2);

        mgr.update(frame + 1);
        assert_eq!(mgr.lights_in_view_space(&camera, &view, frame + 1).len(), 0);
    }

    #[test]
    fn test_scene_capacity_truncation_keeps_sun_slot() {
        let ids = LightIdAllocator::new();
        let mut mgr = manager("shaders");

        let frame = 0;
        let capacity = LightManager::max_lights_in_scene();
        let mut first = None;
        for i in 0..capacity + 10 {
            let light = light_at(&ids, &mut mgr, Vec3::new(i as f32, 0.0, 0.0), frame);
            first.get_or_insert(light);
        }

        let camera = Camera::new("MainCamera");
        let view = Mat4::identity();
        let bounds = mgr.lights_in_view_space(&camera, &view, frame);

        assert_eq!(bounds.len(), capacity - 1);
        // Index 0 is reserved and kept out of the proximity sort.
        assert_eq!(bounds[0].light.id(), first.unwrap().id());
    }

    #[test]
    fn test_state_set_cache_returns_identical_object() {
        let ids = LightIdAllocator::new();
        let mut mgr = manager("shaders");

        let frame = 0;
        let a = light_at(&ids, &mut mgr, Vec3::new(1.0, 0.0, 0.0), frame);
        let b = light_at(&ids, &mut mgr, Vec3::new(2.0, 0.0, 0.0), frame);

        let camera = Camera::new("MainCamera");
        let view = Mat4::identity();
        let list: Vec<_> = mgr.lights_in_view_space(&camera, &view, frame).to_vec();
        assert_eq!(list.len(), 2);

        let first = mgr.light_list_state_set(&list, frame, &view);
        let second = mgr.light_list_state_set(&list, frame, &view);
        assert!(Rc::ptr_eq(&first, &second));

        // Order-dependent hashing: the reversed list is a separate entry.
        let reversed: Vec<_> = list.iter().rev().cloned().collect();
        let third = mgr.light_list_state_set(&reversed, frame, &view);
        assert!(!Rc::ptr_eq(&first, &third));

        let _ = (a, b);
    }

    #[test]
    fn test_frame_parity_reassigns_buffer_slots() {
        let ids = LightIdAllocator::new();
        let mut mgr = manager("shaders");

        let frame = 0;
        let a = light_at(&ids, &mut mgr, Vec3::new(1.0, 0.0, 0.0), frame);
        let b = light_at(&ids, &mut mgr, Vec3::new(2.0, 0.0, 0.0), frame);

        let camera = Camera::new("MainCamera");
        let view = Mat4::identity();
        let list: Vec<_> = mgr.lights_in_view_space(&camera, &view, frame).to_vec();
        mgr.light_list_state_set(&list, frame, &view);

        assert_eq!(mgr.light_index_map(frame)[&a.id()], 1);
        assert_eq!(mgr.light_index_map(frame)[&b.id()], 2);

        // Next frame: only b is requested, so it claims the first slot.
        let next = frame + 1;
        mgr.update(next);
        mgr.add_light(&b, Mat4::identity(), next);
        let list: Vec<_> = mgr.lights_in_view_space(&camera, &view, next).to_vec();
        mgr.light_list_state_set(&list, next, &view);

        assert_eq!(mgr.light_index_map(next)[&b.id()], 1);
        assert!(!mgr.light_index_map(next).contains_key(&a.id()));
    }

    #[test]
    fn test_update_max_lights_shrinks_cached_state() {
        let ids = LightIdAllocator::new();
        let mut cfg = settings("shaders");
        cfg.max_lights = 8;
        let mut mgr = LightManager::new(
            Rc::new(MockDevice::with_full_support(LightManager::max_lights_in_scene())),
            &cfg,
            false,
        );

        let frame = 0;
        for i in 0..6 {
            light_at(&ids, &mut mgr, Vec3::new(i as f32, 0.0, 0.0), frame);
        }
        let camera = Camera::new("MainCamera");
        let view = Mat4::identity();
        let list: Vec<_> = mgr.lights_in_view_space(&camera, &view, frame).to_vec();
        let state = mgr.light_list_state_set(&list, frame, &view);

        cfg.max_lights = MAX_LIGHTS_LOWER_LIMIT as i32;
        mgr.update_max_lights(&cfg);

        assert_eq!(mgr.max_lights(), MAX_LIGHTS_LOWER_LIMIT);
        assert_eq!(mgr.state_set_cache_len(frame), 0);

        let StateSet::SingleUbo { indices, count } = &*state.borrow() else {
            panic!("expected UBO state");
        };
        assert_eq!(indices.len(), MAX_LIGHTS_LOWER_LIMIT);
        assert_eq!(*count, MAX_LIGHTS_LOWER_LIMIT as i32);
    }

    #[test]
    fn test_ubo_slot_write_goes_to_parity_buffer() {
        let ids = LightIdAllocator::new();
        let mut mgr = manager("shaders");

        let frame = 0;
        let light = light_at(&ids, &mut mgr, Vec3::new(3.0, 0.0, 0.0), frame);
        light.light_mut(frame).diffuse = Vec4::new(0.5, 0.25, 0.75, 1.0);

        let camera = Camera::new("MainCamera");
        let view = Mat4::identity();
        let list: Vec<_> = mgr.lights_in_view_space(&camera, &view, frame).to_vec();
        mgr.light_list_state_set(&list, frame, &view);

        let buffer = mgr.light_buffer(frame).expect("UBO tier has buffers");
        assert_eq!(buffer.position(1), Vec4::new(3.0, 0.0, 0.0, 1.0));
        assert_relative_eq!(buffer.attenuation_radius(1).w, 10.0);
    }

    #[test]
    fn test_deferred_layout_configuration_preserves_slots() {
        let ids = LightIdAllocator::new();
        let device = Rc::new(MockDevice::with_full_support(
            LightManager::max_lights_in_scene(),
        ));
        let mut mgr = LightManager::new(
            Rc::clone(&device) as Rc<dyn GraphicsDevice>,
            &settings("shaders"),
            false,
        );

        let frame = 0;
        light_at(&ids, &mut mgr, Vec3::new(3.0, 0.0, 0.0), frame);

        let camera = Camera::new("MainCamera");
        let view = Mat4::identity();
        let list: Vec<_> = mgr.lights_in_view_space(&camera, &view, frame).to_vec();
        mgr.light_list_state_set(&list, frame, &view);

        // Driver still compiling: nothing happens.
        mgr.ensure_buffer_layout();
        device.finish_link();
        mgr.ensure_buffer_layout();

        let buffer = mgr.light_buffer(frame).expect("UBO tier has buffers");
        assert_eq!(buffer.position(1), Vec4::new(3.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_sunlight_staged_into_buffer_slot_zero() {
        let mut mgr = manager("shaders");
        let sun = Rc::new(RefCell::new(LightData {
            diffuse: Vec4::new(1.0, 0.9, 0.8, 1.0),
            position: Vec4::new(0.0, 0.0, 1000.0, 1.0),
            ..LightData::default()
        }));
        mgr.set_sunlight(Some(sun));

        let frame = 0;
        mgr.stage_sunlight(frame);
        let view = Mat4::new_translation(&Vec3::new(0.0, 0.0, -100.0));
        mgr.upload_sun(frame, &view);

        let buffer = mgr.light_buffer(frame).expect("UBO tier has buffers");
        assert_eq!(buffer.position(0), Vec4::new(0.0, 0.0, 900.0, 1.0));
    }

    #[test]
    fn test_light_defines_match_tier() {
        let mgr = manager("shaders");
        let defines = mgr.light_defines();

        assert_eq!(defines["useUBO"], "1");
        assert_eq!(defines["lightingMethodUBO"], "1");
        assert_eq!(defines["getLight"], "LightBuffer");
        assert_eq!(defines["startLight"], "0");
        assert_eq!(defines["endLight"], "PointLightCount");
        assert_eq!(defines["maxLights"], "8");
        assert_eq!(
            defines["maxLightsInScene"],
            LightManager::max_lights_in_scene().to_string()
        );

        let ffp = manager("legacy").light_defines();
        assert_eq!(ffp["getLight"], "gl_LightSource");
        assert_eq!(ffp["endLight"], FFP_MAX_LIGHTS.to_string());
        assert_eq!(ffp["startLight"], "1");
    }
}
