//! Dynamic lighting subsystem
//!
//! The manager collects visible lights during the update traversal,
//! computes per-camera view-space bounds, packs light data for the active
//! GPU tier, and hands drawables cached state sets during cull. See
//! [`manager::LightManager`] for the frame lifecycle.

pub mod buffer;
pub mod cull;
pub mod generators;
pub mod light_source;
pub mod manager;

pub use buffer::LightBuffer;
pub use cull::{LightListCallback, ManagerCullCallback};
pub use generators::{StateSet, StateSetGenerator, StateSetRef};
pub use light_source::{LightData, LightSource};
pub use manager::{LightManager, LightSourceViewBound, LightingMethod};

#[cfg(test)]
mod tests {
    //! Whole-subsystem tests driving the graph traversals end to end

    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::config::LightingSettings;
    use crate::foundation::id::LightIdAllocator;
    use crate::foundation::math::{BoundingSphere, Mat4, Vec3, Vec4};
    use crate::lighting::cull::{LightListCallback, ManagerCullCallback};
    use crate::lighting::generators::StateSet;
    use crate::lighting::light_source::{LightData, LightSource};
    use crate::lighting::manager::LightManager;
    use crate::render::device::testing::MockDevice;
    use crate::scene::camera::Camera;
    use crate::scene::cull::CullVisitor;
    use crate::scene::graph::{NodeKind, SceneGraph};

    struct Fixture {
        ids: LightIdAllocator,
        manager: Rc<RefCell<LightManager>>,
        device: Rc<MockDevice>,
        graph: SceneGraph,
        root: crate::scene::graph::NodeKey,
    }

    impl Fixture {
        fn new(method: &str) -> Self {
            crate::foundation::logging::init_for_tests();
            let device = Rc::new(MockDevice::with_full_support(
                LightManager::max_lights_in_scene(),
            ));
            let settings = LightingSettings {
                lighting_method: method.to_string(),
                ..LightingSettings::default()
            };
            let manager = Rc::new(RefCell::new(LightManager::new(
                Rc::clone(&device) as Rc<dyn crate::render::GraphicsDevice>,
                &settings,
                false,
            )));

            let mut graph = SceneGraph::new();
            let root = graph.add_root(NodeKind::LightRoot {
                manager: Rc::clone(&manager),
                cull: RefCell::new(ManagerCullCallback::new()),
            });

            Self {
                ids: LightIdAllocator::new(),
                manager,
                device,
                graph,
                root,
            }
        }

        fn add_light(&mut self, pos: Vec3, radius: f32) -> Rc<LightSource> {
            let light = LightSource::new(&self.ids);
            light.set_radius(radius);
            let transform = self.graph.add_child(
                self.root,
                NodeKind::Transform(Mat4::new_translation(&pos)),
            );
            self.graph
                .add_child(transform, NodeKind::Light(Rc::clone(&light)));
            light
        }

        fn add_drawable(&mut self, center: Vec3, radius: f32) -> crate::scene::graph::NodeKey {
            let key = self.graph.add_child(
                self.root,
                NodeKind::Drawable {
                    bound: BoundingSphere::new(center, radius),
                },
            );
            self.graph.attach_light_callback(key, LightListCallback::new());
            key
        }

        fn run_frame(&self, frame: usize, camera: &Rc<Camera>) -> CullVisitor {
            self.graph.update_traversal(frame);
            let mut cv = CullVisitor::new(Rc::clone(camera), Mat4::identity(), frame);
            self.graph.cull_traversal(&mut cv);
            cv
        }
    }

    #[test]
    fn test_full_frame_lights_reach_the_buffer_and_drawable() {
        let mut fixture = Fixture::new("shaders");
        let light = fixture.add_light(Vec3::new(3.0, 0.0, 0.0), 10.0);
        fixture.add_drawable(Vec3::zeros(), 1.0);

        let camera = Camera::new("MainCamera");
        let cv = fixture.run_frame(0, &camera);

        let state = cv.drawable_states()[0].clone().expect("drawable is lit");
        let StateSet::SingleUbo { indices, count } = &*state.borrow() else {
            panic!("expected UBO state");
        };
        assert_eq!(*count, 1);
        assert_eq!(indices[0], 1);

        let mgr = fixture.manager.borrow();
        let buffer = mgr.light_buffer(0).expect("UBO tier has buffers");
        assert_eq!(buffer.position(1), Vec4::new(3.0, 0.0, 0.0, 1.0));
        assert_eq!(mgr.light_index_map(0)[&light.id()], 1);
    }

    #[test]
    fn test_consecutive_frames_use_alternate_generations() {
        let mut fixture = Fixture::new("shaders");
        fixture.add_light(Vec3::new(3.0, 0.0, 0.0), 10.0);
        fixture.add_drawable(Vec3::zeros(), 1.0);

        let camera = Camera::new("MainCamera");
        let first = fixture.run_frame(0, &camera);
        let second = fixture.run_frame(1, &camera);

        let state0 = first.drawable_states()[0].clone().expect("frame 0 lit");
        let state1 = second.drawable_states()[0].clone().expect("frame 1 lit");

        // Even and odd frames must not share cached state, or rendering
        // frame N would observe frame N+1's slot assignments.
        assert!(!Rc::ptr_eq(&state0, &state1));

        let mgr = fixture.manager.borrow();
        assert_eq!(mgr.light_index_map(0).len(), 1);
        assert_eq!(mgr.light_index_map(1).len(), 1);
    }

    #[test]
    fn test_two_cameras_share_one_frames_collection() {
        let mut fixture = Fixture::new("shaders");
        fixture.add_light(Vec3::new(3.0, 0.0, 0.0), 10.0);
        fixture.add_drawable(Vec3::zeros(), 1.0);

        let main = Camera::new("MainCamera");
        let reflection = Camera::new(crate::scene::REFLECTION_CAMERA_NAME);

        fixture.graph.update_traversal(0);
        let mut cv_main = CullVisitor::new(Rc::clone(&main), Mat4::identity(), 0);
        fixture.graph.cull_traversal(&mut cv_main);
        let mut cv_reflection = CullVisitor::new(Rc::clone(&reflection), Mat4::identity(), 0);
        fixture.graph.cull_traversal(&mut cv_reflection);

        // Same frame, same light list ordering, same parity: both cameras
        // resolve to the identical cached state set.
        let state_main = cv_main.drawable_states()[0].clone().expect("lit");
        let state_reflection = cv_reflection.drawable_states()[0]
            .clone()
            .expect("lit");
        assert!(Rc::ptr_eq(&state_main, &state_reflection));
    }

    #[test]
    fn test_drawable_receives_exactly_the_intersecting_lights() {
        let mut fixture = Fixture::new("shaders");
        let near_a = fixture.add_light(Vec3::new(4.0, 0.0, 0.0), 10.0);
        let near_b = fixture.add_light(Vec3::new(0.0, 4.0, 0.0), 10.0);
        let _far = fixture.add_light(Vec3::new(0.0, 0.0, 300.0), 10.0);
        let drawable = fixture.add_drawable(Vec3::zeros(), 1.0);

        let camera = Camera::new("MainCamera");
        let cv = fixture.run_frame(0, &camera);

        let state = cv.drawable_states()[0].clone().expect("drawable is lit");
        let StateSet::SingleUbo { indices, count } = &*state.borrow() else {
            panic!("expected UBO state");
        };
        assert_eq!(*count, 2);

        // Registration order breaks the tie between equidistant lights, so
        // the slots come out in collection order.
        let mgr = fixture.manager.borrow();
        let map = mgr.light_index_map(0);
        assert_eq!(indices[0], map[&near_a.id()] as i32);
        assert_eq!(indices[1], map[&near_b.id()] as i32);

        let callback = fixture
            .graph
            .light_callback(drawable)
            .expect("callback attached")
            .borrow();
        assert_eq!(callback.light_list().len(), 2);
    }

    #[test]
    fn test_per_object_uniform_tier_packs_matrices() {
        let mut fixture = Fixture::new("shaders compatibility");
        let light = fixture.add_light(Vec3::new(2.0, 0.0, 0.0), 10.0);
        light.light_mut(0).diffuse = Vec4::new(0.25, 0.5, 0.75, 1.0);
        fixture.add_drawable(Vec3::zeros(), 1.0);

        let sun = Rc::new(RefCell::new(LightData::default()));
        fixture.manager.borrow_mut().set_sunlight(Some(sun));

        let camera = Camera::new("MainCamera");
        let cv = fixture.run_frame(0, &camera);

        let state = cv.drawable_states()[0].clone().expect("drawable is lit");
        let StateSet::PerObjectUniform {
            matrices, count, ..
        } = &*state.borrow()
        else {
            panic!("expected per-object uniform state");
        };

        // Element 0 is the sun; the point light follows.
        assert_eq!(*count, 2);
        assert_eq!(matrices.len(), 2);
        let light_matrix = &matrices[1];
        assert_eq!(light_matrix.m31, 0.25);
        assert_eq!(light_matrix.m32, 0.5);
        assert_eq!(light_matrix.m33, 0.75);
    }

    #[test]
    fn test_ffp_tier_needs_no_device_features() {
        let mut fixture = Fixture::new("legacy");
        fixture.add_light(Vec3::new(2.0, 0.0, 0.0), 10.0);
        fixture.add_drawable(Vec3::zeros(), 1.0);

        let camera = Camera::new("MainCamera");
        let cv = fixture.run_frame(0, &camera);

        let state = cv.drawable_states()[0].clone().expect("drawable is lit");
        let StateSet::Ffp {
            start_unit, lights, ..
        } = &*state.borrow()
        else {
            panic!("expected FFP state");
        };
        assert_eq!(*start_unit, 0);
        assert_eq!(lights.len(), 1);

        // No probe program is ever compiled in FFP mode.
        assert_eq!(fixture.device.compiled_programs(), 0);
    }
}
