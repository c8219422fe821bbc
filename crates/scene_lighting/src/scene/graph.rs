//! Minimal scene-graph node arena
//!
//! Just enough graph to host the lighting subsystem: groups, transforms,
//! drawables, light nodes, and a light root that owns the manager. Nodes
//! live in a slotmap arena and refer to children by key, which keeps the
//! graph free of reference cycles.

use std::cell::RefCell;
use std::rc::Rc;

use slotmap::{new_key_type, SlotMap};

use crate::foundation::math::{transform_bounding_sphere, BoundingSphere, Mat4, Vec3};
use crate::lighting::cull::{LightListCallback, ManagerCullCallback};
use crate::lighting::light_source::LightSource;
use crate::lighting::manager::LightManager;
use crate::scene::cull::CullVisitor;

new_key_type! {
    /// Stable handle to a node in the arena
    pub struct NodeKey;
}

/// What a node contributes to the traversals
pub enum NodeKind {
    /// Pure grouping node
    Group,
    /// Applies a local transform to its subtree
    Transform(Mat4),
    /// Root of the lit part of the graph; owns the manager
    LightRoot {
        /// The scene's light manager
        manager: Rc<RefCell<LightManager>>,
        /// Per-frame staging callback
        cull: RefCell<ManagerCullCallback>,
    },
    /// A dynamic light source
    Light(Rc<LightSource>),
    /// A renderable leaf with a local bounding sphere
    Drawable {
        /// Bound in the node's local space
        bound: BoundingSphere,
    },
}

/// A node and its children
pub struct Node {
    kind: NodeKind,
    children: Vec<NodeKey>,
    /// Attached on nodes that should receive light state during cull
    light_callback: Option<RefCell<LightListCallback>>,
}

/// Node arena with the two traversals the lighting subsystem needs
///
/// The update traversal runs once per frame: it resets the manager and
/// registers every light with its resolved world transform. The cull
/// traversal runs once per camera and assigns light state to drawables.
#[derive(Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeKey, Node>,
    roots: Vec<NodeKey>,
}

impl SceneGraph {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node without a parent
    pub fn add_root(&mut self, kind: NodeKind) -> NodeKey {
        let key = self.insert(kind);
        self.roots.push(key);
        key
    }

    /// Insert a node as a child of `parent`
    pub fn add_child(&mut self, parent: NodeKey, kind: NodeKind) -> NodeKey {
        let key = self.insert(kind);
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(key);
        }
        key
    }

    fn insert(&mut self, kind: NodeKind) -> NodeKey {
        self.nodes.insert(Node {
            kind,
            children: Vec::new(),
            light_callback: None,
        })
    }

    /// Attach a light-list callback so the node receives light state
    pub fn attach_light_callback(&mut self, key: NodeKey, callback: LightListCallback) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.light_callback = Some(RefCell::new(callback));
        }
    }

    /// Remove a node and its subtree
    pub fn remove(&mut self, key: NodeKey) {
        if let Some(node) = self.nodes.remove(key) {
            for child in node.children {
                self.remove(child);
            }
        }
        self.roots.retain(|&root| root != key);
        for node in self.nodes.values_mut() {
            node.children.retain(|&child| child != key);
        }
    }

    /// Borrow a node's light callback, if attached
    pub fn light_callback(&self, key: NodeKey) -> Option<&RefCell<LightListCallback>> {
        self.nodes.get(key)?.light_callback.as_ref()
    }

    /// Per-frame update traversal
    ///
    /// Resets every light manager for the frame, then registers each light
    /// node with its accumulated world transform.
    ///
    /// # Panics
    ///
    /// Panics when a light node sits outside any light root's subtree;
    /// such a light could never be rendered and indicates a broken graph.
    pub fn update_traversal(&self, frame: usize) {
        for &root in &self.roots {
            self.update_node(root, frame, &Mat4::identity(), None);
        }
    }

    fn update_node(
        &self,
        key: NodeKey,
        frame: usize,
        world: &Mat4,
        manager: Option<&Rc<RefCell<LightManager>>>,
    ) {
        let Some(node) = self.nodes.get(key) else {
            return;
        };

        let mut world = *world;
        let mut manager = manager;
        let light_root_manager;

        match &node.kind {
            NodeKind::Transform(matrix) => world = world * matrix,
            NodeKind::LightRoot {
                manager: root_manager,
                ..
            } => {
                root_manager.borrow_mut().update(frame);
                light_root_manager = Rc::clone(root_manager);
                manager = Some(&light_root_manager);
            }
            NodeKind::Light(light) => {
                let Some(manager) = manager else {
                    panic!("light node attached outside a light root subtree");
                };
                manager.borrow_mut().add_light(light, world, frame);
            }
            NodeKind::Group | NodeKind::Drawable { .. } => {}
        }

        for &child in &node.children {
            self.update_node(child, frame, &world, manager);
        }
    }

    /// Per-camera cull traversal
    pub fn cull_traversal(&self, cv: &mut CullVisitor) {
        for &root in &self.roots {
            self.cull_node(root, cv);
        }
    }

    fn cull_node(&self, key: NodeKey, cv: &mut CullVisitor) {
        let Some(node) = self.nodes.get(key) else {
            return;
        };

        let mut pushed_transform = false;
        let mut previous_manager = None;
        let mut entered_root = false;

        match &node.kind {
            NodeKind::Transform(matrix) => {
                cv.push_model_view(matrix);
                pushed_transform = true;
            }
            NodeKind::LightRoot { manager, cull } => {
                cull.borrow_mut().stage(&mut manager.borrow_mut(), cv);
                previous_manager = cv.set_light_manager(Some(Rc::clone(manager)));
                entered_root = true;
            }
            NodeKind::Group | NodeKind::Light(_) | NodeKind::Drawable { .. } => {}
        }

        // The transform is already on the model-view stack, so the
        // callback sees the node's bound in its own local space.
        let mut pushed_state = false;
        if let Some(callback) = &node.light_callback {
            let bound = self.local_bound(key);
            if bound.valid() {
                pushed_state = callback.borrow_mut().push_light_state(&bound, cv);
            }
        }

        if let NodeKind::Drawable { .. } = node.kind {
            cv.record_drawable();
        }

        for &child in &node.children {
            self.cull_node(child, cv);
        }

        if pushed_state {
            cv.pop_state_set();
        }
        if entered_root {
            cv.set_light_manager(previous_manager);
        }
        if pushed_transform {
            cv.pop_model_view();
        }
    }

    /// Subtree bound in the space below the node's own transform
    ///
    /// For a transform node this skips the node's matrix; the cull
    /// traversal has already composed it onto the model-view stack.
    fn local_bound(&self, key: NodeKey) -> BoundingSphere {
        let Some(node) = self.nodes.get(key) else {
            return BoundingSphere::empty();
        };
        if !matches!(node.kind, NodeKind::Transform(_)) {
            return self.compute_bound(key);
        }

        let mut bound = BoundingSphere::empty();
        for &child in &node.children {
            let child_bound = self.compute_bound(child);
            if child_bound.valid() {
                bound.expand_by(&child_bound);
            }
        }
        bound
    }

    /// Bound of a node's subtree in the parent's coordinate space
    pub fn compute_bound(&self, key: NodeKey) -> BoundingSphere {
        let Some(node) = self.nodes.get(key) else {
            return BoundingSphere::empty();
        };

        let mut bound = match &node.kind {
            NodeKind::Drawable { bound } => *bound,
            NodeKind::Light(light) => BoundingSphere::new(Vec3::zeros(), light.radius()),
            _ => BoundingSphere::empty(),
        };

        for &child in &node.children {
            let mut child_bound = self.compute_bound(child);
            if !child_bound.valid() {
                continue;
            }
            if let NodeKind::Transform(matrix) = &node.kind {
                transform_bounding_sphere(matrix, &mut child_bound);
            }
            bound.expand_by(&child_bound);
        }

        bound
    }
}
