//! # Scene Lighting
//!
//! A scene-graph dynamic lighting manager with tiered GPU backends.
//!
//! ## Features
//!
//! - **Per-frame collection**: lights register during the update traversal
//!   with their resolved world transforms
//! - **Tiered GPU packing**: fixed-function light units, per-drawable
//!   uniform matrix arrays, or one shared uniform buffer per scene
//! - **Cached state sets**: drawables sharing a light list share one GPU
//!   state object, double-buffered by frame parity
//! - **View-space culling**: per-camera light bounds with distance fade
//!   and capacity-aware proximity sorting
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use scene_lighting::prelude::*;
//!
//! fn build(device: Rc<dyn GraphicsDevice>) {
//!     let settings = LightingSettings::default();
//!     let manager = Rc::new(RefCell::new(LightManager::new(device, &settings, false)));
//!
//!     let mut graph = SceneGraph::new();
//!     let root = graph.add_root(NodeKind::LightRoot {
//!         manager: Rc::clone(&manager),
//!         cull: RefCell::new(ManagerCullCallback::new()),
//!     });
//!
//!     let ids = LightIdAllocator::new();
//!     let light = LightSource::new(&ids);
//!     light.set_radius(32.0);
//!     graph.add_child(root, NodeKind::Light(light));
//!
//!     let frame = 0;
//!     graph.update_traversal(frame);
//!     let camera = Camera::new("MainCamera");
//!     let mut cv = CullVisitor::new(camera, Mat4::identity(), frame);
//!     graph.cull_traversal(&mut cv);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod lighting;
pub mod render;
pub mod scene;

pub use config::{Config, ConfigError, LightingSettings};
pub use lighting::{LightManager, LightSource, LightingMethod};

/// Common imports for lighting users
pub mod prelude {
    pub use crate::{
        config::{Config, LightingSettings},
        foundation::{
            id::{LightId, LightIdAllocator},
            math::{BoundingSphere, Mat4, Point3, Vec3, Vec4},
        },
        lighting::{
            LightData, LightListCallback, LightManager, LightSource, LightingMethod,
            ManagerCullCallback, StateSet, StateSetRef,
        },
        render::{GraphicsDevice, ProgramHandle, UniformBlockLayout},
        scene::{
            graph::{NodeKind, SceneGraph},
            Camera, CullVisitor, TraversalMask,
        },
    };
}
