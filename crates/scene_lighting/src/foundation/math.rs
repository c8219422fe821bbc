//! Math utilities and types
//!
//! Provides fundamental math types for the lighting system: vector and
//! matrix aliases over nalgebra, bounding spheres, and culling planes.

pub use nalgebra::{Matrix4, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Bounding sphere used for light and drawable culling
///
/// A sphere with a negative radius is "empty" and intersects nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Sphere center
    pub center: Vec3,
    /// Sphere radius; negative means the sphere is empty/invalid
    pub radius: f32,
}

impl BoundingSphere {
    /// Create a sphere from center and radius
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Create an empty (invalid) sphere
    pub fn empty() -> Self {
        Self {
            center: Vec3::zeros(),
            radius: -1.0,
        }
    }

    /// Whether the sphere encloses any volume
    pub fn valid(&self) -> bool {
        self.radius >= 0.0
    }

    /// Squared radius
    pub fn radius2(&self) -> f32 {
        self.radius * self.radius
    }

    /// Check whether two spheres overlap
    ///
    /// Empty spheres never intersect anything.
    pub fn intersects(&self, other: &Self) -> bool {
        if !self.valid() || !other.valid() {
            return false;
        }
        let combined = self.radius + other.radius;
        (other.center - self.center).norm_squared() <= combined * combined
    }

    /// Grow this sphere to enclose another
    pub fn expand_by(&mut self, other: &Self) {
        if !other.valid() {
            return;
        }
        if !self.valid() {
            *self = *other;
            return;
        }

        let offset = other.center - self.center;
        let distance = offset.norm();

        // Already contained, one way or the other.
        if distance + other.radius <= self.radius {
            return;
        }
        if distance + self.radius <= other.radius {
            *self = *other;
            return;
        }

        let new_radius = (distance + self.radius + other.radius) * 0.5;
        let ratio = (new_radius - self.radius) / distance;
        self.center += offset * ratio;
        self.radius = new_radius;
    }
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self::empty()
    }
}

/// Transform a bounding sphere by a matrix
///
/// The center is transformed as a point; the radius is scaled by the
/// largest axis scale so that the result always encloses the transformed
/// sphere, even under non-uniform scaling.
pub fn transform_bounding_sphere(matrix: &Mat4, sphere: &mut BoundingSphere) {
    if !sphere.valid() {
        return;
    }

    let center = matrix.transform_point(&Point3::from(sphere.center));
    sphere.center = center.coords;

    let scale_x = Vec3::new(matrix.m11, matrix.m21, matrix.m31).norm();
    let scale_y = Vec3::new(matrix.m12, matrix.m22, matrix.m32).norm();
    let scale_z = Vec3::new(matrix.m13, matrix.m23, matrix.m33).norm();
    sphere.radius *= scale_x.max(scale_y).max(scale_z);
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    /// Normal vector (should be normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self {
            normal: normal.normalize(),
            distance,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}
