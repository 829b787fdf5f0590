//! View pyramid used by the visibility walk.

use nalgebra::{UnitQuaternion, Vector3};

/// The four side planes of a perspective view, all passing through the
/// observer. There is no near or far plane; distance is bounded by the
/// magnitude limit instead.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    origin: Vector3<f32>,
    /// Inward-facing plane normals in catalog space.
    normals: [Vector3<f32>; 4],
}

impl Frustum {
    /// Builds the pyramid for an observer at `origin` whose `orientation`
    /// maps catalog space into camera space, with the camera looking down −Z.
    ///
    /// `fov_y` is the full vertical field of view in radians. The horizontal
    /// half-angle follows from `aspect_ratio` (width / height).
    pub fn new(
        origin: Vector3<f32>,
        orientation: &UnitQuaternion<f32>,
        fov_y: f32,
        aspect_ratio: f32,
    ) -> Self {
        let half_v = fov_y * 0.5;
        let half_h = ((half_v).tan() * aspect_ratio).atan();
        let (sin_v, cos_v) = half_v.sin_cos();
        let (sin_h, cos_h) = half_h.sin_cos();

        let camera_normals = [
            Vector3::new(0.0, -cos_v, -sin_v), // top
            Vector3::new(0.0, cos_v, -sin_v),  // bottom
            Vector3::new(-cos_h, 0.0, -sin_h), // right
            Vector3::new(cos_h, 0.0, -sin_h),  // left
        ];
        let to_world = orientation.inverse();
        Self {
            origin,
            normals: camera_normals.map(|n| to_world * n),
        }
    }

    pub fn origin(&self) -> Vector3<f32> {
        self.origin
    }

    /// True if `point` is inside or on the boundary of the pyramid.
    pub fn contains_point(&self, point: &Vector3<f32>) -> bool {
        let v = point - self.origin;
        self.normals.iter().all(|n| n.dot(&v) >= 0.0)
    }

    /// Conservative cube test: false only if the cube lies entirely outside
    /// one of the planes.
    pub fn intersects_cube(&self, center: &Vector3<f32>, half_size: f32) -> bool {
        let v = center - self.origin;
        self.normals.iter().all(|n| {
            let reach = half_size * (n.x.abs() + n.y.abs() + n.z.abs());
            n.dot(&v) + reach >= 0.0
        })
    }
}
