//! Triangle primitive.
//!
//! Uses the Möller-Trumbore algorithm for ray-triangle intersection.

use crate::{HitRecord, Hittable, Material};
use az_math::{Aabb, Interval, Ray, Vec3};

/// A triangle primitive.
#[derive(Debug, Clone)]
pub struct Triangle {
    /// Vertices
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    /// Pre-computed face normal (unit length)
    normal: Vec3,
    material: Material,
    bbox: Aabb,
}

impl Triangle {
    /// Create a new triangle from three vertices.
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3, material: Material) -> Self {
        let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
        let bbox = Aabb::from_points(v0.min(v1).min(v2), v0.max(v1).max(v2));

        Self {
            v0,
            v1,
            v2,
            normal,
            material,
            bbox,
        }
    }
}

/// Möller-Trumbore intersection. Returns `t` when the ray crosses the triangle inside `ray_t`
/// (near bound inclusive, far bound exclusive).
pub(crate) fn intersect(ray: &Ray, v0: Vec3, v1: Vec3, v2: Vec3, ray_t: Interval) -> Option<f32> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let h = ray.direction.cross(edge2);
    let a = edge1.dot(h);

    // Ray is parallel to triangle
    if a.abs() < 1e-8 {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin - v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);
    ray_t.contains_half_open(t).then_some(t)
}

impl Hittable for Triangle {
    fn hit(&self, ray: &Ray, ray_t: Interval, rec: &mut HitRecord) -> bool {
        let Some(t) = intersect(ray, self.v0, self.v1, self.v2, ray_t) else {
            return false;
        };

        rec.is_hit = true;
        rec.t = t;
        rec.position = ray.at(t);
        rec.set_face_normal(ray, self.normal);
        rec.set_material(&self.material);

        true
    }

    fn bounding_box(&self) -> Aabb {
        self.bbox
    }
}
