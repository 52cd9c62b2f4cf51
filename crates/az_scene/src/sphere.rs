//! Sphere primitive.

use crate::{HitRecord, Hittable, Material};
use az_math::{Aabb, Interval, Ray, Vec3};

/// A sphere primitive.
#[derive(Debug, Clone)]
pub struct Sphere {
    center: Vec3,
    radius: f32,
    material: Material,
    bbox: Aabb,
}

impl Sphere {
    /// Create a new sphere.
    pub fn new(center: Vec3, radius: f32, material: Material) -> Self {
        let radius = radius.max(0.0);
        let rvec = Vec3::splat(radius);
        let bbox = Aabb::from_points(center - rvec, center + rvec);

        Self {
            center,
            radius,
            material,
            bbox,
        }
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }
}

impl Hittable for Sphere {
    fn hit(&self, ray: &Ray, ray_t: Interval, rec: &mut HitRecord) -> bool {
        let oc = self.center - ray.origin;
        let a = ray.direction.length_squared();
        let h = ray.direction.dot(oc);
        let c = oc.length_squared() - self.radius * self.radius;

        let discriminant = h * h - a * c;
        if discriminant < 0.0 {
            return false;
        }

        let sqrtd = discriminant.sqrt();

        // Find the nearest root in the acceptable range
        let mut root = (h - sqrtd) / a;
        if !ray_t.contains_half_open(root) {
            root = (h + sqrtd) / a;
            if !ray_t.contains_half_open(root) {
                return false;
            }
        }

        rec.is_hit = true;
        rec.t = root;
        rec.position = ray.at(root);
        let outward_normal = (rec.position - self.center) / self.radius;
        rec.set_face_normal(ray, outward_normal);
        rec.set_material(&self.material);

        true
    }

    fn bounding_box(&self) -> Aabb {
        self.bbox
    }
}
