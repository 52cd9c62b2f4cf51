//! Hittable trait, scene layers and the hit record the oracle reports.

use crate::{Color, Material, Model, Sphere, Triangle};
use az_math::{Aabb, Interval, Ray, Vec3};
use bitflags::bitflags;

bitflags! {
    /// Layers a piece of geometry belongs to. Queries pass a mask and only see geometry whose
    /// layer intersects it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SceneLayer: u32 {
        /// Ordinary geometry, visible to every query.
        const DEFAULT = 0b01;
        /// Geometry that never casts shadows (light proxies and similar).
        const SHADOW_IGNORED = 0b10;
    }
}

impl SceneLayer {
    /// Mask for eye and global-illumination queries.
    pub const VISIBLE: SceneLayer = SceneLayer::all();
    /// Mask for shadow queries.
    pub const SHADOW: SceneLayer = SceneLayer::DEFAULT;
}

impl Default for SceneLayer {
    fn default() -> Self {
        SceneLayer::DEFAULT
    }
}

/// Record of the closest intersection found by a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitRecord {
    /// Whether anything was hit
    pub is_hit: bool,
    /// Parameter t where the intersection occurs
    pub t: f32,
    /// Point of intersection
    pub position: Vec3,
    /// Surface normal at intersection (always points against ray)
    pub normal: Vec3,
    pub diffuse: Color,
    pub specular: Color,
    pub refractive_index: f32,
    pub texture: Color,
    pub emission: Color,
}

impl Default for HitRecord {
    fn default() -> Self {
        Self {
            is_hit: false,
            t: f32::INFINITY,
            position: Vec3::ZERO,
            normal: Vec3::ZERO,
            diffuse: Color::ZERO,
            specular: Color::ZERO,
            refractive_index: 0.0,
            texture: Color::ONE,
            emission: Color::ZERO,
        }
    }
}

impl HitRecord {
    /// Set the normal so it points against the incoming ray.
    pub fn set_face_normal(&mut self, ray: &Ray, outward_normal: Vec3) {
        let front_face = ray.direction.dot(outward_normal) < 0.0;
        self.normal = if front_face {
            outward_normal
        } else {
            -outward_normal
        };
    }

    /// Copy the material terms of the surface that was hit.
    pub fn set_material(&mut self, material: &Material) {
        self.diffuse = material.diffuse;
        self.specular = material.specular;
        self.refractive_index = material.refractive_index;
        self.texture = material.texture;
        self.emission = material.emission;
    }
}

/// Trait for objects that can be hit by rays.
pub trait Hittable: Send + Sync {
    /// Test if a ray hits this object within the given interval.
    ///
    /// Returns true if hit, and fills in the hit record.
    fn hit(&self, ray: &Ray, ray_t: Interval, rec: &mut HitRecord) -> bool;

    /// Get the axis-aligned bounding box of this object.
    fn bounding_box(&self) -> Aabb;
}

/// The geometry variants a scene can hold.
#[derive(Debug, Clone)]
pub enum Geometry {
    Sphere(Sphere),
    Triangle(Triangle),
    Model(Model),
}

impl Hittable for Geometry {
    fn hit(&self, ray: &Ray, ray_t: Interval, rec: &mut HitRecord) -> bool {
        match self {
            Geometry::Sphere(s) => s.hit(ray, ray_t, rec),
            Geometry::Triangle(t) => t.hit(ray, ray_t, rec),
            Geometry::Model(m) => m.hit(ray, ray_t, rec),
        }
    }

    fn bounding_box(&self) -> Aabb {
        match self {
            Geometry::Sphere(s) => s.bounding_box(),
            Geometry::Triangle(t) => t.bounding_box(),
            Geometry::Model(m) => m.bounding_box(),
        }
    }
}

impl From<Sphere> for Geometry {
    fn from(sphere: Sphere) -> Self {
        Geometry::Sphere(sphere)
    }
}

impl From<Triangle> for Geometry {
    fn from(triangle: Triangle) -> Self {
        Geometry::Triangle(triangle)
    }
}

impl From<Model> for Geometry {
    fn from(model: Model) -> Self {
        Geometry::Model(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_masks() {
        assert!(SceneLayer::VISIBLE.intersects(SceneLayer::SHADOW_IGNORED));
        assert!(SceneLayer::VISIBLE.intersects(SceneLayer::DEFAULT));
        assert!(!SceneLayer::SHADOW.intersects(SceneLayer::SHADOW_IGNORED));
    }

    #[test]
    fn test_face_normal_faces_ray() {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        let mut rec = HitRecord::default();

        rec.set_face_normal(&ray, Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(rec.normal, Vec3::new(0.0, 0.0, 1.0));

        rec.set_face_normal(&ray, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(rec.normal, Vec3::new(0.0, 0.0, 1.0));
    }
}
