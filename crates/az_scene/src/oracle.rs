//! The local scene oracle: closest-hit and occlusion queries against one node's geometry.

use crate::{Geometry, HitRecord, Hittable, Light, SceneLayer};
use az_math::{Aabb, Interval, Ray};

/// Queries the distributed tracer issues against the geometry a node owns.
///
/// Implementations must be deterministic for identical inputs. Query intervals are
/// `[t_min, t_max)`.
pub trait SceneOracle: Send + Sync {
    /// Nearest intersection among geometry whose layer intersects `mask`.
    fn closest_hit(&self, ray: &Ray, t_min: f32, t_max: f32, mask: SceneLayer) -> HitRecord;

    /// True if anything on `mask` blocks the ray inside the interval.
    fn occluded(&self, ray: &Ray, t_min: f32, t_max: f32, mask: SceneLayer) -> bool;

    /// Union bounds of all local geometry, empty if the node owns none.
    fn local_bounds(&self) -> Aabb;

    fn lights(&self) -> &[Light];
}

/// A piece of geometry tagged with its layer.
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub geometry: Geometry,
    pub layer: SceneLayer,
}

impl SceneObject {
    pub fn new(geometry: impl Into<Geometry>) -> Self {
        Self {
            geometry: geometry.into(),
            layer: SceneLayer::DEFAULT,
        }
    }

    pub fn on_layer(mut self, layer: SceneLayer) -> Self {
        self.layer = layer;
        self
    }
}

/// Geometry owned by one node, intersected with a linear scan.
#[derive(Debug, Clone, Default)]
pub struct LocalScene {
    objects: Vec<SceneObject>,
    lights: Vec<Light>,
    bounds: Aabb,
}

impl LocalScene {
    pub fn new(objects: Vec<SceneObject>, lights: Vec<Light>) -> Self {
        let bounds = objects.iter().fold(Aabb::EMPTY, |acc, object| {
            Aabb::surrounding(&acc, &object.geometry.bounding_box())
        });
        Self {
            objects,
            lights,
            bounds,
        }
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn visible(&self, mask: SceneLayer) -> impl Iterator<Item = &SceneObject> {
        self.objects
            .iter()
            .filter(move |object| object.layer.intersects(mask))
    }
}

impl SceneOracle for LocalScene {
    fn closest_hit(&self, ray: &Ray, t_min: f32, t_max: f32, mask: SceneLayer) -> HitRecord {
        let mut closest = HitRecord::default();
        let mut closest_so_far = t_max;

        for object in self.visible(mask) {
            let mut rec = HitRecord::default();
            if object
                .geometry
                .hit(ray, Interval::new(t_min, closest_so_far), &mut rec)
            {
                closest_so_far = rec.t;
                closest = rec;
            }
        }

        closest
    }

    fn occluded(&self, ray: &Ray, t_min: f32, t_max: f32, mask: SceneLayer) -> bool {
        let ray_t = Interval::new(t_min, t_max);
        self.visible(mask).any(|object| {
            let mut rec = HitRecord::default();
            object.geometry.hit(ray, ray_t, &mut rec)
        })
    }

    fn local_bounds(&self) -> Aabb {
        self.bounds
    }

    fn lights(&self) -> &[Light] {
        &self.lights
    }
}
