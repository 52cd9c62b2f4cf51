//! Indexed triangle mesh.

use crate::{triangle, HitRecord, Hittable, Material};
use az_math::{Aabb, Interval, Ray, Vec3};

/// A mesh consisting of vertex positions and triangle indices, sharing one material.
#[derive(Clone, Debug)]
pub struct Model {
    /// Vertex positions (one Vec3 per vertex)
    positions: Vec<Vec3>,
    /// Triangle indices (every 3 indices form a triangle)
    indices: Vec<u32>,
    material: Material,
    bounds: Aabb,
}

impl Model {
    /// Create a new model from positions and indices.
    ///
    /// Trailing indices that do not form a whole triangle and triangles that reference a
    /// missing vertex are dropped with a warning.
    pub fn new(positions: Vec<Vec3>, mut indices: Vec<u32>, material: Material) -> Self {
        if indices.len() % 3 != 0 {
            log::warn!(
                "Model index count {} is not a multiple of 3, truncating",
                indices.len()
            );
            indices.truncate(indices.len() - indices.len() % 3);
        }

        let vertex_count = positions.len();
        let before = indices.len() / 3;
        let indices: Vec<u32> = indices
            .chunks_exact(3)
            .filter(|tri| tri.iter().all(|&i| (i as usize) < vertex_count))
            .flatten()
            .copied()
            .collect();
        if indices.len() / 3 != before {
            log::warn!(
                "Dropped {} triangles with out-of-range vertex indices",
                before - indices.len() / 3
            );
        }

        let bounds = Self::compute_bounds(&positions);
        Self {
            positions,
            indices,
            material,
            bounds,
        }
    }

    /// Axis-aligned box spanning `min`..`max`, as 12 triangles.
    pub fn cuboid(min: Vec3, max: Vec3, material: Material) -> Self {
        let positions = vec![
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(max.x, max.y, max.z),
            Vec3::new(min.x, max.y, max.z),
        ];
        #[rustfmt::skip]
        let indices = vec![
            0, 2, 1, 0, 3, 2, // -z
            4, 5, 6, 4, 6, 7, // +z
            0, 1, 5, 0, 5, 4, // -y
            3, 7, 6, 3, 6, 2, // +y
            0, 4, 7, 0, 7, 3, // -x
            1, 2, 6, 1, 6, 5, // +x
        ];
        Self::new(positions, indices, material)
    }

    /// Number of triangles in the model.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Compute axis-aligned bounding box from positions.
    fn compute_bounds(positions: &[Vec3]) -> Aabb {
        if positions.is_empty() {
            return Aabb::EMPTY;
        }

        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);

        for pos in positions {
            min = min.min(*pos);
            max = max.max(*pos);
        }

        Aabb::from_points(min, max)
    }
}

impl Hittable for Model {
    fn hit(&self, ray: &Ray, ray_t: Interval, rec: &mut HitRecord) -> bool {
        if !self.bounds.hit(ray, ray_t) {
            return false;
        }

        let mut closest: Option<(f32, usize)> = None;
        for (i, tri) in self.indices.chunks_exact(3).enumerate() {
            let far = closest.map_or(ray_t.max, |(t, _)| t);
            let v0 = self.positions[tri[0] as usize];
            let v1 = self.positions[tri[1] as usize];
            let v2 = self.positions[tri[2] as usize];
            if let Some(t) = triangle::intersect(ray, v0, v1, v2, Interval::new(ray_t.min, far)) {
                closest = Some((t, i));
            }
        }

        let Some((t, i)) = closest else {
            return false;
        };

        let tri = &self.indices[i * 3..i * 3 + 3];
        let v0 = self.positions[tri[0] as usize];
        let v1 = self.positions[tri[1] as usize];
        let v2 = self.positions[tri[2] as usize];
        let outward_normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();

        rec.is_hit = true;
        rec.t = t;
        rec.position = ray.at(t);
        rec.set_face_normal(ray, outward_normal);
        rec.set_material(&self.material);

        true
    }

    fn bounding_box(&self) -> Aabb {
        self.bounds
    }
}
