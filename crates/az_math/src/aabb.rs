use crate::{Interval, Ray, Vec3};

/// Axis-aligned bounding box.
///
/// Defined by three intervals (one per axis). A box with any inverted interval is empty and
/// is never intersected; that is the bound a node reports when it owns no geometry.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub x: Interval,
    pub y: Interval,
    pub z: Interval,
}

impl Aabb {
    /// Create a new AABB from three intervals.
    pub fn new(x: Interval, y: Interval, z: Interval) -> Self {
        let mut aabb = Self { x, y, z };
        aabb.pad_to_minimums();
        aabb
    }

    /// Create an AABB from two corner points, padding degenerate axes.
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        let x = Interval::new(a.x.min(b.x), a.x.max(b.x));
        let y = Interval::new(a.y.min(b.y), a.y.max(b.y));
        let z = Interval::new(a.z.min(b.z), a.z.max(b.z));

        let mut aabb = Self { x, y, z };
        aabb.pad_to_minimums();
        aabb
    }

    /// Rebuild a box from its exact min/max corners.
    ///
    /// No sorting and no padding: an inverted (empty) box stays empty. Used when a box
    /// comes back off the wire and must be bit-identical to what its owner sent.
    pub fn from_corners(min: Vec3, max: Vec3) -> Self {
        Self {
            x: Interval::new(min.x, max.x),
            y: Interval::new(min.y, max.y),
            z: Interval::new(min.z, max.z),
        }
    }

    /// Create an AABB that surrounds two other AABBs.
    pub fn surrounding(box0: &Aabb, box1: &Aabb) -> Self {
        Self {
            x: Interval::surrounding(&box0.x, &box1.x),
            y: Interval::surrounding(&box0.y, &box1.y),
            z: Interval::surrounding(&box0.z, &box1.z),
        }
    }

    /// True when the box contains no point.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty() || self.y.is_empty() || self.z.is_empty()
    }

    /// Minimum corner.
    pub fn min(&self) -> Vec3 {
        Vec3::new(self.x.min, self.y.min, self.z.min)
    }

    /// Maximum corner.
    pub fn max(&self) -> Vec3 {
        Vec3::new(self.x.max, self.y.max, self.z.max)
    }

    /// Get the interval for a specific axis (0=X, 1=Y, 2=Z).
    pub fn axis_interval(&self, n: usize) -> Interval {
        match n {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Test if a ray intersects this AABB within the given interval.
    ///
    /// Uses the slab method. Empty boxes never intersect.
    pub fn hit(&self, r: &Ray, mut ray_t: Interval) -> bool {
        if self.is_empty() {
            return false;
        }

        let origin = r.origin.to_array();
        let direction = r.direction.to_array();

        for axis in 0..3 {
            let slab = self.axis_interval(axis);
            let adinv = 1.0 / direction[axis];
            let mut t0 = (slab.min - origin[axis]) * adinv;
            let mut t1 = (slab.max - origin[axis]) * adinv;
            if adinv < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            ray_t.min = t0.max(ray_t.min);
            ray_t.max = t1.min(ray_t.max);
            if ray_t.max <= ray_t.min {
                return false;
            }
        }

        true
    }

    /// Returns the center point of the bounding box.
    pub fn centroid(&self) -> Vec3 {
        Vec3::new(
            (self.x.min + self.x.max) * 0.5,
            (self.y.min + self.y.max) * 0.5,
            (self.z.min + self.z.max) * 0.5,
        )
    }

    /// Pad intervals to avoid zero-width AABBs (degenerate cases).
    fn pad_to_minimums(&mut self) {
        let delta = 0.0001;
        if self.x.size() < delta {
            self.x = self.x.expand(delta);
        }
        if self.y.size() < delta {
            self.y = self.y.expand(delta);
        }
        if self.z.size() < delta {
            self.z = self.z.expand(delta);
        }
    }

    pub const EMPTY: Aabb = Aabb {
        x: Interval::EMPTY,
        y: Interval::EMPTY,
        z: Interval::EMPTY,
    };

    pub const UNIVERSE: Aabb = Aabb {
        x: Interval::UNIVERSE,
        y: Interval::UNIVERSE,
        z: Interval::UNIVERSE,
    };
}

impl Default for Aabb {
    fn default() -> Self {
        Aabb::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_from_points() {
        let aabb = Aabb::from_points(Vec3::new(10.0, 0.0, 10.0), Vec3::new(0.0, 10.0, 0.0));

        assert_eq!(aabb.min(), Vec3::ZERO);
        assert_eq!(aabb.max(), Vec3::splat(10.0));
    }

    #[test]
    fn test_aabb_surrounding_empty() {
        let a = Aabb::from_points(Vec3::ZERO, Vec3::ONE);
        let joined = Aabb::surrounding(&Aabb::EMPTY, &a);

        assert_eq!(joined, a);
        assert!(Aabb::EMPTY.is_empty());
        assert!(!a.is_empty());
    }

    #[test]
    fn test_aabb_hit() {
        let aabb = Aabb::from_points(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));

        // Ray pointing at center
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(aabb.hit(&ray, Interval::new(0.0, 100.0)));

        // Ray pointing away
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(!aabb.hit(&ray, Interval::new(0.0, 100.0)));

        // Ray missing the box
        let ray = Ray::new(Vec3::new(10.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(!aabb.hit(&ray, Interval::new(0.0, 100.0)));

        // Box beyond the far distance
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(!aabb.hit(&ray, Interval::new(0.0, 3.0)));
    }

    #[test]
    fn test_empty_box_never_hit() {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(1.0, 0.3, 0.2));
        assert!(!Aabb::EMPTY.hit(&ray, Interval::UNIVERSE));
    }

    #[test]
    fn test_from_corners_keeps_empty() {
        let rebuilt = Aabb::from_corners(Aabb::EMPTY.min(), Aabb::EMPTY.max());
        assert!(rebuilt.is_empty());
        assert_eq!(rebuilt, Aabb::EMPTY);
    }

    #[test]
    fn test_aabb_centroid() {
        let aabb = Aabb::from_points(Vec3::ZERO, Vec3::new(10.0, 10.0, 10.0));
        assert_eq!(aabb.centroid(), Vec3::new(5.0, 5.0, 5.0));
    }
}
