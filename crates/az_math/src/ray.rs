use crate::Vec3;

/// A geometric ray: a half-line starting at `origin` and travelling along `direction`.
///
/// This is the form handed to intersection routines. The routed work unit that travels
/// between nodes carries much more state and lives in the tracer crate.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: origin + t * direction
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}
