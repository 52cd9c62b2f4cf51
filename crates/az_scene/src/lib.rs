//! Local scene oracle for azurender.
//!
//! Each node owns a slice of the scene. The distributed tracer only ever talks to that slice
//! through [`SceneOracle`]: closest-hit and occlusion queries, local bounds, and the lights.
//! Intersection is a plain linear scan over the node's geometry.

mod description;
mod hittable;
mod light;
mod material;
mod model;
mod oracle;
mod sphere;
mod triangle;

pub use description::{CameraSetup, SceneDescription};
pub use hittable::{Geometry, HitRecord, Hittable, SceneLayer};
pub use light::{random_unit_vector, Light};
pub use material::{Color, Material};
pub use model::Model;
pub use oracle::{LocalScene, SceneObject, SceneOracle};
pub use sphere::Sphere;
pub use triangle::Triangle;

/// Re-export common math types from az_math
pub use az_math::{Aabb, Interval, Ray, Vec3};
