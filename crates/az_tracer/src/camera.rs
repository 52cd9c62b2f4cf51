//! Camera for eye-ray generation.

use az_math::{Ray, Vec3};
use az_scene::CameraSetup;
use rand::RngCore;

use crate::sampling::sample_square;

/// Pinhole camera mapping pixels to primary rays.
#[derive(Debug, Clone)]
pub struct Camera {
    pub image_width: u32,
    pub image_height: u32,
    center: Vec3,
    pixel00_loc: Vec3,
    pixel_delta_u: Vec3,
    pixel_delta_v: Vec3,
}

impl Camera {
    /// Build the camera for an image of `width` x `height` pixels.
    pub fn new(setup: &CameraSetup, width: u32, height: u32) -> Self {
        let center = setup.look_from;
        let focus_dist = 1.0;

        // Calculate viewport dimensions
        let theta = setup.vfov.to_radians();
        let h = (theta / 2.0).tan();
        let viewport_height = 2.0 * h * focus_dist;
        let viewport_width = viewport_height * (width.max(1) as f32 / height.max(1) as f32);

        // Calculate camera basis vectors
        let w = (setup.look_from - setup.look_at).normalize();
        let u = setup.vup.cross(w).normalize();
        let v = w.cross(u);

        let viewport_u = viewport_width * u;
        let viewport_v = -viewport_height * v;

        let pixel_delta_u = viewport_u / width.max(1) as f32;
        let pixel_delta_v = viewport_v / height.max(1) as f32;

        // Calculate upper left pixel location
        let viewport_upper_left = center - focus_dist * w - viewport_u / 2.0 - viewport_v / 2.0;
        let pixel00_loc = viewport_upper_left + 0.5 * (pixel_delta_u + pixel_delta_v);

        Self {
            image_width: width,
            image_height: height,
            center,
            pixel00_loc,
            pixel_delta_u,
            pixel_delta_v,
        }
    }

    /// Generate a jittered ray through pixel (i, j). The direction is unit length, so hit
    /// parameters are distances.
    pub fn get_ray(&self, i: u32, j: u32, rng: &mut dyn RngCore) -> Ray {
        let offset = sample_square(rng);

        let pixel_sample = self.pixel00_loc
            + ((i as f32) + offset.x) * self.pixel_delta_u
            + ((j as f32) + offset.y) * self.pixel_delta_v;

        Ray::new(self.center, (pixel_sample - self.center).normalize())
    }
}
