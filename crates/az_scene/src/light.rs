//! Spherical area lights.

use crate::Color;
use az_math::Vec3;
use rand::Rng;

/// A spherical light source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub center: Vec3,
    pub radius: f32,
    pub color: Color,
}

impl Light {
    pub fn new(center: Vec3, radius: f32, color: Color) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
            color,
        }
    }

    /// Uniformly sample a point on the light's surface.
    pub fn sample_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        self.center + self.radius * random_unit_vector(rng)
    }

    /// Unoccluded irradiance arriving at `position` on a surface facing `normal`.
    ///
    /// `color * max(0, n·l)` toward the light's center; visibility and the Lambertian `1/π`
    /// are applied elsewhere.
    pub fn irradiance(&self, position: Vec3, normal: Vec3) -> Color {
        let to_light = (self.center - position).normalize_or_zero();
        self.color * normal.dot(to_light).max(0.0)
    }
}

/// Random unit vector, uniform over the sphere.
pub fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    loop {
        let p = Vec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        let len_sq = p.length_squared();
        if 1e-8 < len_sq && len_sq <= 1.0 {
            return p / len_sq.sqrt();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sample_point_on_surface() {
        let light = Light::new(Vec3::new(0.0, 10.0, 0.0), 2.0, Color::ONE);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..64 {
            let p = light.sample_point(&mut rng);
            assert!(((p - light.center).length() - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_irradiance_cosine() {
        let light = Light::new(Vec3::new(0.0, 10.0, 0.0), 1.0, Color::splat(2.0));

        let facing = light.irradiance(Vec3::ZERO, Vec3::Y);
        assert!((facing - Color::splat(2.0)).length() < 1e-5);

        let away = light.irradiance(Vec3::ZERO, -Vec3::Y);
        assert_eq!(away, Color::ZERO);
    }
}
