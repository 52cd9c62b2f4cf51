//! Random sampling helpers.

use az_math::Vec3;
use rand::RngCore;

/// Uniform float in `[0, 1)`.
#[inline]
pub fn gen_f32(rng: &mut dyn RngCore) -> f32 {
    // 24 random mantissa bits
    (rng.next_u32() >> 8) as f32 * (1.0 / (1u32 << 24) as f32)
}

/// Sample a random point in the unit square [-0.5, 0.5] x [-0.5, 0.5].
pub fn sample_square(rng: &mut dyn RngCore) -> Vec3 {
    Vec3::new(gen_f32(rng) - 0.5, gen_f32(rng) - 0.5, 0.0)
}

/// Cosine-weighted direction on the hemisphere around `normal`.
///
/// Returns the unit direction and its cosine with the normal. The density is `cos / π`.
pub fn cosine_hemisphere(normal: Vec3, rng: &mut dyn RngCore) -> (Vec3, f32) {
    let r1 = gen_f32(rng);
    let r2 = gen_f32(rng);

    let phi = 2.0 * std::f32::consts::PI * r1;
    let radius = r2.sqrt();
    let local = Vec3::new(radius * phi.cos(), radius * phi.sin(), (1.0 - r2).max(0.0).sqrt());

    let w = normal.normalize_or_zero();
    let (u, v) = w.any_orthonormal_pair();
    let direction = (local.x * u + local.y * v + local.z * w).normalize_or_zero();
    (direction, local.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_gen_f32_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let x = gen_f32(&mut rng);
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn test_cosine_hemisphere_above_surface() {
        let mut rng = StdRng::seed_from_u64(3);
        let normal = Vec3::new(0.0, 1.0, 1.0).normalize();

        let mut mean_cos = 0.0;
        let n = 4000;
        for _ in 0..n {
            let (dir, cos) = cosine_hemisphere(normal, &mut rng);
            assert!((dir.length() - 1.0).abs() < 1e-4);
            assert!((dir.dot(normal) - cos).abs() < 1e-4);
            assert!(cos >= 0.0);
            mean_cos += cos;
        }
        // E[cos] under a cosine-weighted density is 2/3
        mean_cos /= n as f32;
        assert!((mean_cos - 2.0 / 3.0).abs() < 0.03);
    }
}
