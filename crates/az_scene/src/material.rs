//! Surface materials.
//!
//! The oracle reports material terms on the hit record instead of scattering rays itself;
//! deriving child rays is the tracer's business.

use az_math::Vec3;

/// Color type alias (RGB values typically 0-1)
pub type Color = Vec3;

/// Per-surface shading terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Diffuse reflectance
    pub diffuse: Color,
    /// Specular reflectance
    pub specular: Color,
    /// Index of refraction, 0.0 for opaque surfaces
    pub refractive_index: f32,
    /// Constant texture tint multiplied into the diffuse term
    pub texture: Color,
    /// Light given off by the surface itself, unaffected by any light source
    pub emission: Color,
}

impl Material {
    /// Opaque diffuse (Lambertian) surface.
    pub fn lambertian(albedo: Color) -> Self {
        Self {
            diffuse: albedo,
            specular: Color::ZERO,
            refractive_index: 0.0,
            texture: Color::ONE,
            emission: Color::ZERO,
        }
    }

    /// Opaque specular surface with no diffuse response.
    pub fn metal(albedo: Color) -> Self {
        Self {
            diffuse: Color::ZERO,
            specular: albedo,
            refractive_index: 0.0,
            texture: Color::ONE,
            emission: Color::ZERO,
        }
    }

    /// Transparent surface.
    ///
    /// - `ior`: Index of refraction (1.0 = air, 1.5 = glass, 2.4 = diamond)
    pub fn dielectric(ior: f32) -> Self {
        Self {
            diffuse: Color::ZERO,
            specular: Color::ONE,
            refractive_index: ior,
            texture: Color::ONE,
            emission: Color::ZERO,
        }
    }

    /// Surface that only gives off light.
    pub fn diffuse_light(emit: Color) -> Self {
        Self {
            emission: emit,
            ..Self::lambertian(Color::ZERO)
        }
    }

    /// Replace the texture tint.
    pub fn with_texture(mut self, texture: Color) -> Self {
        self.texture = texture;
        self
    }

    /// True if direct diffuse shading applies: a non-black diffuse term on an opaque surface.
    pub fn is_diffuse(&self) -> bool {
        self.diffuse != Color::ZERO && self.refractive_index == 0.0
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::lambertian(Color::splat(0.5))
    }
}
