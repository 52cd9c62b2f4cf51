//! The routed ray: the unit of work and the wire message.
//!
//! A [`Ray`] is a flat `#[repr(C)]` record of 4-byte fields with no padding and no owned
//! memory, so a batch of rays is sent as its raw bytes. Field order is the wire format.

use az_math::Vec3;
use bytemuck::{Pod, Zeroable};

use crate::ProtocolError;

/// What a ray is for, and so what a node does with it.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RayKind {
    Eye = 0,
    Shadow = 1,
    GlobalIllumination = 2,
    GlobalIlluminationShadow = 3,
    Terminate = 4,
}

impl RayKind {
    /// Shadow rays only test occlusion between a surface and a light sample.
    pub fn is_shadow(self) -> bool {
        matches!(self, RayKind::Shadow | RayKind::GlobalIlluminationShadow)
    }
}

impl TryFrom<u32> for RayKind {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RayKind::Eye),
            1 => Ok(RayKind::Shadow),
            2 => Ok(RayKind::GlobalIllumination),
            3 => Ok(RayKind::GlobalIlluminationShadow),
            4 => Ok(RayKind::Terminate),
            other => Err(ProtocolError::UnknownRayKind(other)),
        }
    }
}

/// A ray in flight between nodes.
///
/// `(x, y)` never changes once set: it ties every derived ray back to one output pixel.
/// `time` doubles as the surface distance used to resolve depth when compositing.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Ray {
    pub origin: [f32; 3],
    pub direction: [f32; 3],
    /// [`RayKind`] discriminant
    pub kind: u32,
    /// Remaining bounce budget
    pub depth: i32,
    pub x: u32,
    pub y: u32,
    /// Accumulated color
    pub color: [f32; 3],
    /// Path weight of global-illumination rays
    pub throughput: [f32; 3],
    pub mint: f32,
    pub maxt: f32,
    pub time: f32,
    pub is_hit: u32,
    /// Set once the partition chain is exhausted; the root finalizes it
    pub returning: u32,
    pub hit_position: [f32; 3],
    pub hit_normal: [f32; 3],
    /// Rank that created the ray
    pub source: u32,
    /// Index of the light sampled for this pixel
    pub light: u32,
}

/// Size of one ray record on the wire.
pub const RAY_SIZE: usize = std::mem::size_of::<Ray>();

const _: () = assert!(RAY_SIZE == 116);

impl Ray {
    /// Create a ray of `kind` for pixel `(x, y)`, spanning `[0, inf)`, with no hit.
    pub fn new(kind: RayKind, origin: Vec3, direction: Vec3, x: u32, y: u32, source: usize) -> Self {
        Self {
            origin: origin.to_array(),
            direction: direction.to_array(),
            kind: kind as u32,
            depth: 0,
            x,
            y,
            color: [0.0; 3],
            throughput: [1.0; 3],
            mint: 0.0,
            maxt: f32::INFINITY,
            time: 0.0,
            is_hit: 0,
            returning: 0,
            hit_position: [0.0; 3],
            hit_normal: [0.0; 3],
            source: source as u32,
            light: 0,
        }
    }

    /// The termination sentinel.
    pub fn terminate(source: usize) -> Self {
        Self::new(RayKind::Terminate, Vec3::ZERO, Vec3::ZERO, 0, 0, source)
    }

    /// Decode the kind tag. Unknown values mean the sender speaks a different wire format.
    pub fn kind(&self) -> Result<RayKind, ProtocolError> {
        RayKind::try_from(self.kind)
    }

    pub fn origin(&self) -> Vec3 {
        Vec3::from_array(self.origin)
    }

    pub fn direction(&self) -> Vec3 {
        Vec3::from_array(self.direction)
    }

    pub fn color(&self) -> Vec3 {
        Vec3::from_array(self.color)
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = color.to_array();
    }

    pub fn throughput(&self) -> Vec3 {
        Vec3::from_array(self.throughput)
    }

    pub fn hit_position(&self) -> Vec3 {
        Vec3::from_array(self.hit_position)
    }

    pub fn hit_normal(&self) -> Vec3 {
        Vec3::from_array(self.hit_normal)
    }

    pub fn is_hit(&self) -> bool {
        self.is_hit != 0
    }

    pub fn is_returning(&self) -> bool {
        self.returning != 0
    }

    /// The geometric half-line this ray travels along.
    pub fn geometric(&self) -> az_math::Ray {
        az_math::Ray::new(self.origin(), self.direction())
    }

    /// A child ray for the same pixel, carrying over pixel, light and source.
    pub fn derive(&self, kind: RayKind, origin: Vec3, direction: Vec3) -> Self {
        Self {
            light: self.light,
            ..Self::new(kind, origin, direction, self.x, self.y, self.source as usize)
        }
    }
}
