//! Per-node partial frame: nearest-surface color, depth and shadow flag per pixel.

use az_scene::Color;

use crate::error::reserve;
use crate::{ProtocolError, TraceResult};

/// One node's partial image for the current pass.
///
/// Depth starts at `+inf` ("far"); a pixel with infinite depth has no sample.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    tie_epsilon: f32,
    color: Vec<[f32; 4]>,
    depth: Vec<f32>,
    shadow: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, tie_epsilon: f32) -> TraceResult<Self> {
        let pixels = width as usize * height as usize;
        let mut color = reserve("frame color buffer", pixels)?;
        let mut depth = reserve("frame depth buffer", pixels)?;
        let mut shadow = reserve("frame shadow mask", pixels)?;
        color.resize(pixels, [0.0, 0.0, 0.0, 1.0]);
        depth.resize(pixels, f32::INFINITY);
        shadow.resize(pixels, 0);

        Ok(Self {
            width,
            height,
            tie_epsilon,
            color,
            depth,
            shadow,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn color(&self) -> &[[f32; 4]] {
        &self.color
    }

    pub fn depth(&self) -> &[f32] {
        &self.depth
    }

    pub fn shadow(&self) -> &[u8] {
        &self.shadow
    }

    /// Number of pixels holding a sample.
    pub fn sample_count(&self) -> usize {
        self.depth.iter().filter(|d| d.is_finite()).count()
    }

    fn index(&self, x: u32, y: u32) -> Result<usize, ProtocolError> {
        if x >= self.width || y >= self.height {
            return Err(ProtocolError::PixelOutOfRange { x, y });
        }
        Ok(y as usize * self.width as usize + x as usize)
    }

    fn write(&mut self, i: usize, depth: f32, color: Color, shadowed: bool) {
        self.color[i] = [color.x, color.y, color.z, 1.0];
        self.depth[i] = depth;
        self.shadow[i] = shadowed as u8;
    }

    /// Direct-pass write: keep the nearest surface.
    ///
    /// A sample more than `tie_epsilon` nearer replaces the current one. Within the tie band
    /// it only replaces a shadowed sample with a lit one.
    pub fn record(
        &mut self,
        x: u32,
        y: u32,
        depth: f32,
        color: Color,
        shadowed: bool,
    ) -> Result<(), ProtocolError> {
        let i = self.index(x, y)?;
        if !depth.is_finite() {
            return Ok(());
        }

        let current = self.depth[i];
        let nearer = depth < current - self.tie_epsilon;
        let tie = (depth - current).abs() <= self.tie_epsilon;
        if nearer || (tie && self.shadow[i] != 0 && !shadowed) {
            self.write(i, depth, color, shadowed);
        }
        Ok(())
    }

    /// Global-illumination write: nearest surface, summing samples that tie.
    ///
    /// Tied samples add their colors and the pixel stays shadowed only if all of them are,
    /// so the order fan-out samples arrive in does not matter.
    pub fn accumulate(
        &mut self,
        x: u32,
        y: u32,
        depth: f32,
        color: Color,
        shadowed: bool,
    ) -> Result<(), ProtocolError> {
        let i = self.index(x, y)?;
        if !depth.is_finite() {
            return Ok(());
        }

        let current = self.depth[i];
        if depth < current - self.tie_epsilon {
            self.write(i, depth, color, shadowed);
        } else if (depth - current).abs() <= self.tie_epsilon {
            let c = &mut self.color[i];
            c[0] += color.x;
            c[1] += color.y;
            c[2] += color.z;
            self.shadow[i] &= shadowed as u8;
        }
        Ok(())
    }

    /// Clear every pixel back to "no sample".
    pub fn reset(&mut self) {
        self.color.fill([0.0, 0.0, 0.0, 1.0]);
        self.depth.fill(f32::INFINITY);
        self.shadow.fill(0);
    }
}
