//! Frame compositor: merges every node's partial frame into one image at the root.

use az_comm::{Communicator, ROOT};
use az_scene::Color;
use rayon::prelude::*;

use crate::{FrameBuffer, ImageBuffer, Step, TraceError, TraceResult};

/// Every node's buffers for one pass, concatenated in rank order.
pub struct GatheredFrames<'a> {
    pub width: u32,
    pub height: u32,
    pub color: &'a [[f32; 4]],
    pub depth: &'a [f32],
    pub shadow: &'a [u8],
}

impl GatheredFrames<'_> {
    fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn node_count(&self) -> usize {
        match self.pixel_count() {
            0 => 0,
            pixels => self.depth.len() / pixels,
        }
    }

    /// Resolve every pixel to its nearest sample.
    ///
    /// Per pixel the nearest finite depth across nodes wins. Candidates within `tie_epsilon`
    /// of the running best are decided by the shadow flag, lit over shadowed. A shadowed
    /// winner is black; a pixel no node sampled takes `background`.
    pub fn resolve(&self, background: Color, tie_epsilon: f32) -> ImageBuffer {
        let pixels = self.pixel_count();
        let nodes = self.node_count();

        let resolved: Vec<Color> = (0..pixels)
            .into_par_iter()
            .map(|i| {
                let mut best: Option<usize> = None;
                for node in 0..nodes {
                    let at = node * pixels + i;
                    let depth = self.depth[at];
                    if !depth.is_finite() {
                        continue;
                    }
                    let take = match best {
                        None => true,
                        Some(b) => {
                            let lit = self.shadow[at] == 0;
                            let best_lit = self.shadow[b] == 0;
                            if (depth - self.depth[b]).abs() <= tie_epsilon && lit != best_lit {
                                lit
                            } else {
                                depth < self.depth[b]
                            }
                        }
                    };
                    if take {
                        best = Some(at);
                    }
                }

                match best {
                    None => background,
                    Some(at) if self.shadow[at] != 0 => Color::ZERO,
                    Some(at) => {
                        let [r, g, b, _] = self.color[at];
                        Color::new(r, g, b)
                    }
                }
            })
            .collect();

        ImageBuffer {
            width: self.width,
            height: self.height,
            pixels: resolved,
        }
    }
}

/// Composite a set of frames held in one process. Mostly useful for tests and tools; the
/// distributed path goes through [`FrameCompositor::composite`].
pub fn composite_buffers(frames: &[FrameBuffer], background: Color, tie_epsilon: f32) -> ImageBuffer {
    let Some(first) = frames.first() else {
        return ImageBuffer::filled(0, 0, background);
    };
    let color: Vec<[f32; 4]> = frames.iter().flat_map(|f| f.color().iter().copied()).collect();
    let depth: Vec<f32> = frames.iter().flat_map(|f| f.depth().iter().copied()).collect();
    let shadow: Vec<u8> = frames.iter().flat_map(|f| f.shadow().iter().copied()).collect();

    GatheredFrames {
        width: first.width(),
        height: first.height(),
        color: &color,
        depth: &depth,
        shadow: &shadow,
    }
    .resolve(background, tie_epsilon)
}

/// `direct += (1/π) * indirect`, the Lambertian normalization deferred from per-ray shading.
pub fn merge_indirect(direct: &mut ImageBuffer, indirect: &ImageBuffer) {
    for (d, i) in direct.pixels.iter_mut().zip(&indirect.pixels) {
        *d += std::f32::consts::FRAC_1_PI * *i;
    }
}

/// `sum += sample`, pixel by pixel.
pub fn add_image(sum: &mut ImageBuffer, sample: &ImageBuffer) {
    for (s, p) in sum.pixels.iter_mut().zip(&sample.pixels) {
        *s += *p;
    }
}

/// Gathers partial frames to the root and resolves them there.
#[derive(Debug, Clone, Copy)]
pub struct FrameCompositor {
    tie_epsilon: f32,
}

impl FrameCompositor {
    pub fn new(tie_epsilon: f32) -> Self {
        Self { tie_epsilon }
    }

    /// Collective: every node calls this with its frame. The root gets the image, others `None`.
    pub fn composite<C: Communicator>(
        &self,
        comm: &mut C,
        frame: &FrameBuffer,
        background: Color,
    ) -> TraceResult<Option<ImageBuffer>> {
        let color = comm
            .gather_pod(ROOT, frame.color())
            .map_err(TraceError::at(Step::Composite))?;
        let depth = comm
            .gather_pod(ROOT, frame.depth())
            .map_err(TraceError::at(Step::Composite))?;
        let shadow = comm
            .gather_pod(ROOT, frame.shadow())
            .map_err(TraceError::at(Step::Composite))?;

        let (Some(color), Some(depth), Some(shadow)) = (color, depth, shadow) else {
            return Ok(None);
        };

        let gathered = GatheredFrames {
            width: frame.width(),
            height: frame.height(),
            color: &color,
            depth: &depth,
            shadow: &shadow,
        };
        let image = gathered.resolve(background, self.tie_epsilon);
        log::debug!(
            "[rank {}] composited {} nodes, {} pixels",
            comm.rank(),
            comm.size(),
            image.pixels.len()
        );
        Ok(Some(image))
    }
}
