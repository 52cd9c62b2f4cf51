//! azurender distributed tracer.
//!
//! Geometry is split across nodes; rays move instead of geometry. Each node traces the rays
//! it holds against its own slice of the scene, then every node swaps rays with every other
//! node in one collective exchange per round. A ray walks the nodes whose bounds it crosses
//! in increasing rank order and ends at the root, which shades it into the frame.

mod camera;
mod compositor;
mod config;
mod engine;
mod error;
mod exchange;
mod frame;
mod image;
mod machine;
mod partition;
mod quiescence;
mod ray;
mod router;
mod sampling;
mod state;

pub use camera::Camera;
pub use compositor::{add_image, composite_buffers, merge_indirect, FrameCompositor, GatheredFrames};
pub use config::{Termination, TraceConfig};
pub use engine::DistributedTracer;
pub use error::{ProtocolError, Step, TraceError, TraceResult};
pub use exchange::{decode_rays, exchange, FlatBatch, RayBucket};
pub use frame::FrameBuffer;
pub use image::{clamp_01, color_to_rgba, linear_to_gamma, ImageBuffer};
pub use machine::{RayMachine, Traced};
pub use partition::{BoundsRecord, PartitionTable};
pub use quiescence::QuiescenceDetector;
pub use ray::{Ray, RayKind, RAY_SIZE};
pub use router::Router;
pub use state::{PassStats, RoundState};
