//! Ray type state machine: what a node does with each kind of ray.
//!
//! A round runs in two phases. Phase A traces every queued ray against local geometry; it
//! touches nothing but the ray, so it runs in parallel and keeps queue order. Phase B routes
//! the traced rays one by one and, at the root, finalizes returning rays into the frame
//! buffer or derives new rays from them.

use std::f32::consts::FRAC_1_PI;

use az_comm::ROOT;
use az_math::Vec3;
use az_scene::{Color, HitRecord, Light, SceneLayer, SceneOracle};
use rayon::prelude::*;

use crate::sampling::cosine_hemisphere;
use crate::state::RoundState;
use crate::{ProtocolError, Ray, RayBucket, RayKind, Router, TraceConfig, TraceResult};

/// Outcome of tracing one ray locally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Traced {
    /// Keep walking the partition chain.
    Onward(Ray),
    /// Occluded shadow ray; goes straight back to the root.
    Occluded(Ray),
    /// A ray whose chain is exhausted, arrived at the root to be finalized.
    Returned(Ray),
}

/// Per-node ray handling for one render.
pub struct RayMachine<'a, O: SceneOracle + ?Sized> {
    rank: usize,
    oracle: &'a O,
    router: Router,
    epsilon: f32,
    gi_fan_out: u32,
    global_illumination: bool,
}

impl<'a, O: SceneOracle + ?Sized> RayMachine<'a, O> {
    pub fn new(rank: usize, oracle: &'a O, router: Router, config: &TraceConfig) -> Self {
        Self {
            rank,
            oracle,
            router,
            epsilon: config.epsilon,
            gi_fan_out: config.gi_fan_out,
            global_illumination: config.global_illumination,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Run one round over `queue`: trace everything, then route and finalize in order.
    pub fn process(
        &self,
        queue: Vec<Ray>,
        bucket: &mut RayBucket,
        state: &mut RoundState,
    ) -> TraceResult<()> {
        state.stats.traced += queue.len();
        let traced = self.trace_all(queue)?;
        for outcome in traced {
            self.dispatch(outcome, bucket, state)?;
        }
        Ok(())
    }

    /// Phase A over a whole queue. The output is in queue order.
    pub fn trace_all(&self, queue: Vec<Ray>) -> Result<Vec<Traced>, ProtocolError> {
        queue.into_par_iter().map(|ray| self.trace(ray)).collect()
    }

    /// Phase A for one ray: local hit or occlusion test, nothing else.
    pub fn trace(&self, mut ray: Ray) -> Result<Traced, ProtocolError> {
        let kind = ray.kind()?;
        if kind == RayKind::Terminate {
            return Err(ProtocolError::StrayTerminate { rank: self.rank });
        }
        if ray.is_returning() {
            if self.rank != ROOT {
                return Err(ProtocolError::MisroutedReturn {
                    kind,
                    rank: self.rank,
                });
            }
            return Ok(Traced::Returned(ray));
        }

        let geometric = ray.geometric();
        let t_min = ray.mint.max(self.epsilon);
        if kind.is_shadow() {
            if self
                .oracle
                .occluded(&geometric, t_min, ray.maxt, SceneLayer::SHADOW)
            {
                ray.is_hit = 1;
                ray.set_color(Color::ZERO);
                ray.returning = 1;
                return Ok(Traced::Occluded(ray));
            }
            return Ok(Traced::Onward(ray));
        }

        let hit = self
            .oracle
            .closest_hit(&geometric, t_min, ray.maxt, SceneLayer::VISIBLE);
        if hit.is_hit {
            ray.maxt = hit.t;
            ray.is_hit = 1;
            ray.hit_position = hit.position.to_array();
            ray.hit_normal = hit.normal.to_array();

            let shade = self.direct_shading(&hit, ray.light);
            match kind {
                RayKind::Eye => {
                    ray.set_color(shade);
                    ray.time = hit.t;
                }
                _ => ray.set_color(ray.throughput() * shade),
            }
        }
        Ok(Traced::Onward(ray))
    }

    /// Emission plus the unoccluded diffuse response of a hit to the pixel's light. Only
    /// opaque diffuse surfaces respond to the light.
    fn direct_shading(&self, hit: &HitRecord, light: u32) -> Color {
        if hit.diffuse == Color::ZERO || hit.refractive_index != 0.0 {
            return hit.emission;
        }
        let irradiance = self
            .light(light)
            .map_or(Color::ZERO, |l| l.irradiance(hit.position, hit.normal));
        hit.emission + hit.diffuse * hit.texture * irradiance
    }

    fn light(&self, index: u32) -> Option<&Light> {
        self.oracle.lights().get(index as usize)
    }

    /// Phase B for one traced ray.
    pub fn dispatch(
        &self,
        outcome: Traced,
        bucket: &mut RayBucket,
        state: &mut RoundState,
    ) -> TraceResult<()> {
        match outcome {
            Traced::Onward(mut ray) => {
                let next = self.router.route(&ray.geometric(), self.rank);
                if next == ROOT {
                    ray.returning = 1;
                }
                self.deliver(next, ray, bucket, state)
            }
            Traced::Occluded(ray) => self.deliver(ROOT, ray, bucket, state),
            Traced::Returned(ray) => self.finalize(ray, bucket, state),
        }
    }

    fn deliver(
        &self,
        dest: usize,
        ray: Ray,
        bucket: &mut RayBucket,
        state: &mut RoundState,
    ) -> TraceResult<()> {
        if dest == self.rank && ray.is_returning() {
            return self.finalize(ray, bucket, state);
        }
        state.stats.forwarded += 1;
        bucket.push(dest, ray);
        Ok(())
    }

    /// Root-side handling of a ray that finished its chain.
    fn finalize(
        &self,
        ray: Ray,
        bucket: &mut RayBucket,
        state: &mut RoundState,
    ) -> TraceResult<()> {
        state.stats.finalized += 1;
        let (x, y) = (ray.x, ray.y);
        match ray.kind()? {
            RayKind::Eye => {
                if !ray.is_hit() {
                    state.stats.missed += 1;
                    return Ok(());
                }
                match self.light_ray(&ray, RayKind::Shadow, state) {
                    Some(shadow) => bucket.push(ROOT, shadow),
                    None => state.frame.record(x, y, ray.time, ray.color(), false)?,
                }
                if self.global_illumination && ray.depth > 0 {
                    self.spawn_indirect(&ray, state);
                }
            }
            RayKind::Shadow => {
                state
                    .frame
                    .record(x, y, ray.time, ray.color(), ray.is_hit())?;
            }
            RayKind::GlobalIllumination => {
                if !ray.is_hit() {
                    state.stats.missed += 1;
                    return Ok(());
                }
                match self.light_ray(&ray, RayKind::GlobalIlluminationShadow, state) {
                    Some(mut shadow) => {
                        shadow.depth = ray.depth - 1;
                        bucket.push(ROOT, shadow);
                    }
                    None => state.frame.accumulate(x, y, ray.time, ray.color(), false)?,
                }
            }
            RayKind::GlobalIlluminationShadow => {
                state
                    .frame
                    .accumulate(x, y, ray.time, ray.color(), ray.is_hit())?;
            }
            RayKind::Terminate => {
                return Err(ProtocolError::StrayTerminate { rank: self.rank }.into());
            }
        }
        Ok(())
    }

    /// Shadow ray from the parent's hit toward a fresh sample on its light.
    ///
    /// `None` when there is no light to test against, or the sample sits on the surface.
    fn light_ray(&self, parent: &Ray, kind: RayKind, state: &mut RoundState) -> Option<Ray> {
        let light = self.light(parent.light)?;
        let origin = parent.hit_position();
        let to_light = light.sample_point(&mut state.rng) - origin;
        let distance = to_light.length();
        if !distance.is_finite() || distance <= self.epsilon {
            return None;
        }

        let mut shadow = parent.derive(kind, origin, to_light / distance);
        shadow.depth = parent.depth;
        shadow.mint = self.epsilon;
        shadow.maxt = distance;
        shadow.time = parent.time;
        shadow.color = parent.color;
        Some(shadow)
    }

    /// Fan out global-illumination rays over the hemisphere of an eye hit, held for the
    /// next pass.
    ///
    /// A sample with zero density or a degenerate direction is not sent, but it still counts
    /// toward `gi_fan_out`: it is a sample whose contribution is zero, so every ray that is
    /// sent carries `1 / gi_fan_out` of the eye color and the estimate stays unbiased.
    fn spawn_indirect(&self, eye: &Ray, state: &mut RoundState) {
        if self.gi_fan_out == 0 {
            return;
        }
        let origin = eye.hit_position();
        let normal = eye.hit_normal();
        let share = eye.color() / self.gi_fan_out as f32;

        for _ in 0..self.gi_fan_out {
            let (direction, cos_theta) = cosine_hemisphere(normal, &mut state.rng);
            let Some(weight) = sample_weight(share, direction, cos_theta) else {
                continue;
            };
            let mut gi = eye.derive(RayKind::GlobalIllumination, origin, direction);
            gi.depth = eye.depth - 1;
            gi.mint = self.epsilon;
            gi.time = eye.time;
            gi.throughput = weight.to_array();
            state.deferred.push(gi);
        }
    }
}

/// Throughput of one cosine-weighted fan-out sample, `None` when it contributes nothing.
fn sample_weight(share: Color, direction: Vec3, cos_theta: f32) -> Option<Color> {
    let pdf = cos_theta * FRAC_1_PI;
    if pdf <= 0.0 || direction == Vec3::ZERO {
        return None;
    }
    Some(share * (cos_theta / pdf))
}
