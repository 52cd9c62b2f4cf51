//! Pass driver: partition, then per sample a direct pass, global-illumination passes and a
//! composite; the root averages the samples.

use std::time::Instant;

use az_comm::Communicator;
use az_scene::{CameraSetup, Color, SceneOracle};
use rand::Rng;

use crate::error::reserve;
use crate::exchange::exchange;
use crate::machine::RayMachine;
use crate::state::{PassStats, RoundState};
use crate::{
    add_image, merge_indirect, Camera, FrameCompositor, ImageBuffer, PartitionTable, QuiescenceDetector, Ray,
    RayBucket, RayKind, Router, TraceConfig, TraceResult,
};

/// One node's side of a distributed render.
///
/// Every node builds one with the same config and camera and calls [`render`] with its
/// communicator. All collectives happen inside `render`, in the same order on every node.
///
/// [`render`]: DistributedTracer::render
pub struct DistributedTracer<'a, O: SceneOracle + ?Sized> {
    config: TraceConfig,
    oracle: &'a O,
    camera: Camera,
    detector: QuiescenceDetector,
    compositor: FrameCompositor,
}

impl<'a, O: SceneOracle + ?Sized> DistributedTracer<'a, O> {
    pub fn new(config: TraceConfig, oracle: &'a O, camera: &CameraSetup) -> TraceResult<Self> {
        config.validate()?;
        Ok(Self {
            camera: Camera::new(camera, config.width, config.height),
            detector: QuiescenceDetector::new(config.termination),
            compositor: FrameCompositor::new(config.tie_epsilon),
            oracle,
            config,
        })
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Render the frame. The root gets the final image, every other node `None`.
    pub fn render<C: Communicator>(&self, comm: &mut C) -> TraceResult<Option<ImageBuffer>> {
        let rank = comm.rank();
        let started = Instant::now();

        let table = PartitionTable::exchange(comm, self.oracle.local_bounds())?;
        if let Some(bounds) = table.bounds(rank) {
            log::info!(
                "[rank {rank}] partition table of {} nodes, local bounds {:?} .. {:?}",
                table.len(),
                bounds.min(),
                bounds.max()
            );
        }
        let router = Router::new(table, self.config.epsilon, self.config.tmax);
        let machine = RayMachine::new(rank, self.oracle, router, &self.config);
        let mut state = RoundState::new(rank, comm.size(), &self.config)?;

        let samples = self.config.samples;
        let mut sum: Option<ImageBuffer> = None;
        for sample in 0..samples {
            state.begin_sample(self.config.sample_seed(sample));
            if let Some(image) = self.render_sample(comm, &machine, &mut state)? {
                match sum.as_mut() {
                    Some(total) => add_image(total, &image),
                    None => sum = Some(image),
                }
            }
            log::debug!("[rank {rank}] sample {} of {samples} done", sample + 1);
        }
        if let Some(image) = sum.as_mut() {
            let scale = 1.0 / samples as f32;
            for pixel in &mut image.pixels {
                *pixel *= scale;
            }
        }

        if comm.is_root() {
            log::info!(
                "[rank {rank}] frame of {samples} samples done in {:.2?}",
                started.elapsed()
            );
        }
        Ok(sum)
    }

    /// One sample of every pixel: the direct pass, then global-illumination passes while any
    /// node holds deferred rays. The root gets the sample's image, every other node `None`.
    fn render_sample<C: Communicator>(
        &self,
        comm: &mut C,
        machine: &RayMachine<'_, O>,
        state: &mut RoundState,
    ) -> TraceResult<Option<ImageBuffer>> {
        let rank = comm.rank();

        // Direct pass
        state.begin_pass();
        if comm.is_root() {
            self.seed_eye_rays(state)?;
        }
        self.run_pass(comm, machine, state, "direct")?;
        let mut image = self
            .compositor
            .composite(comm, &state.frame, Color::from_array(self.config.background))?;

        let mut pass = 0;
        while self.config.global_illumination
            && !self.detector.is_quiescent(comm, state.deferred.len())?
        {
            pass += 1;
            state.begin_pass();
            self.run_pass(comm, machine, state, "indirect")?;
            let indirect = self.compositor.composite(comm, &state.frame, Color::ZERO)?;
            if let (Some(direct), Some(indirect)) = (image.as_mut(), indirect.as_ref()) {
                merge_indirect(direct, indirect);
            }
        }

        if comm.is_root() {
            log::debug!("[rank {rank}] sample done after {pass} indirect passes");
        }
        Ok(image)
    }

    /// Round loop for one pass: process, exchange, check quiescence, until quiescent.
    pub fn run_pass<C: Communicator>(
        &self,
        comm: &mut C,
        machine: &RayMachine<'_, O>,
        state: &mut RoundState,
        label: &str,
    ) -> TraceResult<PassStats> {
        let rank = comm.rank();
        let started = Instant::now();

        loop {
            state.stats.rounds += 1;
            let queue = std::mem::take(&mut state.queue);
            log::debug!(
                "[rank {rank}] {label} round {}: {} queued rays",
                state.stats.rounds,
                queue.len()
            );

            let mut bucket = RayBucket::new(state.size);
            machine.process(queue, &mut bucket, state)?;
            state.queue = exchange(comm, bucket)?;

            if self.detector.is_quiescent(comm, state.queue.len())? {
                break;
            }
        }

        let stats = state.stats;
        log::info!(
            "[rank {rank}] {label} pass done: {} rounds, {} traced, {} forwarded, {} finalized in {:.2?}",
            stats.rounds,
            stats.traced,
            stats.forwarded,
            stats.finalized,
            started.elapsed()
        );
        Ok(stats)
    }

    /// One jittered eye ray per pixel, each with a light picked for it.
    fn seed_eye_rays(&self, state: &mut RoundState) -> TraceResult<()> {
        let lights = self.oracle.lights().len();
        let mut rays: Vec<Ray> = reserve("eye rays", self.config.pixel_count())?;

        for y in 0..self.config.height {
            for x in 0..self.config.width {
                let view = self.camera.get_ray(x, y, &mut state.rng);
                let mut ray =
                    Ray::new(RayKind::Eye, view.origin, view.direction, x, y, state.rank);
                ray.depth = self.config.eye_depth;
                ray.mint = self.config.epsilon;
                if lights > 0 {
                    ray.light = state.rng.gen_range(0..lights) as u32;
                }
                rays.push(ray);
            }
        }

        log::debug!("[rank {}] generated {} eye rays", state.rank, rays.len());
        state.queue.append(&mut rays);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProtocolError, Termination, TraceError};
    use az_comm::{LocalCluster, ROOT};
    use az_math::{Aabb, Vec3};
    use az_scene::{
        HitRecord, Light, LocalScene, Material, SceneDescription, SceneLayer, SceneObject, Sphere,
    };
    use std::sync::{Arc, Mutex};

    /// Wraps a node's scene and logs every closest-hit query with the rank that issued it.
    struct RecordingOracle {
        rank: usize,
        scene: LocalScene,
        log: Arc<Mutex<Vec<usize>>>,
    }

    impl SceneOracle for RecordingOracle {
        fn closest_hit(
            &self,
            ray: &az_math::Ray,
            t_min: f32,
            t_max: f32,
            mask: SceneLayer,
        ) -> HitRecord {
            self.log.lock().unwrap().push(self.rank);
            self.scene.closest_hit(ray, t_min, t_max, mask)
        }

        fn occluded(&self, ray: &az_math::Ray, t_min: f32, t_max: f32, mask: SceneLayer) -> bool {
            self.scene.occluded(ray, t_min, t_max, mask)
        }

        fn local_bounds(&self) -> Aabb {
            self.scene.local_bounds()
        }

        fn lights(&self) -> &[Light] {
            self.scene.lights()
        }
    }

    fn ball(center: Vec3, radius: f32) -> SceneObject {
        SceneObject::new(Sphere::new(center, radius, Material::lambertian(Color::splat(0.5))))
    }

    /// Slab `i` spans x in [i, i+1] and y, z in [-1, 1]; two corner balls set its bounds
    /// without touching the x axis.
    fn slab(i: usize) -> Vec<SceneObject> {
        let x = i as f32;
        vec![
            ball(Vec3::new(x + 0.05, -0.95, -0.95), 0.05),
            ball(Vec3::new(x + 0.95, 0.95, 0.95), 0.05),
        ]
    }

    fn small_config(termination: Termination) -> TraceConfig {
        TraceConfig {
            width: 6,
            height: 4,
            gi_fan_out: 2,
            termination,
            ..TraceConfig::default()
        }
    }

    #[test]
    fn test_eye_ray_walks_slabs_in_rank_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let config = TraceConfig {
            width: 1,
            height: 1,
            global_illumination: false,
            ..TraceConfig::default()
        };

        let results = LocalCluster::run(4, |comm| {
            let rank = comm.rank();
            let mut objects = slab(rank);
            if rank == 3 {
                objects.push(ball(Vec3::new(3.5, 0.0, 0.0), 0.25));
            }
            let oracle = RecordingOracle {
                rank,
                scene: LocalScene::new(objects, Vec::new()),
                log: Arc::clone(&log),
            };
            let tracer = DistributedTracer::new(config.clone(), &oracle, &CameraSetup::default())?;
            let router = Router::new(
                PartitionTable::exchange(comm, oracle.local_bounds())?,
                config.epsilon,
                config.tmax,
            );
            let machine = RayMachine::new(rank, &oracle, router, &config);
            let mut state = RoundState::new(rank, 4, &config)?;
            if rank == ROOT {
                let mut eye = Ray::new(RayKind::Eye, Vec3::new(0.5, 0.0, 0.0), Vec3::X, 0, 0, 0);
                eye.mint = config.epsilon;
                state.queue.push(eye);
            }
            tracer.run_pass(comm, &machine, &mut state, "direct")?;
            Ok::<_, TraceError>((state.frame.sample_count(), state.frame.depth()[0]))
        });

        let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
        // Only the root writes samples: the hit on slab 3's ball at x = 3.25
        assert_eq!(results[0].0, 1);
        assert!((results[0].1 - 2.75).abs() < 1e-4);
        assert!(results[1..].iter().all(|(samples, _)| *samples == 0));
    }

    #[test]
    fn test_render_under_both_strategies() {
        let scene = SceneDescription::slabs();
        for termination in [Termination::Symmetric, Termination::RootBroadcast] {
            let config = small_config(termination);
            let nodes = scene.distribute(3);
            let results = LocalCluster::run(3, |comm| {
                let local = &nodes[comm.rank()];
                DistributedTracer::new(config.clone(), local, &scene.camera)?.render(comm)
            });

            let images: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
            let image = images[0].as_ref().expect("root returns the image");
            assert_eq!((image.width, image.height), (6, 4));
            assert!(image.pixels.iter().all(|c| c.is_finite()));
            assert!(images[1..].iter().all(Option::is_none));
        }
    }

    #[test]
    fn test_render_matches_single_node() {
        // A point light makes every shadow test deterministic
        let mut scene = SceneDescription::slabs();
        scene.lights = vec![Light::new(Vec3::new(1.0, 10.0, 6.0), 0.0, Color::ONE)];
        let config = TraceConfig {
            global_illumination: false,
            ..small_config(Termination::Symmetric)
        };

        let render = |n: usize| {
            let nodes = scene.distribute(n);
            let mut results = LocalCluster::run(n, |comm| {
                let local = &nodes[comm.rank()];
                DistributedTracer::new(config.clone(), local, &scene.camera)?.render(comm)
            });
            results.remove(0).unwrap().expect("root returns the image")
        };

        let single = render(1);
        let split = render(4);
        for (a, b) in single.pixels.iter().zip(&split.pixels) {
            assert!((*a - *b).length() < 1e-4, "{a} != {b}");
        }
    }

    #[test]
    fn test_first_sample_is_the_fresh_state_render() {
        let scene = SceneDescription::slabs();
        let config = TraceConfig {
            seed: 5,
            ..small_config(Termination::Symmetric)
        };
        let nodes = scene.distribute(2);

        let results = LocalCluster::run(2, |comm| {
            let local = &nodes[comm.rank()];
            let tracer = DistributedTracer::new(config.clone(), local, &scene.camera)?;
            let averaged = tracer.render(comm)?;

            let router = Router::new(
                PartitionTable::exchange(comm, local.local_bounds())?,
                config.epsilon,
                config.tmax,
            );
            let machine = RayMachine::new(comm.rank(), local, router, &config);
            let mut state = RoundState::new(comm.rank(), 2, &config)?;
            let fresh = tracer.render_sample(comm, &machine, &mut state)?;
            Ok::<_, TraceError>((averaged, fresh))
        });

        let (averaged, fresh) = results.into_iter().next().unwrap().unwrap();
        assert_eq!(averaged.expect("root image"), fresh.expect("root image"));
    }

    #[test]
    fn test_samples_average_seeded_renders() {
        let scene = SceneDescription::slabs();
        let render = |config: TraceConfig| {
            let nodes = scene.distribute(2);
            let mut results = LocalCluster::run(2, |comm| {
                let local = &nodes[comm.rank()];
                DistributedTracer::new(config.clone(), local, &scene.camera)?.render(comm)
            });
            results.remove(0).unwrap().expect("root returns the image")
        };
        let base = TraceConfig {
            seed: 11,
            ..small_config(Termination::RootBroadcast)
        };

        let averaged = render(TraceConfig {
            samples: 3,
            ..base.clone()
        });
        let singles: Vec<ImageBuffer> = (0..3)
            .map(|sample| {
                render(TraceConfig {
                    seed: base.sample_seed(sample),
                    ..base.clone()
                })
            })
            .collect();

        for (i, pixel) in averaged.pixels.iter().enumerate() {
            let mean = singles.iter().map(|image| image.pixels[i]).sum::<Color>() / 3.0;
            assert!((*pixel - mean).length() < 1e-5, "pixel {i}: {pixel} != {mean}");
        }
    }

    #[test]
    fn test_background_where_nothing_is_hit() {
        let config = TraceConfig {
            width: 3,
            height: 2,
            background: [0.1, 0.2, 0.3],
            ..TraceConfig::default()
        };
        let results = LocalCluster::run(2, |comm| {
            let empty = LocalScene::default();
            DistributedTracer::new(config.clone(), &empty, &CameraSetup::default())?.render(comm)
        });

        let image = results
            .into_iter()
            .next()
            .and_then(|r| r.unwrap())
            .expect("root returns the image");
        assert!(image
            .pixels
            .iter()
            .all(|c| *c == Color::new(0.1, 0.2, 0.3)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TraceConfig {
            width: 0,
            ..TraceConfig::default()
        };
        let empty = LocalScene::default();
        assert!(matches!(
            DistributedTracer::new(config, &empty, &CameraSetup::default()),
            Err(TraceError::Config(_))
        ));
    }

    /// Corrupts the first ray rank 1 receives by returning it as if its chain were done.
    #[test]
    fn test_protocol_error_aborts_every_rank() {
        let config = TraceConfig {
            width: 1,
            height: 1,
            ..TraceConfig::default()
        };
        let results = LocalCluster::run(3, |comm| {
            let rank = comm.rank();
            let scene = LocalScene::new(slab(rank), Vec::new());
            let tracer = DistributedTracer::new(config.clone(), &scene, &CameraSetup::default())?;
            let router = Router::new(
                PartitionTable::exchange(comm, scene.local_bounds())?,
                config.epsilon,
                config.tmax,
            );
            let machine = RayMachine::new(rank, &scene, router, &config);
            let mut state = RoundState::new(rank, 3, &config)?;
            if rank == ROOT {
                let mut ray = Ray::new(RayKind::Eye, Vec3::new(0.5, 0.0, 0.0), Vec3::X, 0, 0, 0);
                ray.returning = 1;
                let mut bucket = RayBucket::new(3);
                bucket.push(1, ray);
                state.queue = exchange(comm, bucket)?;
            } else {
                state.queue = exchange(comm, RayBucket::new(3))?;
            }
            tracer.run_pass(comm, &machine, &mut state, "direct")
        });

        assert!(matches!(
            &results[1],
            Err(TraceError::Protocol(ProtocolError::MisroutedReturn {
                kind: RayKind::Eye,
                rank: 1
            }))
        ));
        assert!(matches!(&results[0], Err(TraceError::Comm { .. })));
        assert!(matches!(&results[2], Err(TraceError::Comm { .. })));
    }
}
