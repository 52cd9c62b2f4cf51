mod options;

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use az_comm::{CommError, Communicator, LocalCluster};
use az_scene::SceneDescription;
use az_tracer::{DistributedTracer, ImageBuffer, TraceConfig, TraceError};
use clap::Parser;

use options::Options;

fn main() -> Result<()> {
    let options = Options::parse();
    env_logger::Builder::new()
        .filter_level(options.log_level())
        .parse_default_env()
        .init();

    let mut config = load_config(options.config.as_deref())?;
    options.apply(&mut config);
    config.validate().context("invalid render settings")?;
    anyhow::ensure!(options.nodes > 0, "--nodes must be at least 1");

    let scene = SceneDescription::builtin(&options.scene).with_context(|| {
        format!(
            "unknown scene '{}', expected one of {:?}",
            options.scene,
            SceneDescription::BUILTIN_NAMES
        )
    })?;

    log::info!(
        "Rendering '{}' at {}x{}, {} samples per pixel, on {} nodes",
        scene.name,
        config.width,
        config.height,
        config.samples,
        options.nodes
    );
    let started = Instant::now();
    let nodes = scene.distribute(options.nodes);

    let results = LocalCluster::run(options.nodes, |comm| {
        let rank = comm.rank();
        let local = &nodes[rank];
        log::debug!("[rank {rank}] owns {} objects", local.len());

        DistributedTracer::new(config.clone(), local, &scene.camera)?
            .render(comm)
            .inspect_err(|err| log::error!("[rank {rank}] {err}"))
    });

    let mut image = None;
    let mut failures = Vec::new();
    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Ok(Some(rendered)) => image = Some(rendered),
            Ok(None) => {}
            Err(err) => failures.push((rank, err)),
        }
    }
    if let Some((rank, err)) = root_cause(failures) {
        return Err(anyhow::Error::new(err).context(format!("render failed on rank {rank}")));
    }

    let image = image.context("root rank returned no image")?;
    save_image(&image, &options.output)?;
    log::info!(
        "Wrote {} in {:.2?}",
        options.output.display(),
        started.elapsed()
    );
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<TraceConfig> {
    let Some(path) = path else {
        return Ok(TraceConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))
}

/// The failure that started it: peers that only saw someone else abort are reported last.
fn root_cause(failures: Vec<(usize, TraceError)>) -> Option<(usize, TraceError)> {
    let is_echo = |err: &TraceError| {
        matches!(
            err,
            TraceError::Comm {
                source: CommError::PeerAborted { .. },
                ..
            }
        )
    };
    let mut failures = failures.into_iter();
    let first = failures.next()?;
    if !is_echo(&first.1) {
        return Some(first);
    }
    Some(failures.find(|(_, err)| !is_echo(err)).unwrap_or(first))
}

fn save_image(image: &ImageBuffer, path: &Path) -> Result<()> {
    let rgba = image::RgbaImage::from_raw(image.width, image.height, image.to_rgba())
        .context("image buffer does not match its dimensions")?;
    rgba.save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}
