//! Render configuration shared (identically) by every node.

use serde::{Deserialize, Serialize};

use crate::{TraceError, TraceResult};

/// How nodes agree that a pass has run out of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Termination {
    /// Every node gathers every pending count and sums it itself.
    #[default]
    Symmetric,
    /// The root sums the counts and broadcasts a terminate sentinel when the total is zero.
    RootBroadcast,
}

/// Distance between the seeds of consecutive samples. Ranks offset a sample's seed by their
/// rank, so streams of different samples never overlap below this many nodes.
const SAMPLE_SEED_STRIDE: u64 = 1 << 32;

/// Render configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub width: u32,
    pub height: u32,
    /// Jittered samples per pixel. Each one is a full direct and indirect render; the root
    /// averages them.
    pub samples: u32,
    /// Bounce budget of eye rays; global-illumination rays are spawned while it is positive
    pub eye_depth: i32,
    /// Global-illumination rays spawned per eye hit
    pub gi_fan_out: u32,
    /// Near-plane offset for every query, avoids self-intersection
    pub epsilon: f32,
    /// Far distance of the router's bounding-box test
    pub tmax: f32,
    /// Depths closer than this are a tie when compositing
    pub tie_epsilon: f32,
    /// Linear RGB of pixels no node recorded a sample for
    pub background: [f32; 3],
    pub seed: u64,
    pub global_illumination: bool,
    pub termination: Termination,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            samples: 1,
            eye_depth: 2,
            gi_fan_out: 10,
            epsilon: 1e-4,
            tmax: 1e5,
            tie_epsilon: 0.01,
            background: [0.0, 0.0, 0.0],
            seed: 0,
            global_illumination: true,
            termination: Termination::Symmetric,
        }
    }
}

impl TraceConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> TraceResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(TraceError::Config(format!(
                "image size {}x{} has no pixels",
                self.width, self.height
            )));
        }
        if self.samples == 0 {
            return Err(TraceError::Config("samples must be at least 1".into()));
        }
        if !(self.epsilon > 0.0) {
            return Err(TraceError::Config(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if !(self.tmax > self.epsilon) || !self.tmax.is_finite() {
            return Err(TraceError::Config(format!(
                "tmax must be finite and larger than epsilon, got {}",
                self.tmax
            )));
        }
        if !(self.tie_epsilon >= 0.0) {
            return Err(TraceError::Config(format!(
                "tie_epsilon must not be negative, got {}",
                self.tie_epsilon
            )));
        }
        Ok(())
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Base seed of sample `sample`. Sample 0 uses `seed` itself.
    pub fn sample_seed(&self, sample: u32) -> u64 {
        self.seed
            .wrapping_add(u64::from(sample).wrapping_mul(SAMPLE_SEED_STRIDE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TraceConfig =
            serde_json::from_str(r#"{ "width": 64, "termination": "root-broadcast" }"#).unwrap();

        assert_eq!(config.width, 64);
        assert_eq!(config.height, 600);
        assert_eq!(config.termination, Termination::RootBroadcast);
        assert_eq!(config.tie_epsilon, 0.01);
    }

    #[test]
    fn test_validate() {
        assert!(TraceConfig::default().validate().is_ok());

        let empty = TraceConfig {
            width: 0,
            ..TraceConfig::default()
        };
        assert!(matches!(empty.validate(), Err(TraceError::Config(_))));

        let nan_eps = TraceConfig {
            epsilon: f32::NAN,
            ..TraceConfig::default()
        };
        assert!(nan_eps.validate().is_err());

        let no_samples = TraceConfig {
            samples: 0,
            ..TraceConfig::default()
        };
        assert!(matches!(no_samples.validate(), Err(TraceError::Config(_))));
    }

    #[test]
    fn test_sample_seeds() {
        let config = TraceConfig {
            seed: 7,
            ..TraceConfig::default()
        };
        assert_eq!(config.samples, 1);
        assert_eq!(config.sample_seed(0), 7);
        assert_eq!(config.sample_seed(2), 7 + 2 * SAMPLE_SEED_STRIDE);

        let wrapped = TraceConfig {
            seed: u64::MAX,
            ..TraceConfig::default()
        };
        assert_eq!(wrapped.sample_seed(1), SAMPLE_SEED_STRIDE - 1);
    }
}
