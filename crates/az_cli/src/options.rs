use std::path::PathBuf;

use az_tracer::{Termination, TraceConfig};
use clap::{ArgAction, Parser, ValueEnum};

/// Render a built-in scene split across in-process nodes that route rays to each other.
#[derive(Parser, Debug)]
#[command(name = "azurender", version, about)]
pub struct Options {
    /// JSON render configuration; the flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of nodes to split the scene across
    #[arg(short, long, default_value_t = 4)]
    pub nodes: usize,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    /// Jittered samples per pixel, averaged
    #[arg(short = 'p', long)]
    pub samples: Option<u32>,

    /// Output image; the format follows the extension
    #[arg(short, long, default_value = "render.png")]
    pub output: PathBuf,

    /// Built-in scene (slabs, spheres)
    #[arg(short, long, default_value = "slabs")]
    pub scene: String,

    /// How nodes agree a pass is finished
    #[arg(long, value_enum)]
    pub termination: Option<TerminationArg>,

    /// Global-illumination rays per eye hit
    #[arg(long)]
    pub gi_fan_out: Option<u32>,

    /// Bounce budget of eye rays
    #[arg(long)]
    pub depth: Option<i32>,

    /// Direct lighting only
    #[arg(long)]
    pub no_gi: bool,

    #[arg(long)]
    pub seed: Option<u64>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationArg {
    Symmetric,
    RootBroadcast,
}

impl From<TerminationArg> for Termination {
    fn from(arg: TerminationArg) -> Self {
        match arg {
            TerminationArg::Symmetric => Termination::Symmetric,
            TerminationArg::RootBroadcast => Termination::RootBroadcast,
        }
    }
}

impl Options {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply(&self, config: &mut TraceConfig) {
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(samples) = self.samples {
            config.samples = samples;
        }
        if let Some(termination) = self.termination {
            config.termination = termination.into();
        }
        if let Some(fan_out) = self.gi_fan_out {
            config.gi_fan_out = fan_out;
        }
        if let Some(depth) = self.depth {
            config.eye_depth = depth;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.no_gi {
            config.global_illumination = false;
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_leave_config_alone() {
        let options = Options::try_parse_from(["azurender"]).unwrap();
        let mut config = TraceConfig::default();
        options.apply(&mut config);

        assert_eq!(config, TraceConfig::default());
        assert_eq!(options.nodes, 4);
        assert_eq!(options.output, PathBuf::from("render.png"));
        assert_eq!(options.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn test_overrides() {
        let options = Options::try_parse_from([
            "azurender",
            "--nodes",
            "2",
            "--width",
            "64",
            "--height",
            "48",
            "--samples",
            "8",
            "--termination",
            "root-broadcast",
            "--gi-fan-out",
            "4",
            "--depth",
            "1",
            "--no-gi",
            "--seed",
            "9",
            "-vv",
        ])
        .unwrap();
        let mut config = TraceConfig::default();
        options.apply(&mut config);

        assert_eq!(options.nodes, 2);
        assert_eq!((config.width, config.height), (64, 48));
        assert_eq!(config.samples, 8);
        assert_eq!(config.termination, Termination::RootBroadcast);
        assert_eq!(config.gi_fan_out, 4);
        assert_eq!(config.eye_depth, 1);
        assert!(!config.global_illumination);
        assert_eq!(config.seed, 9);
        assert_eq!(options.log_level(), log::LevelFilter::Trace);
    }

    #[test]
    fn test_zero_samples_fails_validation() {
        let options = Options::try_parse_from(["azurender", "-p", "0"]).unwrap();
        let mut config = TraceConfig::default();
        options.apply(&mut config);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_termination() {
        assert!(Options::try_parse_from(["azurender", "--termination", "count-matching"]).is_err());
    }
}
