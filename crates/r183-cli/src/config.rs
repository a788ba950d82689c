//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use r183_core::{LineTerminator, Repeat, ReplayOptions};
use serde::{Deserialize, Serialize};

use crate::cli::PlayArgs;

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Line ending written after each sentence.
    pub terminator: LineTerminator,
    /// Pause between consecutive sources, in milliseconds.
    pub inter_source_delay_ms: u64,
    /// Passes over the source list.
    pub loops: Repeat,
    /// Skip sources without timestamped data instead of failing.
    pub skip_empty: bool,
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (REPLAY183_*)
        figment = figment.merge(Env::prefixed("REPLAY183_"));

        figment.extract()
    }

    /// Applies explicit `play` flags on top of the loaded values.
    pub fn apply_play_args(&mut self, args: &PlayArgs) {
        if args.crlf {
            self.terminator = LineTerminator::CrLf;
        }
        if let Some(delay) = args.delay {
            self.inter_source_delay_ms = delay;
        }
        if let Some(loops) = args.loops {
            self.loops = loops;
        }
        if args.skip_empty {
            self.skip_empty = true;
        }
    }

    pub fn replay_options(&self) -> ReplayOptions {
        ReplayOptions {
            terminator: self.terminator,
            inter_source_delay: Duration::from_millis(self.inter_source_delay_ms),
            repeat: self.loops,
            skip_empty: self.skip_empty,
        }
    }
}

/// Returns the platform-specific config directory for replay183.
///
/// On Linux: `~/.config/replay183`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("replay183"))
}
