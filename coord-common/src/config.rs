//! Command-line / environment configuration for the coordinator daemon, modeled on the
//! reference compute-node's `ComputeNodeOpts`: every field is overridable by an
//! environment variable and an optional TOML overlay.

use clap::Parser;
use serde::Deserialize;

/// Default bound on the dispatch worker pool used to fan out `ExecPlanFragment` RPCs,
/// matching the reference scheduler's `TASK_SCHEDULING_PARALLELISM`.
pub const DEFAULT_DISPATCH_PARALLELISM: usize = 10;

#[derive(Parser, Clone, Debug)]
#[command(name = "coordinatord", about = "Distributed analytical query coordinator")]
pub struct CoordinatorOpts {
    /// Address this coordinator's RPC server listens on.
    #[arg(long, env = "COORD_LISTEN_ADDR", default_value = "127.0.0.1:6090")]
    pub listen_addr: String,

    /// Address advertised to backends as the destination for exchange data and
    /// `UpdateFragmentExecStatus` callbacks. Defaults to `listen_addr` if unset.
    #[arg(long, env = "COORD_ADVERTISE_ADDR")]
    pub advertise_addr: Option<String>,

    /// Upper bound on concurrent in-flight `ExecPlanFragment` RPCs during dispatch.
    #[arg(
        long,
        env = "COORD_DISPATCH_PARALLELISM",
        default_value_t = DEFAULT_DISPATCH_PARALLELISM
    )]
    pub dispatch_parallelism: usize,

    /// Path to an optional TOML file overlaying the defaults above. Empty disables it.
    #[arg(long, env = "COORD_CONFIG_PATH", default_value = "")]
    pub config_path: String,

    /// Verbosity: 0 = query level, 1 = + file level, 2 = + row level.
    #[arg(long, env = "COORD_VERBOSE_LEVEL", default_value_t = 0)]
    pub verbose_level: u8,
}

/// The subset of [`CoordinatorOpts`] that may additionally be supplied via a TOML file
/// pointed to by `config_path`. CLI/env values always take precedence when present;
/// the overlay only fills in values the user left at the clap default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverlay {
    pub dispatch_parallelism: Option<usize>,
    pub verbose_level: Option<u8>,
}

impl CoordinatorOpts {
    /// Loads `config_path` (if non-empty) and applies any fields it sets, without
    /// clobbering a value the operator explicitly passed on the command line is left
    /// as a documented limitation: clap does not expose "was this explicit" per-field,
    /// so the overlay always wins over the built-in default. This matches the
    /// reference's `OverrideConfigOpts` pattern of file-then-flag layering.
    pub fn load_overlay(&mut self) -> anyhow::Result<()> {
        if self.config_path.is_empty() {
            return Ok(());
        }
        let contents = std::fs::read_to_string(&self.config_path)?;
        let overlay: ConfigOverlay = toml::from_str(&contents)?;
        if let Some(p) = overlay.dispatch_parallelism {
            self.dispatch_parallelism = p;
        }
        if let Some(v) = overlay.verbose_level {
            self.verbose_level = v;
        }
        Ok(())
    }

    pub fn resolved_advertise_addr(&self) -> String {
        self.advertise_addr
            .clone()
            .unwrap_or_else(|| self.listen_addr.clone())
    }
}

/// Panics (after logging) on an invalid configuration, mirroring the reference
/// `validate_opts`: these are startup-time operator errors, not recoverable runtime
/// conditions.
pub fn validate_opts(opts: &CoordinatorOpts) {
    if opts.dispatch_parallelism == 0 {
        let msg = "dispatch_parallelism must not be zero";
        tracing::error!(msg);
        panic!("{msg}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn overlay_fills_in_unset_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dispatch_parallelism = 42").unwrap();
        let mut opts = CoordinatorOpts::parse_from(["coordinatord"]);
        opts.config_path = file.path().to_str().unwrap().to_string();
        opts.load_overlay().unwrap();
        assert_eq!(opts.dispatch_parallelism, 42);
    }

    #[test]
    fn advertise_addr_defaults_to_listen_addr() {
        let opts = CoordinatorOpts::parse_from(["coordinatord", "--listen-addr", "10.0.0.1:9000"]);
        assert_eq!(opts.resolved_advertise_addr(), "10.0.0.1:9000");
    }
}
