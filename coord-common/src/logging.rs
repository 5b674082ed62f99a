//! Structured logging setup. The spec's three verbosity tiers (query/file/row) map onto
//! `tracing` levels info/debug/trace.

use tracing_subscriber::EnvFilter;

pub fn init_logging(verbose_level: u8) {
    let default_directive = match verbose_level {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
