//! Structured logging setup, per `SPEC_FULL.md` §11. Metrics use the
//! `metrics` crate's global recorder; this binary installs none by default
//! — the exporter choice is an ambient, swappable concern left to the
//! deployment environment, matching `spec.md` §1's scope boundary.

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Human,
    Json,
}

pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Human => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}
