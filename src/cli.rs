//! The `guardduty-azure-ingest` CLI surface, per `SPEC_FULL.md` §12. All
//! four subcommands build and drive the same [`ingest_pipeline::Controller`]
//! (C10); they differ only in how `ObjectRef`s are supplied.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::telemetry::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "guardduty-azure-ingest", about = "GuardDuty-to-Azure-Monitor-Logs ingestion engine")]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, short = 'c', global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    #[arg(long, global = true, value_enum, default_value = "human")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Long-running daemon: polls the source continuously until a shutdown
    /// signal fires.
    Serve,
    /// Lists the source exactly once, drains the resulting objects through
    /// the pipeline, and exits. Suited to a scheduled/cron invocation.
    RunOnce,
    /// Reads `bucket/key` references as JSON lines on stdin and processes
    /// exactly those objects. Suited to embedding behind an external event
    /// handler (e.g. an S3 event notification).
    HandleEvent,
    /// Prints the current health report as JSON; exits non-zero when the
    /// status is `unhealthy`.
    Healthcheck,
}
