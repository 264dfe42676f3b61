//! The `guardduty-azure-ingest` binary's own surface: CLI parsing, telemetry
//! setup, and the three entry points that drive `ingest_pipeline::Controller`.
//! The C1–C10 engine itself lives in the `ingest-core`/`ingest-pipeline`
//! workspace members; this crate only assembles and runs it.

pub mod cli;
pub mod entrypoints;
pub mod telemetry;
