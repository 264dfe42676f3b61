//! C8: Sink Client — POSTs batches to the Azure Monitor Logs Ingestion API.
//! See `spec.md` §4.8.

mod azure_monitor_logs;

pub use azure_monitor_logs::AzureMonitorLogsSink;
