//! Domain types, error taxonomy, configuration, and narrow component traits
//! shared by every stage of the GuardDuty-to-Azure ingestion engine.

pub mod batch;
pub mod config;
pub mod error;
pub mod finding;
pub mod object_ref;
pub mod token;
pub mod traits;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use batch::{Batch, BatchId, BatchStatus};
pub use error::IngestError;
pub use finding::{Finding, TargetRecord};
pub use object_ref::ObjectRef;
pub use token::Token;
