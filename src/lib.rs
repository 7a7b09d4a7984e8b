// src/lib.rs
// Public library surface for the `kona-run` binary and integration tests.

pub mod config;
pub mod error;
pub mod source_weights;

// Feed adapters and normalization
pub mod ingest;

// Clustering, corroboration scoring, fact synthesis
pub mod analyze;

// Providers, orchestration, publication ledger
pub mod generate;
pub mod publish;

pub mod artifacts;
pub mod metrics;
pub mod report;
pub mod run;

// ---- Re-exports for stable public API ----
pub use crate::analyze::{ValidatedStory, ValidationParams};
pub use crate::config::PipelineConfig;
pub use crate::error::{ConfigError, ErrorKind};
pub use crate::generate::{GeneratedArticle, GenerationProvider};
pub use crate::publish::{PublicationLedger, PublicationRecord};
pub use crate::report::RunReport;
pub use crate::run::{run_entries, run_pipeline, RunContext, RunOutcome};
