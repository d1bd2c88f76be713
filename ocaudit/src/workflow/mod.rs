//! Audit pipeline: enrichment, model building and run orchestration

pub mod enrichment;
pub mod model_builder;
pub mod orchestrator;
pub mod worker_pool;

pub use enrichment::{BundleEnricher, EnrichedBundle, LabelFilter, ManifestFacts};
pub use model_builder::{build, AuditModel};
pub use orchestrator::{audit_catalog, AuditOrchestrator};
pub use worker_pool::WorkerPool;
