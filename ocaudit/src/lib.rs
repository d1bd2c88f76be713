//! ocaudit library interface
//!
//! Operator catalog compliance audit: reads a catalog (relational or
//! declarative), enriches every bundle from its artifact, builds the canonical
//! audit model and classifies packages by deprecated API usage.

pub mod catalog;
pub mod classify;
pub mod error;
pub mod report;
pub mod services;
pub mod validators;
pub mod workflow;

pub use crate::catalog::{CatalogFormat, CatalogSnapshot, CatalogSource};
pub use crate::classify::{classify, Classification, ComplianceTier, PackageCompliance};
pub use crate::error::{AuditError, AuditResult};
pub use crate::report::AuditReport;
pub use crate::workflow::{AuditModel, AuditOrchestrator};
