//! # ocaudit Common Library
//!
//! Shared code for the ocaudit workspace including:
//! - Canonical audit model (packages, channels, bundles)
//! - Audit configuration and TOML bootstrap loading
//! - Platform version rules (deprecated API removal boundary, mitigation signals)
//! - Semantic version validation

pub mod config;
pub mod error;
pub mod models;
pub mod platform;
pub mod version;

pub use config::AuditConfig;
pub use error::{Error, Result};
