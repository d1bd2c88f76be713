//! Static bundle validators
//!
//! Each validator inspects a parsed [`BundleManifest`] and reports findings as
//! [`ValidatorMessage`]s. Findings are facts about the bundle; a validator that
//! cannot run at all returns a [`ValidatorError`], which the enrichment worker
//! records as a `validate`-stage bundle error.
//!
//! # Validators
//! 1. **deprecated_api_validator** - objects using APIs removed in Kubernetes 1.22
//! 2. **csv_validator** - ClusterServiceVersion identity and version
//! 3. **operatorhub_validator** - OperatorHub listing metadata

pub mod csv_validator;
pub mod deprecated_api_validator;
pub mod operatorhub_validator;

pub use csv_validator::CsvValidator;
pub use deprecated_api_validator::DeprecatedApiValidator;
pub use operatorhub_validator::OperatorHubValidator;

use crate::services::manifest_parser::BundleManifest;
use ocaudit_common::models::{MessageLevel, ValidatorMessage};
use thiserror::Error;

/// Validator could not evaluate the bundle
#[derive(Debug, Error)]
#[error("{validator}: {message}")]
pub struct ValidatorError {
    pub validator: String,
    pub message: String,
}

impl ValidatorError {
    pub fn new(validator: &str, message: impl Into<String>) -> Self {
        Self {
            validator: validator.to_string(),
            message: message.into(),
        }
    }
}

/// Static check over a parsed manifest set
pub trait BundleValidator: Send + Sync {
    /// Validator name recorded on each message
    fn name(&self) -> &'static str;

    fn validate(&self, manifest: &BundleManifest) -> Result<Vec<ValidatorMessage>, ValidatorError>;

    fn warning(&self, message: impl Into<String>) -> ValidatorMessage
    where
        Self: Sized,
    {
        ValidatorMessage {
            validator: self.name().to_string(),
            level: MessageLevel::Warning,
            message: message.into(),
        }
    }

    fn error(&self, message: impl Into<String>) -> ValidatorMessage
    where
        Self: Sized,
    {
        ValidatorMessage {
            validator: self.name().to_string(),
            level: MessageLevel::Error,
            message: message.into(),
        }
    }
}

/// Findings and failures from running every validator once
#[derive(Debug, Default)]
pub struct SuiteOutcome {
    pub messages: Vec<ValidatorMessage>,
    pub failures: Vec<ValidatorError>,
}

/// Ordered set of validators run against every bundle
pub struct ValidatorSuite {
    validators: Vec<Box<dyn BundleValidator>>,
}

impl ValidatorSuite {
    pub fn new(validators: Vec<Box<dyn BundleValidator>>) -> Self {
        Self { validators }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Run every validator; one failing validator does not stop the others
    pub fn run(&self, manifest: &BundleManifest) -> SuiteOutcome {
        let mut outcome = SuiteOutcome::default();
        for validator in &self.validators {
            match validator.validate(manifest) {
                Ok(messages) => outcome.messages.extend(messages),
                Err(e) => outcome.failures.push(e),
            }
        }
        outcome
    }
}

impl Default for ValidatorSuite {
    fn default() -> Self {
        Self::new(vec![
            Box::new(DeprecatedApiValidator),
            Box::new(CsvValidator),
            Box::new(OperatorHubValidator),
        ])
    }
}

impl std::fmt::Debug for ValidatorSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.validators.iter().map(|v| v.name()).collect();
        f.debug_struct("ValidatorSuite").field("validators", &names).finish()
    }
}
