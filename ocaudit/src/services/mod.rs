//! Collaborators used by the enrichment pool

pub mod fetcher;
pub mod manifest_parser;
pub mod scorecard_runner;
pub mod scratch;

pub use fetcher::{ArtifactFetcher, ContainerToolFetcher, FetchError, FetchedArtifact, LocalDirectoryFetcher};
pub use manifest_parser::{parse_bundle_dir, BundleManifest, ManifestError};
pub use scorecard_runner::{check_environment, ConformanceError, ConformanceRunner, ScorecardRunner};
pub use scratch::ScratchDir;
