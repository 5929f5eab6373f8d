//! EC2 resource detection pipeline.
//!
//! - [`Ec2ResourceDetector`] - confirms the EC2 environment and describes
//!   the instance from its identity document.
//! - [`EnrichedEc2Detector`] - wraps the base detector and layers
//!   best-effort enrichment (name tag, service details, environment
//!   attributes) on top.
//! - [`EnvResourceAugmenter`] / [`EnvServiceDetails`] - environment-derived
//!   attribute sources.

mod ec2;
mod enriched;
mod env;

pub use ec2::{Ec2ResourceDetector, HOST_IP};
pub use enriched::{EnrichedEc2Detector, AWS_EC2_NAME_TAG};
pub use env::{EnvResourceAugmenter, EnvServiceDetails};

use thiserror::Error;

use crate::imds::ImdsError;

/// Fatal detection error: the EC2 environment could not be confirmed.
///
/// This is the only error [`EnrichedEc2Detector::detect`] ever surfaces; it
/// is propagated from the base detector unchanged. Enrichment failures are
/// absorbed where they occur.
#[derive(Error, Debug)]
pub enum DetectError {
    /// The instance identity document could not be retrieved.
    #[error("failed to retrieve instance identity document: {0}")]
    Identity(#[from] ImdsError),
    /// An injected base detector failed.
    #[error("{0}")]
    Detector(String),
}

/// Error produced by an enrichment source.
///
/// Never visible to callers of the detection pipeline; the coordinator logs
/// it and keeps the resource it had.
#[derive(Error, Debug)]
pub enum EnrichError {
    /// A resource attribute entry could not be parsed.
    #[error("invalid resource attribute entry `{0}`")]
    InvalidAttribute(String),
    /// An injected enrichment source failed.
    #[error("{0}")]
    Source(String),
}
