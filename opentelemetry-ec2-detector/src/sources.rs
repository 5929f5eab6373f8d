//! Contracts for the collaborators the detection pipeline is assembled from.
//!
//! Every dependency of [`EnrichedEc2Detector`] is supplied through one of
//! these traits at construction time, never through process-global state, so
//! tests can substitute fakes without cross-test interference. Each trait has
//! a blanket implementation for the matching `Fn` type; a plain closure is a
//! valid collaborator.
//!
//! [`EnrichedEc2Detector`]: crate::detector::EnrichedEc2Detector

use std::collections::HashMap;

use opentelemetry_sdk::Resource;

use crate::detector::{DetectError, EnrichError};
use crate::imds::{ImdsError, InstanceIdentityDocument};

/// A fallible resource detector.
///
/// `Ok(None)` is a valid outcome: the environment was confirmed but produced
/// no attributes. It is distinct from an error, which means the environment
/// could not be confirmed at all.
pub trait Detector {
    /// Runs detection once; nothing is cached across calls.
    fn detect(&self) -> Result<Option<Resource>, DetectError>;
}

impl<F> Detector for F
where
    F: Fn() -> Result<Option<Resource>, DetectError>,
{
    fn detect(&self) -> Result<Option<Resource>, DetectError> {
        self()
    }
}

/// Fetches the instance identity document from the metadata endpoint.
pub trait IdentityDocumentSource {
    /// Retrieves a fresh identity document.
    fn identity_document(&self) -> Result<InstanceIdentityDocument, ImdsError>;
}

impl<F> IdentityDocumentSource for F
where
    F: Fn() -> Result<InstanceIdentityDocument, ImdsError>,
{
    fn identity_document(&self) -> Result<InstanceIdentityDocument, ImdsError> {
        self()
    }
}

/// Resolves the human-readable name tag of an instance.
///
/// There is no error channel: inability to resolve is expressed as an empty
/// string, which the merge rule treats as a no-op contribution.
pub trait NameResolver {
    /// Returns the instance name, or an empty string when it cannot be
    /// determined.
    fn resolve(&self, instance_id: &str, region: &str) -> String;
}

impl<F> NameResolver for F
where
    F: Fn(&str, &str) -> String,
{
    fn resolve(&self, instance_id: &str, region: &str) -> String {
        self(instance_id, region)
    }
}

/// Looks up service-describing attributes (name, namespace, version).
pub trait ServiceDetailSource {
    /// Returns the service attributes as a string mapping; keys map directly
    /// to resource attribute keys.
    fn service_details(&self) -> Result<HashMap<String, String>, EnrichError>;
}

impl<F> ServiceDetailSource for F
where
    F: Fn() -> Result<HashMap<String, String>, EnrichError>,
{
    fn service_details(&self) -> Result<HashMap<String, String>, EnrichError> {
        self()
    }
}

/// Folds additional attributes into an existing resource.
///
/// On failure the caller keeps the resource it passed in; the augmented
/// value is only adopted on success.
pub trait ResourceAugmenter {
    /// Returns a new resource containing `resource` plus the augmenter's
    /// contributions.
    fn augment(&self, resource: &Resource) -> Result<Resource, EnrichError>;
}

impl<F> ResourceAugmenter for F
where
    F: Fn(&Resource) -> Result<Resource, EnrichError>,
{
    fn augment(&self, resource: &Resource) -> Result<Resource, EnrichError> {
        self(resource)
    }
}
