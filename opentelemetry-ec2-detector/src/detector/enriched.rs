//! Enrichment coordinator: the EC2 detector callers actually use.

use opentelemetry::{otel_warn, KeyValue};
use opentelemetry_sdk::resource::ResourceDetector;
use opentelemetry_sdk::Resource;

use super::{DetectError, Ec2ResourceDetector, EnvResourceAugmenter, EnvServiceDetails};
use crate::imds::{ImdsClient, InstanceIdentityDocument};
use crate::resource::{empty_resource, merge_attributes};
use crate::sources::{
    Detector, IdentityDocumentSource, NameResolver, ResourceAugmenter, ServiceDetailSource,
};

/// Attribute key carrying the instance `Name` tag.
pub const AWS_EC2_NAME_TAG: &str = "aws.ec2.tag.name";

/// EC2 detector with best-effort enrichment.
///
/// Runs the base EC2 detector and, when it succeeds, layers additional
/// attributes on top: environment-derived attributes, the instance name tag
/// (when a resolver is configured) and service details. A base detection
/// failure is returned to the caller unchanged and stops the pipeline; a
/// failure in any enrichment step is logged and dropped, never surfaced.
/// Exactly one error can thus come out of [`detect`](Self::detect) per call:
/// the base detector's.
///
/// All collaborators are injected at construction time and the detector
/// holds no mutable state, so a single instance may be used from multiple
/// threads.
pub struct EnrichedEc2Detector {
    base: Box<dyn Detector + Send + Sync>,
    identity_source: Box<dyn IdentityDocumentSource + Send + Sync>,
    name_resolver: Option<Box<dyn NameResolver + Send + Sync>>,
    service_details: Box<dyn ServiceDetailSource + Send + Sync>,
    augmenter: Box<dyn ResourceAugmenter + Send + Sync>,
}

impl EnrichedEc2Detector {
    /// Returns a detector wired to the production collaborators: the IMDS
    /// identity lookup, environment-variable service details and the
    /// `OTEL_RESOURCE_ATTRIBUTES` augmenter.
    ///
    /// Name-tag resolution is disabled by default; enable it with
    /// [`with_name_resolver`](Self::with_name_resolver).
    pub fn new() -> Self {
        let imds = ImdsClient::new();
        Self {
            base: Box::new(Ec2ResourceDetector::with_identity_source(imds.clone())),
            identity_source: Box::new(imds),
            name_resolver: None,
            service_details: Box::new(EnvServiceDetails),
            augmenter: Box::new(EnvResourceAugmenter),
        }
    }

    /// Replaces the base detector.
    pub fn with_base_detector(mut self, base: impl Detector + Send + Sync + 'static) -> Self {
        self.base = Box::new(base);
        self
    }

    /// Replaces the identity lookup used for name-tag resolution.
    pub fn with_identity_source(
        mut self,
        identity_source: impl IdentityDocumentSource + Send + Sync + 'static,
    ) -> Self {
        self.identity_source = Box::new(identity_source);
        self
    }

    /// Enables name-tag enrichment through `name_resolver`.
    pub fn with_name_resolver(
        mut self,
        name_resolver: impl NameResolver + Send + Sync + 'static,
    ) -> Self {
        self.name_resolver = Some(Box::new(name_resolver));
        self
    }

    /// Replaces the service-detail lookup.
    pub fn with_service_details(
        mut self,
        service_details: impl ServiceDetailSource + Send + Sync + 'static,
    ) -> Self {
        self.service_details = Box::new(service_details);
        self
    }

    /// Replaces the environment attribute augmenter.
    pub fn with_augmenter(
        mut self,
        augmenter: impl ResourceAugmenter + Send + Sync + 'static,
    ) -> Self {
        self.augmenter = Box::new(augmenter);
        self
    }

    /// Runs detection.
    ///
    /// Returns the base detector's error verbatim when the EC2 environment
    /// cannot be confirmed; otherwise always `Ok`, carrying whatever
    /// attributes were collectible. `Ok(None)` means the environment was
    /// confirmed but no source contributed anything.
    pub fn detect(&self) -> Result<Option<Resource>, DetectError> {
        let mut current = self.base.detect()?;

        // Environment augmentation is adopted wholesale on success; on
        // failure the pre-augmentation resource is kept and the error goes
        // to the internal logs only.
        let seed = current.clone().unwrap_or_else(empty_resource);
        match self.augmenter.augment(&seed) {
            Ok(augmented) => current = Some(augmented),
            Err(err) => {
                otel_warn!(name: "Ec2Detector.EnvAugmentationFailed", reason = err.to_string());
            }
        }

        if let Some(resolver) = &self.name_resolver {
            // A failed identity lookup degrades to an empty document; the
            // resolver then answers with an empty name, a no-op.
            let document = self.identity_source.identity_document().unwrap_or_else(|err| {
                otel_warn!(name: "Ec2Detector.IdentityLookupFailed", reason = err.to_string());
                InstanceIdentityDocument::default()
            });
            let name = resolver.resolve(&document.instance_id, &document.region);
            if !name.is_empty() {
                current = Some(merge_attributes(
                    current.as_ref(),
                    [KeyValue::new(AWS_EC2_NAME_TAG, name)],
                ));
            }
        }

        match self.service_details.service_details() {
            Ok(details) if !details.is_empty() => {
                let attributes = details
                    .into_iter()
                    .map(|(key, value)| KeyValue::new(key, value));
                current = Some(merge_attributes(current.as_ref(), attributes));
            }
            Ok(_) => {}
            Err(err) => {
                otel_warn!(name: "Ec2Detector.ServiceDetailsFailed", reason = err.to_string());
            }
        }

        Ok(current)
    }
}

impl Default for EnrichedEc2Detector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnrichedEc2Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichedEc2Detector")
            .field("name_resolver", &self.name_resolver.is_some())
            .finish_non_exhaustive()
    }
}

impl Detector for EnrichedEc2Detector {
    fn detect(&self) -> Result<Option<Resource>, DetectError> {
        EnrichedEc2Detector::detect(self)
    }
}

/// SDK integration: detection failures and absence both collapse to an
/// empty resource, since the SDK contract has no error channel.
impl ResourceDetector for EnrichedEc2Detector {
    fn detect(&self) -> Resource {
        match EnrichedEc2Detector::detect(self) {
            Ok(Some(resource)) => resource,
            Ok(None) => empty_resource(),
            Err(err) => {
                otel_warn!(name: "Ec2Detector.DetectionFailed", reason = err.to_string());
                empty_resource()
            }
        }
    }
}
