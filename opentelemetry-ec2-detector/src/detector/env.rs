//! Environment-derived attribute sources.

use std::collections::HashMap;
use std::env;

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions as semconv;

use super::EnrichError;
use crate::resource::merge_attributes;
use crate::sources::{ResourceAugmenter, ServiceDetailSource};

const OTEL_RESOURCE_ATTRIBUTES: &str = "OTEL_RESOURCE_ATTRIBUTES";
const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
const OTEL_SERVICE_NAMESPACE: &str = "OTEL_SERVICE_NAMESPACE";
const OTEL_SERVICE_VERSION: &str = "OTEL_SERVICE_VERSION";

/// Augments a resource with attributes parsed from
/// `OTEL_RESOURCE_ATTRIBUTES` (`key=value` pairs, comma-separated).
///
/// An unset or empty variable leaves the resource unchanged. A malformed
/// entry fails the whole augmentation; no partial merge takes place.
#[derive(Debug, Default)]
pub struct EnvResourceAugmenter;

impl ResourceAugmenter for EnvResourceAugmenter {
    fn augment(&self, resource: &Resource) -> Result<Resource, EnrichError> {
        let raw = match env::var(OTEL_RESOURCE_ATTRIBUTES) {
            Ok(raw) if !raw.is_empty() => raw,
            _ => return Ok(resource.clone()),
        };

        let mut attributes = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| EnrichError::InvalidAttribute(entry.to_owned()))?;
            if key.is_empty() {
                return Err(EnrichError::InvalidAttribute(entry.to_owned()));
            }
            attributes.push(KeyValue::new(key.to_owned(), value.to_owned()));
        }

        Ok(merge_attributes(Some(resource), attributes))
    }
}

/// Service-describing attributes read from the standard OpenTelemetry
/// environment variables.
///
/// Unset or empty variables contribute nothing.
#[derive(Debug, Default)]
pub struct EnvServiceDetails;

impl ServiceDetailSource for EnvServiceDetails {
    fn service_details(&self) -> Result<HashMap<String, String>, EnrichError> {
        let mappings = [
            (OTEL_SERVICE_NAME, semconv::resource::SERVICE_NAME),
            (OTEL_SERVICE_NAMESPACE, semconv::resource::SERVICE_NAMESPACE),
            (OTEL_SERVICE_VERSION, semconv::resource::SERVICE_VERSION),
        ];

        let mut details = HashMap::new();
        for (var, key) in mappings {
            match env::var(var) {
                Ok(value) if !value.is_empty() => {
                    details.insert(key.to_owned(), value);
                }
                _ => {}
            }
        }
        Ok(details)
    }
}
