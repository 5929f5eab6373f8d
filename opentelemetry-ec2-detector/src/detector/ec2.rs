//! Base EC2 resource detector.

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions as semconv;

use super::DetectError;
use crate::imds::ImdsClient;
use crate::resource::merge_attributes;
use crate::sources::{Detector, IdentityDocumentSource};

/// Attribute key for the instance private IP. There is no resource semantic
/// convention for it yet.
pub const HOST_IP: &str = "host.ip";

/// Resource detector that confirms and describes the EC2 environment.
///
/// Detection succeeds only when the instance identity document can be
/// fetched; an unreachable metadata endpoint means the process cannot be
/// confirmed to run on EC2 and is reported as a [`DetectError`]. Document
/// fields that come back empty are omitted from the resource.
#[derive(Debug)]
pub struct Ec2ResourceDetector<S = ImdsClient> {
    identity_source: S,
}

impl Ec2ResourceDetector<ImdsClient> {
    /// Returns a detector backed by the standard metadata endpoint.
    pub fn new() -> Self {
        Self {
            identity_source: ImdsClient::new(),
        }
    }
}

impl Default for Ec2ResourceDetector<ImdsClient> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: IdentityDocumentSource> Ec2ResourceDetector<S> {
    /// Returns a detector reading identity documents from `identity_source`.
    pub fn with_identity_source(identity_source: S) -> Self {
        Self { identity_source }
    }
}

impl<S: IdentityDocumentSource> Detector for Ec2ResourceDetector<S> {
    fn detect(&self) -> Result<Option<Resource>, DetectError> {
        let document = self.identity_source.identity_document()?;

        let attributes = [
            KeyValue::new(semconv::resource::CLOUD_PROVIDER, "aws"),
            KeyValue::new(semconv::resource::CLOUD_PLATFORM, "aws_ec2"),
            KeyValue::new(semconv::resource::CLOUD_REGION, document.region),
            KeyValue::new(semconv::resource::CLOUD_ACCOUNT_ID, document.account_id),
            KeyValue::new(
                semconv::resource::CLOUD_AVAILABILITY_ZONE,
                document.availability_zone,
            ),
            KeyValue::new(semconv::resource::HOST_ID, document.instance_id),
            KeyValue::new(semconv::resource::HOST_IMAGE_ID, document.image_id),
            KeyValue::new(semconv::resource::HOST_TYPE, document.instance_type),
            KeyValue::new(semconv::resource::HOST_ARCH, document.architecture),
            KeyValue::new(HOST_IP, document.private_ip),
        ];

        // merge_attributes drops empty-valued entries, so fields absent from
        // the document never show up as empty attributes.
        Ok(Some(merge_attributes(None, attributes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imds::{ImdsError, InstanceIdentityDocument};
    use opentelemetry::Key;

    fn full_document() -> InstanceIdentityDocument {
        InstanceIdentityDocument {
            private_ip: "10.158.112.84".to_owned(),
            instance_id: "i-1234567890abcdef0".to_owned(),
            region: "us-west-2".to_owned(),
            account_id: "123456789012".to_owned(),
            availability_zone: "us-west-2b".to_owned(),
            image_id: "ami-5fb8c835".to_owned(),
            instance_type: "t2.micro".to_owned(),
            architecture: "x86_64".to_owned(),
        }
    }

    #[test]
    fn detects_instance_attributes() {
        let detector =
            Ec2ResourceDetector::with_identity_source(|| Ok::<_, ImdsError>(full_document()));

        let resource = detector.detect().unwrap().unwrap();

        assert_eq!(
            resource.get(&Key::from_static_str(semconv::resource::CLOUD_PROVIDER)),
            Some("aws".into())
        );
        assert_eq!(
            resource.get(&Key::from_static_str(semconv::resource::CLOUD_PLATFORM)),
            Some("aws_ec2".into())
        );
        assert_eq!(
            resource.get(&Key::from_static_str(semconv::resource::CLOUD_REGION)),
            Some("us-west-2".into())
        );
        assert_eq!(
            resource.get(&Key::from_static_str(semconv::resource::HOST_ID)),
            Some("i-1234567890abcdef0".into())
        );
        assert_eq!(
            resource.get(&Key::from_static_str(HOST_IP)),
            Some("10.158.112.84".into())
        );
        assert_eq!(resource.len(), 10);
    }

    #[test]
    fn empty_document_fields_are_omitted() {
        let detector = Ec2ResourceDetector::with_identity_source(|| {
            Ok::<_, ImdsError>(InstanceIdentityDocument {
                private_ip: "10.0.0.1".to_owned(),
                ..InstanceIdentityDocument::default()
            })
        });

        let resource = detector.detect().unwrap().unwrap();

        // provider, platform and the private IP; nothing else was known.
        assert_eq!(resource.len(), 3);
        assert_eq!(
            resource.get(&Key::from_static_str(semconv::resource::HOST_ID)),
            None
        );
    }

    #[test]
    fn identity_failure_is_fatal() {
        let detector = Ec2ResourceDetector::with_identity_source(|| {
            Err::<InstanceIdentityDocument, _>(ImdsError::Response(401, "Unauthorized".to_owned()))
        });

        let err = detector.detect().unwrap_err();

        assert!(matches!(
            err,
            DetectError::Identity(ImdsError::Response(401, _))
        ));
    }
}
