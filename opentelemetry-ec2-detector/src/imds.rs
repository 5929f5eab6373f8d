//! Blocking client for the EC2 instance metadata service (IMDSv2).
//!
//! Every request authenticates with a session token obtained from the token
//! endpoint; tokens are requested per call and never cached, matching the
//! once-per-detection lifecycle of the documents they guard.

use std::time::Duration;

use opentelemetry::otel_debug;
use serde::Deserialize;
use thiserror::Error;

use crate::sources::{IdentityDocumentSource, NameResolver};

/// Default base URL of the instance metadata service.
pub const DEFAULT_IMDS_BASE_URL: &str = "http://169.254.169.254";

const TOKEN_PATH: &str = "/latest/api/token";
const IDENTITY_DOCUMENT_PATH: &str = "/latest/dynamic/instance-identity/document";
const NAME_TAG_PATH: &str = "/latest/meta-data/tags/instance/Name";

const TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
const TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";

const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(10);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors raised while talking to the instance metadata service.
#[derive(Error, Debug)]
pub enum ImdsError {
    /// The metadata endpoint could not be reached.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The metadata endpoint answered outside the 2xx range.
    #[error("unexpected status {0}: {1}")]
    Response(u16, String),
    /// The identity document payload could not be parsed.
    #[error("invalid instance identity document: {0}")]
    Document(#[from] serde_json::Error),
}

/// Instance identity document as served by the metadata endpoint.
///
/// Fields missing from the payload deserialize to empty strings; consumers
/// treat an empty field as "not available" rather than an error.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceIdentityDocument {
    /// Private IPv4 address of the instance.
    pub private_ip: String,
    /// EC2 instance id.
    pub instance_id: String,
    /// Region the instance runs in.
    pub region: String,
    /// Account that owns the instance.
    pub account_id: String,
    /// Availability zone of the instance.
    pub availability_zone: String,
    /// AMI the instance was launched from.
    pub image_id: String,
    /// Instance type, e.g. `t2.micro`.
    pub instance_type: String,
    /// CPU architecture.
    pub architecture: String,
}

/// IMDSv2 client with per-request timeouts.
///
/// The base URL is overridable so tests can point the client at a local
/// mock server.
#[derive(Debug, Clone)]
pub struct ImdsClient {
    http_client: reqwest::blocking::Client,
    base_url: String,
    token_ttl: Duration,
    timeout: Duration,
}

impl ImdsClient {
    /// Returns a client against the standard metadata endpoint.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_IMDS_BASE_URL)
    }

    /// Returns a client against `base_url` instead of the standard endpoint.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::blocking::Client::new(),
            base_url: base_url.into(),
            token_ttl: DEFAULT_TOKEN_TTL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the TTL requested for session tokens.
    pub fn with_token_ttl(mut self, token_ttl: Duration) -> Self {
        self.token_ttl = token_ttl;
        self
    }

    fn token(&self) -> Result<String, ImdsError> {
        let response = self
            .http_client
            .put(format!("{}{}", self.base_url, TOKEN_PATH))
            .header(TOKEN_TTL_HEADER, self.token_ttl.as_secs().to_string())
            .timeout(self.timeout)
            .send()?;
        Self::ensure_success(&response)?;
        Ok(response.text()?)
    }

    fn get(&self, path: &str) -> Result<reqwest::blocking::Response, ImdsError> {
        let token = self.token()?;
        let response = self
            .http_client
            .get(format!("{}{}", self.base_url, path))
            .header(TOKEN_HEADER, token)
            .timeout(self.timeout)
            .send()?;
        Self::ensure_success(&response)?;
        Ok(response)
    }

    fn ensure_success(response: &reqwest::blocking::Response) -> Result<(), ImdsError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ImdsError::Response(
                status.as_u16(),
                status.canonical_reason().unwrap_or_default().to_string(),
            ));
        }
        Ok(())
    }

    /// Fetches and parses the instance identity document.
    pub fn identity_document(&self) -> Result<InstanceIdentityDocument, ImdsError> {
        let response = self.get(IDENTITY_DOCUMENT_PATH)?;
        let document = serde_json::from_slice(&response.bytes()?)?;
        Ok(document)
    }

    /// Fetches the instance `Name` tag.
    ///
    /// Requires instance-metadata tag access to be enabled on the instance;
    /// the endpoint answers 404 otherwise.
    pub fn name_tag(&self) -> Result<String, ImdsError> {
        let response = self.get(NAME_TAG_PATH)?;
        Ok(response.text()?)
    }
}

impl Default for ImdsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityDocumentSource for ImdsClient {
    fn identity_document(&self) -> Result<InstanceIdentityDocument, ImdsError> {
        ImdsClient::identity_document(self)
    }
}

/// Resolves the instance name tag through the metadata service.
///
/// Instance id and region are already encoded in the endpoint the client
/// talks to, so both arguments of the [`NameResolver`] contract are unused
/// here. Any lookup failure resolves to an empty string.
#[derive(Debug, Clone, Default)]
pub struct ImdsNameResolver {
    client: ImdsClient,
}

impl ImdsNameResolver {
    /// Returns a resolver against the standard metadata endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a resolver using `client`.
    pub fn with_client(client: ImdsClient) -> Self {
        Self { client }
    }
}

impl NameResolver for ImdsNameResolver {
    fn resolve(&self, _instance_id: &str, _region: &str) -> String {
        match self.client.name_tag() {
            Ok(name) => name,
            Err(err) => {
                otel_debug!(name: "Ec2Detector.NameTagLookupFailed", reason = err.to_string());
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;

    const IDENTITY_DOCUMENT_BODY: &str = r#"
    {
        "devpayProductCodes" : null,
        "marketplaceProductCodes" : [ "1abc2defghijklm3nopqrs4tu" ],
        "availabilityZone" : "us-west-2b",
        "privateIp" : "10.158.112.84",
        "version" : "2017-09-30",
        "instanceId" : "i-1234567890abcdef0",
        "billingProducts" : null,
        "instanceType" : "t2.micro",
        "accountId" : "123456789012",
        "imageId" : "ami-5fb8c835",
        "pendingTime" : "2016-11-19T16:32:11Z",
        "architecture" : "x86_64",
        "kernelId" : null,
        "ramdiskId" : null,
        "region" : "us-west-2"
    }
    "#;

    fn client_for(server: &MockServer) -> ImdsClient {
        ImdsClient::with_base_url(server.base_url())
    }

    #[test]
    fn fetches_identity_document_with_token() {
        let server = MockServer::start();
        let token_mock = server.mock(|when, then| {
            when.method("PUT")
                .path("/latest/api/token")
                .header(TOKEN_TTL_HEADER, "10");
            then.status(200).body("test-token");
        });
        let document_mock = server.mock(|when, then| {
            when.method("GET")
                .path("/latest/dynamic/instance-identity/document")
                .header(TOKEN_HEADER, "test-token");
            then.status(200).body(IDENTITY_DOCUMENT_BODY);
        });

        let document = client_for(&server).identity_document().unwrap();

        assert_eq!(document.instance_id, "i-1234567890abcdef0");
        assert_eq!(document.private_ip, "10.158.112.84");
        assert_eq!(document.region, "us-west-2");
        assert_eq!(document.account_id, "123456789012");
        assert_eq!(document.availability_zone, "us-west-2b");
        assert_eq!(document.instance_type, "t2.micro");
        token_mock.assert_hits(1);
        document_mock.assert_hits(1);
    }

    #[test]
    fn missing_fields_deserialize_to_empty() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("PUT").path("/latest/api/token");
            then.status(200).body("test-token");
        });
        server.mock(|when, then| {
            when.method("GET")
                .path("/latest/dynamic/instance-identity/document");
            then.status(200).body(r#"{"privateIp": "10.0.0.1"}"#);
        });

        let document = client_for(&server).identity_document().unwrap();

        assert_eq!(document.private_ip, "10.0.0.1");
        assert_eq!(document.instance_id, "");
        assert_eq!(document.region, "");
    }

    #[test]
    fn unsuccessful_document_response_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("PUT").path("/latest/api/token");
            then.status(200).body("test-token");
        });
        server.mock(|when, then| {
            when.method("GET")
                .path("/latest/dynamic/instance-identity/document");
            then.status(401);
        });

        let err = client_for(&server).identity_document().unwrap_err();

        assert!(matches!(err, ImdsError::Response(401, _)));
    }

    #[test]
    fn failed_token_request_is_an_error() {
        let server = MockServer::start();
        let token_mock = server.mock(|when, then| {
            when.method("PUT").path("/latest/api/token");
            then.status(500);
        });

        let err = client_for(&server).identity_document().unwrap_err();

        assert!(matches!(err, ImdsError::Response(500, _)));
        token_mock.assert_hits(1);
    }

    #[test]
    fn malformed_document_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("PUT").path("/latest/api/token");
            then.status(200).body("test-token");
        });
        server.mock(|when, then| {
            when.method("GET")
                .path("/latest/dynamic/instance-identity/document");
            then.status(200).body("{ this is not json }");
        });

        let err = client_for(&server).identity_document().unwrap_err();

        assert!(matches!(err, ImdsError::Document(_)));
    }

    #[test]
    fn name_tag_round_trip() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("PUT").path("/latest/api/token");
            then.status(200).body("test-token");
        });
        server.mock(|when, then| {
            when.method("GET")
                .path("/latest/meta-data/tags/instance/Name")
                .header(TOKEN_HEADER, "test-token");
            then.status(200).body("web-frontend-1");
        });

        let name = client_for(&server).name_tag().unwrap();

        assert_eq!(name, "web-frontend-1");
    }

    #[test]
    fn name_resolver_maps_failure_to_empty_string() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("PUT").path("/latest/api/token");
            then.status(200).body("test-token");
        });
        server.mock(|when, then| {
            when.method("GET")
                .path("/latest/meta-data/tags/instance/Name");
            then.status(404);
        });

        let resolver = ImdsNameResolver::with_client(client_for(&server));

        assert_eq!(resolver.resolve("i-123", "us-west-2"), "");
    }
}
