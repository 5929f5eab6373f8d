//! AWS EC2 resource detection for OpenTelemetry.
//!
//! This crate detects "where this process is running" on EC2 and produces a
//! [`Resource`] suitable for attaching to emitted telemetry: the instance
//! identity (id, region, account, private IP) plus best-effort enrichment
//! from the instance `Name` tag, service-describing environment variables,
//! and `OTEL_RESOURCE_ATTRIBUTES`.
//!
//! Detection fails only when the EC2 environment itself cannot be confirmed
//! (the instance metadata service is unreachable); every enrichment step is
//! best-effort and a failure there never invalidates a successful base
//! detection.
//!
//! # Getting started
//!
//! ```no_run
//! use opentelemetry_ec2_detector::detector::EnrichedEc2Detector;
//!
//! let detector = EnrichedEc2Detector::new();
//! match detector.detect() {
//!     Ok(Some(resource)) => { /* attach to providers */ }
//!     Ok(None) => { /* EC2 confirmed, no attributes available */ }
//!     Err(err) => eprintln!("not running on EC2: {err}"),
//! }
//! ```
//!
//! The detector also implements the SDK's
//! [`ResourceDetector`](opentelemetry_sdk::resource::ResourceDetector)
//! trait, so it can be handed to
//! `Resource::builder().with_detector(..)` directly; detection failures
//! then collapse to an empty resource.
//!
//! [`Resource`]: opentelemetry_sdk::Resource
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod detector;
pub mod imds;
pub mod sources;

mod resource;
