//! HTTP surface of the Tally metering service.
//!
//! Routes map one-to-one onto [`tally_gateway::Meter`] operations. Errors
//! are rendered as `{error, code, retryable, ...}` bodies that
//! `tally-client` decodes back into [`tally_core::MeteringError`].

pub mod api;
pub mod audit_factory;
pub mod auth;
pub mod blob_factory;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod state_factory;
pub mod telemetry;
