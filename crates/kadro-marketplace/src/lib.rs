//! kadro-marketplace - Marketplace integration for kadro
//!
//! This crate speaks the marketplace's SaaS fulfillment and metering
//! protocol:
//! - Purchase token resolution and subscription activation (landing flow)
//! - Webhook handling for subscription lifecycle events
//! - Batched usage reporting (25 events per call on the wire)
//!
//! # Architecture
//!
//! Everything the rest of the system needs goes through the
//! [`MarketplaceApi`] trait. The HTTP implementation authenticates with a
//! cached client-credentials token; [`MockMarketplaceApi`] backs tests and
//! development. A deployment without marketplace credentials fails fast at
//! client construction rather than silently dropping billing calls.

mod api;
mod client;
mod config;
mod landing;
mod reporter;
mod webhook;

pub use api::{
    MockMarketplaceApi, MarketplaceApi, OperationOutcome, RemoteSubscription,
    ResolvedSubscription,
};
pub use client::HttpMarketplaceClient;
pub use config::MarketplaceConfig;
pub use landing::{process_landing, LandingError};
pub use reporter::MarketplaceUsageReporter;
pub use webhook::{WebhookAction, WebhookEvent, WebhookProcessor};

use thiserror::Error;

/// Marketplace adapter errors
#[derive(Debug, Error)]
pub enum MarketplaceError {
    /// Credentials are missing; billing calls cannot be made at all.
    #[error("marketplace not configured: {0}")]
    NotConfigured(String),

    #[error("marketplace authentication failed: {0}")]
    Auth(String),

    /// Transport failure or a non-2xx answer from the marketplace.
    #[error("marketplace protocol error: {0}")]
    Protocol(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Hard protocol limit on events per metering call.
pub const MAX_USAGE_EVENTS_PER_CALL: usize = 25;
