//! Marketplace configuration, read once at startup.

use std::time::Duration;

use url::Url;

use crate::MarketplaceError;

const DEFAULT_API_BASE: &str = "https://marketplaceapi.example.com/api/saas/";
const DEFAULT_METERING_BASE: &str = "https://marketplaceapi.example.com/api/usageEvent/";
const DEFAULT_AUTH_BASE: &str = "https://login.example.com/";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for the marketplace client
#[derive(Clone, Debug)]
pub struct MarketplaceConfig {
    /// OAuth client id of our marketplace app registration
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Directory (auth) tenant the token request is scoped to
    pub directory_tenant_id: String,

    /// Our publisher id on the marketplace
    pub publisher_id: String,

    /// The offer tenants purchase
    pub offer_id: String,

    /// Fulfillment API base URL
    pub api_base_url: Url,

    /// Metering API base URL
    pub metering_base_url: Url,

    /// Token endpoint base URL
    pub auth_base_url: Url,

    /// Per-request timeout
    pub timeout: Duration,
}

fn required(name: &str) -> Result<String, MarketplaceError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| MarketplaceError::NotConfigured(format!("{} not set", name)))
}

fn url_var(name: &str, default: &str) -> Result<Url, MarketplaceError> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw)
        .map_err(|e| MarketplaceError::NotConfigured(format!("invalid {}: {}", name, e)))
}

impl MarketplaceConfig {
    /// Read the configuration from environment variables.
    ///
    /// Missing credentials are an error, not a silent no-op: a deployment
    /// that wants to run without the marketplace must say so explicitly
    /// (the server's `--mock-marketplace` flag).
    pub fn from_env() -> Result<Self, MarketplaceError> {
        let timeout_secs = match std::env::var("MARKETPLACE_TIMEOUT_SECS") {
            Ok(v) => v.parse().map_err(|_| {
                MarketplaceError::NotConfigured(format!(
                    "invalid MARKETPLACE_TIMEOUT_SECS value '{}': expected a number",
                    v
                ))
            })?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            client_id: required("MARKETPLACE_CLIENT_ID")?,
            client_secret: required("MARKETPLACE_CLIENT_SECRET")?,
            directory_tenant_id: required("MARKETPLACE_DIRECTORY_TENANT_ID")?,
            publisher_id: required("MARKETPLACE_PUBLISHER_ID")?,
            offer_id: required("MARKETPLACE_OFFER_ID")?,
            api_base_url: url_var("MARKETPLACE_API_BASE_URL", DEFAULT_API_BASE)?,
            metering_base_url: url_var("MARKETPLACE_METERING_BASE_URL", DEFAULT_METERING_BASE)?,
            auth_base_url: url_var("MARKETPLACE_AUTH_BASE_URL", DEFAULT_AUTH_BASE)?,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Create a test configuration (for development/testing)
    pub fn test() -> Self {
        Self {
            client_id: "test_client_id".into(),
            client_secret: "test_client_secret".into(),
            directory_tenant_id: "test_directory".into(),
            publisher_id: "test_publisher".into(),
            offer_id: "kadro-hr".into(),
            api_base_url: Url::parse(DEFAULT_API_BASE).unwrap(),
            metering_base_url: Url::parse(DEFAULT_METERING_BASE).unwrap(),
            auth_base_url: Url::parse(DEFAULT_AUTH_BASE).unwrap(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}
