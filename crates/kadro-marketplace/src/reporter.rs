//! Bridges the metering batcher onto the marketplace client.

use std::sync::Arc;

use async_trait::async_trait;

use kadro_tenant::{UsageEvent, UsageReportError, UsageReporter};

use crate::{MarketplaceApi, MarketplaceError};

/// [`UsageReporter`] backed by the marketplace metering API.
///
/// Auth and configuration failures map to `Auth` so the batcher aborts the
/// run instead of burning the attempt budget of every record in it.
pub struct MarketplaceUsageReporter {
    client: Arc<dyn MarketplaceApi>,
}

impl MarketplaceUsageReporter {
    pub fn new(client: Arc<dyn MarketplaceApi>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UsageReporter for MarketplaceUsageReporter {
    async fn report_usage(&self, events: &[UsageEvent]) -> Result<(), UsageReportError> {
        self.client.report_usage(events).await.map_err(|err| match err {
            MarketplaceError::Auth(msg) | MarketplaceError::NotConfigured(msg) => {
                UsageReportError::Auth(msg)
            }
            other => UsageReportError::Rejected(other.to_string()),
        })
    }
}
