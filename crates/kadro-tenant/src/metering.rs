//! Usage metering batcher.
//!
//! Pending usage records are shipped to the billing side in batches. The
//! wire contract caps a single call at 25 events, so the batcher loads a
//! page of records, groups them per (tenant, subscription), and emits
//! fixed-size chunks. Failures are scoped to the chunk that failed; a
//! chunk's records flip to `Rejected` and come back on later runs until
//! their attempt budget is spent.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use kadro_audit::{AuditAction, AuditEvent, AuditSeverity, AuditSink};
use kadro_storage::{MeteringRecord, Store, SubscriptionId, TenantId};

use crate::{LifecycleError, PlanCatalog};

/// Max records loaded per run.
const PAGE_SIZE: usize = 100;
/// Max events per reporting call.
const CHUNK_SIZE: usize = 25;
/// A record is abandoned after this many failed attempts.
const MAX_ATTEMPTS: u32 = 5;
/// Base retry cool-down; doubles per failed attempt.
const COOLDOWN_MINUTES: i64 = 5;

/// One billable usage event on the wire.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    /// Marketplace subscription id the usage bills against.
    pub resource_id: String,
    pub plan_id: String,
    pub dimension: String,
    pub quantity: f64,
    pub effective_start_time: DateTime<Utc>,
}

/// Errors from a usage reporting backend.
#[derive(Debug, Error)]
pub enum UsageReportError {
    /// Could not authenticate against the billing side. Aborts the run;
    /// nothing is marked rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The batch was refused. The affected records are marked rejected.
    #[error("usage rejected: {0}")]
    Rejected(String),
}

/// Where usage events go. Implemented by the marketplace client; tests
/// plug in a recorder.
#[async_trait]
pub trait UsageReporter: Send + Sync {
    async fn report_usage(&self, events: &[UsageEvent]) -> Result<(), UsageReportError>;
}

/// Counts from one batcher run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub reported: usize,
    pub rejected: usize,
    /// Reporting calls actually made.
    pub calls: usize,
}

pub struct MeteringBatcher<S: Store> {
    store: Arc<S>,
    reporter: Arc<dyn UsageReporter>,
    audit: Arc<dyn AuditSink>,
    catalog: Arc<PlanCatalog>,
}

impl<S: Store> MeteringBatcher<S> {
    pub fn new(
        store: Arc<S>,
        reporter: Arc<dyn UsageReporter>,
        audit: Arc<dyn AuditSink>,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        Self {
            store,
            reporter,
            audit,
            catalog,
        }
    }

    fn retry_due(record: &MeteringRecord, now: DateTime<Utc>) -> bool {
        match record.last_attempt_at {
            None => true,
            Some(at) => {
                // 5 min, 10 min, 20 min, ... per failed attempt.
                let cooldown =
                    Duration::minutes(COOLDOWN_MINUTES) * (1i32 << record.attempts.min(16));
                now - at >= cooldown
            }
        }
    }

    /// One batching pass. Called from a scheduler; never panics the caller
    /// and never lets one group's failure starve the others.
    pub async fn process_pending_usage(&self) -> Result<BatchOutcome, LifecycleError> {
        let now = Utc::now();
        let mut outcome = BatchOutcome::default();

        let mut records = self.store.list_pending_metering(PAGE_SIZE).await?;
        let retryable: Vec<MeteringRecord> = self
            .store
            .list_rejected_metering(MAX_ATTEMPTS)
            .await?
            .into_iter()
            .filter(|r| Self::retry_due(r, now))
            .collect();
        records.extend(retryable);

        if records.is_empty() {
            return Ok(outcome);
        }

        // Group per (tenant, subscription), keeping first-seen order.
        let mut order: Vec<(TenantId, SubscriptionId)> = Vec::new();
        let mut groups: HashMap<(TenantId, SubscriptionId), Vec<MeteringRecord>> = HashMap::new();
        for record in records {
            let key = (record.tenant_id, record.subscription_id);
            if !groups.contains_key(&key) {
                order.push(key);
            }
            groups.entry(key).or_default().push(record);
        }

        for key in order {
            let (tenant_id, subscription_id) = key;
            let group = match groups.remove(&key) {
                Some(g) => g,
                None => continue,
            };

            let sub = match self.store.get_subscription(&subscription_id).await {
                Ok(sub) => sub,
                Err(err) => {
                    warn!(
                        tenant_id = %tenant_id,
                        subscription_id = %subscription_id,
                        error = %err,
                        "skipping usage group, subscription lookup failed"
                    );
                    continue;
                }
            };
            let resource_id = sub
                .external_subscription_id
                .clone()
                .unwrap_or_else(|| sub.id.to_string());
            let plan_code = self
                .catalog
                .get(&sub.plan_id)
                .map(|p| p.code.clone())
                .unwrap_or_else(|| sub.plan_id.to_string());

            for chunk in group.chunks(CHUNK_SIZE) {
                let events: Vec<UsageEvent> = chunk
                    .iter()
                    .map(|r| UsageEvent {
                        resource_id: resource_id.clone(),
                        plan_id: plan_code.clone(),
                        dimension: r.dimension.as_str().to_string(),
                        quantity: r.quantity,
                        effective_start_time: r.effective_start_time,
                    })
                    .collect();
                let ids: Vec<_> = chunk.iter().map(|r| r.id).collect();

                outcome.calls += 1;
                match self.reporter.report_usage(&events).await {
                    Ok(()) => {
                        self.store.mark_metering_reported(&ids, now).await?;
                        outcome.reported += ids.len();
                        info!(
                            tenant_id = %tenant_id,
                            count = ids.len(),
                            "usage chunk reported"
                        );
                        self.audit_best_effort(
                            AuditEvent::builder("metering-batcher", AuditAction::UsageReported)
                                .tenant_id(Some(&tenant_id))
                                .subscription_id(Some(&subscription_id))
                                .resource("metering", &resource_id)
                                .details(serde_json::json!({ "count": ids.len() }))
                                .build(),
                        )
                        .await;
                    }
                    Err(UsageReportError::Auth(msg)) => {
                        // Without a token nothing else will succeed either.
                        // Leave everything untouched and retry next run.
                        warn!(error = %msg, "usage reporting aborted, authentication failed");
                        return Ok(outcome);
                    }
                    Err(UsageReportError::Rejected(msg)) => {
                        self.store.mark_metering_rejected(&ids, &msg, now).await?;
                        outcome.rejected += ids.len();
                        warn!(
                            tenant_id = %tenant_id,
                            count = ids.len(),
                            error = %msg,
                            "usage chunk rejected"
                        );
                        self.audit_best_effort(
                            AuditEvent::builder("metering-batcher", AuditAction::UsageRejected)
                                .severity(AuditSeverity::Warning)
                                .tenant_id(Some(&tenant_id))
                                .subscription_id(Some(&subscription_id))
                                .resource("metering", &resource_id)
                                .reason(msg)
                                .details(serde_json::json!({ "count": ids.len() }))
                                .build(),
                        )
                        .await;
                    }
                }
            }
        }

        Ok(outcome)
    }

    async fn audit_best_effort(&self, event: AuditEvent) {
        if let Err(err) = self.audit.record(event).await {
            warn!(error = %err, "failed to record audit event");
        }
    }
}
