//! Trial expiration monitoring.
//!
//! Scans trial tenants on a schedule, warns the ones about to lapse, and
//! expires the ones already past their clock. Notification delivery is
//! behind a trait; the monitor only decides that a notification is due.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use kadro_storage::{Store, TenantId};

use crate::{LifecycleError, TenantService, TrialPolicy};

/// Notifications the monitor emits.
#[derive(Clone, Debug, PartialEq)]
pub enum TrialNotification {
    EndingSoon {
        tenant_id: TenantId,
        code: String,
        ends_at: DateTime<Utc>,
    },
    Expired {
        tenant_id: TenantId,
        code: String,
    },
}

/// Delivery channel for trial notifications (email, in-app, ...).
#[async_trait]
pub trait TrialNotifier: Send + Sync {
    async fn notify(&self, notification: TrialNotification) -> Result<(), String>;
}

/// Collects notifications in memory. For tests and development.
#[derive(Default)]
pub struct MemoryTrialNotifier {
    notifications: RwLock<Vec<TrialNotification>>,
}

impl MemoryTrialNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notifications(&self) -> Vec<TrialNotification> {
        self.notifications.read().await.clone()
    }
}

#[async_trait]
impl TrialNotifier for MemoryTrialNotifier {
    async fn notify(&self, notification: TrialNotification) -> Result<(), String> {
        self.notifications.write().await.push(notification);
        Ok(())
    }
}

/// Counts from one monitor sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub expired: usize,
    pub reminded: usize,
}

pub struct TrialMonitor<S: Store> {
    service: Arc<TenantService<S>>,
    notifier: Arc<dyn TrialNotifier>,
    policy: TrialPolicy,
    // Tenants already warned this process lifetime. A tenant stays in the
    // reminder window across many sweeps; the warning fires once, not per
    // sweep. A restart may repeat at most one reminder per tenant.
    reminded: RwLock<HashSet<TenantId>>,
}

impl<S: Store> TrialMonitor<S> {
    pub fn new(
        service: Arc<TenantService<S>>,
        notifier: Arc<dyn TrialNotifier>,
        policy: TrialPolicy,
    ) -> Self {
        Self {
            service,
            notifier,
            policy,
            reminded: RwLock::new(HashSet::new()),
        }
    }

    /// One sweep. A failure on one tenant is logged and the sweep moves
    /// on; the scheduler calls again soon anyway.
    pub async fn run_once(&self) -> Result<SweepOutcome, LifecycleError> {
        let now = Utc::now();
        let cutoff = now + Duration::days(self.policy.reminder_days);
        let mut outcome = SweepOutcome::default();

        for tenant in self.service.expiring_trials(cutoff).await? {
            let ends_at = match tenant.trial_ends_at {
                Some(ends_at) => ends_at,
                None => continue,
            };

            if ends_at <= now {
                match self.service.expire_trial(&tenant.id, "trial-monitor").await {
                    Ok(_) => {
                        outcome.expired += 1;
                        self.reminded.write().await.remove(&tenant.id);
                        info!(tenant_id = %tenant.id, code = %tenant.code, "trial expired");
                        self.notify_best_effort(TrialNotification::Expired {
                            tenant_id: tenant.id,
                            code: tenant.code.clone(),
                        })
                        .await;
                    }
                    Err(err) => {
                        warn!(
                            tenant_id = %tenant.id,
                            error = %err,
                            "failed to expire trial, will retry next sweep"
                        );
                    }
                }
            } else if self.reminded.write().await.insert(tenant.id) {
                outcome.reminded += 1;
                self.notify_best_effort(TrialNotification::EndingSoon {
                    tenant_id: tenant.id,
                    code: tenant.code.clone(),
                    ends_at,
                })
                .await;
            }
        }

        Ok(outcome)
    }

    async fn notify_best_effort(&self, notification: TrialNotification) {
        if let Err(err) = self.notifier.notify(notification).await {
            warn!(error = %err, "failed to deliver trial notification");
        }
    }
}
