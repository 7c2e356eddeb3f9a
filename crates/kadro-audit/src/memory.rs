//! In-memory [`AuditSink`] implementation.
//!
//! Suitable for single server deployments, development and testing.

use tokio::sync::RwLock;

use crate::{AuditError, AuditEvent, AuditEventId, AuditFilter, AuditSink};

/// In-memory audit sink backed by a `Vec`, newest events last.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches(event: &AuditEvent, filter: &AuditFilter) -> bool {
    if let Some(tenant_id) = filter.tenant_id {
        if event.tenant_id != Some(tenant_id.0) {
            return false;
        }
    }
    if let Some(action) = filter.action {
        if event.action != action {
            return false;
        }
    }
    if let Some(severity) = filter.severity {
        if event.severity != severity {
            return false;
        }
    }
    if let Some(from) = filter.from {
        if event.timestamp < from {
            return false;
        }
    }
    if let Some(to) = filter.to {
        if event.timestamp >= to {
            return false;
        }
    }
    true
}

#[async_trait::async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        let events = self.events.read().await;
        let mut matched: Vec<AuditEvent> = events
            .iter()
            .filter(|e| matches(e, &filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn get(&self, id: AuditEventId) -> Result<AuditEvent, AuditError> {
        let events = self.events.read().await;
        events
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(AuditError::NotFound(id))
    }

    async fn count(&self, filter: AuditFilter) -> Result<u64, AuditError> {
        let events = self.events.read().await;
        Ok(events.iter().filter(|e| matches(e, &filter)).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuditAction, AuditSeverity};
    use kadro_storage::TenantId;
    use uuid::Uuid;

    #[tokio::test]
    async fn record_and_query_by_tenant() {
        let sink = MemoryAuditSink::new();
        let tenant_a = TenantId(Uuid::new_v4());
        let tenant_b = TenantId(Uuid::new_v4());

        sink.record(
            AuditEvent::builder("system", AuditAction::TenantCreated)
                .tenant_id(Some(&tenant_a))
                .resource("tenant", tenant_a.to_string())
                .build(),
        )
        .await
        .unwrap();
        sink.record(
            AuditEvent::builder("system", AuditAction::TenantCreated)
                .tenant_id(Some(&tenant_b))
                .resource("tenant", tenant_b.to_string())
                .build(),
        )
        .await
        .unwrap();

        let events = sink
            .query(AuditFilter::new().tenant_id(tenant_a))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tenant_id, Some(tenant_a.0));
    }

    #[tokio::test]
    async fn query_filters_by_action_and_severity() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditEvent::builder("marketplace", AuditAction::WebhookReceived).build())
            .await
            .unwrap();
        sink.record(
            AuditEvent::builder("marketplace", AuditAction::WebhookFailed)
                .severity(AuditSeverity::Critical)
                .build(),
        )
        .await
        .unwrap();

        let failed = sink
            .query(AuditFilter::new().action(AuditAction::WebhookFailed))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);

        let critical = sink
            .count(AuditFilter::new().severity(AuditSeverity::Critical))
            .await
            .unwrap();
        assert_eq!(critical, 1);
    }

    #[tokio::test]
    async fn get_by_id() {
        let sink = MemoryAuditSink::new();
        let event = AuditEvent::builder("system", AuditAction::UsageReported).build();
        let id = event.id;
        sink.record(event).await.unwrap();

        let got = sink.get(id).await.unwrap();
        assert_eq!(got.id, id);

        assert!(matches!(
            sink.get(AuditEventId::new()).await,
            Err(AuditError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn query_respects_limit_and_offset() {
        let sink = MemoryAuditSink::new();
        for _ in 0..5 {
            sink.record(AuditEvent::builder("system", AuditAction::UsageReported).build())
                .await
                .unwrap();
        }

        let page = sink
            .query(AuditFilter::new().limit(2).offset(1))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
    }
}
