mod server;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kadro_audit::MemoryAuditSink;
use kadro_marketplace::{
    HttpMarketplaceClient, MarketplaceApi, MarketplaceConfig, MarketplaceUsageReporter,
    MockMarketplaceApi, WebhookProcessor,
};
use kadro_storage::{BillingCycle, Plan, PlanId, PlanLimits};
use kadro_store_memory::MemoryStore;
use kadro_tenant::{
    MeteringBatcher, PlanCatalog, TenantService, TrialMonitor, TrialNotification, TrialNotifier,
    TrialPolicy,
};
use uuid::Uuid;

use server::AppState;

#[derive(Parser)]
#[command(name = "kadro-server")]
#[command(about = "Kadro tenant lifecycle and marketplace billing server")]
struct Cli {
    /// HTTP listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "KADRO_ADDR")]
    addr: String,

    /// Where a buyer lands after a successful marketplace purchase
    #[arg(
        long,
        env = "KADRO_ONBOARDING_URL",
        default_value = "https://app.kadro.example.com/onboarding"
    )]
    onboarding_url: String,

    /// Where a buyer lands when the purchase flow fails
    #[arg(
        long,
        env = "KADRO_ERROR_URL",
        default_value = "https://app.kadro.example.com/purchase-error"
    )]
    error_url: String,

    /// Run against the in-process marketplace mock instead of real
    /// credentials (development only; billing calls go nowhere)
    #[arg(long, env = "KADRO_MOCK_MARKETPLACE")]
    mock_marketplace: bool,

    /// Seconds between usage reporting runs
    #[arg(long, default_value = "300", env = "KADRO_METERING_INTERVAL_SECS")]
    metering_interval_secs: u64,

    /// Seconds between trial expiry sweeps
    #[arg(long, default_value = "3600", env = "KADRO_TRIAL_INTERVAL_SECS")]
    trial_interval_secs: u64,
}

fn plan(
    code: &str,
    billing_cycle: BillingCycle,
    modules: &[&str],
    limits: PlanLimits,
    rate_limit_tier: u8,
) -> Plan {
    Plan {
        id: PlanId(Uuid::new_v4()),
        code: code.to_string(),
        billing_cycle,
        modules: modules.iter().map(|m| m.to_string()).collect(),
        limits,
        rate_limit_tier,
    }
}

/// The purchasable plans and the trial entitlement set.
fn default_catalog() -> PlanCatalog {
    PlanCatalog::new(
        vec![
            plan(
                "starter",
                BillingCycle::Monthly,
                &["career_progression", "employee_records"],
                PlanLimits {
                    max_users: 50,
                    storage_gb: 20,
                    api_calls_per_month: 100_000,
                },
                1,
            ),
            plan(
                "pro",
                BillingCycle::Monthly,
                &[
                    "career_progression",
                    "employee_records",
                    "performance",
                    "placement",
                    "reporting",
                ],
                PlanLimits {
                    max_users: 250,
                    storage_gb: 100,
                    api_calls_per_month: 1_000_000,
                },
                2,
            ),
            plan(
                "enterprise",
                BillingCycle::Annually,
                &[
                    "career_progression",
                    "employee_records",
                    "performance",
                    "placement",
                    "reporting",
                    "ai_insights",
                ],
                PlanLimits {
                    max_users: 2_000,
                    storage_gb: 1_024,
                    api_calls_per_month: 10_000_000,
                },
                3,
            ),
        ],
        vec![
            "career_progression".to_string(),
            "employee_records".to_string(),
            "performance".to_string(),
        ],
    )
}

/// Trial notification delivery for deployments without an email channel.
struct LogNotifier;

#[async_trait::async_trait]
impl TrialNotifier for LogNotifier {
    async fn notify(&self, notification: TrialNotification) -> Result<(), String> {
        match notification {
            TrialNotification::EndingSoon { code, ends_at, .. } => {
                info!(tenant_code = %code, %ends_at, "trial ending soon");
            }
            TrialNotification::Expired { code, .. } => {
                info!(tenant_code = %code, "trial expired");
            }
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down gracefully"),
        _ = sigint.recv() => info!("received SIGINT, shutting down gracefully"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let store = Arc::new(MemoryStore::new());
    let audit = Arc::new(MemoryAuditSink::new());
    let catalog = Arc::new(default_catalog());
    let policy = TrialPolicy::default();
    let service = Arc::new(TenantService::new(
        store.clone(),
        audit.clone(),
        catalog.clone(),
        policy,
    ));

    let marketplace: Arc<dyn MarketplaceApi> = if cli.mock_marketplace {
        warn!("marketplace mock enabled, no billing calls leave this process");
        Arc::new(MockMarketplaceApi::new())
    } else {
        Arc::new(HttpMarketplaceClient::new(MarketplaceConfig::from_env()?)?)
    };

    let processor = Arc::new(WebhookProcessor::new(
        service.clone(),
        marketplace.clone(),
        audit.clone(),
    ));
    let batcher = Arc::new(MeteringBatcher::new(
        store.clone(),
        Arc::new(MarketplaceUsageReporter::new(marketplace.clone())),
        audit.clone(),
        catalog.clone(),
    ));
    let monitor = Arc::new(TrialMonitor::new(
        service.clone(),
        Arc::new(LogNotifier),
        policy,
    ));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // Usage reporting scheduler.
    {
        let batcher = batcher.clone();
        let mut shutdown = shutdown_tx.subscribe();
        let period = Duration::from_secs(cli.metering_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => match batcher.process_pending_usage().await {
                        Ok(outcome) if outcome.calls > 0 => {
                            info!(
                                reported = outcome.reported,
                                rejected = outcome.rejected,
                                calls = outcome.calls,
                                "usage reporting run finished"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "usage reporting run failed"),
                    },
                    _ = shutdown.recv() => break,
                }
            }
        });
    }

    // Trial expiry scheduler.
    {
        let monitor = monitor.clone();
        let mut shutdown = shutdown_tx.subscribe();
        let period = Duration::from_secs(cli.trial_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => match monitor.run_once().await {
                        Ok(outcome) if outcome.expired > 0 || outcome.reminded > 0 => {
                            info!(
                                expired = outcome.expired,
                                reminded = outcome.reminded,
                                "trial sweep finished"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "trial sweep failed"),
                    },
                    _ = shutdown.recv() => break,
                }
            }
        });
    }

    let state = AppState {
        service,
        marketplace,
        processor,
        onboarding_url: cli.onboarding_url,
        error_url: cli.error_url,
    };

    let listener = tokio::net::TcpListener::bind(&cli.addr).await?;
    info!(addr = %listener.local_addr()?, "kadro-server listening");

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = signal_tx.send(());
    });

    let mut shutdown_rx = shutdown_tx.subscribe();
    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    info!("shutdown complete");
    Ok(())
}
