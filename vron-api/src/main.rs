use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vron_api::{app, AppState};
use vron_core::dispatcher::{Connector, ConnectorPolicy};
use vron_core::repository::AuditSender;
use vron_core::rules::PaymentPolicy;
use vron_ron::{Mode, RonConfig, RonGateway};
use vron_store::{MemoryKeyRepository, MemoryLogRepository, Settings, TracingNotifier};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vron_api=debug,vron_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load().expect("Failed to load config");
    tracing::info!(
        "Starting VRON connector on port {} ({} mode)",
        settings.server.port,
        settings.ron.mode
    );

    let gateway = RonGateway::new(RonConfig {
        username: settings.ron.username.clone(),
        password: settings.ron.password.clone(),
        test_url: settings.ron.test_url.clone(),
        live_url: settings.ron.live_url.clone(),
        mode: Mode::parse(&settings.ron.mode),
        timeout_secs: settings.ron.timeout_secs,
    })
    .expect("Failed to build RON client");

    let keys = Arc::new(MemoryKeyRepository::from_seeds(&settings.keys));
    let logs = Arc::new(MemoryLogRepository::new());

    // Audit writes go through a bounded channel so the response path never
    // blocks on logging.
    let (audit_tx, audit_rx) = tokio::sync::mpsc::channel(settings.audit.queue_capacity);
    tokio::spawn(vron_api::worker::start_audit_worker(audit_rx, logs.clone()));

    let connector = Connector {
        ron: Arc::new(gateway),
        keys,
        notifier: Arc::new(TracingNotifier),
        audit: AuditSender::new(audit_tx),
        policy: ConnectorPolicy {
            base_key: settings.api.base_key.clone(),
            payment: PaymentPolicy {
                allowed_options: settings.business_rules.allowed_payment_options.clone(),
                default_option: settings.business_rules.default_payment_option.clone(),
                rotation_days: settings.business_rules.payment_rotation_days,
            },
            pickup_fault_markers: settings.business_rules.pickup_fault_markers.clone(),
        },
    };

    let app = app(AppState {
        connector: Arc::new(connector),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
