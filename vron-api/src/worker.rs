use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use vron_core::repository::{AuditEvent, LogRepository};

/// Drains the audit queue into the log repository. Best-effort by design:
/// the producer never awaits this task, and an upsert problem can only
/// surface here, never on the response path.
pub async fn start_audit_worker(
    mut rx: mpsc::Receiver<AuditEvent>,
    repo: Arc<dyn LogRepository>,
) {
    info!("audit worker started");
    while let Some(event) = rx.recv().await {
        debug!(
            external_reference = %event.external_reference,
            status = event.status.as_str(),
            "audit upsert"
        );
        repo.upsert(&event).await;
    }
    info!("audit channel closed, worker stopping");
}
