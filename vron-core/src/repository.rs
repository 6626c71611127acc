//! Collaborator interfaces for configuration-backed state: issued partner
//! keys, the audit log sink and operator notification.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Audit status of a request. Transitions are monotonic within one request
/// lifecycle: Pending -> CompleteAccepted | CompleteRejected | Error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStatus {
    Pending,
    Error,
    CompleteRejected,
    CompleteAccepted,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Pending => "Pending",
            LogStatus::Error => "Error",
            LogStatus::CompleteRejected => "Complete-Rejected",
            LogStatus::CompleteAccepted => "Complete-Accepted",
        }
    }
}

/// One status write, queued for the background audit worker.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub external_reference: String,
    pub status: LogStatus,
    pub error_message: Option<String>,
    pub confirmation_number: Option<String>,
}

/// The stored record. One logical record per external reference: the first
/// write creates it with `attempts = 0`, every later write for the same
/// reference overwrites status/error/confirmation and increments
/// `attempts`.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub external_reference: String,
    pub status: LogStatus,
    pub error_message: Option<String>,
    pub confirmation_number: Option<String>,
    pub attempts: u32,
}

#[async_trait]
pub trait LogRepository: Send + Sync {
    async fn upsert(&self, event: &AuditEvent);
    async fn find(&self, external_reference: &str) -> Option<AuditRecord>;
}

/// Non-blocking producer side of the audit queue. A full queue drops the
/// event with a warning; the response path never waits on logging.
#[derive(Clone)]
pub struct AuditSender {
    tx: mpsc::Sender<AuditEvent>,
}

impl AuditSender {
    pub fn new(tx: mpsc::Sender<AuditEvent>) -> Self {
        AuditSender { tx }
    }

    pub fn record(
        &self,
        external_reference: &str,
        status: LogStatus,
        error_message: Option<String>,
        confirmation_number: Option<String>,
    ) {
        let event = AuditEvent {
            external_reference: external_reference.to_string(),
            status,
            error_message,
            confirmation_number,
        };
        if let Err(e) = self.tx.try_send(event) {
            tracing::warn!("audit event dropped: {}", e);
        }
    }
}

/// An issued partner key of the form `base_key + host_id`, carrying the
/// mutable payment-option state used by the rotation rule.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub host_id: String,
    pub name: String,
    pub payment_option: Option<String>,
    pub last_update_payment: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait KeyRepository: Send + Sync {
    async fn find_by_host(&self, host_id: &str) -> Option<IssuedKey>;

    /// Persists the outcome of a payment-option rotation. Returns false if
    /// the host id is unknown.
    async fn update_payment_state(
        &self,
        host_id: &str,
        payment_option: &str,
        updated: DateTime<Utc>,
    ) -> bool;
}

/// Operator-facing notification channel, fired when payment rotation falls
/// back to the configured default.
#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    async fn payment_fallback(&self, host_id: &str, adopted: &str);
}
