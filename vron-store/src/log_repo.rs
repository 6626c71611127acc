//! In-memory audit-log sink with upsert semantics.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use vron_core::repository::{AuditEvent, AuditRecord, LogRepository};

#[derive(Default)]
pub struct MemoryLogRepository {
    records: RwLock<HashMap<String, AuditRecord>>,
}

impl MemoryLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogRepository for MemoryLogRepository {
    /// One logical record per external reference: the first write creates
    /// it with `attempts = 0`, every later write overwrites the status
    /// fields and increments `attempts`.
    async fn upsert(&self, event: &AuditEvent) {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match records.get_mut(&event.external_reference) {
            Some(record) => {
                record.status = event.status;
                record.error_message = event.error_message.clone();
                record.confirmation_number = event.confirmation_number.clone();
                record.attempts += 1;
            }
            None => {
                records.insert(
                    event.external_reference.clone(),
                    AuditRecord {
                        external_reference: event.external_reference.clone(),
                        status: event.status,
                        error_message: event.error_message.clone(),
                        confirmation_number: event.confirmation_number.clone(),
                        attempts: 0,
                    },
                );
            }
        }
    }

    async fn find(&self, external_reference: &str) -> Option<AuditRecord> {
        self.records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(external_reference)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vron_core::repository::LogStatus;

    fn event(status: LogStatus, confirmation: Option<&str>) -> AuditEvent {
        AuditEvent {
            external_reference: "REF-1".to_string(),
            status,
            error_message: None,
            confirmation_number: confirmation.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_second_write_updates_single_record() {
        let repo = MemoryLogRepository::new();
        repo.upsert(&event(LogStatus::Pending, None)).await;
        repo.upsert(&event(LogStatus::CompleteAccepted, Some("CONF-1")))
            .await;

        let record = repo.find("REF-1").await.unwrap();
        assert_eq!(record.status, LogStatus::CompleteAccepted);
        assert_eq!(record.confirmation_number.as_deref(), Some("CONF-1"));
        assert_eq!(record.attempts, 1);
    }

    #[tokio::test]
    async fn test_first_write_starts_at_zero_attempts() {
        let repo = MemoryLogRepository::new();
        repo.upsert(&event(LogStatus::Pending, None)).await;
        assert_eq!(repo.find("REF-1").await.unwrap().attempts, 0);
        assert!(repo.find("REF-2").await.is_none());
    }
}
