//! In-memory issued-key store.
//!
//! Keys are seeded from configuration at startup; the payment-option state
//! mutates as the rotation rule runs.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vron_core::repository::{IssuedKey, KeyRepository};

use crate::app_config::KeySeed;

pub struct MemoryKeyRepository {
    keys: RwLock<HashMap<String, IssuedKey>>,
}

impl MemoryKeyRepository {
    pub fn from_seeds(seeds: &[KeySeed]) -> Self {
        let keys = seeds
            .iter()
            .map(|seed| {
                (
                    seed.host_id.clone(),
                    IssuedKey {
                        host_id: seed.host_id.clone(),
                        name: seed.name.clone(),
                        payment_option: None,
                        last_update_payment: None,
                    },
                )
            })
            .collect();
        MemoryKeyRepository {
            keys: RwLock::new(keys),
        }
    }
}

#[async_trait]
impl KeyRepository for MemoryKeyRepository {
    async fn find_by_host(&self, host_id: &str) -> Option<IssuedKey> {
        self.keys
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(host_id)
            .cloned()
    }

    async fn update_payment_state(
        &self,
        host_id: &str,
        payment_option: &str,
        updated: DateTime<Utc>,
    ) -> bool {
        let mut keys = self
            .keys
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match keys.get_mut(host_id) {
            Some(key) => {
                key.payment_option = Some(payment_option.to_string());
                key.last_update_payment = Some(updated);
                true
            }
            None => {
                tracing::warn!(host_id, "payment state update for unknown host");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeds() -> Vec<KeySeed> {
        vec![KeySeed {
            host_id: "host1".to_string(),
            name: "Partner One".to_string(),
        }]
    }

    #[tokio::test]
    async fn test_find_and_update() {
        let repo = MemoryKeyRepository::from_seeds(&seeds());
        let key = repo.find_by_host("host1").await.unwrap();
        assert_eq!(key.name, "Partner One");
        assert!(key.payment_option.is_none());

        let now = Utc::now();
        assert!(repo.update_payment_state("host1", "full-agent", now).await);
        let key = repo.find_by_host("host1").await.unwrap();
        assert_eq!(key.payment_option.as_deref(), Some("full-agent"));
        assert_eq!(key.last_update_payment, Some(now));
    }

    #[tokio::test]
    async fn test_unknown_host() {
        let repo = MemoryKeyRepository::from_seeds(&seeds());
        assert!(repo.find_by_host("ghost").await.is_none());
        assert!(!repo.update_payment_state("ghost", "full-agent", Utc::now()).await);
    }
}
