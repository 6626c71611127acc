//! Business rules sitting between the two protocols: pickup resolution,
//! payment-option rotation and retriable-fault classification.

use chrono::{DateTime, Duration, Utc};

use crate::backend::{PickupRecord, RonApi};
use crate::repository::{IssuedKey, KeyRepository, OperatorNotifier};

/// Outcome of resolving a partner pickup point against the backend's
/// pickup list.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPickup {
    pub pickup_key: String,
    /// Set when the requested point matched nothing and the first backend
    /// record was adopted; appended to the general comments so the
    /// operator can see what was asked for.
    pub fallback_note: Option<(String, String)>,
}

/// Case-insensitive exact match against the backend pickup names. An
/// unmatched point falls back to the first backend record with an
/// explanatory note; a booking is never dropped over an unmatched pickup.
pub fn resolve_pickup(
    pickup_point: Option<&str>,
    default_pickup_key: &str,
    pickups: &[PickupRecord],
) -> ResolvedPickup {
    let Some(requested) = pickup_point.filter(|p| !p.is_empty()) else {
        return ResolvedPickup {
            pickup_key: default_pickup_key.to_string(),
            fallback_note: None,
        };
    };

    for pickup in pickups {
        if pickup.pickup_name.eq_ignore_ascii_case(requested) {
            return ResolvedPickup {
                pickup_key: pickup.pickup_key.clone(),
                fallback_note: None,
            };
        }
    }

    match pickups.first() {
        Some(first) => ResolvedPickup {
            pickup_key: first.pickup_key.clone(),
            fallback_note: Some(("pickup_point".to_string(), requested.to_string())),
        },
        None => ResolvedPickup {
            pickup_key: default_pickup_key.to_string(),
            fallback_note: None,
        },
    }
}

/// Forces the first backend pickup record, used for the single retry after
/// a pickup-mandatory fault.
pub fn force_first_pickup(
    requested: Option<&str>,
    pickups: &[PickupRecord],
) -> Option<ResolvedPickup> {
    pickups.first().map(|first| ResolvedPickup {
        pickup_key: first.pickup_key.clone(),
        fallback_note: Some((
            "pickup_point".to_string(),
            requested.unwrap_or_default().to_string(),
        )),
    })
}

/// Typed classification of a backend fault. The backend's fault vocabulary
/// is not authoritatively documented, so the pickup-mandatory markers are
/// configuration, not code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    PickupMandatory,
    Other,
}

pub fn classify_fault(fault: &str, pickup_markers: &[String]) -> FaultKind {
    let fault = fault.to_lowercase();
    if pickup_markers
        .iter()
        .any(|marker| !marker.is_empty() && fault.contains(&marker.to_lowercase()))
    {
        FaultKind::PickupMandatory
    } else {
        FaultKind::Other
    }
}

#[derive(Debug, Clone)]
pub struct PaymentPolicy {
    /// Operator preference order; the first allowed option the backend
    /// offers wins.
    pub allowed_options: Vec<String>,
    pub default_option: String,
    pub rotation_days: i64,
}

/// Rotates the host key's payment option when its state is stale.
///
/// A fresh state short-circuits to the stored option. A stale (or unset)
/// state queries the backend: the first allow-listed option offered is
/// adopted; an empty intersection adopts the configured default and
/// notifies the operator. Both rotation branches persist the option and a
/// refreshed timestamp. An unreachable backend keeps the previous option
/// (or the default) without refreshing the timestamp, so the next request
/// retries.
pub async fn rotate_payment_option(
    ron: &mut dyn RonApi,
    keys: &dyn KeyRepository,
    notifier: &dyn OperatorNotifier,
    policy: &PaymentPolicy,
    key: &IssuedKey,
    now: DateTime<Utc>,
) -> String {
    let stale = match (&key.payment_option, key.last_update_payment) {
        (Some(_), Some(updated)) => now - updated >= Duration::days(policy.rotation_days),
        _ => true,
    };
    if !stale {
        return key
            .payment_option
            .clone()
            .unwrap_or_else(|| policy.default_option.clone());
    }

    let Some(offered) = ron.read_payment_options().await else {
        tracing::warn!(
            host_id = %key.host_id,
            "payment options unavailable, keeping previous option"
        );
        return key
            .payment_option
            .clone()
            .unwrap_or_else(|| policy.default_option.clone());
    };

    let adopted = policy
        .allowed_options
        .iter()
        .find(|allowed| offered.iter().any(|o| o.eq_ignore_ascii_case(allowed)))
        .cloned();

    let adopted = match adopted {
        Some(option) => option,
        None => {
            notifier
                .payment_fallback(&key.host_id, &policy.default_option)
                .await;
            policy.default_option.clone()
        }
    };

    keys.update_payment_state(&key.host_id, &adopted, now).await;
    adopted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        AvailabilityDay, AvailabilityQuery, TourBasis, TourRecord, TourTime, WebDetails,
    };
    use crate::model::Reservation;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn pickups() -> Vec<PickupRecord> {
        vec![
            PickupRecord {
                pickup_key: "PK-1".to_string(),
                pickup_name: "Town Hall".to_string(),
                pickup_time: Some("07:45".to_string()),
            },
            PickupRecord {
                pickup_key: "PK-2".to_string(),
                pickup_name: "Ferry Terminal".to_string(),
                pickup_time: None,
            },
        ]
    }

    #[test]
    fn test_pickup_exact_match_case_insensitive() {
        let resolved = resolve_pickup(Some("town hall"), "PK-DEFAULT", &pickups());
        assert_eq!(resolved.pickup_key, "PK-1");
        assert!(resolved.fallback_note.is_none());
    }

    #[test]
    fn test_pickup_unmatched_falls_back_to_first_with_note() {
        let resolved = resolve_pickup(Some("Airport"), "PK-DEFAULT", &pickups());
        assert_eq!(resolved.pickup_key, "PK-1");
        assert_eq!(
            resolved.fallback_note,
            Some(("pickup_point".to_string(), "Airport".to_string()))
        );
    }

    #[test]
    fn test_pickup_empty_backend_list_uses_default() {
        let resolved = resolve_pickup(Some("Airport"), "PK-DEFAULT", &[]);
        assert_eq!(resolved.pickup_key, "PK-DEFAULT");
        assert!(resolved.fallback_note.is_none());
    }

    #[test]
    fn test_classify_fault_markers() {
        let markers = vec!["pickup".to_string()];
        assert_eq!(
            classify_fault("A Pickup location is mandatory for this tour", &markers),
            FaultKind::PickupMandatory
        );
        assert_eq!(
            classify_fault("tour is booked out", &markers),
            FaultKind::Other
        );
    }

    struct StubRon {
        payment_options: Option<Vec<String>>,
    }

    #[async_trait]
    impl RonApi for StubRon {
        fn set_host(&mut self, _host_id: &str) {}
        async fn login(&mut self, _reseller_id: &str) -> bool {
            true
        }
        async fn read_tour_pickups(
            &mut self,
            _tour_code: &str,
            _tour_time_id: &str,
            _basis_id: &str,
        ) -> Option<Vec<PickupRecord>> {
            None
        }
        async fn read_tour_times(&mut self, _tour_code: &str) -> Option<Vec<TourTime>> {
            None
        }
        async fn read_tour_bases(&mut self, _tour_code: &str) -> Option<Vec<TourBasis>> {
            None
        }
        async fn read_tours(&mut self) -> Option<Vec<TourRecord>> {
            None
        }
        async fn read_tour_web_details(&mut self, _tour_code: &str) -> Option<WebDetails> {
            None
        }
        async fn read_tour_availability_range(
            &mut self,
            _queries: &[AvailabilityQuery],
        ) -> Option<Vec<AvailabilityDay>> {
            None
        }
        async fn read_payment_options(&mut self) -> Option<Vec<String>> {
            self.payment_options.clone()
        }
        async fn write_reservation(
            &mut self,
            _reservation: &Reservation,
            _payment_option: &str,
        ) -> Option<String> {
            None
        }
        fn last_fault(&self) -> Option<&str> {
            None
        }
    }

    #[derive(Default)]
    struct StubKeys {
        updates: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl KeyRepository for StubKeys {
        async fn find_by_host(&self, _host_id: &str) -> Option<IssuedKey> {
            None
        }
        async fn update_payment_state(
            &self,
            host_id: &str,
            payment_option: &str,
            _updated: DateTime<Utc>,
        ) -> bool {
            self.updates
                .lock()
                .unwrap()
                .push((host_id.to_string(), payment_option.to_string()));
            true
        }
    }

    #[derive(Default)]
    struct StubNotifier {
        fallbacks: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OperatorNotifier for StubNotifier {
        async fn payment_fallback(&self, host_id: &str, _adopted: &str) {
            self.fallbacks.lock().unwrap().push(host_id.to_string());
        }
    }

    fn policy() -> PaymentPolicy {
        PaymentPolicy {
            allowed_options: vec!["full-agent".to_string(), "deposit".to_string()],
            default_option: "full-agent".to_string(),
            rotation_days: 30,
        }
    }

    fn key(option: Option<&str>, age_days: Option<i64>) -> IssuedKey {
        IssuedKey {
            host_id: "host1".to_string(),
            name: "Partner One".to_string(),
            payment_option: option.map(str::to_string),
            last_update_payment: age_days.map(|d| Utc::now() - Duration::days(d)),
        }
    }

    #[tokio::test]
    async fn test_rotation_fresh_state_keeps_option() {
        let mut ron = StubRon {
            payment_options: Some(vec!["deposit".to_string()]),
        };
        let keys = StubKeys::default();
        let notifier = StubNotifier::default();
        let adopted = rotate_payment_option(
            &mut ron,
            &keys,
            &notifier,
            &policy(),
            &key(Some("deposit"), Some(1)),
            Utc::now(),
        )
        .await;
        assert_eq!(adopted, "deposit");
        assert!(keys.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rotation_stale_state_adopts_first_allowed() {
        let mut ron = StubRon {
            payment_options: Some(vec!["voucher".to_string(), "deposit".to_string()]),
        };
        let keys = StubKeys::default();
        let notifier = StubNotifier::default();
        let adopted = rotate_payment_option(
            &mut ron,
            &keys,
            &notifier,
            &policy(),
            &key(Some("full-agent"), Some(45)),
            Utc::now(),
        )
        .await;
        // allow-list order wins: full-agent is not offered, deposit is
        assert_eq!(adopted, "deposit");
        assert_eq!(
            keys.updates.lock().unwrap().as_slice(),
            &[("host1".to_string(), "deposit".to_string())]
        );
        assert!(notifier.fallbacks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rotation_empty_intersection_notifies_operator() {
        let mut ron = StubRon {
            payment_options: Some(vec!["voucher".to_string()]),
        };
        let keys = StubKeys::default();
        let notifier = StubNotifier::default();
        let adopted = rotate_payment_option(
            &mut ron,
            &keys,
            &notifier,
            &policy(),
            &key(None, None),
            Utc::now(),
        )
        .await;
        assert_eq!(adopted, "full-agent");
        assert_eq!(notifier.fallbacks.lock().unwrap().len(), 1);
        assert_eq!(keys.updates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rotation_backend_unreachable_keeps_previous() {
        let mut ron = StubRon {
            payment_options: None,
        };
        let keys = StubKeys::default();
        let notifier = StubNotifier::default();
        let adopted = rotate_payment_option(
            &mut ron,
            &keys,
            &notifier,
            &policy(),
            &key(Some("deposit"), Some(45)),
            Utc::now(),
        )
        .await;
        assert_eq!(adopted, "deposit");
        // timestamp not refreshed, rotation retries next request
        assert!(keys.updates.lock().unwrap().is_empty());
    }
}
