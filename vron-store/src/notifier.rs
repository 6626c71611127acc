//! Operator notification.
//!
//! Deployments hook a mailer in here; the shipped implementation writes a
//! structured tracing event, which is what the on-call alerting tails.

use async_trait::async_trait;

use vron_core::repository::OperatorNotifier;

#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl OperatorNotifier for TracingNotifier {
    async fn payment_fallback(&self, host_id: &str, adopted: &str) {
        tracing::warn!(
            host_id,
            adopted,
            "payment rotation fell back to the default option"
        );
    }
}
