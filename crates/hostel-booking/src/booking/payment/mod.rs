//! Boundary to the external payment provider. The engine never moves money
//! itself; it initiates an intent, hands the student a redirect, and later
//! verifies the outcome. Confirmation idempotency is enforced by the booking
//! state machine, not here.

mod khalti;

pub use khalti::KhaltiGateway;

use std::time::Duration;

use async_trait::async_trait;

use super::domain::BookingId;

/// Identifier and redirect issued by the provider for one payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PaymentIntent {
    pub intent_id: String,
    pub redirect_url: String,
}

/// Provider receipt for a settled payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub reference: String,
    pub amount_paisa: u64,
}

/// Result of a verification query against the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded(PaymentReceipt),
    Declined { reason: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate(
        &self,
        booking_id: &BookingId,
        amount_paisa: u64,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn verify(&self, intent_id: &str) -> Result<PaymentOutcome, GatewayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Provider unreachable or slow; the only retryable failure.
    #[error("payment gateway timed out")]
    Timeout,
    #[error("payment gateway error: {0}")]
    Protocol(String),
}

/// Bounded retry schedule for gateway timeouts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    fn delay_before(&self, attempt: u32) -> Duration {
        // 200ms, 400ms, 800ms, ... capped by max_attempts anyway.
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Decorator retrying [`GatewayError::Timeout`] with exponential backoff.
/// Protocol errors and declined payments surface on first occurrence.
pub struct RetryingGateway<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G> RetryingGateway<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<G> PaymentGateway for RetryingGateway<G>
where
    G: PaymentGateway,
{
    async fn initiate(
        &self,
        booking_id: &BookingId,
        amount_paisa: u64,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut attempt = 1;
        loop {
            match self.inner.initiate(booking_id, amount_paisa).await {
                Err(GatewayError::Timeout) if attempt < self.policy.max_attempts => {
                    tracing::warn!(%booking_id, attempt, "payment initiate timed out, retrying");
                    tokio::time::sleep(self.policy.delay_before(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn verify(&self, intent_id: &str) -> Result<PaymentOutcome, GatewayError> {
        let mut attempt = 1;
        loop {
            match self.inner.verify(intent_id).await {
                Err(GatewayError::Timeout) if attempt < self.policy.max_attempts => {
                    tracing::warn!(intent_id, attempt, "payment lookup timed out, retrying");
                    tokio::time::sleep(self.policy.delay_before(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
