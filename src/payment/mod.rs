// ============================================================================
// Payment Gateway - Charge capture boundary
// ============================================================================
//
// The core owns no retry policy. A declined or failed charge is terminal for
// that attempt; callers decide whether to resubmit.
//
// ============================================================================

use async_trait::async_trait;

mod sandbox;

pub use sandbox::SandboxGateway;

/// Result of a charge the gateway actually processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Accepted { reference: String },
    Declined { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid charge amount: {0}")]
    InvalidAmount(i64),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charge `amount_minor` minor currency units against `source_token`.
    async fn charge(&self, amount_minor: i64, source_token: &str) -> Result<ChargeOutcome, PaymentError>;
}
