use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

use super::{ChargeOutcome, PaymentError, PaymentGateway};

/// In-process gateway that accepts every charge except for configured
/// source tokens. Used when no processor is wired in, and by tests.
pub struct SandboxGateway {
    currency: String,
    declined_tokens: HashSet<String>,
    decline_all: AtomicBool,
    unavailable: AtomicBool,
    charges: AtomicUsize,
}

impl SandboxGateway {
    pub fn new(currency: impl Into<String>, declined_tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            currency: currency.into(),
            declined_tokens: declined_tokens.into_iter().collect(),
            decline_all: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            charges: AtomicUsize::new(0),
        }
    }

    pub fn accepting() -> Self {
        Self::new("usd", Vec::new())
    }

    pub fn set_decline_all(&self, decline: bool) {
        self.decline_all.store(decline, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of charge calls received, including declined ones.
    pub fn charge_count(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn charge(&self, amount_minor: i64, source_token: &str) -> Result<ChargeOutcome, PaymentError> {
        self.charges.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PaymentError::Unavailable("sandbox gateway offline".to_string()));
        }

        if amount_minor <= 0 {
            return Err(PaymentError::InvalidAmount(amount_minor));
        }

        if self.decline_all.load(Ordering::SeqCst) || self.declined_tokens.contains(source_token) {
            tracing::debug!(amount_minor, currency = %self.currency, "Sandbox charge declined");
            return Ok(ChargeOutcome::Declined {
                reason: "card declined".to_string(),
            });
        }

        let reference = format!("ch_{}", Uuid::new_v4().simple());
        tracing::debug!(amount_minor, currency = %self.currency, reference = %reference, "Sandbox charge accepted");
        Ok(ChargeOutcome::Accepted { reference })
    }
}
