// Private module declaration
mod server;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::configure;

// ============================================================================
// Metrics Module - Prometheus metrics for the order lifecycle
// ============================================================================
//
// Covers:
// - Order creation and rejections (by operation and error code)
// - Status transitions
// - Claim contention
// - Payment capture outcomes and latency
// - Captured payments that need manual reconciliation
//
// All metrics are registered with one Registry and scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Lifecycle
    pub orders_created: IntCounter,
    pub order_rejections: IntCounterVec,
    pub status_transitions: IntCounterVec,

    // Assignment
    pub claim_attempts: IntCounterVec,

    // Payment
    pub payment_charges: IntCounterVec,
    pub payment_charge_duration: Histogram,
    pub reconciliations_required: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Lifecycle
        let orders_created = IntCounter::new("orders_created_total", "Orders paid and recorded")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_rejections = IntCounterVec::new(
            Opts::new("order_rejections_total", "Rejected order operations"),
            &["operation", "code"],
        )?;
        registry.register(Box::new(order_rejections.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Committed order status transitions"),
            &["from_status", "to_status"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        // Assignment
        let claim_attempts = IntCounterVec::new(
            Opts::new("order_claim_attempts_total", "Driver claim attempts"),
            &["outcome"],
        )?;
        registry.register(Box::new(claim_attempts.clone()))?;

        // Payment
        let payment_charges = IntCounterVec::new(
            Opts::new("payment_charges_total", "Payment gateway charge calls"),
            &["outcome"],
        )?;
        registry.register(Box::new(payment_charges.clone()))?;

        let payment_charge_duration = Histogram::with_opts(
            HistogramOpts::new("payment_charge_duration_seconds", "Payment gateway charge latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(payment_charge_duration.clone()))?;

        let reconciliations_required = IntCounter::new(
            "payment_reconciliations_required_total",
            "Payments captured for orders that were not recorded",
        )?;
        registry.register(Box::new(reconciliations_required.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_rejections,
            status_transitions,
            claim_attempts,
            payment_charges,
            payment_charge_duration,
            reconciliations_required,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self) {
        self.orders_created.inc();
    }

    /// Helper to record a rejected operation by its stable error code
    pub fn record_rejection(&self, operation: &str, code: &str) {
        self.order_rejections.with_label_values(&[operation, code]).inc();
    }

    pub fn record_transition(&self, from_status: &str, to_status: &str) {
        self.status_transitions.with_label_values(&[from_status, to_status]).inc();
    }

    /// Outcome is `won`, `lost`, `driver_busy` or `rejected`
    pub fn record_claim(&self, outcome: &str) {
        self.claim_attempts.with_label_values(&[outcome]).inc();
    }

    /// Outcome is `accepted`, `declined` or `error`
    pub fn record_payment_charge(&self, outcome: &str, duration_secs: f64) {
        self.payment_charges.with_label_values(&[outcome]).inc();
        self.payment_charge_duration.observe(duration_secs);
    }

    pub fn record_reconciliation(&self) {
        self.reconciliations_required.inc();
    }
}
