use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::payment::{ChargeOutcome, PaymentGateway};
use crate::store::{CheckoutHold, OrderStore, StoreError};

use super::aggregate::{price_lines, Order};
use super::commands::OrderCommand;
use super::errors::{ErrorKind, OrderError, ReconciliationReport};
use super::events::EventEnvelope;
use super::value_objects::{
    CustomerId, DriverId, Meal, MealId, Money, OrderId, OrderLine, OrderLineRequest, RestaurantId,
};

// ============================================================================
// Order Lifecycle
// ============================================================================
//
// createOrder: validate → hold customer slot → price → charge → insert
//
// The checkout hold is taken before the charge and consumed by the insert, so
// a second submission from the same customer is turned away uncharged.
// transitions: load → handle_command → apply_event → conditional commit
//
// A commit that loses a version race reloads the order and re-evaluates the
// command against the fresh state.
//
// ============================================================================

const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// Upper bound on a checkout; a crashed attempt frees the customer after this.
const CHECKOUT_HOLD_SECS: i64 = 300;

pub struct OrderLifecycle {
    store: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentGateway>,
    metrics: Arc<Metrics>,
}

impl OrderLifecycle {
    pub fn new(
        store: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentGateway>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            payments,
            metrics,
        }
    }

    /// Charge the customer and record a COOKING order with its lines.
    ///
    /// Nothing is persisted unless the charge is accepted. A charge that
    /// succeeds for an order that then fails to persist is returned as
    /// `OrderError::Reconciliation`.
    pub async fn create_order(
        &self,
        customer_id: CustomerId,
        restaurant_id: RestaurantId,
        address: &str,
        lines: &[OrderLineRequest],
        payment_source: &str,
    ) -> Result<Order, OrderError> {
        let result = self
            .try_create_order(customer_id, restaurant_id, address, lines, payment_source)
            .await;

        if let Err(e) = &result {
            self.reject("create_order", e);
        }
        result
    }

    async fn try_create_order(
        &self,
        customer_id: CustomerId,
        restaurant_id: RestaurantId,
        address: &str,
        lines: &[OrderLineRequest],
        payment_source: &str,
    ) -> Result<Order, OrderError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(OrderError::EmptyAddress);
        }
        if lines.is_empty() {
            return Err(OrderError::EmptyLines);
        }

        let expires_at = Utc::now() + Duration::seconds(CHECKOUT_HOLD_SECS);
        let hold = match self.store.hold_checkout(customer_id, expires_at).await {
            Ok(hold) => hold,
            Err(StoreError::CustomerHasActiveOrder(_)) => return Err(OrderError::ActiveOrderExists),
            Err(e) => return Err(e.into()),
        };

        let result = self
            .checkout(&hold, restaurant_id, address, lines, payment_source)
            .await;
        if result.is_err() {
            self.release_hold(&hold).await;
        }
        result
    }

    async fn release_hold(&self, hold: &CheckoutHold) {
        if let Err(e) = self.store.release_checkout(hold).await {
            tracing::warn!(
                customer_id = %hold.customer_id,
                expires_at = %hold.expires_at,
                error = %e,
                "Failed to release checkout hold"
            );
        }
    }

    async fn checkout(
        &self,
        hold: &CheckoutHold,
        restaurant_id: RestaurantId,
        address: &str,
        lines: &[OrderLineRequest],
        payment_source: &str,
    ) -> Result<Order, OrderError> {
        let customer_id = hold.customer_id;

        let meal_ids: Vec<MealId> = lines.iter().map(OrderLineRequest::meal_id).collect();
        let meals: HashMap<MealId, Meal> = self
            .store
            .get_meals(&meal_ids)
            .await?
            .into_iter()
            .map(|meal| (meal.id, meal))
            .collect();

        let order_id = OrderId::new();
        let (order_lines, total) = price_lines(order_id, restaurant_id, lines, &meals)?;

        let payment_reference = self.charge(customer_id, total, payment_source).await?;

        let order = Order {
            id: order_id,
            ..Order::new(
                customer_id,
                restaurant_id,
                address.to_string(),
                total,
                payment_reference,
            )
        };
        let event = EventEnvelope::new(
            order.id,
            order.version,
            order.created_event(order_lines.len()),
            Uuid::new_v4(),
        );

        if let Err(e) = self.store.insert_order(&order, &order_lines, &event).await {
            let report = ReconciliationReport {
                payment_reference: order.payment_reference.clone(),
                amount: total,
                customer_id,
                restaurant_id,
                address: order.address.clone(),
                lines: order_lines,
                cause: e.to_string(),
            };

            tracing::error!(
                payment_reference = %report.payment_reference,
                amount = %report.amount,
                customer_id = %customer_id,
                restaurant_id = %restaurant_id,
                error = %e,
                "Payment captured but order was not recorded"
            );
            self.metrics.record_reconciliation();
            return Err(OrderError::Reconciliation(Box::new(report)));
        }

        self.metrics.record_order_created();
        tracing::info!(
            order_id = %order.id,
            customer_id = %customer_id,
            restaurant_id = %restaurant_id,
            total = %total,
            line_count = order_lines.len(),
            "Order created"
        );

        Ok(order)
    }

    async fn charge(
        &self,
        customer_id: CustomerId,
        total: Money,
        payment_source: &str,
    ) -> Result<String, OrderError> {
        let started = Instant::now();
        let result = self.payments.charge(total.minor_units(), payment_source).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(ChargeOutcome::Accepted { reference }) => {
                self.metrics.record_payment_charge("accepted", elapsed);
                tracing::info!(
                    customer_id = %customer_id,
                    amount = %total,
                    payment_reference = %reference,
                    "Payment accepted"
                );
                Ok(reference)
            }
            Ok(ChargeOutcome::Declined { reason }) => {
                self.metrics.record_payment_charge("declined", elapsed);
                tracing::info!(customer_id = %customer_id, amount = %total, reason = %reason, "Payment declined");
                Err(OrderError::PaymentDeclined(reason))
            }
            Err(e) => {
                self.metrics.record_payment_charge("error", elapsed);
                tracing::warn!(customer_id = %customer_id, amount = %total, error = %e, "Payment gateway failed");
                Err(OrderError::PaymentDeclined(e.to_string()))
            }
        }
    }

    /// COOKING → READY. Returns the order unchanged if it is already READY
    /// or later.
    pub async fn advance_to_ready(
        &self,
        order_id: OrderId,
        restaurant_id: RestaurantId,
    ) -> Result<Order, OrderError> {
        let result = self
            .transition(order_id, OrderCommand::MarkReady { restaurant_id })
            .await;

        if let Err(e) = &result {
            self.reject("advance_to_ready", e);
        }
        result
    }

    /// ON_THE_WAY → DELIVERED, by the assigned driver only.
    pub async fn complete_delivery(
        &self,
        order_id: OrderId,
        driver_id: DriverId,
    ) -> Result<Order, OrderError> {
        let result = self
            .transition(order_id, OrderCommand::CompleteDelivery { driver_id })
            .await;

        if let Err(e) = &result {
            self.reject("complete_delivery", e);
        }
        result
    }

    async fn transition(&self, order_id: OrderId, command: OrderCommand) -> Result<Order, OrderError> {
        let correlation_id = Uuid::new_v4();
        let mut order = self.load(order_id).await?;

        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let Some(event) = order.handle_command(&command)? else {
                tracing::debug!(order_id = %order_id, status = %order.status, "Transition already applied");
                return Ok(order);
            };

            let from = order.status;
            let expected_version = order.version;
            let mut updated = order.clone();
            updated.apply_event(&event)?;

            let envelope = EventEnvelope::new(order_id, updated.version, event, correlation_id);
            match self.store.commit_transition(&updated, expected_version, &envelope).await {
                Ok(()) => {
                    self.metrics.record_transition(from.as_str(), updated.status.as_str());
                    tracing::info!(
                        order_id = %order_id,
                        from = %from,
                        to = %updated.status,
                        version = updated.version,
                        "Order status changed"
                    );
                    return Ok(updated);
                }
                Err(StoreError::VersionConflict { actual, .. }) => {
                    tracing::debug!(
                        order_id = %order_id,
                        expected_version,
                        actual,
                        attempt,
                        "Version conflict, reloading order"
                    );
                    order = self.load(order_id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(OrderError::ConcurrentModification(order_id))
    }

    async fn load(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.load(order_id).await
    }

    pub async fn order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>, OrderError> {
        Ok(self.store.get_lines(order_id).await?)
    }

    /// Every event recorded for the order, oldest first.
    pub async fn order_history(&self, order_id: OrderId) -> Result<Vec<EventEnvelope>, OrderError> {
        self.load(order_id).await?;
        Ok(self.store.load_events(order_id).await?)
    }

    /// Add or replace a menu entry for the restaurant.
    pub async fn add_meal(
        &self,
        restaurant_id: RestaurantId,
        name: &str,
        price: Money,
    ) -> Result<Meal, OrderError> {
        let meal = Meal {
            id: MealId(Uuid::new_v4()),
            restaurant_id,
            name: name.trim().to_string(),
            price,
        };
        self.store.save_meal(&meal).await?;

        tracing::info!(meal_id = %meal.id, restaurant_id = %restaurant_id, price = %price, "Meal added");
        Ok(meal)
    }

    fn reject(&self, operation: &str, error: &OrderError) {
        self.metrics.record_rejection(operation, error.code());
        match error.kind() {
            // Logged where they are raised
            ErrorKind::Reconciliation => {}
            ErrorKind::Internal => {
                tracing::error!(operation, code = error.code(), error = %error, "Order operation failed");
            }
            _ => {
                tracing::warn!(operation, code = error.code(), error = %error, "Order operation rejected");
            }
        }
    }
}
