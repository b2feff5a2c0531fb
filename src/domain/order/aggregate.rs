use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::value_objects::{
    CustomerId, DriverId, Meal, MealId, Money, OrderId, OrderLine, OrderLineRequest, OrderStatus,
    RestaurantId,
};
use super::events::*;
use super::commands::OrderCommand;
use super::errors::OrderError;

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: OrderId,
    pub version: i64,

    // Parties
    pub customer_id: CustomerId,
    pub restaurant_id: RestaurantId,
    pub driver_id: Option<DriverId>,

    // Current State
    pub status: OrderStatus,
    pub address: String,
    pub total: Money,
    pub payment_reference: String,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub picked_up_at: Option<DateTime<Utc>>,
}

impl Order {
    /// A freshly paid order. Starts in COOKING at version 1.
    pub fn new(
        customer_id: CustomerId,
        restaurant_id: RestaurantId,
        address: String,
        total: Money,
        payment_reference: String,
    ) -> Self {
        Self {
            id: OrderId::new(),
            version: 1,
            customer_id,
            restaurant_id,
            driver_id: None,
            status: OrderStatus::Cooking,
            address,
            total,
            payment_reference,
            created_at: Utc::now(),
            picked_up_at: None,
        }
    }

    pub fn created_event(&self, line_count: usize) -> OrderEvent {
        OrderEvent::Created(OrderCreated {
            customer_id: self.customer_id,
            restaurant_id: self.restaurant_id,
            total: self.total,
            payment_reference: self.payment_reference.clone(),
            line_count,
        })
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    fn invalid_state(&self, command: &OrderCommand) -> OrderError {
        OrderError::InvalidState {
            order_id: self.id,
            status: self.status,
            action: command.action(),
        }
    }

    /// Validate a command against current state.
    ///
    /// Returns the event to apply, or `None` when the command is already
    /// satisfied (marking an order ready that has moved past COOKING).
    pub fn handle_command(&self, command: &OrderCommand) -> Result<Option<OrderEvent>, OrderError> {
        match *command {
            OrderCommand::MarkReady { restaurant_id } => {
                if self.restaurant_id != restaurant_id {
                    return Err(OrderError::Forbidden(self.id));
                }

                match self.status {
                    OrderStatus::Cooking => Ok(Some(OrderEvent::MarkedReady(OrderMarkedReady {
                        ready_at: Utc::now(),
                    }))),
                    OrderStatus::Ready | OrderStatus::OnTheWay | OrderStatus::Delivered => Ok(None),
                }
            }

            OrderCommand::Claim { driver_id } => match (self.status, self.driver_id) {
                (OrderStatus::Ready, None) => Ok(Some(OrderEvent::PickedUp(OrderPickedUp {
                    driver_id,
                    picked_up_at: Utc::now(),
                }))),
                (OrderStatus::Cooking, _) => Err(self.invalid_state(command)),
                _ => Err(OrderError::AlreadyClaimed(self.id)),
            },

            OrderCommand::CompleteDelivery { driver_id } => {
                if self.driver_id.is_some_and(|assigned| assigned != driver_id) {
                    return Err(OrderError::Forbidden(self.id));
                }

                match self.status {
                    OrderStatus::OnTheWay => Ok(Some(OrderEvent::Delivered(OrderDelivered {
                        delivered_at: Utc::now(),
                    }))),
                    _ => Err(self.invalid_state(command)),
                }
            }
        }
    }

    /// Apply a transition event and bump the version.
    pub fn apply_event(&mut self, event: &OrderEvent) -> Result<(), OrderError> {
        let target = match event {
            OrderEvent::Created(_) => None,
            OrderEvent::MarkedReady(_) => Some(OrderStatus::Ready),
            OrderEvent::PickedUp(_) => Some(OrderStatus::OnTheWay),
            OrderEvent::Delivered(_) => Some(OrderStatus::Delivered),
        };

        if target.is_none() || self.status.successor() != target {
            return Err(OrderError::InvalidState {
                order_id: self.id,
                status: self.status,
                action: "apply event to",
            });
        }

        match event {
            OrderEvent::Created(_) => {}
            OrderEvent::MarkedReady(_) => {
                self.status = OrderStatus::Ready;
            }
            OrderEvent::PickedUp(e) => {
                self.status = OrderStatus::OnTheWay;
                self.driver_id = Some(e.driver_id);
                self.picked_up_at = Some(e.picked_up_at);
            }
            OrderEvent::Delivered(_) => {
                self.status = OrderStatus::Delivered;
            }
        }

        self.version += 1;
        Ok(())
    }
}

/// Price requested lines against the meal catalog.
///
/// Every meal must exist and belong to `restaurant_id`. Returns the lines
/// (with sub totals captured now) and their sum.
pub fn price_lines(
    order_id: OrderId,
    restaurant_id: RestaurantId,
    requests: &[OrderLineRequest],
    meals: &HashMap<MealId, Meal>,
) -> Result<(Vec<OrderLine>, Money), OrderError> {
    if requests.is_empty() {
        return Err(OrderError::EmptyLines);
    }

    let mut lines = Vec::with_capacity(requests.len());
    let mut total = Money::ZERO;

    for request in requests {
        let meal = meals
            .get(&request.meal_id())
            .ok_or(OrderError::UnknownMeal(request.meal_id()))?;

        if meal.restaurant_id != restaurant_id {
            return Err(OrderError::MealNotOffered {
                meal_id: meal.id,
                restaurant_id,
            });
        }

        let sub_total = meal
            .price
            .checked_mul(request.quantity())
            .ok_or(OrderError::TotalOverflow)?;
        total = total.checked_add(sub_total).ok_or(OrderError::TotalOverflow)?;

        lines.push(OrderLine {
            order_id,
            meal_id: meal.id,
            quantity: request.quantity(),
            sub_total,
        });
    }

    Ok((lines, total))
}

// ============================================================================
// Unit Tests
// ============================================================================
