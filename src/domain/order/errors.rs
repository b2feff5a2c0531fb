use chrono::NaiveDate;
use serde::Serialize;

use crate::store::StoreError;
use super::value_objects::{CustomerId, MealId, Money, OrderLine, OrderStatus, OrderId, RestaurantId};

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Address is required")]
    EmptyAddress,

    #[error("Order must contain at least one meal")]
    EmptyLines,

    #[error("Invalid meal quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Meal not found: {0}")]
    UnknownMeal(MealId),

    #[error("Meal {meal_id} is not offered by restaurant {restaurant_id}")]
    MealNotOffered {
        meal_id: MealId,
        restaurant_id: RestaurantId,
    },

    #[error("Order total is too large")]
    TotalOverflow,

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Week starting {0} is out of range")]
    InvalidWeek(NaiveDate),

    #[error("existing order in progress")]
    ActiveOrderExists,

    #[error("driver already delivering")]
    DriverAlreadyDelivering,

    #[error("Order {0} was modified concurrently")]
    ConcurrentModification(OrderId),

    #[error("Cannot {action} order {order_id} while it is {status}")]
    InvalidState {
        order_id: OrderId,
        status: OrderStatus,
        action: &'static str,
    },

    #[error("Order {0} has been picked up by another driver")]
    AlreadyClaimed(OrderId),

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error(
        "Payment {} captured but the order was not recorded: {}",
        .0.payment_reference,
        .0.cause
    )]
    Reconciliation(Box<ReconciliationReport>),

    #[error("Order not found: {0}")]
    NotFound(OrderId),

    #[error("Order {0} does not belong to the caller")]
    Forbidden(OrderId),

    #[error("Storage failure: {0}")]
    Store(#[from] StoreError),
}

/// Error families callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    InvalidState,
    AlreadyClaimed,
    PaymentDeclined,
    Reconciliation,
    NotFound,
    Forbidden,
    Internal,
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::EmptyAddress
            | OrderError::EmptyLines
            | OrderError::InvalidQuantity(_)
            | OrderError::UnknownMeal(_)
            | OrderError::MealNotOffered { .. }
            | OrderError::TotalOverflow
            | OrderError::InvalidLocation(_)
            | OrderError::InvalidWeek(_) => ErrorKind::Validation,
            OrderError::ActiveOrderExists
            | OrderError::DriverAlreadyDelivering
            | OrderError::ConcurrentModification(_) => ErrorKind::Conflict,
            OrderError::InvalidState { .. } => ErrorKind::InvalidState,
            OrderError::AlreadyClaimed(_) => ErrorKind::AlreadyClaimed,
            OrderError::PaymentDeclined(_) => ErrorKind::PaymentDeclined,
            OrderError::Reconciliation(_) => ErrorKind::Reconciliation,
            OrderError::NotFound(_) => ErrorKind::NotFound,
            OrderError::Forbidden(_) => ErrorKind::Forbidden,
            OrderError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code, one per variant.
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::EmptyAddress => "address_required",
            OrderError::EmptyLines => "order_lines_required",
            OrderError::InvalidQuantity(_) => "invalid_quantity",
            OrderError::UnknownMeal(_) => "unknown_meal",
            OrderError::MealNotOffered { .. } => "meal_not_offered",
            OrderError::TotalOverflow => "total_overflow",
            OrderError::InvalidLocation(_) => "invalid_location",
            OrderError::InvalidWeek(_) => "invalid_week",
            OrderError::ActiveOrderExists => "order_in_progress",
            OrderError::DriverAlreadyDelivering => "driver_already_delivering",
            OrderError::ConcurrentModification(_) => "concurrent_modification",
            OrderError::InvalidState { .. } => "invalid_state",
            OrderError::AlreadyClaimed(_) => "already_claimed",
            OrderError::PaymentDeclined(_) => "payment_declined",
            OrderError::Reconciliation(_) => "reconciliation_required",
            OrderError::NotFound(_) => "order_not_found",
            OrderError::Forbidden(_) => "forbidden",
            OrderError::Store(_) => "internal_error",
        }
    }
}

/// Everything needed to reconcile a captured payment whose order was lost.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub payment_reference: String,
    pub amount: Money,
    pub customer_id: CustomerId,
    pub restaurant_id: RestaurantId,
    pub address: String,
    pub lines: Vec<OrderLine>,
    pub cause: String,
}
