// ============================================================================
// Order Store - Transactional persistence for orders, lines and history
// ============================================================================
//
// Every write is one atomic unit: the state change, its lines (on create) and
// its event envelope are either all visible or none are. Per-actor
// invariants (one active order per customer, one delivery per driver) are
// re-checked inside the same unit as the write they guard.
//
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::order::{
    CustomerId, DriverId, EventEnvelope, Location, Meal, MealId, Order, OrderId, OrderLine,
    RestaurantId,
};

mod memory;
mod postgres;

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Concurrency conflict on order {order_id}: expected version {expected}, but current is {actual}")]
    VersionConflict {
        order_id: OrderId,
        expected: i64,
        actual: i64,
    },

    #[error("Customer {0} already has an order in progress")]
    CustomerHasActiveOrder(CustomerId),

    #[error("Driver {0} is already delivering an order")]
    DriverBusy(DriverId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Keyset position for newest-first paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub created_at: DateTime<Utc>,
    pub id: OrderId,
}

impl From<&Order> for PageCursor {
    fn from(order: &Order) -> Self {
        Self {
            created_at: order.created_at,
            id: order.id,
        }
    }
}

/// A customer's single active-order slot, reserved from before the charge
/// until the order is inserted or the attempt is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutHold {
    pub customer_id: CustomerId,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl CheckoutHold {
    pub fn new(customer_id: CustomerId, expires_at: DateTime<Utc>) -> Self {
        Self {
            customer_id,
            token: Uuid::new_v4(),
            expires_at,
        }
    }
}

/// Whose delivered orders a revenue query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevenueParty {
    Driver(DriverId),
    Restaurant(RestaurantId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MealPopularity {
    pub meal: Meal,
    pub quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverOrderCount {
    pub driver_id: DriverId,
    pub orders: u64,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn save_meal(&self, meal: &Meal) -> Result<(), StoreError>;

    async fn get_meals(&self, ids: &[MealId]) -> Result<Vec<Meal>, StoreError>;

    /// The restaurant's menu ordered by name.
    async fn meals_for_restaurant(&self, restaurant_id: RestaurantId) -> Result<Vec<Meal>, StoreError>;

    /// Reserve the customer's active-order slot until `expires_at`.
    ///
    /// Fails with `CustomerHasActiveOrder` if the customer has an order that
    /// is not yet DELIVERED or another unexpired hold. The check and the
    /// reservation are one atomic unit.
    async fn hold_checkout(
        &self,
        customer_id: CustomerId,
        expires_at: DateTime<Utc>,
    ) -> Result<CheckoutHold, StoreError>;

    /// Drop a hold that did not become an order. A no-op once the hold was
    /// consumed or taken over after expiring.
    async fn release_checkout(&self, hold: &CheckoutHold) -> Result<(), StoreError>;

    /// Whether the driver holds an ON_THE_WAY order.
    async fn is_driver_busy(&self, driver_id: DriverId) -> Result<bool, StoreError>;

    /// Insert a new order with its lines and creation event, consuming the
    /// customer's checkout hold.
    ///
    /// Fails with `CustomerHasActiveOrder` if the customer gained an active
    /// order since any earlier check.
    async fn insert_order(
        &self,
        order: &Order,
        lines: &[OrderLine],
        event: &EventEnvelope,
    ) -> Result<(), StoreError>;

    /// Persist `order` (already transitioned) only if the stored version is
    /// still `expected_version`. A pick-up additionally fails with
    /// `DriverBusy` if the driver holds another ON_THE_WAY order.
    async fn commit_transition(
        &self,
        order: &Order,
        expected_version: i64,
        event: &EventEnvelope,
    ) -> Result<(), StoreError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn get_lines(&self, id: OrderId) -> Result<Vec<OrderLine>, StoreError>;

    async fn load_events(&self, id: OrderId) -> Result<Vec<EventEnvelope>, StoreError>;

    /// READY, unassigned orders strictly older than `after`, newest first.
    async fn ready_orders_page(
        &self,
        after: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<Order>, StoreError>;

    async fn latest_order_for_customer(&self, customer_id: CustomerId) -> Result<Option<Order>, StoreError>;

    /// Most recently picked-up order for the driver.
    async fn latest_order_for_driver(&self, driver_id: DriverId) -> Result<Option<Order>, StoreError>;

    async fn active_delivery_for_customer(&self, customer_id: CustomerId) -> Result<Option<Order>, StoreError>;

    async fn orders_for_restaurant(&self, restaurant_id: RestaurantId) -> Result<Vec<Order>, StoreError>;

    async fn count_orders_created_since(
        &self,
        restaurant_id: RestaurantId,
        watermark: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// DELIVERED orders for `party` created in `[from, to)`.
    async fn delivered_orders(
        &self,
        party: RevenueParty,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError>;

    async fn meal_popularity(
        &self,
        restaurant_id: RestaurantId,
        limit: usize,
    ) -> Result<Vec<MealPopularity>, StoreError>;

    async fn driver_order_counts(
        &self,
        restaurant_id: RestaurantId,
        limit: usize,
    ) -> Result<Vec<DriverOrderCount>, StoreError>;
}

/// Last-write-wins driver coordinates.
#[async_trait]
pub trait LocationStore: Send + Sync {
    async fn set_driver_location(&self, driver_id: DriverId, location: Location) -> Result<(), StoreError>;

    async fn driver_location(&self, driver_id: DriverId) -> Result<Option<Location>, StoreError>;
}
