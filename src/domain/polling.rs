// ============================================================================
// Polling Service - Read models the actors poll
// ============================================================================
//
// Customers poll their latest order and their driver's position, restaurants
// poll a new-order count past a watermark, drivers poll their current order
// and push their position. Locations are last-write-wins.
//
// ============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::domain::order::{
    CustomerId, DriverId, Location, Meal, Order, OrderError, OrderLine, RestaurantId,
};
use crate::store::{LocationStore, OrderStore};

/// An order together with its persisted lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

pub struct PollingService {
    orders: Arc<dyn OrderStore>,
    locations: Arc<dyn LocationStore>,
}

impl PollingService {
    pub fn new(orders: Arc<dyn OrderStore>, locations: Arc<dyn LocationStore>) -> Self {
        Self { orders, locations }
    }

    async fn with_lines(&self, order: Option<Order>) -> Result<Option<OrderDetails>, OrderError> {
        match order {
            Some(order) => {
                let lines = self.orders.get_lines(order.id).await?;
                Ok(Some(OrderDetails { order, lines }))
            }
            None => Ok(None),
        }
    }

    /// The customer's most recently created order.
    pub async fn latest_order_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<OrderDetails>, OrderError> {
        let order = self.orders.latest_order_for_customer(customer_id).await?;
        self.with_lines(order).await
    }

    /// The order the driver picked up most recently.
    pub async fn latest_order_for_driver(
        &self,
        driver_id: DriverId,
    ) -> Result<Option<OrderDetails>, OrderError> {
        let order = self.orders.latest_order_for_driver(driver_id).await?;
        self.with_lines(order).await
    }

    pub async fn update_driver_location(
        &self,
        driver_id: DriverId,
        location: Location,
    ) -> Result<(), OrderError> {
        self.locations.set_driver_location(driver_id, location).await?;
        tracing::debug!(driver_id = %driver_id, location = %location, "Driver location updated");
        Ok(())
    }

    /// Position of the driver carrying the customer's ON_THE_WAY order.
    /// `None` when nothing is on the way or the driver never reported.
    pub async fn driver_location_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<Location>, OrderError> {
        let Some(order) = self.orders.active_delivery_for_customer(customer_id).await? else {
            return Ok(None);
        };
        let Some(driver_id) = order.driver_id else {
            return Ok(None);
        };
        Ok(self.locations.driver_location(driver_id).await?)
    }

    /// Orders for the restaurant created strictly after `watermark`.
    pub async fn new_order_count_since(
        &self,
        restaurant_id: RestaurantId,
        watermark: DateTime<Utc>,
    ) -> Result<u64, OrderError> {
        Ok(self
            .orders
            .count_orders_created_since(restaurant_id, watermark)
            .await?)
    }

    pub async fn orders_for_restaurant(
        &self,
        restaurant_id: RestaurantId,
    ) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.orders_for_restaurant(restaurant_id).await?)
    }

    pub async fn meals_for_restaurant(
        &self,
        restaurant_id: RestaurantId,
    ) -> Result<Vec<Meal>, OrderError> {
        Ok(self.orders.meals_for_restaurant(restaurant_id).await?)
    }
}
