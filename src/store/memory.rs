//! In-memory order store.
//!
//! All state sits behind one async mutex, so each trait method runs as a
//! single indivisible critical section. Useful for tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{
    CheckoutHold, DriverOrderCount, LocationStore, MealPopularity, OrderStore, PageCursor, RevenueParty,
    StoreError,
};
use crate::domain::order::{
    CustomerId, DriverId, EventEnvelope, Location, Meal, MealId, Order, OrderEvent, OrderId,
    OrderLine, OrderStatus, RestaurantId,
};

#[derive(Default)]
struct State {
    meals: HashMap<MealId, Meal>,
    orders: HashMap<OrderId, Order>,
    lines: HashMap<OrderId, Vec<OrderLine>>,
    events: HashMap<OrderId, Vec<EventEnvelope>>,
    locations: HashMap<DriverId, Location>,
    checkout_holds: HashMap<CustomerId, CheckoutHold>,
    insert_failure: Option<String>,
}

impl State {
    fn newest_first(&self, filter: impl Fn(&Order) -> bool) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.values().filter(|o| filter(o)).cloned().collect();
        orders.sort_by_key(|o| Reverse((o.created_at, o.id)));
        orders
    }

    fn has_active_order(&self, customer_id: CustomerId) -> bool {
        self.orders
            .values()
            .any(|o| o.customer_id == customer_id && o.is_active())
    }

    fn driver_busy(&self, driver_id: DriverId, except: Option<OrderId>) -> bool {
        self.orders.values().any(|o| {
            o.driver_id == Some(driver_id)
                && o.status == OrderStatus::OnTheWay
                && Some(o.id) != except
        })
    }
}

pub struct MemoryOrderStore {
    state: Mutex<State>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Make every subsequent `insert_order` fail with `cause` until cleared.
    pub async fn set_insert_failure(&self, cause: Option<String>) {
        self.state.lock().await.insert_failure = cause;
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }
}

impl Default for MemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn save_meal(&self, meal: &Meal) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.meals.insert(meal.id, meal.clone());
        Ok(())
    }

    async fn get_meals(&self, ids: &[MealId]) -> Result<Vec<Meal>, StoreError> {
        let state = self.state.lock().await;
        Ok(ids.iter().filter_map(|id| state.meals.get(id).cloned()).collect())
    }

    async fn meals_for_restaurant(&self, restaurant_id: RestaurantId) -> Result<Vec<Meal>, StoreError> {
        let state = self.state.lock().await;
        let mut meals: Vec<Meal> = state
            .meals
            .values()
            .filter(|m| m.restaurant_id == restaurant_id)
            .cloned()
            .collect();
        meals.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(meals)
    }

    async fn hold_checkout(
        &self,
        customer_id: CustomerId,
        expires_at: DateTime<Utc>,
    ) -> Result<CheckoutHold, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let held = state
            .checkout_holds
            .get(&customer_id)
            .is_some_and(|hold| hold.expires_at > now);
        if held || state.has_active_order(customer_id) {
            return Err(StoreError::CustomerHasActiveOrder(customer_id));
        }

        let hold = CheckoutHold::new(customer_id, expires_at);
        state.checkout_holds.insert(customer_id, hold);
        Ok(hold)
    }

    async fn release_checkout(&self, hold: &CheckoutHold) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state
            .checkout_holds
            .get(&hold.customer_id)
            .is_some_and(|current| current.token == hold.token)
        {
            state.checkout_holds.remove(&hold.customer_id);
        }
        Ok(())
    }

    async fn is_driver_busy(&self, driver_id: DriverId) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.driver_busy(driver_id, None))
    }

    async fn insert_order(
        &self,
        order: &Order,
        lines: &[OrderLine],
        event: &EventEnvelope,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;

        if let Some(cause) = &state.insert_failure {
            return Err(StoreError::Unavailable(cause.clone()));
        }

        if state.has_active_order(order.customer_id) {
            return Err(StoreError::CustomerHasActiveOrder(order.customer_id));
        }

        state.checkout_holds.remove(&order.customer_id);
        state.orders.insert(order.id, order.clone());
        state.lines.insert(order.id, lines.to_vec());
        state.events.insert(order.id, vec![event.clone()]);

        tracing::debug!(order_id = %order.id, "Inserted order into memory store");
        Ok(())
    }

    async fn commit_transition(
        &self,
        order: &Order,
        expected_version: i64,
        event: &EventEnvelope,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;

        let current = state
            .orders
            .get(&order.id)
            .ok_or(StoreError::OrderNotFound(order.id))?;

        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                order_id: order.id,
                expected: expected_version,
                actual: current.version,
            });
        }

        if let OrderEvent::PickedUp(e) = &event.event_data {
            if state.driver_busy(e.driver_id, Some(order.id)) {
                return Err(StoreError::DriverBusy(e.driver_id));
            }
        }

        state.orders.insert(order.id, order.clone());
        state.events.entry(order.id).or_default().push(event.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn get_lines(&self, id: OrderId) -> Result<Vec<OrderLine>, StoreError> {
        Ok(self.state.lock().await.lines.get(&id).cloned().unwrap_or_default())
    }

    async fn load_events(&self, id: OrderId) -> Result<Vec<EventEnvelope>, StoreError> {
        let mut events = self.state.lock().await.events.get(&id).cloned().unwrap_or_default();
        events.sort_by_key(|e| e.sequence_number);
        Ok(events)
    }

    async fn ready_orders_page(
        &self,
        after: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        let orders = state.newest_first(|o| {
            o.status == OrderStatus::Ready
                && o.driver_id.is_none()
                && after.map_or(true, |c| (o.created_at, o.id) < (c.created_at, c.id))
        });
        Ok(orders.into_iter().take(limit).collect())
    }

    async fn latest_order_for_customer(&self, customer_id: CustomerId) -> Result<Option<Order>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .newest_first(|o| o.customer_id == customer_id)
            .into_iter()
            .next())
    }

    async fn latest_order_for_driver(&self, driver_id: DriverId) -> Result<Option<Order>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .values()
            .filter(|o| o.driver_id == Some(driver_id))
            .max_by_key(|o| (o.picked_up_at, o.id))
            .cloned())
    }

    async fn active_delivery_for_customer(&self, customer_id: CustomerId) -> Result<Option<Order>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .newest_first(|o| o.customer_id == customer_id && o.status == OrderStatus::OnTheWay)
            .into_iter()
            .next())
    }

    async fn orders_for_restaurant(&self, restaurant_id: RestaurantId) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .newest_first(|o| o.restaurant_id == restaurant_id))
    }

    async fn count_orders_created_since(
        &self,
        restaurant_id: RestaurantId,
        watermark: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .values()
            .filter(|o| o.restaurant_id == restaurant_id && o.created_at > watermark)
            .count() as u64)
    }

    async fn delivered_orders(
        &self,
        party: RevenueParty,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.newest_first(|o| {
            let belongs = match party {
                RevenueParty::Driver(driver_id) => o.driver_id == Some(driver_id),
                RevenueParty::Restaurant(restaurant_id) => o.restaurant_id == restaurant_id,
            };
            belongs
                && o.status == OrderStatus::Delivered
                && o.created_at >= from
                && o.created_at < to
        }))
    }

    async fn meal_popularity(
        &self,
        restaurant_id: RestaurantId,
        limit: usize,
    ) -> Result<Vec<MealPopularity>, StoreError> {
        let state = self.state.lock().await;

        let mut quantities: HashMap<MealId, u64> = HashMap::new();
        for line in state.lines.values().flatten() {
            *quantities.entry(line.meal_id).or_default() += u64::from(line.quantity);
        }

        let mut ranked: Vec<MealPopularity> = state
            .meals
            .values()
            .filter(|m| m.restaurant_id == restaurant_id)
            .map(|m| MealPopularity {
                meal: m.clone(),
                quantity: quantities.get(&m.id).copied().unwrap_or(0),
            })
            .collect();
        ranked.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| a.meal.name.cmp(&b.meal.name)));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn driver_order_counts(
        &self,
        restaurant_id: RestaurantId,
        limit: usize,
    ) -> Result<Vec<DriverOrderCount>, StoreError> {
        let state = self.state.lock().await;

        let mut counts: HashMap<DriverId, u64> = HashMap::new();
        for order in state.orders.values().filter(|o| o.restaurant_id == restaurant_id) {
            if let Some(driver_id) = order.driver_id {
                *counts.entry(driver_id).or_default() += 1;
            }
        }

        let mut ranked: Vec<DriverOrderCount> = counts
            .into_iter()
            .map(|(driver_id, orders)| DriverOrderCount { driver_id, orders })
            .collect();
        ranked.sort_by(|a, b| b.orders.cmp(&a.orders).then_with(|| a.driver_id.cmp(&b.driver_id)));
        ranked.truncate(limit);
        Ok(ranked)
    }
}

#[async_trait]
impl LocationStore for MemoryOrderStore {
    async fn set_driver_location(&self, driver_id: DriverId, location: Location) -> Result<(), StoreError> {
        self.state.lock().await.locations.insert(driver_id, location);
        Ok(())
    }

    async fn driver_location(&self, driver_id: DriverId) -> Result<Option<Location>, StoreError> {
        Ok(self.state.lock().await.locations.get(&driver_id).copied())
    }
}
