//! PostgreSQL order store.
//!
//! Writes run in explicit transactions. Transitions are conditional updates
//! keyed on the row version; partial unique indexes back the per-customer
//! and per-driver invariants when two transactions race past the existence
//! checks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use uuid::Uuid;

use super::{
    CheckoutHold, DriverOrderCount, LocationStore, MealPopularity, OrderStore, PageCursor, RevenueParty,
    StoreError,
};
use crate::domain::order::{
    CustomerId, DriverId, EventEnvelope, Location, Meal, MealId, Money, Order, OrderEvent, OrderId,
    OrderLine, OrderStatus, RestaurantId,
};

const ORDER_COLUMNS: &str = "id, version, customer_id, restaurant_id, driver_id, status, address, \
     total_cents, payment_reference, created_at, picked_up_at";

const ACTIVE_PER_CUSTOMER_INDEX: &str = "orders_one_active_per_customer";
const DELIVERY_PER_DRIVER_INDEX: &str = "orders_one_delivery_per_driver";

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    version: i64,
    customer_id: Uuid,
    restaurant_id: Uuid,
    driver_id: Option<Uuid>,
    status: String,
    address: String,
    total_cents: i64,
    payment_reference: String,
    created_at: DateTime<Utc>,
    picked_up_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row.status.parse().map_err(StoreError::Corrupt)?;
        Ok(Order {
            id: OrderId(row.id),
            version: row.version,
            customer_id: CustomerId(row.customer_id),
            restaurant_id: RestaurantId(row.restaurant_id),
            driver_id: row.driver_id.map(DriverId),
            status,
            address: row.address,
            total: Money::from_minor_units(row.total_cents),
            payment_reference: row.payment_reference,
            created_at: row.created_at,
            picked_up_at: row.picked_up_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineRow {
    order_id: Uuid,
    meal_id: Uuid,
    quantity: i32,
    sub_total_cents: i64,
}

#[derive(sqlx::FromRow)]
struct MealRow {
    id: Uuid,
    restaurant_id: Uuid,
    name: String,
    price_cents: i64,
}

impl From<MealRow> for Meal {
    fn from(row: MealRow) -> Self {
        Meal {
            id: MealId(row.id),
            restaurant_id: RestaurantId(row.restaurant_id),
            name: row.name,
            price: Money::from_minor_units(row.price_cents),
        }
    }
}

#[derive(sqlx::FromRow)]
struct MealPopularityRow {
    #[sqlx(flatten)]
    meal: MealRow,
    quantity: i64,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    event_id: Uuid,
    order_id: Uuid,
    sequence_number: i64,
    event_type: String,
    payload: String,
    correlation_id: Uuid,
    created_at: DateTime<Utc>,
}

fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
    rows.into_iter().map(Order::try_from).collect()
}

/// Translate unique-index violations into the invariant they protect.
fn map_write_error(err: sqlx::Error, order: &Order) -> StoreError {
    let violated = match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => db.constraint().map(str::to_owned),
        _ => None,
    };

    match (violated.as_deref(), order.driver_id) {
        (Some(ACTIVE_PER_CUSTOMER_INDEX), _) => StoreError::CustomerHasActiveOrder(order.customer_id),
        (Some(DELIVERY_PER_DRIVER_INDEX), Some(driver_id)) => StoreError::DriverBusy(driver_id),
        _ => StoreError::Database(err),
    }
}

async fn insert_event(conn: &mut PgConnection, event: &EventEnvelope) -> Result<(), StoreError> {
    let payload = serde_json::to_string(&event.event_data)?;

    sqlx::query(
        "INSERT INTO order_events (event_id, order_id, sequence_number, event_type, payload, correlation_id, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(event.event_id)
    .bind(event.order_id.as_uuid())
    .bind(event.sequence_number)
    .bind(&event.event_type)
    .bind(payload)
    .bind(event.correlation_id)
    .bind(event.timestamp)
    .execute(conn)
    .await?;

    Ok(())
}

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn fetch_orders(&self, sql: &str, id: Uuid) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(sql).bind(id).fetch_all(&self.pool).await?;
        into_orders(rows)
    }

    async fn fetch_first(&self, sql: &str, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(Order::try_from).transpose()
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn save_meal(&self, meal: &Meal) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO meals (id, restaurant_id, name, price_cents) VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE
             SET restaurant_id = EXCLUDED.restaurant_id, name = EXCLUDED.name, price_cents = EXCLUDED.price_cents",
        )
        .bind(meal.id.as_uuid())
        .bind(meal.restaurant_id.as_uuid())
        .bind(&meal.name)
        .bind(meal.price.minor_units())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_meals(&self, ids: &[MealId]) -> Result<Vec<Meal>, StoreError> {
        let ids: Vec<Uuid> = ids.iter().map(MealId::as_uuid).collect();
        let rows: Vec<MealRow> =
            sqlx::query_as("SELECT id, restaurant_id, name, price_cents FROM meals WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Meal::from).collect())
    }

    async fn meals_for_restaurant(&self, restaurant_id: RestaurantId) -> Result<Vec<Meal>, StoreError> {
        let rows: Vec<MealRow> = sqlx::query_as(
            "SELECT id, restaurant_id, name, price_cents FROM meals WHERE restaurant_id = $1 ORDER BY name, id",
        )
        .bind(restaurant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Meal::from).collect())
    }

    async fn hold_checkout(
        &self,
        customer_id: CustomerId,
        expires_at: DateTime<Utc>,
    ) -> Result<CheckoutHold, StoreError> {
        let hold = CheckoutHold::new(customer_id, expires_at);
        let mut tx = self.pool.begin().await?;

        // A live hold keeps its row; a concurrent insert waits on the row lock
        let taken = sqlx::query(
            "INSERT INTO checkout_holds (customer_id, token, expires_at) VALUES ($1, $2, $3)
             ON CONFLICT (customer_id) DO UPDATE
             SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at
             WHERE checkout_holds.expires_at <= $4",
        )
        .bind(customer_id.as_uuid())
        .bind(hold.token)
        .bind(hold.expires_at)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if taken == 0 {
            return Err(StoreError::CustomerHasActiveOrder(customer_id));
        }

        let active: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM orders WHERE customer_id = $1 AND status <> 'DELIVERED')",
        )
        .bind(customer_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        if active {
            return Err(StoreError::CustomerHasActiveOrder(customer_id));
        }

        tx.commit().await?;
        Ok(hold)
    }

    async fn release_checkout(&self, hold: &CheckoutHold) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM checkout_holds WHERE customer_id = $1 AND token = $2")
            .bind(hold.customer_id.as_uuid())
            .bind(hold.token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_driver_busy(&self, driver_id: DriverId) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM orders WHERE driver_id = $1 AND status = 'ON_THE_WAY')",
        )
        .bind(driver_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_order(
        &self,
        order: &Order,
        lines: &[OrderLine],
        event: &EventEnvelope,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let active: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM orders WHERE customer_id = $1 AND status <> 'DELIVERED')",
        )
        .bind(order.customer_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        if active {
            return Err(StoreError::CustomerHasActiveOrder(order.customer_id));
        }

        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(order.id.as_uuid())
        .bind(order.version)
        .bind(order.customer_id.as_uuid())
        .bind(order.restaurant_id.as_uuid())
        .bind(order.driver_id.map(|d| d.as_uuid()))
        .bind(order.status.as_str())
        .bind(&order.address)
        .bind(order.total.minor_units())
        .bind(&order.payment_reference)
        .bind(order.created_at)
        .bind(order.picked_up_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, order))?;

        for (line_no, line) in lines.iter().enumerate() {
            let quantity = i32::try_from(line.quantity)
                .map_err(|_| StoreError::Corrupt(format!("quantity {} out of range", line.quantity)))?;
            sqlx::query(
                "INSERT INTO order_lines (order_id, line_no, meal_id, quantity, sub_total_cents)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(order.id.as_uuid())
            .bind(line_no as i32)
            .bind(line.meal_id.as_uuid())
            .bind(quantity)
            .bind(line.sub_total.minor_units())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM checkout_holds WHERE customer_id = $1")
            .bind(order.customer_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        insert_event(&mut *tx, event).await?;
        tx.commit().await?;

        tracing::debug!(order_id = %order.id, line_count = lines.len(), "Inserted order");
        Ok(())
    }

    async fn commit_transition(
        &self,
        order: &Order,
        expected_version: i64,
        event: &EventEnvelope,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        if let OrderEvent::PickedUp(e) = &event.event_data {
            let busy: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM orders WHERE driver_id = $1 AND status = 'ON_THE_WAY' AND id <> $2)",
            )
            .bind(e.driver_id.as_uuid())
            .bind(order.id.as_uuid())
            .fetch_one(&mut *tx)
            .await?;

            if busy {
                return Err(StoreError::DriverBusy(e.driver_id));
            }
        }

        let result = sqlx::query(
            "UPDATE orders SET version = $3, status = $4, driver_id = $5, picked_up_at = $6
             WHERE id = $1 AND version = $2",
        )
        .bind(order.id.as_uuid())
        .bind(expected_version)
        .bind(order.version)
        .bind(order.status.as_str())
        .bind(order.driver_id.map(|d| d.as_uuid()))
        .bind(order.picked_up_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, order))?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                .bind(order.id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

            return Err(match actual {
                Some(actual) => StoreError::VersionConflict {
                    order_id: order.id,
                    expected: expected_version,
                    actual,
                },
                None => StoreError::OrderNotFound(order.id),
            });
        }

        insert_event(&mut *tx, event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.fetch_first(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"), id.as_uuid())
            .await
    }

    async fn get_lines(&self, id: OrderId) -> Result<Vec<OrderLine>, StoreError> {
        let rows: Vec<LineRow> = sqlx::query_as(
            "SELECT order_id, meal_id, quantity, sub_total_cents FROM order_lines
             WHERE order_id = $1 ORDER BY line_no",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<OrderLine, StoreError> {
                let quantity = u32::try_from(row.quantity)
                    .map_err(|_| StoreError::Corrupt(format!("negative quantity on order {}", row.order_id)))?;
                Ok(OrderLine {
                    order_id: OrderId(row.order_id),
                    meal_id: MealId(row.meal_id),
                    quantity,
                    sub_total: Money::from_minor_units(row.sub_total_cents),
                })
            })
            .collect()
    }

    async fn load_events(&self, id: OrderId) -> Result<Vec<EventEnvelope>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT event_id, order_id, sequence_number, event_type, payload, correlation_id, created_at
             FROM order_events WHERE order_id = $1 ORDER BY sequence_number ASC",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<EventEnvelope, StoreError> {
                Ok(EventEnvelope {
                    event_id: row.event_id,
                    order_id: OrderId(row.order_id),
                    sequence_number: row.sequence_number,
                    event_type: row.event_type,
                    event_data: serde_json::from_str(&row.payload)?,
                    correlation_id: row.correlation_id,
                    timestamp: row.created_at,
                })
            })
            .collect()
    }

    async fn ready_orders_page(
        &self,
        after: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE status = 'READY' AND driver_id IS NULL
               AND ($1::timestamptz IS NULL OR (created_at, id) < ($1, $2))
             ORDER BY created_at DESC, id DESC
             LIMIT $3"
        ))
        .bind(after.map(|c| c.created_at))
        .bind(after.map(|c| c.id.as_uuid()))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        into_orders(rows)
    }

    async fn latest_order_for_customer(&self, customer_id: CustomerId) -> Result<Option<Order>, StoreError> {
        self.fetch_first(
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = $1
                 ORDER BY created_at DESC, id DESC LIMIT 1"
            ),
            customer_id.as_uuid(),
        )
        .await
    }

    async fn latest_order_for_driver(&self, driver_id: DriverId) -> Result<Option<Order>, StoreError> {
        self.fetch_first(
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE driver_id = $1
                 ORDER BY picked_up_at DESC NULLS LAST, id DESC LIMIT 1"
            ),
            driver_id.as_uuid(),
        )
        .await
    }

    async fn active_delivery_for_customer(&self, customer_id: CustomerId) -> Result<Option<Order>, StoreError> {
        self.fetch_first(
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = $1 AND status = 'ON_THE_WAY'
                 ORDER BY created_at DESC, id DESC LIMIT 1"
            ),
            customer_id.as_uuid(),
        )
        .await
    }

    async fn orders_for_restaurant(&self, restaurant_id: RestaurantId) -> Result<Vec<Order>, StoreError> {
        self.fetch_orders(
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE restaurant_id = $1
                 ORDER BY created_at DESC, id DESC"
            ),
            restaurant_id.as_uuid(),
        )
        .await
    }

    async fn count_orders_created_since(
        &self,
        restaurant_id: RestaurantId,
        watermark: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE restaurant_id = $1 AND created_at > $2")
                .bind(restaurant_id.as_uuid())
                .bind(watermark)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn delivered_orders(
        &self,
        party: RevenueParty,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError> {
        let (column, id) = match party {
            RevenueParty::Driver(driver_id) => ("driver_id", driver_id.as_uuid()),
            RevenueParty::Restaurant(restaurant_id) => ("restaurant_id", restaurant_id.as_uuid()),
        };

        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE {column} = $1 AND status = 'DELIVERED' AND created_at >= $2 AND created_at < $3
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        into_orders(rows)
    }

    async fn meal_popularity(
        &self,
        restaurant_id: RestaurantId,
        limit: usize,
    ) -> Result<Vec<MealPopularity>, StoreError> {
        let rows: Vec<MealPopularityRow> = sqlx::query_as(
            "SELECT m.id, m.restaurant_id, m.name, m.price_cents,
                    COALESCE(SUM(l.quantity), 0)::BIGINT AS quantity
             FROM meals m
             LEFT JOIN order_lines l ON l.meal_id = m.id
             WHERE m.restaurant_id = $1
             GROUP BY m.id, m.restaurant_id, m.name, m.price_cents
             ORDER BY quantity DESC, m.name ASC
             LIMIT $2",
        )
        .bind(restaurant_id.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MealPopularity {
                meal: Meal::from(row.meal),
                quantity: row.quantity.max(0) as u64,
            })
            .collect())
    }

    async fn driver_order_counts(
        &self,
        restaurant_id: RestaurantId,
        limit: usize,
    ) -> Result<Vec<DriverOrderCount>, StoreError> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            "SELECT driver_id, COUNT(*) AS orders FROM orders
             WHERE restaurant_id = $1 AND driver_id IS NOT NULL
             GROUP BY driver_id
             ORDER BY orders DESC, driver_id ASC
             LIMIT $2",
        )
        .bind(restaurant_id.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(driver_id, orders)| DriverOrderCount {
                driver_id: DriverId(driver_id),
                orders: orders.max(0) as u64,
            })
            .collect())
    }
}

#[async_trait]
impl LocationStore for PgOrderStore {
    async fn set_driver_location(&self, driver_id: DriverId, location: Location) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO driver_locations (driver_id, lat, lng, updated_at) VALUES ($1, $2, $3, $4)
             ON CONFLICT (driver_id) DO UPDATE
             SET lat = EXCLUDED.lat, lng = EXCLUDED.lng, updated_at = EXCLUDED.updated_at",
        )
        .bind(driver_id.as_uuid())
        .bind(location.lat)
        .bind(location.lng)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn driver_location(&self, driver_id: DriverId) -> Result<Option<Location>, StoreError> {
        let row: Option<(f64, f64)> =
            sqlx::query_as("SELECT lat, lng FROM driver_locations WHERE driver_id = $1")
                .bind(driver_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(lat, lng)| Location { lat, lng }))
    }
}
