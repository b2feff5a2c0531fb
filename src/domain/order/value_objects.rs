use serde::{Deserialize, Serialize};
use uuid::Uuid;
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

use super::errors::OrderError;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_newtype!(
    /// Order identity. New orders get a UUIDv7, so ids sort by creation time.
    OrderId
);
id_newtype!(CustomerId);
id_newtype!(RestaurantId);
id_newtype!(DriverId);
id_newtype!(MealId);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Money
// ============================================================================

/// Monetary amount held as integral minor currency units (cents).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_minor_units(cents: i64) -> Self {
        Self(cents)
    }

    /// Build from a major/minor split, e.g. `Money::new(10, 0)` for 10.00.
    pub fn new(major: i64, minor: i64) -> Self {
        Self(major * 100 + minor)
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_mul(self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// Saturating; totals that must not clamp go through `checked_add`.
impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| Money(acc.0.saturating_add(m.0)))
    }
}

// ============================================================================
// Order Status
// ============================================================================

/// Stages an order moves through. The sequence is fixed and forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Cooking,
    Ready,
    OnTheWay,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Cooking => "COOKING",
            OrderStatus::Ready => "READY",
            OrderStatus::OnTheWay => "ON_THE_WAY",
            OrderStatus::Delivered => "DELIVERED",
        }
    }

    pub fn successor(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Cooking => Some(OrderStatus::Ready),
            OrderStatus::Ready => Some(OrderStatus::OnTheWay),
            OrderStatus::OnTheWay => Some(OrderStatus::Delivered),
            OrderStatus::Delivered => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COOKING" => Ok(OrderStatus::Cooking),
            "READY" => Ok(OrderStatus::Ready),
            "ON_THE_WAY" => Ok(OrderStatus::OnTheWay),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

// ============================================================================
// Meals and Order Lines
// ============================================================================

/// A restaurant's menu entry. Its price is copied onto order lines at
/// creation time and never re-read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub id: MealId,
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub price: Money,
}

#[derive(Deserialize)]
struct RawLineRequest {
    meal_id: MealId,
    quantity: i64,
}

/// Largest quantity of one meal a single line may ask for.
pub const MAX_LINE_QUANTITY: u32 = 1_000;

/// One requested (meal, quantity) pair. Quantity is in `1..=MAX_LINE_QUANTITY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLineRequest")]
pub struct OrderLineRequest {
    meal_id: MealId,
    quantity: u32,
}

impl OrderLineRequest {
    pub fn new(meal_id: MealId, quantity: i64) -> Result<Self, OrderError> {
        match u32::try_from(quantity) {
            Ok(q) if (1..=MAX_LINE_QUANTITY).contains(&q) => Ok(Self { meal_id, quantity: q }),
            _ => Err(OrderError::InvalidQuantity(quantity)),
        }
    }

    pub fn meal_id(&self) -> MealId {
        self.meal_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }
}

impl TryFrom<RawLineRequest> for OrderLineRequest {
    type Error = OrderError;

    fn try_from(raw: RawLineRequest) -> Result<Self, Self::Error> {
        Self::new(raw.meal_id, raw.quantity)
    }
}

/// A persisted line of an order with its price captured at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: OrderId,
    pub meal_id: MealId,
    pub quantity: u32,
    pub sub_total: Money,
}

// ============================================================================
// Driver Location
// ============================================================================

/// Latest reported driver coordinates. Wire form is `"lat,lng"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Result<Self, OrderError> {
        if !lat.is_finite() || !lng.is_finite() || !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(OrderError::InvalidLocation(format!("{lat},{lng}")));
        }
        Ok(Self { lat, lng })
    }
}

impl FromStr for Location {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || OrderError::InvalidLocation(s.to_string());
        let (lat, lng) = s.split_once(',').ok_or_else(invalid)?;
        let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;
        Location::new(lat, lng)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
