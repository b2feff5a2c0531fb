use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::value_objects::{CustomerId, DriverId, Money, OrderId, RestaurantId};

// ============================================================================
// Order Events - Facts recorded alongside every state change
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Created(OrderCreated),
    MarkedReady(OrderMarkedReady),
    PickedUp(OrderPickedUp),
    Delivered(OrderDelivered),
}

impl OrderEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "OrderCreated",
            OrderEvent::MarkedReady(_) => "OrderMarkedReady",
            OrderEvent::PickedUp(_) => "OrderPickedUp",
            OrderEvent::Delivered(_) => "OrderDelivered",
        }
    }
}

/// Order Created - payment captured, order and lines recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub customer_id: CustomerId,
    pub restaurant_id: RestaurantId,
    pub total: Money,
    pub payment_reference: String,
    pub line_count: usize,
}

/// Order Marked Ready - restaurant finished cooking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderMarkedReady {
    pub ready_at: DateTime<Utc>,
}

/// Order Picked Up - a driver won the claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPickedUp {
    pub driver_id: DriverId,
    pub picked_up_at: DateTime<Utc>,
}

/// Order Delivered - terminal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub delivered_at: DateTime<Utc>,
}

// ============================================================================
// Event Envelope
// ============================================================================

/// An event plus the metadata it is stored with. `sequence_number` equals
/// the order version the event produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub order_id: OrderId,
    pub sequence_number: i64,
    pub event_type: String,
    pub event_data: OrderEvent,
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(
        order_id: OrderId,
        sequence_number: i64,
        event_data: OrderEvent,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            order_id,
            sequence_number,
            event_type: event_data.event_type().to_string(),
            event_data,
            correlation_id,
            timestamp: Utc::now(),
        }
    }
}
