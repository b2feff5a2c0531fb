use super::value_objects::{DriverId, RestaurantId};

// ============================================================================
// Order Commands - Actor intent against an existing order
// ============================================================================
//
// Creation is not a command here: it needs the payment gateway and the meal
// catalog, so OrderLifecycle::create_order builds the order directly.
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderCommand {
    MarkReady { restaurant_id: RestaurantId },
    Claim { driver_id: DriverId },
    CompleteDelivery { driver_id: DriverId },
}

impl OrderCommand {
    /// Verb used in invalid-state messages.
    pub fn action(&self) -> &'static str {
        match self {
            OrderCommand::MarkReady { .. } => "mark ready",
            OrderCommand::Claim { .. } => "claim",
            OrderCommand::CompleteDelivery { .. } => "complete delivery of",
        }
    }
}
