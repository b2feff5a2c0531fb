// ============================================================================
// Order Domain - Business Logic for the order lifecycle
// ============================================================================
//
// - Value objects (ids, Money, OrderStatus, Meal, OrderLine, Location)
// - Events (OrderCreated, OrderMarkedReady, ...) and their envelope
// - Commands (MarkReady, Claim, CompleteDelivery)
// - Errors (OrderError and its kinds)
// - Aggregate (Order state machine)
// - Lifecycle (creation with payment, restaurant and delivery transitions)
// - Assignment (driver claims and the ready listing)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod lifecycle;
pub mod assignment;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use lifecycle::*;
pub use assignment::*;
