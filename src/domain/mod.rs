// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// order:     the order state machine and the services that drive it
// polling:   read models the three actors poll
// reporting: weekly revenue and restaurant statistics
//
// ============================================================================

pub mod order;
pub mod polling;
pub mod reporting;
