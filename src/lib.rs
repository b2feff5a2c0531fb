// ============================================================================
// Delivery Orders - Food order lifecycle core
// ============================================================================
//
// Customers order and pay, restaurants cook, drivers race to claim READY
// orders and deliver them. The three actors never talk to each other; they
// poll and mutate shared order state through the services in `domain`.
//
//   domain      order state machine, lifecycle, assignment, polling, reporting
//   store       transactional persistence (in-memory and PostgreSQL)
//   payment     payment gateway boundary
//   metrics     Prometheus registry and /metrics, /health
//   api         actix-web JSON endpoints
//   app_config  layered configuration
//
// ============================================================================

pub mod api;
pub mod app_config;
pub mod domain;
pub mod metrics;
pub mod payment;
pub mod store;
