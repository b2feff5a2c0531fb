// ============================================================================
// HTTP API - JSON endpoints for customers, restaurants and drivers
// ============================================================================
//
// Thin adapter over the domain services. Identity comes from trusted headers
// (see identity.rs); all rules live in the domain layer.
//
// ============================================================================

mod customer;
mod driver;
mod error;
mod identity;
mod restaurant;

use actix_web::web;
use std::sync::Arc;

use crate::domain::order::{AssignmentService, OrderLifecycle};
use crate::domain::polling::PollingService;
use crate::domain::reporting::RevenueReporter;
use crate::metrics::Metrics;
use crate::payment::PaymentGateway;
use crate::store::{LocationStore, OrderStore};

pub use error::ApiError;
pub use identity::{CUSTOMER_HEADER, DRIVER_HEADER, RESTAURANT_HEADER};

pub struct AppState {
    pub lifecycle: OrderLifecycle,
    pub assignment: AssignmentService,
    pub polling: PollingService,
    pub reporter: RevenueReporter,
    pub ready_page_size: usize,
}

impl AppState {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        locations: Arc<dyn LocationStore>,
        payments: Arc<dyn PaymentGateway>,
        metrics: Arc<Metrics>,
        ready_page_size: usize,
    ) -> Self {
        Self {
            lifecycle: OrderLifecycle::new(Arc::clone(&orders), payments, Arc::clone(&metrics)),
            assignment: AssignmentService::new(Arc::clone(&orders), metrics, ready_page_size),
            polling: PollingService::new(Arc::clone(&orders), locations),
            reporter: RevenueReporter::new(orders),
            ready_page_size,
        }
    }
}

/// Mount every `/api` route. Expects `web::Data<AppState>` in app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .service(
        web::scope("/api")
            .service(
                web::scope("/customer")
                    .route("/orders", web::post().to(customer::create_order))
                    .route("/orders/latest", web::get().to(customer::latest_order))
                    .route("/driver-location", web::get().to(customer::driver_location))
                    .route("/restaurants/{restaurant_id}/meals", web::get().to(customer::meals)),
            )
            .service(
                web::scope("/restaurant")
                    .route("/meals", web::post().to(restaurant::add_meal))
                    .route("/orders", web::get().to(restaurant::orders))
                    .route("/orders/{order_id}/ready", web::post().to(restaurant::mark_ready))
                    .route("/notifications", web::get().to(restaurant::notifications))
                    .route("/report", web::get().to(restaurant::report)),
            )
            .service(
                web::scope("/driver")
                    .route("/orders/ready", web::get().to(driver::ready_orders))
                    .route("/orders/latest", web::get().to(driver::latest_order))
                    .route("/orders/{order_id}/claim", web::post().to(driver::claim))
                    .route("/orders/{order_id}/complete", web::post().to(driver::complete))
                    .route("/revenue", web::get().to(driver::revenue))
                    .route("/location", web::put().to(driver::update_location)),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{CustomerId, DriverId, Money, OrderStatus};
    use crate::test_support::Fixture;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::{json, Value};
    use uuid::Uuid;

    macro_rules! init_app {
        ($fx:expr) => {
            test::init_service(App::new().app_data($fx.app_state()).configure(configure)).await
        };
    }

    #[actix_web::test]
    async fn test_customer_places_order() {
        let fx = Fixture::new().await;
        let app = init_app!(fx);
        let customer_id = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/api/customer/orders")
            .insert_header((CUSTOMER_HEADER, customer_id.to_string()))
            .set_json(json!({
                "restaurant_id": fx.restaurant_id,
                "address": "221B Baker Street",
                "payment_source": "tok_visa",
                "lines": [
                    {"meal_id": fx.burger.id, "quantity": 2},
                    {"meal_id": fx.fries.id, "quantity": 3}
                ]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["order"]["status"], "COOKING");
        assert_eq!(body["order"]["total"], 3500);

        let req = test::TestRequest::get()
            .uri("/api/customer/orders/latest")
            .insert_header((CUSTOMER_HEADER, customer_id.to_string()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["order"]["lines"].as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn test_invalid_quantity_is_bad_request() {
        let fx = Fixture::new().await;
        let app = init_app!(fx);

        for quantity in [0_i64, 1_001, 3_000_000_000] {
            let req = test::TestRequest::post()
                .uri("/api/customer/orders")
                .insert_header((CUSTOMER_HEADER, Uuid::new_v4().to_string()))
                .set_json(json!({
                    "restaurant_id": fx.restaurant_id,
                    "address": "1 Main St",
                    "payment_source": "tok_visa",
                    "lines": [{"meal_id": fx.burger.id, "quantity": quantity}]
                }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "quantity {quantity}");

            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["status"], "failed");
            assert_eq!(body["code"], "invalid_request");
        }
        assert_eq!(fx.gateway.charge_count(), 0);
    }

    #[actix_web::test]
    async fn test_out_of_range_week_is_bad_request() {
        let fx = Fixture::new().await;
        let app = init_app!(fx);
        let week_start = chrono::NaiveDate::MAX - chrono::Days::new(3);
        let encoded = week_start.to_string().replace('+', "%2B");

        let req = test::TestRequest::get()
            .uri(&format!("/api/driver/revenue?week_start={encoded}"))
            .insert_header((DRIVER_HEADER, Uuid::new_v4().to_string()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "invalid_week");
    }

    #[actix_web::test]
    async fn test_declined_card_is_payment_required() {
        let fx = Fixture::new().await;
        fx.gateway.set_decline_all(true);
        let app = init_app!(fx);

        let req = test::TestRequest::post()
            .uri("/api/customer/orders")
            .insert_header((CUSTOMER_HEADER, Uuid::new_v4().to_string()))
            .set_json(json!({
                "restaurant_id": fx.restaurant_id,
                "address": "1 Main St",
                "payment_source": "tok_visa",
                "lines": [{"meal_id": fx.burger.id, "quantity": 1}]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[actix_web::test]
    async fn test_missing_identity_is_unauthorized() {
        let fx = Fixture::new().await;
        let app = init_app!(fx);

        let req = test::TestRequest::get().uri("/api/driver/orders/ready").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_restaurant_marks_ready_and_driver_delivers() {
        let fx = Fixture::new().await;
        let app = init_app!(fx);
        let order = fx.place_order(CustomerId(Uuid::new_v4())).await;
        let driver_id = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri(&format!("/api/restaurant/orders/{}/ready", order.id))
            .insert_header((RESTAURANT_HEADER, fx.restaurant_id.to_string()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["order"]["status"], "READY");

        let req = test::TestRequest::get()
            .uri("/api/driver/orders/ready")
            .insert_header((DRIVER_HEADER, driver_id.to_string()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["orders"].as_array().unwrap().len(), 1);

        let req = test::TestRequest::post()
            .uri(&format!("/api/driver/orders/{}/claim", order.id))
            .insert_header((DRIVER_HEADER, driver_id.to_string()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["order"]["status"], "ON_THE_WAY");

        let req = test::TestRequest::post()
            .uri(&format!("/api/driver/orders/{}/claim", order.id))
            .insert_header((DRIVER_HEADER, Uuid::new_v4().to_string()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "already_claimed");

        let req = test::TestRequest::post()
            .uri(&format!("/api/driver/orders/{}/complete", order.id))
            .insert_header((DRIVER_HEADER, driver_id.to_string()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["order"]["status"], "DELIVERED");

        let stored = fx.lifecycle.get_order(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Delivered);
        assert_eq!(stored.driver_id, Some(DriverId(driver_id)));
    }

    #[actix_web::test]
    async fn test_wrong_restaurant_is_forbidden() {
        let fx = Fixture::new().await;
        let app = init_app!(fx);
        let order = fx.place_order(CustomerId(Uuid::new_v4())).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/restaurant/orders/{}/ready", order.id))
            .insert_header((RESTAURANT_HEADER, Uuid::new_v4().to_string()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_driver_location_round_trip() {
        let fx = Fixture::new().await;
        let app = init_app!(fx);
        let customer_id = CustomerId(Uuid::new_v4());
        let driver_id = DriverId(Uuid::new_v4());
        let order = fx.ready_order(customer_id).await;
        fx.assignment.claim(order.id, driver_id).await.unwrap();

        let req = test::TestRequest::put()
            .uri("/api/driver/location")
            .insert_header((DRIVER_HEADER, driver_id.to_string()))
            .set_json(json!({"location": "37.7749,-122.4194"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let req = test::TestRequest::get()
            .uri("/api/customer/driver-location")
            .insert_header((CUSTOMER_HEADER, customer_id.to_string()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["location"], "37.7749,-122.4194");

        let req = test::TestRequest::put()
            .uri("/api/driver/location")
            .insert_header((DRIVER_HEADER, driver_id.to_string()))
            .set_json(json!({"location": "north"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_restaurant_notifications_and_report() {
        let fx = Fixture::new().await;
        let app = init_app!(fx);
        fx.delivered_order(CustomerId(Uuid::new_v4()), DriverId(Uuid::new_v4())).await;

        let req = test::TestRequest::get()
            .uri("/api/restaurant/notifications?since=2000-01-01T00:00:00Z")
            .insert_header((RESTAURANT_HEADER, fx.restaurant_id.to_string()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["notification"], 1);

        let req = test::TestRequest::get()
            .uri("/api/restaurant/report")
            .insert_header((RESTAURANT_HEADER, fx.restaurant_id.to_string()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["revenue"]["days"].as_array().unwrap().len(), 7);
        assert_eq!(body["top_meals"].as_array().unwrap().len(), 2);
        assert_eq!(body["top_drivers"].as_array().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_restaurant_adds_meal_and_customer_sees_menu() {
        let fx = Fixture::new().await;
        let app = init_app!(fx);

        let req = test::TestRequest::post()
            .uri("/api/restaurant/meals")
            .insert_header((RESTAURANT_HEADER, fx.restaurant_id.to_string()))
            .set_json(json!({"name": "Apple Pie", "price": 450}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::get()
            .uri(&format!("/api/customer/restaurants/{}/meals", fx.restaurant_id))
            .insert_header((CUSTOMER_HEADER, Uuid::new_v4().to_string()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let meals = body["meals"].as_array().unwrap();
        assert_eq!(meals.len(), 3);
        assert_eq!(meals[0]["name"], "Apple Pie");
        assert_eq!(meals[0]["price"], Money::from_minor_units(450).minor_units());
    }

    #[actix_web::test]
    async fn test_driver_revenue() {
        let fx = Fixture::new().await;
        let app = init_app!(fx);
        let driver_id = DriverId(Uuid::new_v4());
        fx.delivered_order(CustomerId(Uuid::new_v4()), driver_id).await;

        let req = test::TestRequest::get()
            .uri("/api/driver/revenue")
            .insert_header((DRIVER_HEADER, driver_id.to_string()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        let total: i64 = body["revenue"]["days"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["revenue"].as_i64().unwrap())
            .sum();
        assert_eq!(total, 3500);
    }
}
