use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::error::ApiError;
use super::identity::Customer;
use super::AppState;
use crate::domain::order::{OrderLineRequest, RestaurantId};

#[derive(Debug, Deserialize)]
pub struct CreateOrderBody {
    pub restaurant_id: RestaurantId,
    pub address: String,
    pub lines: Vec<OrderLineRequest>,
    pub payment_source: String,
}

pub async fn create_order(
    state: web::Data<AppState>,
    Customer(customer_id): Customer,
    body: web::Json<CreateOrderBody>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let order = state
        .lifecycle
        .create_order(
            customer_id,
            body.restaurant_id,
            &body.address,
            &body.lines,
            &body.payment_source,
        )
        .await?;

    Ok(HttpResponse::Created().json(json!({ "status": "success", "order": order })))
}

pub async fn latest_order(
    state: web::Data<AppState>,
    Customer(customer_id): Customer,
) -> Result<HttpResponse, ApiError> {
    let order = state.polling.latest_order_for_customer(customer_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "order": order })))
}

pub async fn driver_location(
    state: web::Data<AppState>,
    Customer(customer_id): Customer,
) -> Result<HttpResponse, ApiError> {
    let location = state
        .polling
        .driver_location_for_customer(customer_id)
        .await?
        .map(|l| l.to_string());
    Ok(HttpResponse::Ok().json(json!({ "location": location })))
}

pub async fn meals(
    state: web::Data<AppState>,
    _customer: Customer,
    path: web::Path<RestaurantId>,
) -> Result<HttpResponse, ApiError> {
    let meals = state.polling.meals_for_restaurant(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "meals": meals })))
}
