use actix_web::{web, HttpResponse};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use super::error::ApiError;
use super::identity::Restaurant;
use super::AppState;
use crate::domain::order::{Money, OrderId};
use crate::domain::reporting::week_start_of;

#[derive(Debug, Deserialize)]
pub struct AddMealBody {
    pub name: String,
    /// Minor currency units.
    pub price: i64,
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub since: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct WeekQuery {
    pub week_start: Option<NaiveDate>,
}

pub async fn add_meal(
    state: web::Data<AppState>,
    Restaurant(restaurant_id): Restaurant,
    body: web::Json<AddMealBody>,
) -> Result<HttpResponse, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Meal name is required".to_string()));
    }
    if body.price < 0 {
        return Err(ApiError::BadRequest("Meal price must not be negative".to_string()));
    }

    let meal = state
        .lifecycle
        .add_meal(restaurant_id, &body.name, Money::from_minor_units(body.price))
        .await?;
    Ok(HttpResponse::Created().json(json!({ "status": "success", "meal": meal })))
}

pub async fn orders(
    state: web::Data<AppState>,
    Restaurant(restaurant_id): Restaurant,
) -> Result<HttpResponse, ApiError> {
    let orders = state.polling.orders_for_restaurant(restaurant_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "orders": orders })))
}

pub async fn mark_ready(
    state: web::Data<AppState>,
    Restaurant(restaurant_id): Restaurant,
    path: web::Path<OrderId>,
) -> Result<HttpResponse, ApiError> {
    let order = state
        .lifecycle
        .advance_to_ready(path.into_inner(), restaurant_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "success", "order": order })))
}

pub async fn notifications(
    state: web::Data<AppState>,
    Restaurant(restaurant_id): Restaurant,
    query: web::Query<NotificationQuery>,
) -> Result<HttpResponse, ApiError> {
    let count = state
        .polling
        .new_order_count_since(restaurant_id, query.since)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "notification": count })))
}

pub async fn report(
    state: web::Data<AppState>,
    Restaurant(restaurant_id): Restaurant,
    query: web::Query<WeekQuery>,
) -> Result<HttpResponse, ApiError> {
    let week_start = query
        .week_start
        .unwrap_or_else(|| week_start_of(Utc::now().date_naive()));
    let report = state.reporter.restaurant_report(restaurant_id, week_start).await?;
    Ok(HttpResponse::Ok().json(report))
}
