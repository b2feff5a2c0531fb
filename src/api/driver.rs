use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use super::error::ApiError;
use super::identity::Driver;
use super::AppState;
use crate::domain::order::{Location, OrderId};
use crate::domain::reporting::week_start_of;
use crate::store::RevenueParty;

#[derive(Debug, Deserialize)]
pub struct ReadyQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct WeekQuery {
    pub week_start: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct LocationBody {
    /// `"lat,lng"`
    pub location: String,
}

pub async fn ready_orders(
    state: web::Data<AppState>,
    _driver: Driver,
    query: web::Query<ReadyQuery>,
) -> Result<HttpResponse, ApiError> {
    let limit = query.limit.unwrap_or(state.ready_page_size);
    let orders = state.assignment.ready_orders(limit).await?;
    Ok(HttpResponse::Ok().json(json!({ "orders": orders })))
}

pub async fn claim(
    state: web::Data<AppState>,
    Driver(driver_id): Driver,
    path: web::Path<OrderId>,
) -> Result<HttpResponse, ApiError> {
    let order = state.assignment.claim(path.into_inner(), driver_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "success", "order": order })))
}

pub async fn complete(
    state: web::Data<AppState>,
    Driver(driver_id): Driver,
    path: web::Path<OrderId>,
) -> Result<HttpResponse, ApiError> {
    let order = state
        .lifecycle
        .complete_delivery(path.into_inner(), driver_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "success", "order": order })))
}

pub async fn latest_order(
    state: web::Data<AppState>,
    Driver(driver_id): Driver,
) -> Result<HttpResponse, ApiError> {
    let order = state.polling.latest_order_for_driver(driver_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "order": order })))
}

pub async fn revenue(
    state: web::Data<AppState>,
    Driver(driver_id): Driver,
    query: web::Query<WeekQuery>,
) -> Result<HttpResponse, ApiError> {
    let week_start = query
        .week_start
        .unwrap_or_else(|| week_start_of(Utc::now().date_naive()));
    let revenue = state
        .reporter
        .revenue_by_weekday(RevenueParty::Driver(driver_id), week_start)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "revenue": revenue })))
}

pub async fn update_location(
    state: web::Data<AppState>,
    Driver(driver_id): Driver,
    body: web::Json<LocationBody>,
) -> Result<HttpResponse, ApiError> {
    let location: Location = body.location.parse()?;
    state.polling.update_driver_location(driver_id, location).await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "success" })))
}
