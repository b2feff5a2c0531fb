//! HTTP rendering of domain errors.
//!
//! Every failure becomes `{"status":"failed","code":..,"error":..}` with a
//! status derived from the error kind. Internal failures are logged by the
//! services and rendered with a generic message.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;

use crate::domain::order::{ErrorKind, OrderError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing or malformed {0} header")]
    Unauthorized(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Order(#[from] OrderError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    code: &'a str,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_reference: Option<&'a str>,
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::BadRequest(_) => "invalid_request",
            ApiError::Order(e) => e.code(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Order(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict | ErrorKind::AlreadyClaimed | ErrorKind::InvalidState => {
                    StatusCode::CONFLICT
                }
                ErrorKind::PaymentDeclined => StatusCode::PAYMENT_REQUIRED,
                ErrorKind::Reconciliation | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error, payment_reference) = match self {
            ApiError::Order(OrderError::Reconciliation(report)) => (
                "Payment was captured but the order could not be recorded".to_string(),
                Some(report.payment_reference.as_str()),
            ),
            ApiError::Order(e) if e.kind() == ErrorKind::Internal => {
                ("Internal server error".to_string(), None)
            }
            other => (other.to_string(), None),
        };

        HttpResponse::build(self.status_code()).json(ErrorBody {
            status: "failed",
            code: self.code(),
            error,
            payment_reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{CustomerId, Money, OrderId, ReconciliationReport, RestaurantId};
    use crate::store::StoreError;
    use actix_web::body::to_bytes;
    use uuid::Uuid;

    async fn body_json(err: ApiError) -> serde_json::Value {
        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[actix_web::test]
    async fn test_status_codes_follow_kind() {
        let id = OrderId::new();
        let cases = [
            (ApiError::from(OrderError::EmptyAddress), StatusCode::BAD_REQUEST),
            (ApiError::from(OrderError::Forbidden(id)), StatusCode::FORBIDDEN),
            (ApiError::from(OrderError::NotFound(id)), StatusCode::NOT_FOUND),
            (ApiError::from(OrderError::ActiveOrderExists), StatusCode::CONFLICT),
            (ApiError::from(OrderError::AlreadyClaimed(id)), StatusCode::CONFLICT),
            (ApiError::from(OrderError::PaymentDeclined("card".into())), StatusCode::PAYMENT_REQUIRED),
            (ApiError::Unauthorized("X-Driver-Id"), StatusCode::UNAUTHORIZED),
        ];

        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
        }
    }

    #[actix_web::test]
    async fn test_conflict_body() {
        let json = body_json(OrderError::ActiveOrderExists.into()).await;
        assert_eq!(json["status"], "failed");
        assert_eq!(json["code"], "order_in_progress");
        assert_eq!(json["error"], "existing order in progress");
    }

    #[actix_web::test]
    async fn test_internal_details_are_hidden() {
        let err = ApiError::from(OrderError::Store(StoreError::Unavailable("pg-primary-3 refused".into())));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(err).await;
        assert_eq!(json["code"], "internal_error");
        assert!(!json["error"].as_str().unwrap().contains("pg-primary-3"));
    }

    #[actix_web::test]
    async fn test_reconciliation_exposes_payment_reference() {
        let report = ReconciliationReport {
            payment_reference: "ch_abc".to_string(),
            amount: Money::new(35, 0),
            customer_id: CustomerId(Uuid::new_v4()),
            restaurant_id: RestaurantId(Uuid::new_v4()),
            address: "1 Main St".to_string(),
            lines: vec![],
            cause: "connection reset".to_string(),
        };
        let json = body_json(OrderError::Reconciliation(Box::new(report)).into()).await;

        assert_eq!(json["code"], "reconciliation_required");
        assert_eq!(json["payment_reference"], "ch_abc");
        assert!(!json["error"].as_str().unwrap().contains("connection reset"));
    }
}
