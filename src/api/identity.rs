//! Caller identity extractors.
//!
//! The upstream auth layer authenticates the caller and forwards their id in
//! a trusted header. Handlers receive it as a typed parameter; authorization
//! against the order itself happens in the domain.

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use std::future::{ready, Ready};
use std::str::FromStr;

use super::error::ApiError;
use crate::domain::order::{CustomerId, DriverId, RestaurantId};

pub const CUSTOMER_HEADER: &str = "X-Customer-Id";
pub const RESTAURANT_HEADER: &str = "X-Restaurant-Id";
pub const DRIVER_HEADER: &str = "X-Driver-Id";

fn header_id<T: FromStr>(req: &HttpRequest, header: &'static str) -> Result<T, ApiError> {
    req.headers()
        .get(header)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .ok_or(ApiError::Unauthorized(header))
}

macro_rules! identity_extractor {
    ($name:ident, $id:ty, $header:expr) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name(pub $id);

        impl FromRequest for $name {
            type Error = ApiError;
            type Future = Ready<Result<Self, Self::Error>>;

            fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
                ready(header_id(req, $header).map(Self))
            }
        }
    };
}

identity_extractor!(Customer, CustomerId, CUSTOMER_HEADER);
identity_extractor!(Restaurant, RestaurantId, RESTAURANT_HEADER);
identity_extractor!(Driver, DriverId, DRIVER_HEADER);
