//! HTTP surface: Rocket wiring and error mapping.

pub mod payloads;
mod routes;

use std::sync::Arc;

use rocket::data::{Limits, ToByteUnit};
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder, status};
use rocket::serde::json::Json;
use rocket::{Build, Rocket};

use crate::app::AppContext;
use payloads::ErrorBody;

/// Errors mapped onto HTTP failure statuses with a JSON `{error}` body.
#[derive(Debug)]
pub enum ApiError {
    /// 503: the model checkpoint is missing or unreadable.
    ServiceUnavailable(String),
    /// 409: a training job is already active.
    Conflict(String),
    /// 500: request-scoped processing failure.
    Internal(String),
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let (http_status, message) = match self {
            ApiError::ServiceUnavailable(message) => (Status::ServiceUnavailable, message),
            ApiError::Conflict(message) => (Status::Conflict, message),
            ApiError::Internal(message) => (Status::InternalServerError, message),
        };
        status::Custom(http_status, Json(ErrorBody { error: message })).respond_to(request)
    }
}

/// Build the Rocket instance serving the full HTTP surface.
pub fn rocket(ctx: Arc<AppContext>) -> Rocket<Build> {
    let limits = Limits::default()
        .limit("file", 512.mebibytes())
        .limit("data-form", 512.mebibytes());
    let figment = rocket::Config::figment().merge(("limits", limits));
    rocket::custom(figment).manage(ctx).mount(
        "/",
        rocket::routes![
            routes::index,
            routes::health,
            routes::model_status,
            routes::predict_clip,
            routes::retrain,
        ],
    )
}
