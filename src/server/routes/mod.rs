//! HTTP route configuration and shared response helpers.

pub mod gateway;
pub mod health;

use crate::utils::error::GatewayError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, web};

/// Configure all routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    health::configure_routes(cfg);
    gateway::configure_routes(cfg);
}

/// Small JSON envelope for gateway-originated failures. Upstream failures
/// passed through verbatim never go through here.
pub(crate) fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({
        "error": {
            "type": "gateway_error",
            "message": message,
        }
    }))
}

pub(crate) fn gateway_error_to_response(err: &GatewayError) -> HttpResponse {
    let status = match err {
        GatewayError::GatewayDisabled | GatewayError::NoActiveProvider { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        GatewayError::UpstreamExhausted { .. }
        | GatewayError::UpstreamTransport(_)
        | GatewayError::UpstreamServerError(_)
        | GatewayError::DecryptionFailed(_) => StatusCode::BAD_GATEWAY,
        GatewayError::UpstreamRateLimited => StatusCode::TOO_MANY_REQUESTS,
        GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &err.to_string())
}
