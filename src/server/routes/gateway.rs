//! Schema-transparent proxy entry points, one per provider family.
//!
//! The gateway does not validate or rewrite the payload beyond a
//! best-effort read of the `model` field inside the proxy service; the
//! upstream response is relayed with its original status code and headers.

use crate::core::proxy::{ForwardRequest, ProxyBody, is_stripped};
use crate::core::types::ProviderFamily;
use crate::server::routes::{error_response, gateway_error_to_response};
use crate::server::state::AppState;
use crate::utils::error::GatewayError;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, Result as ActixResult, web};
use tracing::error;
use uuid::Uuid;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/gateway")
            .route("/openai/{tail:.*}", web::route().to(proxy_openai))
            .route("/anthropic/{tail:.*}", web::route().to(proxy_anthropic)),
    );
}

async fn proxy_openai(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
    tail: web::Path<String>,
) -> ActixResult<HttpResponse> {
    relay(state, req, body, ProviderFamily::OpenAi, tail.into_inner()).await
}

async fn proxy_anthropic(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
    tail: web::Path<String>,
) -> ActixResult<HttpResponse> {
    relay(state, req, body, ProviderFamily::Anthropic, tail.into_inner()).await
}

async fn relay(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
    family: ProviderFamily,
    tail: String,
) -> ActixResult<HttpResponse> {
    let Some(proxy) = state.proxy.as_ref() else {
        return Ok(gateway_error_to_response(&GatewayError::GatewayDisabled));
    };

    let tenant_id = match tenant_from_headers(&req) {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    let forward = ForwardRequest {
        tenant_id,
        agent_id: agent_from_headers(&req),
        family,
        method: upstream_method(&req),
        tail: with_query(&tail, req.query_string()),
        headers: upstream_headers(&req),
        body,
    };

    match proxy.forward(forward).await {
        Ok(outcome) => {
            let status = StatusCode::from_u16(outcome.status.as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            let mut builder = HttpResponse::build(status);
            for (name, value) in outcome.headers.iter() {
                if !is_stripped(name.as_str()) {
                    builder.append_header((name.as_str(), value.as_bytes()));
                }
            }
            match outcome.body {
                ProxyBody::Buffered(bytes) => Ok(builder.body(bytes)),
                ProxyBody::Streaming(stream) => Ok(builder.streaming(stream)),
            }
        }
        Err(err) => {
            error!(family = %family, error = %err, "gateway request failed");
            Ok(gateway_error_to_response(&err))
        }
    }
}

/// Tenant binding comes from the platform's auth layer via `x-tenant-id`.
fn tenant_from_headers(req: &HttpRequest) -> Result<Uuid, HttpResponse> {
    let raw = req
        .headers()
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "missing x-tenant-id header"))?;
    Uuid::parse_str(raw)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "x-tenant-id must be a UUID"))
}

fn agent_from_headers(req: &HttpRequest) -> Option<Uuid> {
    req.headers()
        .get("x-agent-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

fn upstream_method(req: &HttpRequest) -> reqwest::Method {
    reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .unwrap_or(reqwest::Method::POST)
}

fn with_query(tail: &str, query: &str) -> String {
    if query.is_empty() {
        tail.to_string()
    } else {
        format!("{tail}?{query}")
    }
}

fn upstream_headers(req: &HttpRequest) -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in req.headers() {
        let name = reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes());
        let value = reqwest::header::HeaderValue::from_bytes(value.as_bytes());
        if let (Ok(name), Ok(value)) = (name, value) {
            headers.append(name, value);
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_with_query() {
        assert_eq!(with_query("v1/models", ""), "v1/models");
        assert_eq!(with_query("v1/models", "limit=5"), "v1/models?limit=5");
    }

    #[actix_web::test]
    async fn test_tenant_header_required_and_validated() {
        let req = TestRequest::default().to_http_request();
        assert!(tenant_from_headers(&req).is_err());

        let req = TestRequest::default()
            .insert_header(("x-tenant-id", "not-a-uuid"))
            .to_http_request();
        assert!(tenant_from_headers(&req).is_err());

        let id = Uuid::new_v4();
        let req = TestRequest::default()
            .insert_header(("x-tenant-id", id.to_string()))
            .to_http_request();
        assert_eq!(tenant_from_headers(&req).unwrap(), id);
    }

    #[actix_web::test]
    async fn test_agent_header_is_optional() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(agent_from_headers(&req), None);

        let id = Uuid::new_v4();
        let req = TestRequest::default()
            .insert_header(("x-agent-id", id.to_string()))
            .to_http_request();
        assert_eq!(agent_from_headers(&req), Some(id));
    }
}
