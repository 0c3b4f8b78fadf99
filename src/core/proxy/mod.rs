//! Request orchestration: provider selection, upstream exchange,
//! retry/failover, and usage accounting.
//!
//! One client-facing request runs a sequential retry loop with a fixed
//! attempt ceiling. Each attempt selects a provider fresh (possibly a
//! different one), forwards the verbatim body with the gateway-held
//! credential injected, and classifies the outcome: transport errors, 5xx,
//! and 429 rotate providers; any other response is relayed to the caller as
//! final. Exactly one usage record is written per request, after the loop
//! terminates.
//!
//! Once response bytes have reached the caller (the streaming case) the
//! attempt can no longer be retried: partial output is already visible.
//! This is a deliberate boundary of the retry contract, not a bug.

mod upstream;
pub mod usage;

pub use upstream::{build_headers, is_stripped, upstream_url};

use crate::core::pricing;
use crate::core::router::ProviderRouter;
use crate::core::types::{
    ProviderFamily, ProviderRecord, TokenUsage, UsageRecord, UsageStatus,
};
use crate::storage::ProviderStore;
use crate::utils::error::{GatewayError, Result};
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Fixed attempt ceiling for one client-facing request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Per-attempt upstream timeout. Generous, to accommodate long generations.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub max_attempts: u32,
    pub upstream_timeout: Duration,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}

/// One inbound gateway request, already stripped of the gateway path prefix.
#[derive(Debug)]
pub struct ForwardRequest {
    pub tenant_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub family: ProviderFamily,
    pub method: Method,
    /// Path plus query to append to the selected provider's base URL.
    pub tail: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Relayed upstream response handed back to the HTTP layer.
pub struct ProxyOutcome {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ProxyBody,
}

pub enum ProxyBody {
    Buffered(Bytes),
    /// Byte-for-byte passthrough. Usage accounting for a streamed body runs
    /// inside the stream itself, after the final chunk has been relayed.
    Streaming(BoxStream<'static, Result<Bytes>>),
}

impl std::fmt::Debug for ProxyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyOutcome")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish()
    }
}

impl std::fmt::Debug for ProxyBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyBody::Buffered(bytes) => {
                f.debug_tuple("Buffered").field(bytes).finish()
            }
            ProxyBody::Streaming(_) => {
                f.debug_tuple("Streaming").field(&"<stream>").finish()
            }
        }
    }
}

enum Exchange {
    Buffered {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    Streaming {
        response: reqwest::Response,
    },
}

/// Everything the streaming relay needs to settle accounting after the
/// response object itself has been consumed.
struct StreamContext {
    tenant_id: Uuid,
    agent_id: Option<Uuid>,
    family: ProviderFamily,
    provider_id: Uuid,
    model: Option<String>,
    retry_count: u32,
    started: Instant,
}

/// Orchestrates the end-to-end lifecycle of gateway requests.
pub struct ProxyService {
    router: Arc<ProviderRouter>,
    store: Arc<dyn ProviderStore>,
    client: reqwest::Client,
    settings: ProxySettings,
}

impl ProxyService {
    /// Build a service with its own pooled outbound client, shared across
    /// all upstream calls.
    pub fn new(
        router: Arc<ProviderRouter>,
        store: Arc<dyn ProviderStore>,
        settings: ProxySettings,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            router,
            store,
            client,
            settings,
        })
    }

    /// Forward one client request to a healthy upstream provider.
    ///
    /// Retries retryable failures up to the attempt ceiling, rotating the
    /// provider choice each time. Selection failures do not retry: with no
    /// providers there is nothing different to try. The final error of the
    /// last attempt is surfaced when the ceiling is exhausted.
    pub async fn forward(&self, request: ForwardRequest) -> Result<ProxyOutcome> {
        let started = Instant::now();
        let model = usage::model_from_body(&request.body);
        let mut last_error: Option<GatewayError> = None;
        let mut last_provider: Option<Uuid> = None;

        for attempt in 0..self.settings.max_attempts {
            let (provider, api_key) = match self
                .router
                .pick(request.tenant_id, request.family, model.as_deref())
                .await
            {
                Ok(picked) => picked,
                Err(err @ GatewayError::DecryptionFailed(_)) => {
                    // Burns the attempt; a fresh pick may draw a different
                    // provider with an intact credential.
                    warn!(attempt, error = %err, "provider selection failed");
                    last_error = Some(err);
                    continue;
                }
                Err(err) => {
                    // No providers (or the directory is unreachable):
                    // retrying cannot change the outcome.
                    self.record_failure(&request, None, model, attempt, started, &err)
                        .await;
                    return Err(err);
                }
            };
            last_provider = Some(provider.id);

            debug!(
                attempt,
                provider_id = %provider.id,
                provider = %provider.name,
                tail = %request.tail,
                "forwarding to upstream"
            );

            match self.exchange(&request, &provider, &api_key).await {
                Ok(Exchange::Buffered {
                    status,
                    headers,
                    body,
                }) => {
                    self.finalize_success(
                        &request,
                        &provider,
                        model,
                        usage::from_buffered(request.family, &body),
                        attempt,
                        started,
                    )
                    .await;
                    return Ok(ProxyOutcome {
                        status,
                        headers,
                        body: ProxyBody::Buffered(body),
                    });
                }
                Ok(Exchange::Streaming { response }) => {
                    let status = response.status();
                    let headers = response.headers().clone();
                    let context = StreamContext {
                        tenant_id: request.tenant_id,
                        agent_id: request.agent_id,
                        family: request.family,
                        provider_id: provider.id,
                        model,
                        retry_count: attempt,
                        started,
                    };
                    return Ok(ProxyOutcome {
                        status,
                        headers,
                        body: ProxyBody::Streaming(self.relay_stream(response, context)),
                    });
                }
                Err(err) => {
                    if let Err(mark_err) = self.router.mark_error(provider.id).await {
                        warn!(provider_id = %provider.id, error = %mark_err, "failed to persist provider error");
                    }
                    if err.retryable() && attempt + 1 < self.settings.max_attempts {
                        warn!(
                            attempt,
                            provider_id = %provider.id,
                            error = %err,
                            "retryable upstream failure; rotating provider"
                        );
                        last_error = Some(err);
                        continue;
                    }
                    let err = if err.retryable() {
                        GatewayError::UpstreamExhausted {
                            attempts: self.settings.max_attempts,
                            last: err.to_string(),
                        }
                    } else {
                        err
                    };
                    self.record_failure(&request, Some(provider.id), model, attempt, started, &err)
                        .await;
                    return Err(err);
                }
            }
        }

        // Every attempt was consumed without reaching an acceptable response.
        let last = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown upstream failure".into());
        let err = GatewayError::UpstreamExhausted {
            attempts: self.settings.max_attempts,
            last,
        };
        self.record_failure(
            &request,
            last_provider,
            model,
            self.settings.max_attempts - 1,
            started,
            &err,
        )
        .await;
        Err(err)
    }

    /// One upstream attempt: build the request, send it, classify the
    /// result. Errors returned here are retryable by construction; any
    /// other response (2xx or not) is acceptable and relayed as final.
    async fn exchange(
        &self,
        request: &ForwardRequest,
        provider: &ProviderRecord,
        api_key: &str,
    ) -> Result<Exchange> {
        let url = upstream_url(&provider.base_url, &request.tail);
        let headers = build_headers(&request.headers, provider.family, api_key)?;

        let response = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers)
            .timeout(self.settings.upstream_timeout)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|err| GatewayError::UpstreamTransport(err.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::UpstreamServerError(status.as_u16()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::UpstreamRateLimited);
        }

        if is_event_stream(response.headers()) {
            Ok(Exchange::Streaming { response })
        } else {
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|err| GatewayError::UpstreamTransport(err.to_string()))?;
            Ok(Exchange::Buffered {
                status,
                headers,
                body,
            })
        }
    }

    /// Relay an event-stream body chunk by chunk while accumulating the raw
    /// text, then settle health and the usage record before the stream
    /// closes. If the caller goes away mid-stream the relay stops with it.
    fn relay_stream(
        &self,
        response: reqwest::Response,
        context: StreamContext,
    ) -> BoxStream<'static, Result<Bytes>> {
        let router = Arc::clone(&self.router);
        let store = Arc::clone(&self.store);

        let stream = async_stream::stream! {
            let mut upstream = response.bytes_stream();
            let mut collected = String::new();
            let mut failure: Option<GatewayError> = None;

            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(bytes) => {
                        collected.push_str(&String::from_utf8_lossy(&bytes));
                        yield Ok(bytes);
                    }
                    Err(err) => {
                        failure = Some(GatewayError::UpstreamTransport(err.to_string()));
                        break;
                    }
                }
            }

            let token_usage = usage::from_stream(context.family, &collected);
            match failure {
                None => {
                    if let Err(err) = router.mark_success(context.provider_id).await {
                        warn!(provider_id = %context.provider_id, error = %err, "failed to persist provider success");
                    }
                    insert_record(
                        store.as_ref(),
                        build_record(&context, token_usage, UsageStatus::Success, None),
                    )
                    .await;
                }
                Some(err) => {
                    // Bytes already reached the caller; the attempt is
                    // terminal and the provider takes the blame.
                    if let Err(mark_err) = router.mark_error(context.provider_id).await {
                        warn!(provider_id = %context.provider_id, error = %mark_err, "failed to persist provider error");
                    }
                    insert_record(
                        store.as_ref(),
                        build_record(
                            &context,
                            token_usage,
                            UsageStatus::Failed,
                            Some(err.to_string()),
                        ),
                    )
                    .await;
                    yield Err(err);
                }
            }
        };
        Box::pin(stream)
    }

    /// Settle a buffered (or passthrough non-2xx) response: clear the
    /// provider's cooldown, price the extracted usage, write the record.
    async fn finalize_success(
        &self,
        request: &ForwardRequest,
        provider: &ProviderRecord,
        model: Option<String>,
        token_usage: TokenUsage,
        retry_count: u32,
        started: Instant,
    ) {
        if let Err(err) = self.router.mark_success(provider.id).await {
            warn!(provider_id = %provider.id, error = %err, "failed to persist provider success");
        }
        let context = StreamContext {
            tenant_id: request.tenant_id,
            agent_id: request.agent_id,
            family: request.family,
            provider_id: provider.id,
            model,
            retry_count,
            started,
        };
        insert_record(
            self.store.as_ref(),
            build_record(&context, token_usage, UsageStatus::Success, None),
        )
        .await;
    }

    /// Write the single failure record for an aborted or exhausted request.
    async fn record_failure(
        &self,
        request: &ForwardRequest,
        provider_id: Option<Uuid>,
        model: Option<String>,
        retry_count: u32,
        started: Instant,
        err: &GatewayError,
    ) {
        let record = UsageRecord {
            id: Uuid::new_v4(),
            tenant_id: request.tenant_id,
            provider_id,
            agent_id: request.agent_id,
            model,
            usage: TokenUsage::default(),
            cost_micro_usd: 0,
            status: UsageStatus::Failed,
            latency_ms: started.elapsed().as_millis() as u64,
            retry_count,
            error: Some(err.to_string()),
            created_at: Utc::now(),
        };
        insert_record(self.store.as_ref(), record).await;
    }
}

fn build_record(
    context: &StreamContext,
    token_usage: TokenUsage,
    status: UsageStatus,
    error: Option<String>,
) -> UsageRecord {
    let cost = pricing::cost_micro_usd(
        context.family,
        context.model.as_deref().unwrap_or_default(),
        &token_usage,
    );
    UsageRecord {
        id: Uuid::new_v4(),
        tenant_id: context.tenant_id,
        provider_id: Some(context.provider_id),
        agent_id: context.agent_id,
        model: context.model.clone(),
        usage: token_usage,
        cost_micro_usd: cost,
        status,
        latency_ms: context.started.elapsed().as_millis() as u64,
        retry_count: context.retry_count,
        error,
        created_at: Utc::now(),
    }
}

/// Recording happens after the response has been delivered; a failure here
/// is logged and swallowed, never surfaced to the caller.
async fn insert_record(store: &dyn ProviderStore, record: UsageRecord) {
    if let Err(err) = store.insert_usage(record).await {
        error!(error = %err, "failed to persist usage record");
    }
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().starts_with("text/event-stream"))
        .unwrap_or(false)
}
