mod rate_limit;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Json, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use voltio_core::{ChatInput, MunicipalFeeEntry, QuoteError, QuoteTables, RiskCategory, ServiceCatalog};
use voltio_flow::{DirectQuoteRequest, IntakeAgent};
use voltio_observability::AppMetrics;
use voltio_storage::MemoryStore;

use crate::rate_limit::IpRateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<IntakeAgent<MemoryStore>>,
    pub metrics: Arc<AppMetrics>,
    pub api_key: String,
    pub limiter: IpRateLimiter,
    pub allowed_origins: Arc<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    metrics: voltio_observability::MetricsSnapshot,
    capabilities: HealthCapabilities,
}

#[derive(Debug, Serialize)]
struct HealthCapabilities {
    services: usize,
    risk_levels: usize,
}

#[derive(Debug, Serialize)]
struct TariffRow {
    risk: RiskCategory,
    #[serde(flatten)]
    entry: MunicipalFeeEntry,
}

pub async fn build_app() -> Result<Router> {
    let metrics = AppMetrics::shared();

    let tables = QuoteTables::from_env().context("failed loading fee tables")?;
    tables
        .validate()
        .context("fee tables are missing a risk row")?;
    let catalog = ServiceCatalog::builtin();
    catalog
        .validate()
        .context("service catalog is missing an entry")?;

    let whatsapp_number =
        env::var("VOLTIO_WHATSAPP_NUMBER").unwrap_or_else(|_| "51987654321".to_string());

    let store = Arc::new(MemoryStore::new());
    let agent = Arc::new(IntakeAgent::new(
        catalog,
        tables,
        store,
        metrics.clone(),
        whatsapp_number,
    ));

    let api_key = env::var("VOLTIO_API_KEY").unwrap_or_else(|_| "dev-voltio-key".to_string());
    let rate_limit_window = Duration::from_secs(
        env::var("VOLTIO_RATE_LIMIT_WINDOW_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(60),
    );
    let rate_limit_max = env::var("VOLTIO_RATE_LIMIT_MAX")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(80);
    let purge_interval = Duration::from_secs(
        env::var("VOLTIO_SESSION_PURGE_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(3600),
    );
    let allowed_origins = Arc::new(parse_allowed_origins());

    spawn_session_purge(agent.clone(), purge_interval);

    let state = ApiState {
        agent,
        metrics,
        api_key,
        limiter: IpRateLimiter::new(rate_limit_window, rate_limit_max),
        allowed_origins,
    };

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/chat", post(chat))
        .route("/v1/quote", post(quote))
        .route("/v1/catalog", get(catalog))
        .route("/v1/tariffs", get(tariffs))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(16 * 1024))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

fn spawn_session_purge(agent: Arc<IntakeAgent<MemoryStore>>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match agent.purge_expired().await {
                Ok(removed) if removed > 0 => {
                    info!(removed, "expired intake sessions purged");
                }
                Ok(_) => {}
                Err(error) => warn!(error = %error, "session purge failed"),
            }
        }
    });
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
        capabilities: HealthCapabilities {
            services: state.agent.catalog().entries().len(),
            risk_levels: RiskCategory::ALL.len(),
        },
    };
    (StatusCode::OK, Json(payload))
}

async fn chat(State(state): State<ApiState>, Json(input): Json<ChatInput>) -> Response {
    match state.agent.handle_message(input).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(error) => match error.downcast_ref::<QuoteError>() {
            Some(QuoteError::MissingTableEntry { table, key }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "config_defect",
                    "message": format!("fee schedule is missing {table}/{key}; fix configuration and redeploy")
                })),
            )
                .into_response(),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "internal_error",
                    "message": "failed to process the message"
                })),
            )
                .into_response(),
        },
    }
}

async fn quote(State(state): State<ApiState>, Json(request): Json<DirectQuoteRequest>) -> Response {
    state.metrics.inc_request();

    match state.agent.quote_direct(&request) {
        Ok(quote) => {
            state.metrics.inc_quote();
            (StatusCode::OK, Json(quote)).into_response()
        }
        Err(QuoteError::InvalidInput { field, message }) => {
            state.metrics.inc_rejected_input();
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({
                    "error": "invalid_input",
                    "field": field,
                    "message": message
                })),
            )
                .into_response()
        }
        Err(QuoteError::MissingTableEntry { table, key }) => {
            state.metrics.inc_table_miss();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "config_defect",
                    "message": format!("fee schedule is missing {table}/{key}; fix configuration and redeploy")
                })),
            )
                .into_response()
        }
    }
}

async fn catalog(State(state): State<ApiState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.agent.catalog().entries().to_vec()))
}

async fn tariffs(State(state): State<ApiState>) -> Response {
    let mut rows = Vec::with_capacity(RiskCategory::ALL.len());
    for risk in RiskCategory::ALL {
        match state.agent.tables().municipal(risk) {
            Ok(entry) => rows.push(TariffRow {
                risk,
                entry: *entry,
            }),
            Err(error) => {
                state.metrics.inc_table_miss();
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({
                        "error": "config_defect",
                        "message": error.to_string()
                    })),
                )
                    .into_response();
            }
        }
    }

    (StatusCode::OK, Json(rows)).into_response()
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if request.method() == Method::OPTIONS || is_public_endpoint(path.as_str()) {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if header_key == state.api_key {
        return next.run(request).await;
    }

    // First-party browser traffic is accepted by origin so the static site
    // does not need to embed the service key.
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .trim()
        .trim_end_matches('/');
    if !origin.is_empty() && state.allowed_origins.iter().any(|value| value == origin) {
        return next.run(request).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "unauthorized",
            "message": "missing or invalid x-api-key, and request origin is not allowed"
        })),
    )
        .into_response()
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    if is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if !state.limiter.allow(&ip) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "rate_limited",
                "message": "rate limit exceeded for this IP"
            })),
        )
            .into_response();
    }

    next.run(request).await
}

async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'; base-uri 'none'"),
    );

    response
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();
    let origins = if origins.is_empty() {
        vec![HeaderValue::from_static("http://localhost:5500")]
    } else {
        origins
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ])
}

fn parse_allowed_origins() -> Vec<String> {
    let default_origins = [
        "http://localhost:5500",
        "http://127.0.0.1:5500",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "https://voltio.pe",
        "https://www.voltio.pe",
    ];

    env::var("VOLTIO_ALLOWED_ORIGINS")
        .ok()
        .map(|value| {
            value
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty())
        .unwrap_or_else(|| default_origins.iter().map(ToString::to_string).collect())
}

fn is_public_endpoint(path: &str) -> bool {
    matches!(path, "/health")
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .next()
                .unwrap_or("unknown")
                .trim()
                .to_string()
        })
        .unwrap_or_else(|| "local".to_string())
}

#[cfg(test)]
mod tests {
    use super::{is_public_endpoint, request_ip};
    use axum::body::Body;
    use axum::http::Request;

    #[test]
    fn only_health_is_public() {
        assert!(is_public_endpoint("/health"));
        assert!(!is_public_endpoint("/v1/chat"));
        assert!(!is_public_endpoint("/v1/quote"));
    }

    #[test]
    fn request_ip_reads_first_forwarded_hop() {
        let request = Request::builder()
            .uri("/v1/chat")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .expect("request");
        assert_eq!(request_ip(&request), "203.0.113.7");

        let bare = Request::builder()
            .uri("/v1/chat")
            .body(Body::empty())
            .expect("request");
        assert_eq!(request_ip(&bare), "local");
    }
}
