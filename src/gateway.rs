use anyhow::{Context, Result};
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use serde::Deserialize;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    services::ServeDir,
};

use crate::{
    config::Settings,
    error::{GatewayError, Resource},
    upstream::{UpstreamClient, UpstreamRequest},
};

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 1000;

#[derive(Clone)]
pub struct GatewayState {
    pub upstream: UpstreamClient,
    pub forward_authorization: bool,
}

/// Query string shared by the two list routes.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

impl ListQuery {
    /// Forwarding rules: `limit` is always sent, the rest only when present
    /// and non-empty, byte for byte. An out-of-range limit never reaches the
    /// upstream.
    pub fn upstream_params(self) -> Result<Vec<(&'static str, String)>, GatewayError> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(GatewayError::InvalidQuery(format!(
                "limit must be between 1 and {MAX_LIMIT} (got {limit})"
            )));
        }

        let mut params = vec![("limit", limit.to_string())];
        let optional = [
            ("status", self.status),
            ("category", self.category),
            ("cursor", self.cursor),
        ];
        for (key, value) in optional {
            if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
                params.push((key, v));
            }
        }
        Ok(params)
    }
}

pub fn router(settings: &Settings, upstream: UpstreamClient) -> Router {
    let state = GatewayState {
        upstream,
        forward_authorization: settings.forward_authorization,
    };

    let mut app = Router::new()
        .route("/", get(root))
        .route("/api/test", get(api_test))
        .route("/api/markets", get(list_markets))
        .route("/api/market/{ticker}", get(get_market))
        .route("/api/events", get(list_events))
        .route("/api/event/{event_ticker}", get(get_event))
        .with_state(state);

    if let Some(dir) = &settings.static_dir {
        app = app.nest_service("/static", ServeDir::new(dir));
    }

    app.layer(cors_layer())
}

/// Any origin, method and header, with credentials. A literal `*` is not
/// allowed alongside credentials, so the request values are echoed back.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub async fn serve(settings: Settings) -> Result<()> {
    let upstream = UpstreamClient::new(&settings)?;
    log::info!(
        "gateway.upstream base={} timeout_secs={} forward_authorization={}",
        upstream.base_url(),
        settings.upstream_timeout_secs,
        settings.forward_authorization
    );
    if let Some(dir) = &settings.static_dir {
        log::info!("gateway.static dir={}", dir);
    }

    let app = router(&settings, upstream);

    let addr = settings.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    log::info!("gateway.start url=http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("gateway.stop");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("gateway.signal_error {}", e);
    }
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Welcome to Kalshi Markets API" }))
}

async fn api_test() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "API is working" }))
}

async fn list_markets(
    State(st): State<GatewayState>,
    headers: HeaderMap,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, GatewayError> {
    let params = list_params(query)?;
    let authorization = st.passthrough_authorization(&headers);
    relay(
        &st,
        UpstreamRequest {
            resource: Resource::Markets,
            segments: &["markets"],
            params,
            authorization,
        },
    )
    .await
}

async fn get_market(
    State(st): State<GatewayState>,
    Path(ticker): Path<String>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let authorization = st.passthrough_authorization(&headers);
    relay(
        &st,
        UpstreamRequest {
            resource: Resource::Market,
            segments: &["markets", ticker.as_str()],
            params: Vec::new(),
            authorization,
        },
    )
    .await
}

async fn list_events(
    State(st): State<GatewayState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, GatewayError> {
    let params = list_params(query)?;
    relay(
        &st,
        UpstreamRequest {
            resource: Resource::Events,
            segments: &["events"],
            params,
            authorization: None,
        },
    )
    .await
}

async fn get_event(
    State(st): State<GatewayState>,
    Path(event_ticker): Path<String>,
) -> Result<Response, GatewayError> {
    relay(
        &st,
        UpstreamRequest {
            resource: Resource::Event,
            segments: &["events", event_ticker.as_str()],
            params: Vec::new(),
            authorization: None,
        },
    )
    .await
}

impl GatewayState {
    /// The caller's header, byte for byte, when passthrough is on. Missing or
    /// blank headers stay absent.
    fn passthrough_authorization(&self, headers: &HeaderMap) -> Option<HeaderValue> {
        if !self.forward_authorization {
            return None;
        }
        headers
            .get(header::AUTHORIZATION)
            .filter(|v| !v.as_bytes().trim_ascii().is_empty())
            .cloned()
    }
}

fn list_params(
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Vec<(&'static str, String)>, GatewayError> {
    let Query(q) = query.map_err(|e| GatewayError::InvalidQuery(e.body_text()))?;
    q.upstream_params()
}

async fn relay(st: &GatewayState, req: UpstreamRequest<'_>) -> Result<Response, GatewayError> {
    let body: Bytes = st.upstream.fetch(req).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
