use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::http::HeaderValue;
use bytes::Bytes;
use reqwest::{header::AUTHORIZATION, Client, StatusCode};
use url::Url;

use crate::{
    config::Settings,
    error::{GatewayError, Resource},
};

/// Outbound side of the gateway. Cloning shares the connection pool; the
/// client carries no default headers, so nothing leaks between requests.
#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
    base_url: Url,
}

/// One outbound call, fully described before it is sent.
#[derive(Debug)]
pub struct UpstreamRequest<'a> {
    pub resource: Resource,
    /// Appended to the base URL path, each one percent-encoded.
    pub segments: &'a [&'a str],
    pub params: Vec<(&'static str, String)>,
    pub authorization: Option<HeaderValue>,
}

impl UpstreamClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let base_url = Url::parse(&settings.upstream_base_url)
            .with_context(|| format!("upstream base url {}", settings.upstream_base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!(
                "upstream base url cannot be a base: {}",
                settings.upstream_base_url
            ));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(settings.upstream_timeout_secs))
            .pool_max_idle_per_host(10)
            .build()
            .context("build upstream http client")?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn url_for(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new(), so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Sends the request and returns the upstream body untouched on 200.
    pub async fn fetch(&self, req: UpstreamRequest<'_>) -> Result<Bytes, GatewayError> {
        // URLs cannot carry `.`/`..` segments, even percent-encoded; they would
        // resolve to a different upstream resource. No such ticker exists.
        if req.segments.iter().copied().any(is_dot_segment) {
            log::info!(
                "upstream.reject_local resource={:?} segments={:?}",
                req.resource,
                req.segments
            );
            return Err(GatewayError::Upstream {
                status: StatusCode::NOT_FOUND.as_u16(),
                resource: req.resource,
            });
        }

        let url = self.url_for(req.segments);
        log::debug!(
            "upstream.request resource={:?} path={} params={:?} auth={}",
            req.resource,
            url.path(),
            req.params,
            req.authorization.is_some()
        );

        let mut builder = self.http.get(url).query(&req.params);
        if let Some(auth) = req.authorization {
            builder = builder.header(AUTHORIZATION, auth);
        }

        let resp = builder.send().await.map_err(|e| {
            log::warn!("upstream.transport_error resource={:?} err={}", req.resource, e);
            GatewayError::Transport(e.to_string())
        })?;

        let status = resp.status();
        if status != StatusCode::OK {
            log::info!(
                "upstream.reject resource={:?} status={}",
                req.resource,
                status.as_u16()
            );
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                resource: req.resource,
            });
        }

        let body = resp.bytes().await.map_err(|e| {
            log::warn!("upstream.read_error resource={:?} err={}", req.resource, e);
            GatewayError::Transport(e.to_string())
        })?;

        // The body is relayed as-is, but it still has to be JSON.
        if let Err(e) = serde_json::from_slice::<serde::de::IgnoredAny>(&body) {
            log::warn!("upstream.malformed_body resource={:?} err={}", req.resource, e);
            return Err(GatewayError::Transport(format!(
                "invalid JSON from upstream: {e}"
            )));
        }

        Ok(body)
    }
}

fn is_dot_segment(segment: &str) -> bool {
    matches!(segment, "." | "..")
}
