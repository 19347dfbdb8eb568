use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

/// Upstream resource a request was forwarded for. Names the resource in the
/// `detail` string when the upstream rejects the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Markets,
    Market,
    Events,
    Event,
}

impl Resource {
    pub fn label(self) -> &'static str {
        match self {
            Resource::Markets => "markets",
            Resource::Market => "market details",
            Resource::Events => "events",
            Resource::Event => "event details",
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Rejected locally; nothing was sent upstream.
    #[error("{0}")]
    InvalidQuery(String),

    /// Upstream answered with something other than 200.
    #[error("Failed to fetch {}", resource.label())]
    Upstream { status: u16, resource: Resource },

    /// Network error, timeout, unreadable or non-JSON body.
    #[error("{0}")]
    Transport(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidQuery(_) => StatusCode::UNPROCESSABLE_ENTITY,
            // Statuses that cannot carry the `detail` body become 502.
            GatewayError::Upstream { status, .. } => match StatusCode::from_u16(*status) {
                Ok(s) if !is_bodiless(s) => s,
                _ => StatusCode::BAD_GATEWAY,
            },
            GatewayError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn is_bodiless(status: StatusCode) -> bool {
    status.is_informational()
        || matches!(
            status,
            StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT | StatusCode::NOT_MODIFIED
        )
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({ "detail": self.to_string() })),
        )
            .into_response()
    }
}
