//! Shared application state and request helpers

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use phishnet_common::types::OwnerId;
use phishnet_core::dispatch::CampaignDispatcher;
use phishnet_core::template::{LureRenderer, TemplateProvider};
use phishnet_core::tracking::EventCorrelator;
use phishnet_storage::DatabasePool;
use serde::Serialize;
use std::sync::Arc;

/// Application state shared across handlers
pub struct AppState {
    pub db_pool: DatabasePool,
    pub dispatcher: CampaignDispatcher,
    pub correlator: EventCorrelator,
    pub template_provider: Arc<dyn TemplateProvider>,
    pub renderer: LureRenderer,
}

/// Error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
        }
    }
}

/// Extract the owning principal from the request.
///
/// Authentication itself is an external collaborator; upstream middleware
/// is expected to resolve the session and pass the principal along in the
/// `X-Owner-Id` header.
pub fn require_owner(headers: &HeaderMap) -> Result<OwnerId, (StatusCode, Json<ErrorResponse>)> {
    headers
        .get("x-owner-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new(
                    "unauthorized",
                    "Missing or invalid X-Owner-Id header",
                )),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use uuid::Uuid;

    #[test]
    fn test_require_owner_parses_uuid() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert("x-owner-id", HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(require_owner(&headers).unwrap(), id);
    }

    #[test]
    fn test_require_owner_rejects_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert("x-owner-id", HeaderValue::from_static("not-a-uuid"));
        assert!(require_owner(&headers).is_err());
        assert!(require_owner(&HeaderMap::new()).is_err());
    }
}
