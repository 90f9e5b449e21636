//! Tracking handlers
//!
//! The inbound surface recipients actually hit. A stale, relaunched, or
//! fabricated token gets the same generic response as an unknown
//! campaign, and the pixel endpoint never errors at all.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use phishnet_common::types::TrackingToken;
use phishnet_core::tracking::{EventContext, TrackingError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::state::{AppState, ErrorResponse};

/// 1x1 transparent GIF served by the pixel endpoint
const TRACKING_PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

/// Submission acknowledgment. Never carries the captured payload.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
}

fn event_context(headers: &HeaderMap) -> EventContext {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    EventContext { ip, user_agent }
}

fn generic_not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("not_found", "Tracking link is not valid")),
    )
}

fn map_tracking_error(e: TrackingError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        TrackingError::UnknownTarget => generic_not_found(),
        TrackingError::Database(e) => {
            error!("Tracking write failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("internal_error", "Tracking failed")),
            )
        }
    }
}

/// Record a click and redirect to the portal page.
///
/// GET /track/click/:campaign_id/:token
pub async fn track_click(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((campaign_id, token)): Path<(Uuid, String)>,
) -> Result<Redirect, (StatusCode, Json<ErrorResponse>)> {
    let token: TrackingToken = token.parse().map_err(|_| generic_not_found())?;

    state
        .correlator
        .record_click(campaign_id, token, event_context(&headers))
        .await
        .map_err(map_tracking_error)?;

    Ok(Redirect::temporary(
        &state.renderer.portal_url(campaign_id, token),
    ))
}

/// Record a credential submission.
///
/// The payload is stored verbatim on the event ledger and acknowledged
/// only.
///
/// POST /track/submit/:campaign_id/:token
pub async fn track_submission(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((campaign_id, token)): Path<(Uuid, String)>,
    Json(credentials): Json<serde_json::Value>,
) -> Result<Json<SubmitResponse>, (StatusCode, Json<ErrorResponse>)> {
    let token: TrackingToken = token.parse().map_err(|_| generic_not_found())?;

    state
        .correlator
        .record_submission(campaign_id, token, credentials, event_context(&headers))
        .await
        .map_err(map_tracking_error)?;

    Ok(Json(SubmitResponse { success: true }))
}

/// Open-tracking pixel.
///
/// Records a click event for the correlation key and always answers with
/// the GIF: a broken or missing token must not be observable from the
/// mail client.
///
/// GET /track/pixel/:campaign_id/:token
pub async fn track_pixel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((campaign_id, token)): Path<(Uuid, String)>,
) -> Response {
    if let Ok(token) = token.parse::<TrackingToken>() {
        match state
            .correlator
            .record_click(campaign_id, token, event_context(&headers))
            .await
        {
            Ok(_) => {}
            Err(TrackingError::UnknownTarget) => {
                debug!(campaign_id = %campaign_id, "Pixel hit with unresolvable token");
            }
            Err(TrackingError::Database(e)) => {
                error!("Pixel tracking write failed: {}", e);
            }
        }
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/gif")],
        TRACKING_PIXEL_GIF,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_event_context_prefers_first_forwarded_ip() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 Mobile"),
        );

        let ctx = event_context(&headers);
        assert_eq!(ctx.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(ctx.user_agent.as_deref(), Some("Mozilla/5.0 Mobile"));
    }

    #[test]
    fn test_event_context_tolerates_missing_headers() {
        let ctx = event_context(&HeaderMap::new());
        assert!(ctx.ip.is_none());
        assert!(ctx.user_agent.is_none());
    }

    #[test]
    fn test_pixel_gif_is_well_formed() {
        assert_eq!(&TRACKING_PIXEL_GIF[..6], b"GIF89a");
        assert_eq!(*TRACKING_PIXEL_GIF.last().unwrap(), 0x3b);
    }
}
