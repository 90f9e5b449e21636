//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use phishnet_common::types::{EmailAddress, TemplateTone};
use phishnet_core::dispatch::{DispatchError, DispatchSummary};
use phishnet_core::stats::{campaign_stats, CampaignStats};
use phishnet_core::template::fallback_template;
use phishnet_storage::models::{Campaign, CreateCampaign, Target, UpdateCampaign};
use phishnet_storage::repository::{CampaignRepository, EventRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::state::{require_owner, AppState, ErrorResponse};

/// Query parameters for listing campaigns
#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// One recipient in a campaign request
#[derive(Debug, Deserialize)]
pub struct TargetInput {
    pub email: String,
    pub name: String,
    pub department: Option<String>,
}

/// Request body for creating a campaign
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub description: String,
    /// Scenario passed to the drafting service; falls back to the
    /// description when absent
    pub context: Option<String>,
    pub tone: Option<TemplateTone>,
    pub targets: Vec<TargetInput>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Request body for updating a draft campaign
#[derive(Debug, Deserialize)]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub tone: Option<TemplateTone>,
    pub targets: Option<Vec<TargetInput>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Target response. The tracking token is not part of the reporting
/// surface; it only ever travels inside outbound lures.
#[derive(Debug, Serialize)]
pub struct TargetResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub department: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl From<&Target> for TargetResponse {
    fn from(t: &Target) -> Self {
        Self {
            id: t.id,
            email: t.email.clone(),
            name: t.name.clone(),
            department: t.department.clone(),
            status: t.status.to_string(),
            error: t.error.clone(),
            sent_at: t.sent_at,
            clicked_at: t.clicked_at,
            submitted_at: t.submitted_at,
        }
    }
}

/// Campaign response
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub subject: String,
    pub body: String,
    pub tone: String,
    pub status: String,
    pub targets: Vec<TargetResponse>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Campaign> for CampaignResponse {
    fn from(c: Campaign) -> Self {
        Self {
            id: c.id,
            name: c.name,
            description: c.description,
            subject: c.subject,
            body: c.body,
            tone: c.tone,
            status: c.status,
            targets: c.targets.iter().map(TargetResponse::from).collect(),
            start_date: c.start_date,
            end_date: c.end_date,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Campaign list response
#[derive(Debug, Serialize)]
pub struct CampaignListResponse {
    pub data: Vec<CampaignResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Dispatch pass response
#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub campaign: CampaignResponse,
    pub results: DispatchSummary,
}

/// Per-owner dashboard rollup
#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_campaigns: i64,
    pub active_campaigns: i64,
    pub total_targets: usize,
    pub total_clicks: usize,
    pub total_submissions: usize,
    pub recent_campaigns: Vec<DashboardCampaign>,
}

/// One campaign in the dashboard rollup
#[derive(Debug, Serialize)]
pub struct DashboardCampaign {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub status: String,
    pub total_targets: usize,
    pub clicks: usize,
    pub submissions: usize,
}

fn parse_targets(
    inputs: Vec<TargetInput>,
) -> Result<Vec<Target>, (StatusCode, Json<ErrorResponse>)> {
    inputs
        .into_iter()
        .map(|t| {
            let email = EmailAddress::parse(&t.email).ok_or_else(|| {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(ErrorResponse::new(
                        "validation_error",
                        format!("Invalid target email: {}", t.email),
                    )),
                )
            })?;
            Ok(Target::new(email, t.name, t.department))
        })
        .collect()
}

fn internal_error(context: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("internal_error", context)),
    )
}

fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("not_found", "Campaign not found")),
    )
}

fn map_dispatch_error(e: DispatchError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, message) = match &e {
        DispatchError::NotFound => (StatusCode::NOT_FOUND, "Campaign not found".to_string()),
        DispatchError::InvalidState(_) => (StatusCode::CONFLICT, e.to_string()),
        DispatchError::NoFailedTargets => (StatusCode::BAD_REQUEST, e.to_string()),
        DispatchError::InProgress => (StatusCode::CONFLICT, e.to_string()),
        DispatchError::TokenCollision
        | DispatchError::Database(_)
        | DispatchError::Internal(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Dispatch pass failed".to_string(),
        ),
    };
    (status, Json(ErrorResponse::new("dispatch_error", message)))
}

/// List campaigns for the owner
///
/// GET /api/v1/campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<CampaignListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let owner = require_owner(&headers)?;
    let repo = CampaignRepository::new(state.db_pool.pool().clone());

    let campaigns = repo
        .list_by_owner(owner, query.limit, query.offset)
        .await
        .map_err(|e| {
            error!("Failed to list campaigns: {}", e);
            internal_error("Failed to list campaigns")
        })?;

    let total = repo.count_by_owner(owner, None).await.unwrap_or(0);

    Ok(Json(CampaignListResponse {
        data: campaigns.into_iter().map(CampaignResponse::from).collect(),
        total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// Create a new campaign in draft status.
///
/// The lure template is drafted by the template collaborator; any failure
/// there substitutes the deterministic fallback template.
///
/// POST /api/v1/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CampaignResponse>), (StatusCode, Json<ErrorResponse>)> {
    let owner = require_owner(&headers)?;

    if input.name.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::new(
                "validation_error",
                "Campaign name is required",
            )),
        ));
    }

    let targets = parse_targets(input.targets)?;
    let tone = input.tone.unwrap_or_default();
    let context = input.context.as_deref().unwrap_or(&input.description);

    let template = match state.template_provider.generate(context, tone).await {
        Ok(t) => t,
        Err(e) => {
            warn!("Template drafting failed, using fallback: {}", e);
            fallback_template(context, tone, &state.renderer.generic_portal_url())
        }
    };

    let body = state.renderer.ensure_call_to_action(&template.body);

    let repo = CampaignRepository::new(state.db_pool.pool().clone());
    let campaign = repo
        .create(CreateCampaign {
            owner_id: owner,
            name: input.name,
            description: input.description,
            subject: template.subject,
            body,
            tone,
            targets,
            start_date: input.start_date,
            end_date: input.end_date,
        })
        .await
        .map_err(|e| {
            error!("Failed to create campaign: {}", e);
            internal_error("Failed to create campaign")
        })?;

    info!(campaign_id = %campaign.id, "Created campaign");

    Ok((StatusCode::CREATED, Json(CampaignResponse::from(campaign))))
}

/// Get a campaign by ID
///
/// GET /api/v1/campaigns/:campaign_id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, (StatusCode, Json<ErrorResponse>)> {
    let owner = require_owner(&headers)?;
    let repo = CampaignRepository::new(state.db_pool.pool().clone());

    let campaign = repo
        .get_by_owner(owner, campaign_id)
        .await
        .map_err(|e| {
            error!("Failed to get campaign: {}", e);
            internal_error("Failed to get campaign")
        })?
        .ok_or_else(not_found)?;

    Ok(Json(CampaignResponse::from(campaign)))
}

/// Update a draft campaign
///
/// PUT /api/v1/campaigns/:campaign_id
pub async fn update_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
    Json(input): Json<UpdateCampaignRequest>,
) -> Result<Json<CampaignResponse>, (StatusCode, Json<ErrorResponse>)> {
    let owner = require_owner(&headers)?;

    let targets = match input.targets {
        Some(inputs) => Some(parse_targets(inputs)?),
        None => None,
    };

    let repo = CampaignRepository::new(state.db_pool.pool().clone());
    let campaign = repo
        .update(
            campaign_id,
            owner,
            UpdateCampaign {
                name: input.name,
                description: input.description,
                subject: input.subject,
                body: input.body,
                tone: input.tone,
                targets,
                start_date: input.start_date,
                end_date: input.end_date,
            },
        )
        .await
        .map_err(|e| {
            error!("Failed to update campaign: {}", e);
            internal_error("Failed to update campaign")
        })?
        .ok_or_else(not_found)?;

    info!(campaign_id = %campaign_id, "Updated campaign");

    Ok(Json(CampaignResponse::from(campaign)))
}

/// Delete a draft campaign
///
/// DELETE /api/v1/campaigns/:campaign_id
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let owner = require_owner(&headers)?;
    let repo = CampaignRepository::new(state.db_pool.pool().clone());

    let deleted = repo.delete(campaign_id, owner).await.map_err(|e| {
        error!("Failed to delete campaign: {}", e);
        internal_error("Failed to delete campaign")
    })?;

    if deleted {
        info!(campaign_id = %campaign_id, "Deleted campaign");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "not_found",
                "Campaign not found or not in draft status",
            )),
        ))
    }
}

/// Launch a draft campaign
///
/// POST /api/v1/campaigns/:campaign_id/launch
pub async fn launch_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<DispatchResponse>, (StatusCode, Json<ErrorResponse>)> {
    let owner = require_owner(&headers)?;
    let repo = CampaignRepository::new(state.db_pool.pool().clone());

    // Ownership check before any dispatch work
    repo.get_by_owner(owner, campaign_id)
        .await
        .map_err(|e| {
            error!("Failed to load campaign: {}", e);
            internal_error("Failed to load campaign")
        })?
        .ok_or_else(not_found)?;

    let (campaign, results) = state
        .dispatcher
        .launch(campaign_id)
        .await
        .map_err(map_dispatch_error)?;

    Ok(Json(DispatchResponse {
        campaign: CampaignResponse::from(campaign),
        results,
    }))
}

/// Retry delivery for the failed targets of a campaign
///
/// POST /api/v1/campaigns/:campaign_id/relaunch-failed
pub async fn relaunch_failed(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<DispatchResponse>, (StatusCode, Json<ErrorResponse>)> {
    let owner = require_owner(&headers)?;
    let repo = CampaignRepository::new(state.db_pool.pool().clone());

    repo.get_by_owner(owner, campaign_id)
        .await
        .map_err(|e| {
            error!("Failed to load campaign: {}", e);
            internal_error("Failed to load campaign")
        })?
        .ok_or_else(not_found)?;

    let (campaign, results) = state
        .dispatcher
        .relaunch_failed(campaign_id)
        .await
        .map_err(map_dispatch_error)?;

    Ok(Json(DispatchResponse {
        campaign: CampaignResponse::from(campaign),
        results,
    }))
}

/// Get campaign statistics
///
/// GET /api/v1/campaigns/:campaign_id/stats
pub async fn get_campaign_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignStats>, (StatusCode, Json<ErrorResponse>)> {
    let owner = require_owner(&headers)?;
    let repo = CampaignRepository::new(state.db_pool.pool().clone());

    let campaign = repo
        .get_by_owner(owner, campaign_id)
        .await
        .map_err(|e| {
            error!("Failed to load campaign: {}", e);
            internal_error("Failed to load campaign")
        })?
        .ok_or_else(not_found)?;

    let events = EventRepository::new(state.db_pool.pool().clone())
        .list_by_campaign(campaign_id)
        .await
        .map_err(|e| {
            error!("Failed to load events: {}", e);
            internal_error("Failed to load events")
        })?;

    Ok(Json(campaign_stats(&campaign, &events)))
}

/// Per-owner dashboard rollup
///
/// GET /api/v1/campaigns/dashboard
pub async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DashboardStats>, (StatusCode, Json<ErrorResponse>)> {
    let owner = require_owner(&headers)?;
    let repo = CampaignRepository::new(state.db_pool.pool().clone());

    let total_campaigns = repo.count_by_owner(owner, None).await.map_err(|e| {
        error!("Failed to count campaigns: {}", e);
        internal_error("Failed to compute dashboard")
    })?;
    let active_campaigns = repo
        .count_by_owner(owner, Some(phishnet_common::types::CampaignStatus::Active))
        .await
        .unwrap_or(0);

    let recent = repo.list_by_owner(owner, 5, 0).await.map_err(|e| {
        error!("Failed to list recent campaigns: {}", e);
        internal_error("Failed to compute dashboard")
    })?;

    let mut total_targets = 0usize;
    let mut total_clicks = 0usize;
    let mut total_submissions = 0usize;

    let recent_campaigns = recent
        .into_iter()
        .map(|c| {
            let targets = c.targets.len();
            let clicks = c.targets.iter().filter(|t| t.clicked_at.is_some()).count();
            let submissions = c
                .targets
                .iter()
                .filter(|t| t.submitted_at.is_some())
                .count();

            total_targets += targets;
            total_clicks += clicks;
            total_submissions += submissions;

            DashboardCampaign {
                id: c.id,
                name: c.name,
                description: c.description,
                status: c.status,
                total_targets: targets,
                clicks,
                submissions,
            }
        })
        .collect();

    Ok(Json(DashboardStats {
        total_campaigns,
        active_campaigns,
        total_targets,
        total_clicks,
        total_submissions,
        recent_campaigns,
    }))
}
