//! Event correlator
//!
//! Resolves opaque tracking tokens back to targets, appends ledger events,
//! and advances target status. Resolution only ever matches the token
//! currently assigned to a target: tokens superseded by a relaunch stop
//! resolving, and an unknown token is a clean failure that mutates
//! nothing.

use crate::geo::{GeoInfo, GeoResolver};
use chrono::Utc;
use phishnet_common::types::{CampaignId, EventKind, TrackingToken};
use phishnet_storage::db::DatabasePool;
use phishnet_storage::models::{CreateEvent, Event, Target};
use phishnet_storage::repository::{CampaignRepository, EventRepository};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Correlator errors
#[derive(Error, Debug)]
pub enum TrackingError {
    /// Generic for every resolution failure: callers cannot tell whether
    /// the campaign or the token was the part that did not resolve.
    #[error("Tracking reference could not be resolved")]
    UnknownTarget,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Request-side context of an inbound tracking hit
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Find the target currently holding the given token
fn resolve_target(targets: &[Target], token: TrackingToken) -> Option<usize> {
    targets.iter().position(|t| t.tracking_id == Some(token))
}

/// Ingests inbound click and credential-submission events
pub struct EventCorrelator {
    db_pool: DatabasePool,
    campaign_repo: CampaignRepository,
    event_repo: EventRepository,
    geo: Arc<dyn GeoResolver>,
}

impl EventCorrelator {
    /// Create a new correlator with an injected geo resolver
    pub fn new(db_pool: DatabasePool, geo: Arc<dyn GeoResolver>) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            db_pool,
            campaign_repo: CampaignRepository::new(pool.clone()),
            event_repo: EventRepository::new(pool),
            geo,
        }
    }

    /// Record a click for the given correlation key.
    ///
    /// Appends a click event; a sent target advances to clicked. Repeated
    /// clicks append further events for analytics without re-advancing.
    pub async fn record_click(
        &self,
        campaign_id: CampaignId,
        token: TrackingToken,
        ctx: EventContext,
    ) -> Result<Event, TrackingError> {
        self.record(campaign_id, token, EventKind::Click, None, ctx)
            .await
    }

    /// Record a credential submission for the given correlation key.
    ///
    /// The payload is stored verbatim on the event and acknowledged only;
    /// it is never echoed back. The target advances to submitted
    /// unconditionally and stays there.
    pub async fn record_submission(
        &self,
        campaign_id: CampaignId,
        token: TrackingToken,
        credentials: serde_json::Value,
        ctx: EventContext,
    ) -> Result<(), TrackingError> {
        self.record(campaign_id, token, EventKind::Submit, Some(credentials), ctx)
            .await?;
        Ok(())
    }

    async fn record(
        &self,
        campaign_id: CampaignId,
        token: TrackingToken,
        kind: EventKind,
        submitted_data: Option<serde_json::Value>,
        ctx: EventContext,
    ) -> Result<Event, TrackingError> {
        // Best-effort lookup before taking the row lock; the resolver
        // degrades to Unknown instead of failing.
        let geo = match ctx.ip.as_deref() {
            Some(ip) => self.geo.locate(ip).await,
            None => GeoInfo::unknown(),
        };

        let mut tx = self.db_pool.pool().begin().await?;

        // Row lock serializes concurrent click/submit for one target, so
        // the status read-modify-write below cannot lose an update.
        let mut campaign = self
            .campaign_repo
            .lock(&mut tx, campaign_id)
            .await?
            .ok_or(TrackingError::UnknownTarget)?;

        let idx =
            resolve_target(&campaign.targets, token).ok_or(TrackingError::UnknownTarget)?;

        let now = Utc::now();
        let target = &mut campaign.targets[idx];
        let target_id = target.id;

        let advanced = match kind {
            EventKind::Click => target.record_click(now),
            EventKind::Submit => target.record_submission(now),
        };

        let event = self
            .event_repo
            .append(
                &mut tx,
                CreateEvent {
                    campaign_id,
                    target_id,
                    kind,
                    ip: ctx.ip,
                    user_agent: ctx.user_agent,
                    country: geo.country,
                    region: geo.region,
                    city: geo.city,
                    latitude: geo.latitude,
                    longitude: geo.longitude,
                    submitted_data,
                },
            )
            .await?;

        if advanced {
            self.campaign_repo
                .save_targets(&mut tx, campaign.id, &campaign.targets)
                .await?;
        }

        tx.commit().await?;

        if advanced {
            info!(
                campaign_id = %campaign_id,
                target_id = %target_id,
                kind = %kind,
                "Target advanced on tracked interaction"
            );
        } else {
            debug!(
                campaign_id = %campaign_id,
                target_id = %target_id,
                kind = %kind,
                "Tracked interaction appended without status change"
            );
        }

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phishnet_common::types::EmailAddress;

    fn target(email: &str) -> Target {
        Target::new(EmailAddress::parse(email).unwrap(), "Target", None)
    }

    #[test]
    fn test_resolve_target_matches_current_token_only() {
        let mut targets = vec![target("a@x.com"), target("b@x.com")];

        let stale = TrackingToken::generate();
        targets[1].mark_failed(stale, "bounced");

        let current = TrackingToken::generate();
        targets[1].mark_sent(current, Utc::now());

        assert_eq!(resolve_target(&targets, current), Some(1));
        // the superseded token no longer resolves
        assert_eq!(resolve_target(&targets, stale), None);
        // an unknown token resolves to nothing at all
        assert_eq!(resolve_target(&targets, TrackingToken::generate()), None);
    }

    #[test]
    fn test_resolve_target_ignores_unassigned() {
        let targets = vec![target("a@x.com")];
        assert_eq!(resolve_target(&targets, TrackingToken::generate()), None);
    }
}
