//! Event repository
//!
//! Events are append-only: rows are never updated or deleted.

use chrono::{DateTime, Utc};
use phishnet_common::types::{CampaignId, EventKind};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{CreateEvent, Event};

/// Event repository
#[derive(Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    /// Create a new event repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Append an event inside the given transaction.
    ///
    /// Rides the correlator's campaign-row transaction so the event and the
    /// target status advance commit together.
    pub async fn append(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        input: CreateEvent,
    ) -> Result<Event, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (
                id, campaign_id, target_id, kind, ip, user_agent,
                country, region, city, latitude, longitude, submitted_data
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.campaign_id)
        .bind(input.target_id)
        .bind(input.kind.to_string())
        .bind(&input.ip)
        .bind(&input.user_agent)
        .bind(&input.country)
        .bind(&input.region)
        .bind(&input.city)
        .bind(input.latitude)
        .bind(input.longitude)
        .bind(&input.submitted_data)
        .fetch_one(&mut **tx)
        .await
    }

    /// List all events for a campaign in append order
    pub async fn list_by_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(
            "SELECT * FROM events WHERE campaign_id = $1 ORDER BY created_at ASC",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Most recent events for a campaign, newest first
    pub async fn recent_by_campaign(
        &self,
        campaign_id: CampaignId,
        limit: i64,
    ) -> Result<Vec<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(
            "SELECT * FROM events WHERE campaign_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(campaign_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Events for a campaign since the given instant, newest first
    pub async fn list_since(
        &self,
        campaign_id: CampaignId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT * FROM events
            WHERE campaign_id = $1 AND created_at >= $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(campaign_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
    }

    /// Count events of one kind for a campaign
    pub async fn count_by_kind(
        &self,
        campaign_id: CampaignId,
        kind: EventKind,
    ) -> Result<i64, sqlx::Error> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM events WHERE campaign_id = $1 AND kind = $2")
                .bind(campaign_id)
                .bind(kind.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }
}
