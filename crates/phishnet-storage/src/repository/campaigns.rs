//! Campaign repository

use phishnet_common::types::{CampaignStatus, OwnerId};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{Campaign, CreateCampaign, Target, UpdateCampaign};

/// Campaign repository
#[derive(Clone)]
pub struct CampaignRepository {
    pool: PgPool,
}

impl CampaignRepository {
    /// Create a new campaign repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create a new campaign in draft status
    pub async fn create(&self, input: CreateCampaign) -> Result<Campaign, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (
                id, owner_id, name, description, subject, body, tone,
                status, targets, start_date, end_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'draft', $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.owner_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.subject)
        .bind(&input.body)
        .bind(input.tone.to_string())
        .bind(Json(&input.targets))
        .bind(input.start_date)
        .bind(input.end_date)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a campaign by ID
    pub async fn get(&self, id: Uuid) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a campaign by ID and owner
    pub async fn get_by_owner(
        &self,
        owner_id: OwnerId,
        id: Uuid,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List campaigns for an owner, newest first
    pub async fn list_by_owner(
        &self,
        owner_id: OwnerId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT * FROM campaigns
            WHERE owner_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Count campaigns for an owner, optionally by status
    pub async fn count_by_owner(
        &self,
        owner_id: OwnerId,
        status: Option<CampaignStatus>,
    ) -> Result<i64, sqlx::Error> {
        let count: (i64,) = if let Some(status) = status {
            sqlx::query_as("SELECT COUNT(*) FROM campaigns WHERE owner_id = $1 AND status = $2")
                .bind(owner_id)
                .bind(status.to_string())
                .fetch_one(&self.pool)
                .await?
        } else {
            sqlx::query_as("SELECT COUNT(*) FROM campaigns WHERE owner_id = $1")
                .bind(owner_id)
                .fetch_one(&self.pool)
                .await?
        };
        Ok(count.0)
    }

    /// Update a campaign (draft campaigns only)
    pub async fn update(
        &self,
        id: Uuid,
        owner_id: OwnerId,
        input: UpdateCampaign,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let current = match self.get_by_owner(owner_id, id).await? {
            Some(c) => c,
            None => return Ok(None),
        };

        // Only draft campaigns may be edited
        if current.status != "draft" {
            return Ok(Some(current));
        }

        let targets = input
            .targets
            .map(Json)
            .unwrap_or_else(|| current.targets.clone());

        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                subject = COALESCE($5, subject),
                body = COALESCE($6, body),
                tone = COALESCE($7, tone),
                targets = $8,
                start_date = COALESCE($9, start_date),
                end_date = COALESCE($10, end_date),
                updated_at = NOW()
            WHERE id = $1 AND owner_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.subject)
        .bind(&input.body)
        .bind(input.tone.map(|t| t.to_string()))
        .bind(&targets)
        .bind(input.start_date)
        .bind(input.end_date)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a campaign (draft campaigns only)
    pub async fn delete(&self, id: Uuid, owner_id: OwnerId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM campaigns WHERE id = $1 AND owner_id = $2 AND status = 'draft'",
        )
        .bind(id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Persist the outcome of a dispatch pass.
    ///
    /// Status and the full target collection are written in one statement,
    /// after the fan-in barrier, so intermediate per-target states are
    /// never visible to readers.
    pub async fn save_dispatch_result(
        &self,
        id: Uuid,
        status: CampaignStatus,
        targets: &[Target],
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = $2,
                targets = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(Json(targets))
        .fetch_optional(&self.pool)
        .await
    }

    /// Load a campaign row with a row lock inside the given transaction.
    ///
    /// Used by the event correlator so the read-modify-write of a target's
    /// status is atomic even when click and submit race for one target.
    pub async fn lock(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Write back the target collection inside the given transaction
    pub async fn save_targets(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        targets: &[Target],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE campaigns SET targets = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(Json(targets))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
