//! Campaign dispatch state machine
//!
//! Owns the draft → active/partial transitions. A dispatch pass fans out
//! one send per target under bounded parallelism, waits for every attempt
//! at the fan-in barrier, then derives the campaign status and persists
//! status plus the whole target collection in one statement.

use chrono::{DateTime, Utc};
use phishnet_common::types::{CampaignId, CampaignStatus, TargetStatus, TrackingToken};
use phishnet_storage::db::DatabasePool;
use phishnet_storage::models::{Campaign, Target};
use phishnet_storage::repository::CampaignRepository;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use super::sender::{MailSender, OutboundEmail};
use crate::template::LureRenderer;

/// Dispatch state machine errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Campaign can only be launched from draft status (current: {0})")]
    InvalidState(String),

    #[error("No failed targets to relaunch")]
    NoFailedTargets,

    #[error("A dispatch pass is already running for this campaign")]
    InProgress,

    #[error("Tracking token collision detected")]
    TokenCollision,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// One failed recipient in a dispatch summary
#[derive(Debug, Clone, Serialize)]
pub struct FailedRecipient {
    pub email: String,
    pub reason: String,
}

/// Result of one dispatch pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedRecipient>,
}

/// Campaign status as a pure function of target statuses, evaluated after
/// a dispatch pass. Unresolved targets (failed, or pending from a prior
/// attempt) keep the campaign partial.
pub fn derive_dispatch_status(targets: &[Target]) -> CampaignStatus {
    let unresolved = targets
        .iter()
        .any(|t| matches!(t.status, TargetStatus::Failed | TargetStatus::Pending));
    if unresolved {
        CampaignStatus::Partial
    } else {
        CampaignStatus::Active
    }
}

/// Indices of targets currently in failed status
fn failed_indices(campaign: &Campaign) -> Vec<usize> {
    campaign
        .targets
        .iter()
        .enumerate()
        .filter(|(_, t)| t.status == TargetStatus::Failed)
        .map(|(i, _)| i)
        .collect()
}

/// Tracks campaigns with a dispatch pass in flight. A second
/// Launch/RelaunchFailed on the same campaign is rejected instead of
/// interleaved with the running pass.
#[derive(Clone, Default)]
struct InFlightSet {
    inner: Arc<Mutex<HashSet<CampaignId>>>,
}

impl InFlightSet {
    fn begin(&self, id: CampaignId) -> Option<InFlightGuard> {
        let mut set = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if set.insert(id) {
            Some(InFlightGuard {
                inner: Arc::clone(&self.inner),
                id,
            })
        } else {
            None
        }
    }
}

struct InFlightGuard {
    inner: Arc<Mutex<HashSet<CampaignId>>>,
    id: CampaignId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Executes one dispatch pass over a subset of a campaign's targets.
///
/// Pure with respect to persistence: mutates the in-memory target
/// collection only, so the caller controls when (and that) the result
/// becomes visible.
pub struct DispatchPass {
    sender: Arc<dyn MailSender>,
    renderer: LureRenderer,
    concurrency: usize,
}

impl DispatchPass {
    /// Create a new pass executor
    pub fn new(sender: Arc<dyn MailSender>, renderer: LureRenderer, concurrency: usize) -> Self {
        Self {
            sender,
            renderer,
            concurrency: concurrency.max(1),
        }
    }

    /// Run the pass over the given target indices.
    ///
    /// Every index gets a fresh token and exactly one send attempt; one
    /// bad address never blocks delivery to the rest. Returns after every
    /// attempt has completed.
    pub async fn run(
        &self,
        campaign: &mut Campaign,
        indices: &[usize],
    ) -> Result<DispatchSummary, DispatchError> {
        // Fresh token per attempted target. A token already present in the
        // campaign means the entropy source is broken; abort the pass.
        let mut in_use: HashSet<TrackingToken> = campaign
            .targets
            .iter()
            .enumerate()
            .filter(|(i, _)| !indices.contains(i))
            .filter_map(|(_, t)| t.tracking_id)
            .collect();

        let mut tokens: Vec<(usize, TrackingToken)> = Vec::with_capacity(indices.len());
        for &idx in indices {
            let token = TrackingToken::generate();
            if !in_use.insert(token) {
                return Err(DispatchError::TokenCollision);
            }
            tokens.push((idx, token));
        }

        // Fan out, bounded by the semaphore.
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(tokens.len());

        for &(idx, token) in &tokens {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| DispatchError::Internal(anyhow::anyhow!(e)))?;
            let sender = Arc::clone(&self.sender);
            let renderer = self.renderer.clone();
            let campaign_id = campaign.id;
            let subject = campaign.subject.clone();
            let body = campaign.body.clone();
            let to = campaign.targets[idx].email.clone();

            let handle = tokio::spawn(async move {
                let rendered = renderer.render(&body, campaign_id, token);
                let email = OutboundEmail {
                    to,
                    subject,
                    html_body: rendered.html,
                    text_body: rendered.text,
                };
                let outcome = sender
                    .send(&email)
                    .await
                    .map(|()| Utc::now())
                    .map_err(|e| e.to_string());
                drop(permit);
                (idx, outcome)
            });
            handles.push((idx, handle));
        }

        // Fan-in barrier: every attempt resolves to exactly one outcome.
        let mut outcomes: HashMap<usize, Result<DateTime<Utc>, String>> = HashMap::new();
        for (idx, handle) in handles {
            match handle.await {
                Ok((i, outcome)) => {
                    outcomes.insert(i, outcome);
                }
                Err(e) => {
                    error!(campaign_id = %campaign.id, "Dispatch task panicked: {}", e);
                    outcomes.insert(idx, Err(format!("dispatch task failed: {}", e)));
                }
            }
        }

        // Apply outcomes in input order.
        let mut summary = DispatchSummary::default();
        for (idx, token) in tokens {
            let outcome = outcomes
                .remove(&idx)
                .unwrap_or_else(|| Err("dispatch outcome missing".to_string()));
            let target = &mut campaign.targets[idx];
            match outcome {
                Ok(at) => {
                    target.mark_sent(token, at);
                    summary.succeeded.push(target.email.clone());
                }
                Err(reason) => {
                    warn!(
                        campaign_id = %campaign.id,
                        email = %target.email,
                        "Failed to send lure: {}", reason
                    );
                    target.mark_failed(token, reason.clone());
                    summary.failed.push(FailedRecipient {
                        email: target.email.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(summary)
    }
}

/// Campaign dispatcher - owns the Launch and RelaunchFailed operations
pub struct CampaignDispatcher {
    campaign_repo: CampaignRepository,
    pass: DispatchPass,
    in_flight: InFlightSet,
}

impl CampaignDispatcher {
    /// Create a new dispatcher with an injected sender
    pub fn new(
        db_pool: DatabasePool,
        sender: Arc<dyn MailSender>,
        renderer: LureRenderer,
        concurrency: usize,
    ) -> Self {
        Self {
            campaign_repo: CampaignRepository::new(db_pool.pool().clone()),
            pass: DispatchPass::new(sender, renderer, concurrency),
            in_flight: InFlightSet::default(),
        }
    }

    /// Launch a draft campaign: one dispatch attempt per target.
    pub async fn launch(
        &self,
        campaign_id: CampaignId,
    ) -> Result<(Campaign, DispatchSummary), DispatchError> {
        let _guard = self
            .in_flight
            .begin(campaign_id)
            .ok_or(DispatchError::InProgress)?;

        let mut campaign = self
            .campaign_repo
            .get(campaign_id)
            .await?
            .ok_or(DispatchError::NotFound)?;

        if campaign.status_enum() != Some(CampaignStatus::Draft) {
            return Err(DispatchError::InvalidState(campaign.status.clone()));
        }

        let indices: Vec<usize> = (0..campaign.targets.len()).collect();
        let summary = self.pass.run(&mut campaign, &indices).await?;

        let status = derive_dispatch_status(&campaign.targets);
        let updated = self
            .campaign_repo
            .save_dispatch_result(campaign.id, status, &campaign.targets)
            .await?
            .ok_or(DispatchError::NotFound)?;

        info!(
            campaign_id = %campaign_id,
            status = %updated.status,
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "Launch pass complete"
        );

        Ok((updated, summary))
    }

    /// Retry exactly the failed subset of a partially dispatched campaign.
    pub async fn relaunch_failed(
        &self,
        campaign_id: CampaignId,
    ) -> Result<(Campaign, DispatchSummary), DispatchError> {
        let _guard = self
            .in_flight
            .begin(campaign_id)
            .ok_or(DispatchError::InProgress)?;

        let mut campaign = self
            .campaign_repo
            .get(campaign_id)
            .await?
            .ok_or(DispatchError::NotFound)?;

        let indices = failed_indices(&campaign);
        if indices.is_empty() {
            return Err(DispatchError::NoFailedTargets);
        }

        let summary = self.pass.run(&mut campaign, &indices).await?;

        let status = derive_dispatch_status(&campaign.targets);
        let updated = self
            .campaign_repo
            .save_dispatch_result(campaign.id, status, &campaign.targets)
            .await?
            .ok_or(DispatchError::NotFound)?;

        info!(
            campaign_id = %campaign_id,
            status = %updated.status,
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "Relaunch pass complete"
        );

        Ok((updated, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::sender::DeliveryError;
    use async_trait::async_trait;
    use phishnet_common::types::EmailAddress;
    use sqlx::types::Json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Sender test double: fails for a scripted set of addresses and keeps
    /// track of how many sends run at once.
    struct ScriptedSender {
        fail: HashSet<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay_ms: u64,
    }

    impl ScriptedSender {
        fn new(fail: &[&str]) -> Self {
            Self {
                fail: fail.iter().map(|s| s.to_string()).collect(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay_ms: 0,
            }
        }

        fn with_delay(mut self, ms: u64) -> Self {
            self.delay_ms = ms;
            self
        }
    }

    #[async_trait]
    impl MailSender for ScriptedSender {
        async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.contains(&email.to) {
                Err(DeliveryError::Rejected(format!(
                    "mailbox unavailable: {}",
                    email.to
                )))
            } else {
                Ok(())
            }
        }
    }

    fn campaign(emails: &[&str]) -> Campaign {
        let targets: Vec<Target> = emails
            .iter()
            .map(|e| Target::new(EmailAddress::parse(e).unwrap(), "Target", None))
            .collect();
        let now = Utc::now();
        Campaign {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Quarterly awareness".to_string(),
            description: "Payroll portal scenario".to_string(),
            subject: "Payroll update required".to_string(),
            body: "Please [click here](https://placeholder.example) to confirm.".to_string(),
            tone: "urgent".to_string(),
            status: "draft".to_string(),
            targets: Json(targets),
            start_date: now,
            end_date: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn pass(sender: ScriptedSender) -> DispatchPass {
        DispatchPass::new(
            Arc::new(sender),
            LureRenderer::new("https://awareness.example.com"),
            4,
        )
    }

    #[tokio::test]
    async fn test_launch_pass_all_ok() {
        let mut c = campaign(&["a@x.com", "b@x.com", "c@x.com"]);
        let indices: Vec<usize> = (0..3).collect();

        let summary = pass(ScriptedSender::new(&[]))
            .run(&mut c, &indices)
            .await
            .unwrap();

        assert_eq!(summary.succeeded.len(), 3);
        assert!(summary.failed.is_empty());
        for t in c.targets.iter() {
            assert_eq!(t.status, TargetStatus::Sent);
            assert!(t.sent_at.is_some());
            assert!(t.error.is_none());
            assert!(t.tracking_id.is_some());
        }
        // every attempt drew a distinct token
        let tokens: HashSet<_> = c.targets.iter().filter_map(|t| t.tracking_id).collect();
        assert_eq!(tokens.len(), 3);
        assert_eq!(derive_dispatch_status(&c.targets), CampaignStatus::Active);
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let mut c = campaign(&["a@x.com", "b@x.com", "c@x.com"]);
        let indices: Vec<usize> = (0..3).collect();

        let summary = pass(ScriptedSender::new(&["b@x.com"]))
            .run(&mut c, &indices)
            .await
            .unwrap();

        assert_eq!(summary.succeeded, vec!["a@x.com", "c@x.com"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].email, "b@x.com");

        assert_eq!(c.targets[0].status, TargetStatus::Sent);
        assert_eq!(c.targets[1].status, TargetStatus::Failed);
        assert!(c.targets[1].error.is_some());
        assert_eq!(c.targets[2].status, TargetStatus::Sent);
        assert_eq!(derive_dispatch_status(&c.targets), CampaignStatus::Partial);
    }

    #[tokio::test]
    async fn test_relaunch_pass_rotates_token_and_clears_error() {
        let mut c = campaign(&["a@x.com", "b@x.com", "c@x.com"]);
        let all: Vec<usize> = (0..3).collect();

        pass(ScriptedSender::new(&["b@x.com"]))
            .run(&mut c, &all)
            .await
            .unwrap();
        let old_token = c.targets[1].tracking_id.unwrap();

        let retry = failed_indices(&c);
        assert_eq!(retry, vec![1]);

        let summary = pass(ScriptedSender::new(&[]))
            .run(&mut c, &retry)
            .await
            .unwrap();

        assert_eq!(summary.succeeded, vec!["b@x.com"]);
        assert_eq!(c.targets[1].status, TargetStatus::Sent);
        assert!(c.targets[1].error.is_none());
        assert_ne!(c.targets[1].tracking_id.unwrap(), old_token);
        assert_eq!(derive_dispatch_status(&c.targets), CampaignStatus::Active);
    }

    #[tokio::test]
    async fn test_relaunch_failure_keeps_partial() {
        let mut c = campaign(&["a@x.com", "b@x.com"]);
        let all: Vec<usize> = (0..2).collect();

        pass(ScriptedSender::new(&["b@x.com"]))
            .run(&mut c, &all)
            .await
            .unwrap();

        let retry = failed_indices(&c);
        pass(ScriptedSender::new(&["b@x.com"]))
            .run(&mut c, &retry)
            .await
            .unwrap();

        assert_eq!(c.targets[1].status, TargetStatus::Failed);
        assert_eq!(derive_dispatch_status(&c.targets), CampaignStatus::Partial);
    }

    #[test]
    fn test_status_stays_partial_while_any_target_pending() {
        let mut c = campaign(&["a@x.com", "b@x.com"]);
        c.targets[0].mark_sent(TrackingToken::generate(), Utc::now());
        // targets[1] still pending from a prior attempt
        assert_eq!(derive_dispatch_status(&c.targets), CampaignStatus::Partial);
    }

    #[test]
    fn test_empty_campaign_derives_active() {
        let c = campaign(&[]);
        assert_eq!(derive_dispatch_status(&c.targets), CampaignStatus::Active);
    }

    #[test]
    fn test_no_failed_targets_detection() {
        let mut c = campaign(&["a@x.com"]);
        assert!(failed_indices(&c).is_empty());
        c.targets[0].mark_failed(TrackingToken::generate(), "bounced");
        assert_eq!(failed_indices(&c), vec![0]);
    }

    #[test]
    fn test_in_flight_guard_rejects_overlap() {
        let set = InFlightSet::default();
        let id = Uuid::new_v4();

        let guard = set.begin(id).unwrap();
        assert!(set.begin(id).is_none());
        // a different campaign is unaffected
        assert!(set.begin(Uuid::new_v4()).is_some());

        drop(guard);
        assert!(set.begin(id).is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fan_out_respects_concurrency_limit() {
        let mut c = campaign(&[
            "a@x.com", "b@x.com", "c@x.com", "d@x.com", "e@x.com", "f@x.com", "g@x.com",
            "h@x.com",
        ]);
        let indices: Vec<usize> = (0..8).collect();

        let sender = Arc::new(ScriptedSender::new(&[]).with_delay(20));
        let p = DispatchPass::new(
            sender.clone(),
            LureRenderer::new("https://awareness.example.com"),
            3,
        );

        let summary = p.run(&mut c, &indices).await.unwrap();
        assert_eq!(summary.succeeded.len(), 8);
        assert!(sender.max_in_flight.load(Ordering::SeqCst) <= 3);
    }
}
