//! Database models

use chrono::{DateTime, Utc};
use phishnet_common::types::{
    CampaignId, CampaignStatus, EmailAddress, EventId, EventKind, OwnerId, TargetId, TargetStatus,
    TemplateTone, TrackingToken,
};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// Campaign model
///
/// Targets are embedded in the campaign row as an ordered JSONB collection:
/// they are owned exclusively by the campaign and the whole collection is
/// written back in one statement after a dispatch pass, so readers never
/// observe a half-updated target list.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub owner_id: OwnerId,
    pub name: String,
    pub description: String,
    pub subject: String,
    pub body: String,
    pub tone: String,
    pub status: String,
    pub targets: Json<Vec<Target>>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }

    /// Get template tone enum
    pub fn tone_enum(&self) -> Option<TemplateTone> {
        self.tone.parse().ok()
    }

    /// Number of targets currently in the given status
    pub fn count_by_status(&self, status: TargetStatus) -> usize {
        self.targets.iter().filter(|t| t.status == status).count()
    }

    /// Whether any target is still in the given status
    pub fn has_status(&self, status: TargetStatus) -> bool {
        self.targets.iter().any(|t| t.status == status)
    }
}

/// One intended recipient of a campaign and their tracked outcome.
///
/// Embedded in the parent campaign row; the id stays stable across dispatch
/// attempts and is what event rows reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub department: Option<String>,
    pub status: TargetStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub tracking_id: Option<TrackingToken>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clicked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl Target {
    /// Create a pending target from a parsed (normalized) address
    pub fn new(email: EmailAddress, name: impl Into<String>, department: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            email: email.to_string(),
            name: name.into(),
            department,
            status: TargetStatus::Pending,
            error: None,
            tracking_id: None,
            sent_at: None,
            clicked_at: None,
            submitted_at: None,
        }
    }

    /// Record a successful dispatch attempt.
    ///
    /// The token was assigned for this attempt; any previously assigned
    /// token stops resolving from here on.
    pub fn mark_sent(&mut self, token: TrackingToken, at: DateTime<Utc>) {
        self.status = TargetStatus::Sent;
        self.tracking_id = Some(token);
        self.error = None;
        self.sent_at.get_or_insert(at);
    }

    /// Record a failed dispatch attempt.
    ///
    /// The token is kept: the attempt assigned it, and a late click on the
    /// delivered-then-bounced mail must still correlate to this target.
    pub fn mark_failed(&mut self, token: TrackingToken, reason: impl Into<String>) {
        self.status = TargetStatus::Failed;
        self.tracking_id = Some(token);
        self.error = Some(reason.into());
    }

    /// Advance on a click event. Returns whether the status changed.
    ///
    /// Only sent targets advance; clicked/submitted targets stay where they
    /// are (the event itself is still appended by the caller).
    pub fn record_click(&mut self, at: DateTime<Utc>) -> bool {
        if self.status == TargetStatus::Sent {
            self.status = TargetStatus::Clicked;
            self.clicked_at.get_or_insert(at);
            true
        } else {
            false
        }
    }

    /// Advance on a credential submission. Returns whether the status changed.
    ///
    /// Submission is the terminal signal: it overrides clicked and is never
    /// overridden afterwards.
    pub fn record_submission(&mut self, at: DateTime<Utc>) -> bool {
        if self.status == TargetStatus::Submitted {
            false
        } else {
            self.status = TargetStatus::Submitted;
            self.submitted_at.get_or_insert(at);
            true
        }
    }
}

/// Create campaign input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub owner_id: OwnerId,
    pub name: String,
    pub description: String,
    pub subject: String,
    pub body: String,
    pub tone: TemplateTone,
    pub targets: Vec<Target>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Update campaign input (draft campaigns only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCampaign {
    pub name: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub tone: Option<TemplateTone>,
    pub targets: Option<Vec<Target>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Tracked interaction event.
///
/// Append-only: rows are inserted by the event correlator and never updated
/// or deleted. All statistics derive from this ledger plus target state.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub campaign_id: CampaignId,
    pub target_id: TargetId,
    pub kind: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub country: String,
    pub region: String,
    pub city: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Captured credential payload, stored verbatim for the training
    /// report; only present for submit events.
    pub submitted_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Get kind enum
    pub fn kind_enum(&self) -> Option<EventKind> {
        self.kind.parse().ok()
    }
}

/// Create event input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEvent {
    pub campaign_id: CampaignId,
    pub target_id: TargetId,
    pub kind: EventKind,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub country: String,
    pub region: String,
    pub city: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub submitted_data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn target() -> Target {
        Target::new(
            EmailAddress::parse("Alice@Example.com").unwrap(),
            "Alice",
            Some("Finance".to_string()),
        )
    }

    #[test]
    fn test_new_target_is_pending_and_normalized() {
        let t = target();
        assert_eq!(t.email, "alice@example.com");
        assert_eq!(t.status, TargetStatus::Pending);
        assert!(t.tracking_id.is_none());
        assert!(t.error.is_none());
    }

    #[test]
    fn test_mark_failed_then_sent_clears_error() {
        let mut t = target();
        let first = TrackingToken::generate();
        t.mark_failed(first, "mailbox unavailable");
        assert_eq!(t.status, TargetStatus::Failed);
        assert_eq!(t.error.as_deref(), Some("mailbox unavailable"));
        assert_eq!(t.tracking_id, Some(first));

        let second = TrackingToken::generate();
        t.mark_sent(second, Utc::now());
        assert_eq!(t.status, TargetStatus::Sent);
        assert!(t.error.is_none());
        assert_eq!(t.tracking_id, Some(second));
        assert!(t.sent_at.is_some());
    }

    #[test]
    fn test_click_advances_only_from_sent() {
        let mut t = target();
        assert!(!t.record_click(Utc::now()));
        assert_eq!(t.status, TargetStatus::Pending);

        t.mark_sent(TrackingToken::generate(), Utc::now());
        assert!(t.record_click(Utc::now()));
        assert_eq!(t.status, TargetStatus::Clicked);
        let first_click = t.clicked_at;

        // repeated clicks neither regress nor re-stamp
        assert!(!t.record_click(Utc::now()));
        assert_eq!(t.status, TargetStatus::Clicked);
        assert_eq!(t.clicked_at, first_click);
    }

    #[test]
    fn test_submission_is_terminal() {
        let mut t = target();
        t.mark_sent(TrackingToken::generate(), Utc::now());
        assert!(t.record_submission(Utc::now()));
        assert_eq!(t.status, TargetStatus::Submitted);
        let stamp = t.submitted_at;

        assert!(!t.record_click(Utc::now()));
        assert_eq!(t.status, TargetStatus::Submitted);
        assert!(!t.record_submission(Utc::now()));
        assert_eq!(t.submitted_at, stamp);
    }

    #[test]
    fn test_target_serde_roundtrip() {
        let mut t = target();
        t.mark_sent(TrackingToken::generate(), Utc::now());
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["status"], "sent");
        let back: Target = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }
}
