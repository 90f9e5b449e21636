//! Common types for PhishNet

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for targets (stable across dispatch attempts)
pub type TargetId = Uuid;

/// Unique identifier for tracking events
pub type EventId = Uuid;

/// Unique identifier for campaign owners
pub type OwnerId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Parse an email address from a string, normalizing to lower-case
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        let parts: Vec<&str> = trimmed.splitn(2, '@').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            Some(Self {
                local: parts[0].to_lowercase(),
                domain: parts[1].to_lowercase(),
            })
        } else {
            None
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid email address".to_string()))
    }
}

/// Opaque per-target tracking token.
///
/// Embedded in outbound links and pixels and used to correlate inbound
/// events back to a single target. A fresh token is drawn from the process
/// entropy source on every dispatch attempt; it carries no relationship to
/// the target identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingToken(Uuid);

impl TrackingToken {
    /// Generate a fresh random token (122 bits of entropy)
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TrackingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TrackingToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Partial,
    Completed,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Active => write!(f, "active"),
            CampaignStatus::Partial => write!(f, "partial"),
            CampaignStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "active" => Ok(CampaignStatus::Active),
            "partial" => Ok(CampaignStatus::Partial),
            "completed" => Ok(CampaignStatus::Completed),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Per-target dispatch/interaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Pending,
    Sent,
    Clicked,
    Submitted,
    Failed,
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetStatus::Pending => write!(f, "pending"),
            TargetStatus::Sent => write!(f, "sent"),
            TargetStatus::Clicked => write!(f, "clicked"),
            TargetStatus::Submitted => write!(f, "submitted"),
            TargetStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TargetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TargetStatus::Pending),
            "sent" => Ok(TargetStatus::Sent),
            "clicked" => Ok(TargetStatus::Clicked),
            "submitted" => Ok(TargetStatus::Submitted),
            "failed" => Ok(TargetStatus::Failed),
            _ => Err(format!("Invalid target status: {}", s)),
        }
    }
}

/// Kind of tracked interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Click,
    Submit,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Click => write!(f, "click"),
            EventKind::Submit => write!(f, "submit"),
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "click" => Ok(EventKind::Click),
            "submit" => Ok(EventKind::Submit),
            _ => Err(format!("Invalid event kind: {}", s)),
        }
    }
}

/// Tone of a lure template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateTone {
    Urgent,
    Corporate,
    Reward,
    Alert,
}

impl Default for TemplateTone {
    fn default() -> Self {
        TemplateTone::Urgent
    }
}

impl std::fmt::Display for TemplateTone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateTone::Urgent => write!(f, "urgent"),
            TemplateTone::Corporate => write!(f, "corporate"),
            TemplateTone::Reward => write!(f, "reward"),
            TemplateTone::Alert => write!(f, "alert"),
        }
    }
}

impl std::str::FromStr for TemplateTone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "urgent" => Ok(TemplateTone::Urgent),
            "corporate" => Ok(TemplateTone::Corporate),
            "reward" => Ok(TemplateTone::Reward),
            "alert" => Ok(TemplateTone::Alert),
            _ => Err(format!("Invalid template tone: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_email_address_parse() {
        let email = EmailAddress::parse("User@Example.COM").unwrap();
        assert_eq!(email.local, "user");
        assert_eq!(email.domain, "example.com");
        assert_eq!(email.to_string(), "user@example.com");
    }

    #[test]
    fn test_email_address_trims_whitespace() {
        let email = EmailAddress::parse("  alice@corp.io ").unwrap();
        assert_eq!(email.to_string(), "alice@corp.io");
    }

    #[test]
    fn test_email_address_invalid() {
        assert!(EmailAddress::parse("invalid").is_none());
        assert!(EmailAddress::parse("@example.com").is_none());
        assert!(EmailAddress::parse("user@").is_none());
    }

    #[test]
    fn test_tracking_token_roundtrip() {
        let token = TrackingToken::generate();
        let parsed: TrackingToken = token.to_string().parse().unwrap();
        assert_eq!(token, parsed);
    }

    #[test]
    fn test_tracking_token_uniqueness() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(TrackingToken::generate()));
        }
    }

    #[test]
    fn test_status_display_roundtrip() {
        for status in [
            TargetStatus::Pending,
            TargetStatus::Sent,
            TargetStatus::Clicked,
            TargetStatus::Submitted,
            TargetStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<TargetStatus>(), Ok(status));
        }
        assert_eq!("partial".parse::<CampaignStatus>(), Ok(CampaignStatus::Partial));
        assert!("sending".parse::<CampaignStatus>().is_err());
    }
}
