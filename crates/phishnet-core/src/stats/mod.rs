//! Statistics aggregation
//!
//! Read-only rollups derived from current target state and the append-only
//! event ledger. Nothing in here mutates anything.

use chrono::{DateTime, Timelike, Utc};
use phishnet_common::types::{CampaignId, EventKind, TargetStatus};
use phishnet_storage::models::{Campaign, Event};
use serde::Serialize;
use std::collections::BTreeMap;

/// Default size of the recent-events view
pub const RECENT_LIMIT: usize = 10;

/// Target counts by status
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub sent: usize,
    pub clicked: usize,
    pub submitted: usize,
    pub failed: usize,
}

/// One entry in the recent-events view
#[derive(Debug, Clone, Serialize)]
pub struct RecentEvent {
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub country: String,
    pub city: String,
    pub device: String,
}

/// Derived campaign statistics
#[derive(Debug, Clone, Serialize)]
pub struct CampaignStats {
    pub campaign_id: CampaignId,
    pub status: String,
    pub total_targets: usize,
    pub counts: StatusCounts,
    /// Raw event totals (repeat clicks included)
    pub click_events: usize,
    pub submit_events: usize,
    /// Distinct targets that clicked / submitted
    pub unique_clicks: usize,
    pub unique_submissions: usize,
    /// Distinct targets over total targets; 0.0 for an empty campaign
    pub click_rate: f64,
    pub submission_rate: f64,
    pub by_country: BTreeMap<String, u64>,
    pub by_device: BTreeMap<String, u64>,
    pub by_hour: [u64; 24],
    pub recent: Vec<RecentEvent>,
}

/// Coarse device class from a user-agent string
pub fn device_class(user_agent: Option<&str>) -> &'static str {
    match user_agent {
        Some(ua) if ua.contains("Mobile") => "Mobile",
        _ => "Desktop",
    }
}

/// Most recent events, newest first
pub fn recent_events(events: &[Event], n: usize) -> Vec<Event> {
    let mut sorted: Vec<Event> = events.to_vec();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted.truncate(n);
    sorted
}

fn rate(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Compute the full statistics rollup for one campaign
pub fn campaign_stats(campaign: &Campaign, events: &[Event]) -> CampaignStats {
    let mut counts = StatusCounts::default();
    for target in campaign.targets.iter() {
        match target.status {
            TargetStatus::Pending => counts.pending += 1,
            TargetStatus::Sent => counts.sent += 1,
            TargetStatus::Clicked => counts.clicked += 1,
            TargetStatus::Submitted => counts.submitted += 1,
            TargetStatus::Failed => counts.failed += 1,
        }
    }

    let total_targets = campaign.targets.len();
    let unique_clicks = campaign
        .targets
        .iter()
        .filter(|t| t.clicked_at.is_some())
        .count();
    let unique_submissions = campaign
        .targets
        .iter()
        .filter(|t| t.submitted_at.is_some())
        .count();

    let mut click_events = 0usize;
    let mut submit_events = 0usize;
    let mut by_country: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_device: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_hour = [0u64; 24];

    for event in events {
        match event.kind_enum() {
            Some(EventKind::Click) => click_events += 1,
            Some(EventKind::Submit) => submit_events += 1,
            None => {}
        }
        *by_country.entry(event.country.clone()).or_default() += 1;
        *by_device
            .entry(device_class(event.user_agent.as_deref()).to_string())
            .or_default() += 1;
        by_hour[event.created_at.hour() as usize] += 1;
    }

    let recent = recent_events(events, RECENT_LIMIT)
        .into_iter()
        .map(|e| RecentEvent {
            device: device_class(e.user_agent.as_deref()).to_string(),
            kind: e.kind,
            timestamp: e.created_at,
            country: e.country,
            city: e.city,
        })
        .collect();

    CampaignStats {
        campaign_id: campaign.id,
        status: campaign.status.clone(),
        total_targets,
        counts,
        click_events,
        submit_events,
        unique_clicks,
        unique_submissions,
        click_rate: rate(unique_clicks, total_targets),
        submission_rate: rate(unique_submissions, total_targets),
        by_country,
        by_device,
        by_hour,
        recent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use phishnet_common::types::{EmailAddress, TrackingToken};
    use phishnet_storage::models::Target;
    use sqlx::types::Json;
    use uuid::Uuid;

    fn campaign(targets: Vec<Target>) -> Campaign {
        let now = Utc::now();
        Campaign {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Awareness".to_string(),
            description: "Scenario".to_string(),
            subject: "Subject".to_string(),
            body: "Body".to_string(),
            tone: "urgent".to_string(),
            status: "active".to_string(),
            targets: Json(targets),
            start_date: now,
            end_date: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn target(email: &str) -> Target {
        Target::new(EmailAddress::parse(email).unwrap(), "Target", None)
    }

    fn event(campaign: &Campaign, kind: &str, hour: u32, country: &str, ua: &str) -> Event {
        Event {
            id: Uuid::new_v4(),
            campaign_id: campaign.id,
            target_id: campaign.targets[0].id,
            kind: kind.to_string(),
            ip: Some("203.0.113.7".to_string()),
            user_agent: Some(ua.to_string()),
            country: country.to_string(),
            region: "Unknown".to_string(),
            city: "Unknown".to_string(),
            latitude: None,
            longitude: None,
            submitted_data: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 14, hour, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_empty_campaign_yields_zero_rates() {
        let c = campaign(vec![]);
        let stats = campaign_stats(&c, &[]);
        assert_eq!(stats.total_targets, 0);
        assert_eq!(stats.click_rate, 0.0);
        assert_eq!(stats.submission_rate, 0.0);
        assert!(stats.recent.is_empty());
    }

    #[test]
    fn test_counts_and_rates() {
        let mut t1 = target("a@x.com");
        let mut t2 = target("b@x.com");
        let mut t3 = target("c@x.com");
        let t4 = target("d@x.com");

        let now = Utc::now();
        t1.mark_sent(TrackingToken::generate(), now);
        t1.record_click(now);
        t2.mark_sent(TrackingToken::generate(), now);
        t2.record_click(now);
        t2.record_submission(now);
        t3.mark_failed(TrackingToken::generate(), "bounced");

        let c = campaign(vec![t1, t2, t3, t4]);
        let stats = campaign_stats(&c, &[]);

        assert_eq!(
            stats.counts,
            StatusCounts {
                pending: 1,
                sent: 0,
                clicked: 1,
                submitted: 1,
                failed: 1,
            }
        );
        assert_eq!(stats.unique_clicks, 2);
        assert_eq!(stats.unique_submissions, 1);
        assert_eq!(stats.click_rate, 0.5);
        assert_eq!(stats.submission_rate, 0.25);
    }

    #[test]
    fn test_event_breakdowns() {
        let c = campaign(vec![target("a@x.com")]);
        let events = vec![
            event(&c, "click", 9, "FI", "Mozilla/5.0 (iPhone) Mobile Safari"),
            event(&c, "click", 9, "FI", "Mozilla/5.0 (X11; Linux x86_64)"),
            event(&c, "submit", 17, "DE", "Mozilla/5.0 (iPhone) Mobile Safari"),
        ];

        let stats = campaign_stats(&c, &events);
        assert_eq!(stats.click_events, 2);
        assert_eq!(stats.submit_events, 1);
        assert_eq!(stats.by_country.get("FI"), Some(&2));
        assert_eq!(stats.by_country.get("DE"), Some(&1));
        assert_eq!(stats.by_device.get("Mobile"), Some(&2));
        assert_eq!(stats.by_device.get("Desktop"), Some(&1));
        assert_eq!(stats.by_hour[9], 2);
        assert_eq!(stats.by_hour[17], 1);
        assert_eq!(stats.by_hour[0], 0);
    }

    #[test]
    fn test_recent_events_newest_first() {
        let c = campaign(vec![target("a@x.com")]);
        let events = vec![
            event(&c, "click", 8, "FI", "ua"),
            event(&c, "submit", 12, "FI", "ua"),
            event(&c, "click", 10, "FI", "ua"),
        ];

        let recent = recent_events(&events, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind, "submit");
        assert_eq!(recent[1].kind, "click");
        assert_eq!(recent[1].created_at.hour(), 10);
    }

    #[test]
    fn test_device_class() {
        assert_eq!(device_class(Some("Mozilla/5.0 (iPhone) Mobile")), "Mobile");
        assert_eq!(device_class(Some("Mozilla/5.0 (X11; Linux)")), "Desktop");
        assert_eq!(device_class(None), "Desktop");
    }
}
