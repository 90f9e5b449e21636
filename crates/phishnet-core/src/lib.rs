//! PhishNet Core - Campaign dispatch and event correlation
//!
//! This crate provides the campaign state machine (launch / relaunch with
//! per-target failure isolation), the inbound event correlator, lure
//! drafting and rendering, geolocation, and derived statistics.

pub mod dispatch;
pub mod geo;
pub mod stats;
pub mod template;
pub mod tracking;

pub use dispatch::{
    derive_dispatch_status, CampaignDispatcher, DeliveryError, DispatchError, DispatchSummary,
    FailedRecipient, MailSender, OutboundEmail, SmtpMailSender,
};
pub use geo::{GeoInfo, GeoResolver, IpinfoResolver, NullGeoResolver};
pub use stats::{campaign_stats, recent_events, CampaignStats};
pub use template::{
    fallback_template, AiTemplateProvider, LureRenderer, LureTemplate, TemplateError,
    TemplateProvider,
};
pub use tracking::{EventContext, EventCorrelator, TrackingError};
