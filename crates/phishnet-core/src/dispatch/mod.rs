//! Campaign dispatch: state machine and delivery boundary

pub mod engine;
pub mod sender;

pub use engine::{
    derive_dispatch_status, CampaignDispatcher, DispatchError, DispatchPass, DispatchSummary,
    FailedRecipient,
};
pub use sender::{DeliveryError, MailSender, OutboundEmail, SmtpMailSender};
