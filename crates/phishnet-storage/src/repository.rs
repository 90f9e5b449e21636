//! Repository layer for data access

pub mod campaigns;
pub mod events;

pub use campaigns::CampaignRepository;
pub use events::EventRepository;
