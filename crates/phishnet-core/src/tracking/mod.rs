//! Inbound tracking: token correlation and the event ledger

pub mod correlator;

pub use correlator::{EventContext, EventCorrelator, TrackingError};
