//! PhishNet Storage - Database persistence layer
//!
//! Campaigns (with their embedded target collections) and the append-only
//! event ledger live in PostgreSQL behind repository structs.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
