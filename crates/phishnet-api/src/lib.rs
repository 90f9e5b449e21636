//! PhishNet API - REST surface
//!
//! Campaign management and the public tracking endpoints recipients hit.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
