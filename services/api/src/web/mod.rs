pub mod auth;
pub mod extract;
pub mod favorites;
pub mod middleware;
pub mod poems;
pub mod progress;
pub mod readings;
pub mod response;
pub mod rest;
pub mod router;
pub mod state;
pub mod students;
pub mod validation;
pub mod views;

// Re-export the router builder and state so binaries and tests only need `web::`.
pub use router::build_router;
pub use state::AppState;
