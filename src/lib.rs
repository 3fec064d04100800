pub mod auth;
pub mod cache;
pub mod error;
pub mod github;
pub mod models;
pub mod openapi;
pub mod reconcile;
pub mod repo;
pub mod routes;
pub mod security;
pub mod summary;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
