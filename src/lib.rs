pub mod assistant;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod store;
pub mod sweeper;
