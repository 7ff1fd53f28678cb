pub mod config;
pub mod constants;
pub mod error;
pub mod notification;
pub mod observability;
pub mod pipeline;
pub mod types;

// Layered boundaries for application and infrastructure
pub mod app;
pub mod infra;
