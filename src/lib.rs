// Core modules
pub mod config;
pub mod exchange;
pub mod execution;
pub mod indicators;
pub mod journal;
pub mod market;
pub mod models;
pub mod orchestrator;
pub mod risk;
pub mod signal;
pub mod strategy;

// Re-export commonly used types
pub use exchange::ExchangeGateway;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
