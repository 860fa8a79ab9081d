//! Library exports for ffund-gateway, shared between the binary and tests.

pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod models;
pub mod startup;
pub mod store;
pub mod utils;

pub use client::ApiClient;
pub use error::{ApiFailure, GatewayError};
pub use gateway::Gateway;
