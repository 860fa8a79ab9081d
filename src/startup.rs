//! Client assembly.
//!
//! Builds the session store, HTTP transport, metrics and gateway described
//! by the configuration and wires them into an [`ApiClient`].

use std::sync::Arc;

use tracing::info;

use crate::client::ApiClient;
use crate::config::ConfigV1;
use crate::gateway::{Gateway, ReqwestTransport};
use crate::metrics::Metrics;
use crate::store::create_store;

/// Initializes the gateway and API client for one session.
///
/// # Errors
///
/// Returns an error if the HTTP client or the metrics registry cannot be built.
pub fn build_client(config: &ConfigV1) -> Result<ApiClient, String> {
    let store = create_store(&config.session.store);
    let transport = Arc::new(ReqwestTransport::new(&config.api)?);
    let metrics = Metrics::new().map_err(|e| format!("Failed to create metrics: {}", e))?;

    info!("Using API at {}", config.api.base_url);
    let gateway = Arc::new(Gateway::new(config, transport, store, metrics));

    Ok(ApiClient::new(gateway, config))
}
