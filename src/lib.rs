//! RestGate: a PostgREST-compatible gateway for PostgreSQL
//!
//! Exposes every table of one schema as a REST resource. Query strings and
//! JSON query bodies compile to parameterized SQL; rows come back as JSON
//! with PostgREST response headers.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub use restgate_common as common;
pub use restgate_rest as rest;

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use restgate_common::config::RestGateConfig;
use restgate_common::error::{Error, Result};
use restgate_rest::{PgBackend, RestEngine, RestServer};

/// Load configuration from a TOML file, falling back to defaults when it is absent
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<RestGateConfig> {
    if !path.exists() {
        info!("Using default configuration");
        return Ok(RestGateConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::ConfigError(format!("{}: {e}", path.display())))
}

/// Main RestGate server
pub struct RestGateServer {
    config: RestGateConfig,
    backend: PgBackend,
    rest_server: Arc<RestServer>,
}

impl RestGateServer {
    /// Connect to the database, load the schema catalog and build the REST server
    ///
    /// # Errors
    /// Returns an error if the database is unreachable or the catalog cannot be loaded.
    pub async fn new(config: RestGateConfig) -> Result<Self> {
        info!("Initializing RestGate");

        let backend = PgBackend::connect(&config.database).await?;
        let catalog = backend
            .catalog_loader()
            .load(&config.rest.schema)
            .await?;

        if catalog.is_empty() {
            tracing::warn!(schema = %config.rest.schema, "No tables found in exposed schema");
        }

        let engine = RestEngine::new(Arc::new(catalog), Arc::new(backend.clone()), &config.rest);
        let rest_server = Arc::new(RestServer::new(&config.rest, &config.pagination, engine));

        Ok(Self {
            config,
            backend,
            rest_server,
        })
    }

    /// Get reference to the REST server
    #[must_use]
    pub fn rest(&self) -> &RestServer {
        &self.rest_server
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RestGateConfig {
        &self.config
    }

    /// Serve until the HTTP server stops
    ///
    /// # Errors
    /// Returns an error if the REST server fails to start.
    pub async fn run(&self) -> Result<()> {
        info!(
            "RestGate listening on {}:{}",
            self.config.rest.host, self.config.rest.port
        );
        self.rest_server.run().await
    }

    /// Close the connection pool
    pub async fn shutdown(&self) {
        info!("Shutting down RestGate");
        self.backend.pool().close().await;
    }
}
