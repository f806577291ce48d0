//! # Formdesk Service
//!
//! Binary entry point for the Formdesk HTTP service.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Wires the filesystem template store and HTTP ticket transport
//! - Starts the HTTP server from formdesk-api

use anyhow::Context;
use formdesk_api::{start_server, LoggingConfig, ServiceConfig, ServiceError};
use formdesk_core::{
    Dispatcher, EntryPipeline, FilesystemTemplateStore, HandshakeVerifier, HttpTicketTransport,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -------------------------------------------------------------------------
    // Load configuration
    //
    // Sources (applied in order, later sources override earlier ones):
    //  1. /etc/formdesk/service.yaml        system-wide defaults
    //  2. ./config/service.yaml             deployment-local override
    //  3. Path given by FORMDESK_CONFIG_FILE
    //  4. Environment variables prefixed FORMDESK__ (double-underscore separator)
    //     e.g. FORMDESK__SERVER__PORT=9090 sets server.port = 9090
    //
    // Absent files are fine; a malformed file or an environment value of the
    // wrong type is a hard error.
    // -------------------------------------------------------------------------
    let service_config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            init_logging(&LoggingConfig::default());
            error!(error = %format!("{e:#}"), "Failed to load configuration; aborting");
            std::process::exit(3);
        }
    };

    init_logging(&service_config.logging);
    info!("Starting Formdesk Service");

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    let pipeline = match build_pipeline(&service_config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Failed to build entry pipeline; aborting");
            std::process::exit(3);
        }
    };

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        endpoint = %service_config.webhook.endpoint_path,
        templates = %service_config.templates.directory.display(),
        ticketing = %service_config.ticketing.base_url,
        "Starting HTTP server"
    );

    if let Err(e) = start_server(service_config, pipeline).await {
        error!("Failed to start server: {}", e);
        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };
        std::process::exit(exit_code);
    }

    Ok(())
}

// ============================================================================
// Private helpers
// ============================================================================

fn load_config() -> anyhow::Result<ServiceConfig> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/formdesk/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Ok(explicit_path) = std::env::var("FORMDESK_CONFIG_FILE") {
        if !explicit_path.is_empty() {
            builder = builder.add_source(
                config::File::with_name(&explicit_path)
                    .required(true)
                    .format(config::FileFormat::Yaml),
            );
        }
    }

    builder
        .add_source(config::Environment::with_prefix("FORMDESK").separator("__"))
        .build()
        .context("could not read configuration sources")?
        .try_deserialize()
        .context("could not deserialize service configuration")
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (json_layer, text_layer) = if logging.json_format {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

fn build_pipeline(config: &ServiceConfig) -> anyhow::Result<EntryPipeline> {
    let base_url = config.ticketing.base_url()?;
    let mut transport = HttpTicketTransport::new(base_url, config.ticketing.timeout())
        .context("could not create ticketing transport")?;
    if let Some((header, key)) = config.ticketing.api_key() {
        transport = transport.with_api_key(header, key);
    }
    info!(base_url = %transport.base_url(), "Ticketing transport ready");

    let store = FilesystemTemplateStore::new(config.templates.directory.clone());
    if !store.directory().is_dir() {
        warn!(
            directory = %store.directory().display(),
            "Template directory does not exist; every entry will be answered with 404"
        );
    }

    Ok(EntryPipeline::new(
        HandshakeVerifier::new(config.webhook.handshake_key.clone()),
        Arc::new(store),
        Dispatcher::new(Arc::new(transport)),
    ))
}
