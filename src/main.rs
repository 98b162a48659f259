//! IIIF Server - IIIF Image API server and static tile generator.
//!
//! This binary starts the HTTP server or runs the static generator.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iiif_server::{
    auth::{AccessStore, AccountSigner},
    config::{Cli, Command, ServeConfig, StaticConfig},
    derive::EngineKind,
    server::{create_router, prefix_name, AppState, AuthState, RouterConfig},
    source::{DimensionCache, FilesystemSource, GeneratorSource, ImageSource},
    static_tiles::StaticGenerator,
    version::ApiVersion,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Static(config) => run_static(config),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "iiif_server=debug,tower_http=debug"
    } else {
        "iiif_server=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("IIIF Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Image directory: {}", config.image_dir.display());
    info!(
        "  Tiles: {}x{}, scale factors {}",
        config.tile_width,
        config.tile_height,
        config
            .scale_factors
            .as_ref()
            .map(|f| format!("{:?}", f))
            .unwrap_or_else(|| "auto".to_string())
    );
    if config.auth_secret.is_none() {
        warn!("  No auth secret given, account cookies use a random key");
    }

    let states = match build_states(&config) {
        Ok(states) => states,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if states.is_empty() {
        error!("No handler prefixes to serve");
        return ExitCode::FAILURE;
    }

    let addr = config.bind_address();
    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Handler prefixes:");
    for state in &states {
        info!("    http://{}/{}/", addr, state.prefix);
    }
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let router = create_router(states, build_router_config(&config));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// One handler prefix per (version, engine, auth) combination.
///
/// Auth services exist from 2.1 on; other combinations with auth are skipped.
fn build_states(config: &ServeConfig) -> Result<Vec<AppState>, String> {
    let patterns = config.auth_patterns()?;
    let settings = Arc::new(config.server_settings());
    let dimensions = Arc::new(DimensionCache::new(config.cache_infos));
    let signer = match &config.auth_secret {
        Some(secret) => AccountSigner::new(secret),
        None => AccountSigner::random(),
    };
    let files: Arc<dyn ImageSource> = Arc::new(FilesystemSource::new(&config.image_dir));
    let generated: Arc<dyn ImageSource> = Arc::new(GeneratorSource);

    let mut states = Vec::new();
    for &version in &config.api_versions {
        for &engine in &config.engines {
            for &pattern in &patterns {
                let prefix = prefix_name(version, engine, pattern);
                if pattern.is_some() && version < ApiVersion::V2_1 {
                    warn!(prefix = %prefix, "auth needs API version 2.1 or later, skipping");
                    continue;
                }
                let source = match engine {
                    EngineKind::Gen => generated.clone(),
                    EngineKind::Image | EngineKind::Null => files.clone(),
                };
                let mut state = AppState::new(
                    prefix,
                    version,
                    engine,
                    source,
                    dimensions.clone(),
                    settings.clone(),
                );
                if let Some(pattern) = pattern {
                    let store = AccessStore::new(
                        config.access_cookie_lifetime(),
                        config.access_token_lifetime(),
                    );
                    state = state.with_auth(AuthState::new(version, pattern, store, signer.clone()));
                }
                states.push(state);
            }
        }
    }
    Ok(states)
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new();

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Static Command
// =============================================================================

fn run_static(config: StaticConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let generator = StaticGenerator::new(config.static_options());
    let mut failures = 0;
    for src in &config.sources {
        match generator.generate(src) {
            Ok(report) => info!(
                "{}: {} tiles written, {} skipped",
                report.identifier,
                report.tiles.len(),
                report.skipped
            ),
            Err(e) => {
                error!("Failed to generate tiles for {}: {}", src.display(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        error!("{} of {} source(s) failed", failures, config.sources.len());
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
