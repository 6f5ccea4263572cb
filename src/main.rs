//! modhost server — TCP plugin host
//!
//! Main entry point that wires the plugin host to the TCP server and runs
//! until a shutdown signal arrives.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use modhost_core::config::AppConfig;
use modhost_core::error::AppError;
use modhost_network::{HookEvents, Server};
use modhost_plugin::hooks::definitions::{ON_SERVER_SHUTDOWN, ON_SERVER_START};
use modhost_plugin::loader::ModuleLoader;
use modhost_plugin::{HookArgs, PluginHost, StaticLoader};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from `config/` and the environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("MODHOST_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Static factory table of the plugins linked into this binary
fn static_table() -> StaticLoader {
    let mut table = StaticLoader::new();
    plugin_echo::register(&mut table);
    tracing::debug!(symbols = ?table.symbols(), "Static plugin table built");
    table
}

/// Module loader: shared libraries first, then the static table
#[cfg(feature = "dynamic")]
fn build_loader() -> impl ModuleLoader + 'static {
    modhost_plugin::loader::CompositeLoader::new()
        .with(modhost_plugin::loader::DynamicLoader::new())
        .with(static_table())
}

/// Module loader backed by the static table
#[cfg(not(feature = "dynamic"))]
fn build_loader() -> impl ModuleLoader + 'static {
    static_table()
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting modhost v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Plugin host ──────────────────────────────────────
    let host = Arc::new(PluginHost::from_config(build_loader(), &config.plugins));

    if config.plugins.auto_load {
        let loaded = host.load_directory(&config.plugins.directory).await;
        tracing::info!(
            "Loaded {} plugin(s) from '{}'",
            loaded,
            config.plugins.directory
        );
    } else {
        tracing::info!("Plugin auto-load disabled");
    }

    // ── Step 2: TCP server ───────────────────────────────────────
    tracing::info!("Starting TCP server on {}...", config.server.bind_address());
    let events = Arc::new(HookEvents::for_host(&host));
    let server = Server::from_config(&config.server, events).await?;

    host.call_hook(ON_SERVER_START, &HookArgs::new()).await;
    tracing::info!("modhost listening on {}", server.local_addr());

    // ── Step 3: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");

    host.call_hook(ON_SERVER_SHUTDOWN, &HookArgs::new()).await;
    server.close().await;
    host.unload_all().await;

    tracing::info!("modhost shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
