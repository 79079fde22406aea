//! `tokencap serve`

use crate::api::{create_router, AppState};
use crate::cli::ServeArgs;
use crate::config::{GatewayConfig, LogFormat};
use crate::ledger::LedgerStore;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn load_config_with_overrides(args: &ServeArgs) -> Result<GatewayConfig, Box<dyn std::error::Error>> {
    let mut config = if args.config.exists() {
        GatewayConfig::load(Some(&args.config))?
    } else {
        tracing::debug!("config file not found, using defaults");
        GatewayConfig::default()
    };

    config = config.with_env_overrides();

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref host) = args.host {
        config.server.host = host.clone();
    }
    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.clone();
    }

    Ok(config)
}

pub fn init_tracing(config: &crate::config::LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter_str = crate::logging::build_filter_directives(config);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    if config.enable_content_logging {
        eprintln!("WARNING: content logging is enabled; request/response bodies will be logged.");
    }

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

pub async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_with_overrides(&args)?;
    config.validate()?;

    init_tracing(&config.logging)?;
    tracing::info!("starting tokencap gateway");
    tracing::debug!(?config.server, "loaded configuration");

    let ledger = Arc::new(LedgerStore::open(&config.database_path)?);
    let config = Arc::new(config);
    let state = Arc::new(AppState::new(Arc::clone(&config), ledger));
    let app = create_router(Arc::clone(&state));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %addr, "tokencap gateway listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("tokencap gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn cli_overrides_take_precedence_over_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[server]\nport = 8080\nhost = \"0.0.0.0\"").unwrap();

        let args = ServeArgs {
            config: temp.path().to_path_buf(),
            port: Some(9000),
            host: None,
            log_level: None,
        };

        let config = load_config_with_overrides(&args).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let args = ServeArgs {
            config: PathBuf::from("nonexistent-tokencap.toml"),
            port: None,
            host: None,
            log_level: None,
        };
        let config = load_config_with_overrides(&args).unwrap();
        assert_eq!(config.server.port, 8000);
    }
}
