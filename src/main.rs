//! tokensync - push token registration
//!
//! Main entry point for the tokensync CLI.

mod cli;
mod cmd_registration;

use std::sync::Arc;

use clap::Parser;
use tracing::{debug, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tokensync_config::{Config, ConfigLoader, ConfigValidator, LoggingSection};
use tokensync_push::{HttpTransport, PushTokenUpdater};
use tokensync_store::FileRegistrationStore;

use cli::{Cli, Commands};
use cmd_registration::{handle_registration_command, validate_config};

fn init_tracing(logging: &LoggingSection) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let file_layer = match logging.resolved_dir() {
        Some(log_dir) => {
            std::fs::create_dir_all(&log_dir)?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("tokensync")
                .filename_suffix("log")
                .max_log_files(30)
                .build(&log_dir)?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // The guard flushes on drop and must outlive every log call.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(())
}

async fn build_updater(config: &Config) -> Result<Arc<PushTokenUpdater>, Box<dyn std::error::Error>> {
    let store = FileRegistrationStore::new(
        config.store.resolved_path(),
        config.registration.installation_id.clone(),
    )
    .await?;
    let transport = HttpTransport::with_timeout(config.http.timeout())?;

    let updater = PushTokenUpdater::new(Arc::new(store), Arc::new(transport))
        .with_retry_options(config.retry.to_options())
        .with_development(config.registration.development);

    Ok(Arc::new(updater))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(&cli.config)?;
    init_tracing(&config.logging)?;
    debug!("Loaded configuration from {}", cli.config.display());

    if let Commands::Validate = cli.command {
        return validate_config(&config);
    }

    let validation = ConfigValidator::validate(&config)?;
    for warning in &validation.warnings {
        warn!("{}: {}", warning.path, warning.message);
    }
    if let Some(err) = validation.into_error() {
        return Err(Box::new(err));
    }

    let updater = build_updater(&config).await?;
    handle_registration_command(cli.command, updater).await
}
