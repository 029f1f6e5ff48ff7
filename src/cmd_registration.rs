//! Registration subcommand handlers for tokensync.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use tokensync_config::{Config, ConfigValidator};
use tokensync_push::{DevicePushToken, PushResult, PushTokenUpdater, RegistrationDescriptor, UpdateOutcome};

use crate::cli::Commands;

/// Handle registration subcommands.
pub(crate) async fn handle_registration_command(
    command: Commands,
    updater: Arc<PushTokenUpdater>,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Register { token_type, data } => {
            let token = DevicePushToken::new(token_type, data);
            let outcome = run_interruptible(&updater, updater.update_push_token(token)).await?;
            report_outcome(outcome)
        }
        Commands::Token { token_type, data } => {
            let token = DevicePushToken::new(token_type, data);
            let outcome = run_interruptible(&updater, updater.handle_new_token(token)).await?;
            report_outcome(outcome)
        }
        Commands::Resume => {
            match run_interruptible(&updater, updater.resume_pending()).await? {
                Some(outcome) => report_outcome(outcome),
                None => {
                    println!("No pending push token");
                    Ok(())
                }
            }
        }
        Commands::Init { url, body } => init_descriptor(&updater, &url, &body).await,
        Commands::Auto { state } => {
            updater.set_auto_registration_enabled(state.enabled()).await?;
            println!(
                "Automatic registration {}",
                if state.enabled() { "enabled" } else { "disabled" }
            );
            Ok(())
        }
        Commands::Status => show_status(&updater).await,
        Commands::Validate => Ok(()),
    }
}

/// Print validation errors and warnings; fails when the config has errors.
pub(crate) fn validate_config(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let result = ConfigValidator::validate(config)?;

    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }

    match result.into_error() {
        Some(err) => Err(Box::new(err)),
        None => {
            println!("Configuration is valid");
            Ok(())
        }
    }
}

/// Drive `update` to completion, interrupting updates on Ctrl-C.
async fn run_interruptible<T>(
    updater: &Arc<PushTokenUpdater>,
    update: impl Future<Output = PushResult<T>>,
) -> PushResult<T> {
    let interrupter = updater.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping push token registration");
            interrupter.interrupt_push_token_updates();
        }
    });

    let result = update.await;
    ctrl_c.abort();
    result
}

fn report_outcome(outcome: UpdateOutcome) -> Result<(), Box<dyn std::error::Error>> {
    match outcome {
        UpdateOutcome::Registered => println!("Push token registered"),
        UpdateOutcome::NothingToRegister => {
            println!("No registration server configured, run `tokensync init` first")
        }
        UpdateOutcome::Disabled => println!("Automatic registration is off, token ignored"),
        UpdateOutcome::Interrupted => {
            println!("Registration interrupted, token stays pending (run `tokensync resume`)")
        }
        UpdateOutcome::GaveUp { attempts } => {
            return Err(format!(
                "Registration failed after {} attempts, token stays pending",
                attempts
            )
            .into());
        }
    }
    Ok(())
}

async fn init_descriptor(
    updater: &PushTokenUpdater,
    url: &str,
    body: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = Url::parse(url)?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(format!("Registration URL must use http or https, got '{}'", parsed.scheme()).into());
    }

    let body = match serde_json::from_str::<Value>(body)? {
        Value::Object(body) => body,
        _ => return Err("Request body must be a JSON object".into()),
    };

    updater
        .set_registration_descriptor(RegistrationDescriptor::new(url, body))
        .await?;

    info!("Registration server set to {}", parsed);
    println!("Registration server set to {}", parsed);
    Ok(())
}

async fn show_status(updater: &PushTokenUpdater) -> Result<(), Box<dyn std::error::Error>> {
    match updater.registration_info().await? {
        Some(info) => println!("{}", serde_json::to_string_pretty(&info)?),
        None => println!("No registration info stored"),
    }
    Ok(())
}
