//! Push token registration workflow.
//!
//! An update reads the persisted registration info, marks the token as pending,
//! POSTs it to the registration server until the server accepts it, and finally
//! clears the pending marker. Every update supersedes the one before it: the
//! older update stops at its next suspension point and its in-flight request is
//! aborted.

use std::sync::Arc;
use tokensync_runtime::{CallOutcome, Epoch, Interruptible, Retries, RetryAttempt, RetryOptions, RetryRequest};
use tokensync_store::RegistrationStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{PushResult, TransportError};
use crate::info::{RegistrationDescriptor, RegistrationInfo};
use crate::token::DevicePushToken;
use crate::transport::{PushTransport, RegistrationRequest};

/// How an update ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The server accepted the token and the pending marker was cleared.
    Registered,
    /// No complete registration descriptor is persisted.
    NothingToRegister,
    /// Automatic registration is switched off; the token was ignored.
    Disabled,
    /// A newer update or an explicit interrupt superseded this one.
    Interrupted,
    /// The retry limit was reached without a successful response. The token
    /// stays pending.
    GaveUp { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    Registered,
    Failed,
    Aborted,
}

#[derive(Clone)]
struct UpdateContext {
    store: Arc<dyn RegistrationStore>,
    transport: Arc<dyn PushTransport>,
    retry: RetryOptions,
    development: bool,
}

/// Registers device push tokens with the configured server.
pub struct PushTokenUpdater {
    context: UpdateContext,
    updates: Interruptible,
}

impl PushTokenUpdater {
    pub fn new(store: Arc<dyn RegistrationStore>, transport: Arc<dyn PushTransport>) -> Self {
        Self {
            context: UpdateContext {
                store,
                transport,
                retry: RetryOptions::default(),
                development: false,
            },
            updates: Interruptible::new("push_token_update"),
        }
    }

    pub fn with_retry_options(mut self, retry: RetryOptions) -> Self {
        self.context.retry = retry;
        self
    }

    /// Flag sent along with every registration.
    pub fn with_development(mut self, development: bool) -> Self {
        self.context.development = development;
        self
    }

    /// Whether any update was started on this updater.
    pub fn has_updated(&self) -> bool {
        self.updates.has_been_called()
    }

    /// Register `token`, superseding any update still in flight.
    ///
    /// Network failures and non-2xx responses are retried with backoff. Errors
    /// are only returned for store failures and corrupted persisted state.
    pub async fn update_push_token(&self, token: DevicePushToken) -> PushResult<UpdateOutcome> {
        let context = self.context.clone();
        let outcome = self
            .updates
            .call(move |epoch| run_update(epoch, context, token))
            .await?;

        Ok(match outcome {
            CallOutcome::Completed(outcome) => outcome,
            CallOutcome::Interrupted => {
                debug!("Push token update superseded");
                UpdateOutcome::Interrupted
            }
        })
    }

    /// Stop the update in flight, if any. Its pending token stays persisted.
    pub fn interrupt_push_token_updates(&self) {
        debug!(
            task = self.updates.name(),
            epoch = self.updates.current_epoch(),
            "Interrupting push token updates"
        );
        self.updates.interrupt();
    }

    /// Current persisted registration info.
    pub async fn registration_info(&self) -> PushResult<Option<RegistrationInfo>> {
        match self.context.store.get_last_registration_info().await? {
            Some(raw) => RegistrationInfo::parse(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Retry the registration of a token left pending by an earlier run.
    ///
    /// Returns `None` when no token is pending.
    pub async fn resume_pending(&self) -> PushResult<Option<UpdateOutcome>> {
        let pending = self
            .registration_info()
            .await?
            .and_then(|info| info.pending_device_push_token);

        let Some(token) = pending else {
            debug!("No pending push token to resume");
            return Ok(None);
        };

        info!(token_type = %token.token_type, "Resuming pending push token registration");
        self.update_push_token(token).await.map(Some)
    }

    /// Register a token the platform just issued, if automatic registration is on.
    pub async fn handle_new_token(&self, token: DevicePushToken) -> PushResult<UpdateOutcome> {
        let enabled = self
            .registration_info()
            .await?
            .is_some_and(|info| info.auto_registration_enabled());

        if !enabled {
            debug!("Automatic registration disabled, ignoring new push token");
            return Ok(UpdateOutcome::Disabled);
        }

        self.update_push_token(token).await
    }

    /// Switch automatic registration on or off.
    ///
    /// Interrupts the update in flight before persisting the flag.
    pub async fn set_auto_registration_enabled(&self, enabled: bool) -> PushResult<()> {
        self.interrupt_push_token_updates();

        let mut info = self.registration_info().await?.unwrap_or_default();
        info.is_enabled = Some(enabled);
        self.context
            .store
            .set_last_registration_info(&info.to_json()?)
            .await?;

        info!(enabled, "Automatic push token registration updated");
        Ok(())
    }

    /// Persist the server URL and base body, keeping the rest of the record.
    ///
    /// Interrupts the update in flight, which targets the previous server.
    pub async fn set_registration_descriptor(&self, descriptor: RegistrationDescriptor) -> PushResult<()> {
        self.interrupt_push_token_updates();

        let mut info = self.registration_info().await?.unwrap_or_default();
        info.url = Some(descriptor.url);
        info.body = Some(descriptor.body);
        self.context
            .store
            .set_last_registration_info(&info.to_json()?)
            .await?;

        debug!("Registration descriptor saved");
        Ok(())
    }
}

async fn run_update(
    epoch: Epoch,
    context: UpdateContext,
    token: DevicePushToken,
) -> PushResult<UpdateOutcome> {
    let raw = epoch
        .step(context.store.get_last_registration_info())
        .await??;

    let Some(raw) = raw else {
        debug!("No registration info persisted, nothing to register");
        return Ok(UpdateOutcome::NothingToRegister);
    };

    let info = RegistrationInfo::parse(&raw)
        .inspect_err(|e| error!("Cannot register push token: {}", e))?;

    let Some(descriptor) = info.descriptor() else {
        warn!("Registration info lacks url or body, skipping push token registration");
        return Ok(UpdateOutcome::NothingToRegister);
    };

    let pending = info.with_pending(Some(token.clone()));
    epoch
        .step(context.store.set_last_registration_info(&pending.to_json()?))
        .await??;

    let request = RegistrationRequest {
        url: descriptor.url.clone(),
        body: descriptor.request_body(&token, context.development),
    };

    let (outcome, attempts) = register_with_retries(&epoch, &context, request).await?;

    match outcome {
        AttemptOutcome::Registered => {
            clear_pending(&epoch, &context, info, &token).await?;

            info!(attempts, token_type = %token.token_type, "Push token registered");
            Ok(UpdateOutcome::Registered)
        }
        AttemptOutcome::Failed => {
            warn!(attempts, "Giving up on push token registration, token stays pending");
            Ok(UpdateOutcome::GaveUp { attempts })
        }
        AttemptOutcome::Aborted => Ok(UpdateOutcome::Interrupted),
    }
}

/// Clear the pending marker of `token` in the freshest stored record.
///
/// Writes made while the request was in flight are kept. A pending token that
/// no longer matches `token` is left alone.
async fn clear_pending(
    epoch: &Epoch,
    context: &UpdateContext,
    snapshot: RegistrationInfo,
    token: &DevicePushToken,
) -> PushResult<()> {
    let latest = match epoch
        .step(context.store.get_last_registration_info())
        .await??
    {
        Some(raw) => RegistrationInfo::parse(&raw)
            .inspect_err(|e| error!("Cannot clear pending push token: {}", e))?,
        None => snapshot,
    };

    if latest.pending_device_push_token.as_ref() != Some(token) {
        debug!("Pending push token changed during registration, leaving it in place");
        return Ok(());
    }

    let cleared = latest.with_pending(None);
    epoch
        .step(context.store.set_last_registration_info(&cleared.to_json()?))
        .await??;
    Ok(())
}

async fn register_with_retries(
    epoch: &Epoch,
    context: &UpdateContext,
    request: RegistrationRequest,
) -> PushResult<(AttemptOutcome, u32)> {
    let transport = context.transport.clone();
    let signal = epoch.signal().clone();
    let request = Arc::new(request);

    let mut attempts = Retries::new(context.retry.clone(), move |retry: RetryRequest| {
        let transport = transport.clone();
        let signal = signal.clone();
        let request = request.clone();
        async move {
            let outcome = attempt_registration(transport.as_ref(), &request, &signal, &retry).await;
            PushResult::Ok(outcome)
        }
    })
    .with_cancellation(epoch.signal().clone());

    let mut outcome = AttemptOutcome::Aborted;
    while let Some(pulled) = epoch.step(attempts.next()).await? {
        if let RetryAttempt::Done(last) = pulled? {
            outcome = last;
        }
    }

    Ok((outcome, attempts.attempts()))
}

async fn attempt_registration(
    transport: &dyn PushTransport,
    request: &RegistrationRequest,
    signal: &CancellationToken,
    retry: &RetryRequest,
) -> AttemptOutcome {
    match transport.post(request, signal).await {
        Ok(response) if response.ok() => AttemptOutcome::Registered,
        Ok(response) => {
            warn!(
                status = response.status(),
                body = response.text(),
                "Push token registration rejected by server, retrying"
            );
            retry.request();
            AttemptOutcome::Failed
        }
        Err(TransportError::Aborted) => {
            debug!("Push token registration request aborted");
            AttemptOutcome::Aborted
        }
        Err(_) if signal.is_cancelled() => AttemptOutcome::Aborted,
        Err(e) => {
            debug!(error = %e, "Push token registration request failed, retrying");
            retry.request();
            AttemptOutcome::Failed
        }
    }
}

#[cfg(test)]
#[path = "updater_tests.rs"]
mod tests;
