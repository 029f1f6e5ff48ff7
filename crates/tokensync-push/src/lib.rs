//! # tokensync Push
//!
//! Registration of device push tokens with a remote server.
//!
//! The [`PushTokenUpdater`] keeps the installation's registration record in a
//! [`RegistrationStore`](tokensync_store::RegistrationStore), POSTs new tokens
//! through a [`PushTransport`] and retries until the server accepts them.

pub mod error;
pub mod info;
pub mod token;
pub mod transport;
pub mod updater;

pub use error::{PushError, PushResult, TransportError};
pub use info::{RegistrationDescriptor, RegistrationInfo};
pub use token::DevicePushToken;
pub use transport::{HttpTransport, PushTransport, RegistrationRequest, TransportResponse};
pub use updater::{PushTokenUpdater, UpdateOutcome};
