//! # tokensync Store
//!
//! Key-value persistence of the last registration info of an installation.
//!
//! The stores hold the serialized record as an opaque string; parsing and
//! validating it is the workflow's job, so corrupted content reaches the caller
//! exactly as it was written.

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::{FileRegistrationStore, MemoryRegistrationStore, RegistrationStore};
