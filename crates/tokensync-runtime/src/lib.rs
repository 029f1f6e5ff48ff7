//! # tokensync Runtime
//!
//! Execution primitives for the push token registration workflow: pull-driven
//! retry sequences with exponential backoff, and interruptible calls where a new
//! invocation supersedes and cancels the previous one.

pub mod interruptible;
pub mod retry;

pub use interruptible::{CallOutcome, Epoch, Interrupted, Interruptible};
pub use retry::{Retries, RetryAttempt, RetryOptions, RetryRequest};
