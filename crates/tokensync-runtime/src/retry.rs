//! Pull-driven retry sequences with exponential backoff.
//!
//! A [`Retries`] sequence runs exactly one attempt of its action per call to
//! [`Retries::next`]. The action alone decides whether it wants another go, by
//! calling [`RetryRequest::request`] before it returns; the sequence only owns the
//! timing between attempts. Because the caller drives the pulls, an enclosing
//! [`Epoch`](crate::Epoch) can check for supersession between any two attempts.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub exponential_factor: f64,
    /// Upper bound for a single delay. Unbounded when `None`.
    pub max_delay: Option<Duration>,
    /// Maximum number of attempts, the first one included. Unbounded when `None`.
    pub max_attempts: Option<u32>,
    /// Spread each delay by up to ±10%.
    pub jitter: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            exponential_factor: 2.0,
            max_delay: None,
            max_attempts: None,
            jitter: false,
        }
    }
}

impl RetryOptions {
    /// Delay before the `retry`-th retry (1-based): `initial_delay * factor^(retry - 1)`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_delay.as_millis() as f64 * self.exponential_factor.powi(exponent);
        let delay = if self.jitter {
            delay + rand_jitter(delay * 0.1)
        } else {
            delay
        };

        // No delay exceeds `max_delay`, jitter included.
        let delay_ms = match self.max_delay {
            Some(max) => delay.min(max.as_millis() as f64),
            None => delay,
        };

        // Float to int casts saturate, so an overflowing delay lands on u64::MAX.
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }
}

/// Simple jitter using system time.
fn rand_jitter(max: f64) -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos as f64 / 1_000_000_000.0) * max * 2.0 - max
}

/// Handle given to every attempt. Calling [`request`](Self::request) asks the
/// sequence for another attempt after the backoff delay.
///
/// Each attempt gets a fresh handle, so a late call from an earlier attempt has
/// no effect on later ones.
#[derive(Debug, Clone, Default)]
pub struct RetryRequest {
    requested: Arc<AtomicBool>,
}

impl RetryRequest {
    /// Ask for another attempt.
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Whether another attempt was asked for.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Result of a single pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAttempt<T> {
    /// The attempt asked for a retry; more attempts may follow.
    Pending,
    /// The sequence is over. Holds the value of the last attempt, which is either
    /// a success or the value of an attempt that ran out of retry budget.
    Done(T),
}

impl<T> RetryAttempt<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, RetryAttempt::Done(_))
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            RetryAttempt::Done(value) => Some(value),
            RetryAttempt::Pending => None,
        }
    }
}

/// A sequence of attempts of `action`, pulled one at a time.
///
/// The first attempt runs without delay. When an attempt requests a retry, the
/// pull that ran it also waits out the backoff delay before returning
/// [`RetryAttempt::Pending`]. An attempt returning `Err` ends the sequence and the
/// error is handed to the caller. Once the sequence is over, [`next`](Self::next)
/// returns `None`.
pub struct Retries<F> {
    action: F,
    options: RetryOptions,
    cancel: Option<CancellationToken>,
    attempts: u32,
    finished: bool,
}

impl<F> Retries<F> {
    /// Create a new retry sequence.
    pub fn new(options: RetryOptions, action: F) -> Self {
        Self {
            action,
            options,
            cancel: None,
            attempts: 0,
            finished: false,
        }
    }

    /// Cut backoff delays short when `token` is cancelled. A sequence whose delay
    /// was cut short is finished.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Number of attempts run so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    async fn backoff(&mut self, delay: Duration) {
        match self.cancel.clone() {
            Some(token) => {
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = token.cancelled() => {
                        debug!(attempt = self.attempts, "Backoff cut short by cancellation");
                        self.finished = true;
                    }
                }
            }
            None => sleep(delay).await,
        }
    }
}

impl<F, Fut, T, E> Retries<F>
where
    F: FnMut(RetryRequest) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    /// Run the next attempt.
    pub async fn next(&mut self) -> Option<Result<RetryAttempt<T>, E>> {
        if self.finished {
            return None;
        }

        self.attempts += 1;
        let attempt = self.attempts;
        let request = RetryRequest::default();

        trace!(attempt, "Running attempt");
        let value = match (self.action)(request.clone()).await {
            Ok(value) => value,
            Err(e) => {
                self.finished = true;
                return Some(Err(e));
            }
        };

        if !request.is_requested() {
            self.finished = true;
            return Some(Ok(RetryAttempt::Done(value)));
        }

        if let Some(max) = self.options.max_attempts {
            if attempt >= max {
                debug!(attempt, max_attempts = max, "Retry budget exhausted");
                self.finished = true;
                return Some(Ok(RetryAttempt::Done(value)));
            }
        }

        let delay = self.options.delay_for_retry(attempt);
        debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Retry requested, backing off"
        );
        self.backoff(delay).await;

        Some(Ok(RetryAttempt::Pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn options(initial_ms: u64, factor: f64) -> RetryOptions {
        RetryOptions {
            initial_delay: Duration::from_millis(initial_ms),
            exponential_factor: factor,
            ..Default::default()
        }
    }

    /// Action that requests `retries` retries, then returns `value`.
    fn retrying_action(
        retries: u32,
        value: &'static str,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut(RetryRequest) -> std::future::Ready<Result<&'static str, Infallible>> {
        move |retry| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            if call < retries {
                retry.request();
            }
            std::future::ready(Ok(value))
        }
    }

    #[test]
    fn test_retry_options_default() {
        let options = RetryOptions::default();
        assert_eq!(options.initial_delay, Duration::from_millis(1000));
        assert_eq!(options.exponential_factor, 2.0);
        assert!(options.max_delay.is_none());
        assert!(options.max_attempts.is_none());
        assert!(!options.jitter);
    }

    #[test]
    fn test_delay_calculation() {
        let options = options(100, 2.0);
        assert_eq!(options.delay_for_retry(1), Duration::from_millis(100));
        assert_eq!(options.delay_for_retry(2), Duration::from_millis(200));
        assert_eq!(options.delay_for_retry(3), Duration::from_millis(400));
        assert_eq!(options.delay_for_retry(4), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_calculation_with_max() {
        let options = RetryOptions {
            max_delay: Some(Duration::from_millis(500)),
            ..options(100, 2.0)
        };

        // 100 * 2^3 = 800, but max is 500
        assert_eq!(options.delay_for_retry(4), Duration::from_millis(500));
    }

    #[test]
    fn test_delay_calculation_with_jitter() {
        let options = RetryOptions {
            jitter: true,
            ..options(100, 1.0)
        };

        let delay = options.delay_for_retry(1);
        assert!(delay.as_millis() >= 89 && delay.as_millis() <= 110);
    }

    #[test]
    fn test_jittered_delay_respects_max_delay() {
        let options = RetryOptions {
            jitter: true,
            max_delay: Some(Duration::from_millis(500)),
            ..options(500, 1.0)
        };

        for retry in 1..=50 {
            let delay = options.delay_for_retry(retry);
            assert!(delay <= Duration::from_millis(500), "{delay:?}");
            assert!(delay >= Duration::from_millis(449), "{delay:?}");
        }
    }

    #[test]
    fn test_delay_does_not_overflow() {
        let options = options(1000, 10.0);
        assert_eq!(options.delay_for_retry(1000), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_retry_request() {
        let request = RetryRequest::default();
        assert!(!request.is_requested());
        request.clone().request();
        assert!(request.is_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_n_retries_yield_n_plus_one_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut retries = Retries::new(options(10, 2.0), retrying_action(3, "v", calls.clone()));

        let mut pulls = Vec::new();
        while let Some(pulled) = retries.next().await {
            pulls.push(pulled.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(retries.attempts(), 4);
        assert_eq!(pulls.len(), 4);
        assert!(pulls[..3].iter().all(|p| *p == RetryAttempt::Pending));
        assert_eq!(pulls[3], RetryAttempt::Done("v"));
    }

    #[tokio::test]
    async fn test_no_retry_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut retries = Retries::new(options(10, 2.0), retrying_action(0, "once", calls.clone()));

        let first = retries.next().await.unwrap().unwrap();
        assert_eq!(first, RetryAttempt::Done("once"));
        assert!(retries.is_finished());
        assert!(retries.next().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_growth() {
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let recorded = stamps.clone();
        let mut retries = Retries::new(options(100, 3.0), move |retry: RetryRequest| {
            let mut stamps = recorded.lock().unwrap();
            stamps.push(Instant::now());
            if stamps.len() < 4 {
                retry.request();
            }
            std::future::ready(Ok::<_, Infallible>(()))
        });

        while retries.next().await.is_some() {}

        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 4);
        for k in 1..stamps.len() {
            let gap = (stamps[k] - stamps[k - 1]).as_secs_f64() * 1000.0;
            let expected = 100.0 * 3f64.powi(k as i32 - 1);
            assert!(
                (gap - expected).abs() <= expected * 0.15,
                "gap {k} was {gap}ms, expected ~{expected}ms"
            );
        }
    }

    #[tokio::test]
    async fn test_first_attempt_has_no_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut retries = Retries::new(options(60_000, 2.0), retrying_action(0, "fast", calls));

        let started = std::time::Instant::now();
        retries.next().await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_error_ends_sequence() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let mut retries = Retries::new(options(1, 2.0), move |retry: RetryRequest| {
            counted.fetch_add(1, Ordering::SeqCst);
            // Requesting a retry does not matter once the attempt fails.
            retry.request();
            std::future::ready(Err::<(), _>("boom"))
        });

        let pulled = retries.next().await.unwrap();
        assert_eq!(pulled.unwrap_err(), "boom");
        assert!(retries.next().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts_exhausted_returns_last_value() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let options = RetryOptions {
            max_attempts: Some(3),
            ..options(10, 2.0)
        };
        let mut retries = Retries::new(options, move |retry: RetryRequest| {
            let call = counted.fetch_add(1, Ordering::SeqCst);
            retry.request();
            std::future::ready(Ok::<_, Infallible>(call))
        });

        let mut last = None;
        while let Some(pulled) = retries.next().await {
            last = Some(pulled.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(last, Some(RetryAttempt::Done(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_cuts_backoff_short() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let mut retries = Retries::new(options(60_000, 2.0), retrying_action(u32::MAX, "never", calls.clone()))
            .with_cancellation(token.clone());

        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(5)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let pulled = retries.next().await.unwrap().unwrap();
        assert_eq!(pulled, RetryAttempt::Pending);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(retries.is_finished());
        assert!(retries.next().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_attempt_accessors() {
        assert!(RetryAttempt::Done(1).is_done());
        assert!(!RetryAttempt::<i32>::Pending.is_done());
        assert_eq!(RetryAttempt::Done(7).into_value(), Some(7));
        assert_eq!(RetryAttempt::<i32>::Pending.into_value(), None);
    }
}
