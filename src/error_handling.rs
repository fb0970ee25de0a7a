use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    state: Mutex<CircuitBreakerState>,
}

#[derive(Debug, Clone)]
enum CircuitBreakerState {
    Closed { failure_count: u32 },
    Open { opened_at: Instant },
    HalfOpen,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            state: Mutex::new(CircuitBreakerState::Closed { failure_count: 0 }),
        }
    }

    pub fn can_execute(&self) -> bool {
        let Ok(mut state) = self.state.lock() else { return false };
        match &*state {
            CircuitBreakerState::Closed { .. } | CircuitBreakerState::HalfOpen => true,
            CircuitBreakerState::Open { opened_at } => {
                if opened_at.elapsed() >= self.recovery_timeout {
                    *state = CircuitBreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = CircuitBreakerState::Closed { failure_count: 0 };
        }
    }

    pub fn record_failure(&self) {
        if let Ok(mut state) = self.state.lock() {
            match &mut *state {
                CircuitBreakerState::Closed { failure_count } => {
                    *failure_count += 1;
                    if *failure_count >= self.failure_threshold {
                        *state = CircuitBreakerState::Open { opened_at: Instant::now() };
                    }
                }
                CircuitBreakerState::Open { .. } => {}
                CircuitBreakerState::HalfOpen => {
                    *state = CircuitBreakerState::Open { opened_at: Instant::now() };
                }
            }
        }
    }

    pub fn get_state(&self) -> String {
        match self.state.lock() {
            Ok(state) => match &*state {
                CircuitBreakerState::Closed { failure_count } => format!("closed (failures: {failure_count})"),
                CircuitBreakerState::Open { opened_at } => format!("open (elapsed: {:?})", opened_at.elapsed()),
                CircuitBreakerState::HalfOpen => "half-open".to_string(),
            },
            Err(_) => "unknown".to_string(),
        }
    }
}

/// Retries ledger RPC calls that fail with `RpcUnavailable`; other errors pass through.
/// Error metrics are recorded once per bridge attempt by the caller, not per retry.
#[derive(Debug)]
pub struct ErrorHandler {
    retry_config: RetryConfig,
    circuit_breaker: CircuitBreaker,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self { retry_config: RetryConfig::default(), circuit_breaker: CircuitBreaker::new(5, Duration::from_secs(60)) }
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn with_circuit_breaker(mut self, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        self.circuit_breaker = CircuitBreaker::new(failure_threshold, recovery_timeout);
        self
    }

    pub async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.circuit_breaker.can_execute() {
            return Err(BridgeError::RpcUnavailable(format!(
                "circuit breaker is {}",
                self.circuit_breaker.get_state()
            )));
        }

        let mut delay = self.retry_config.retry_delay;
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => {
                    self.circuit_breaker.record_success();
                    return Ok(result);
                }
                Err(error @ BridgeError::RpcUnavailable(_)) => {
                    if attempt >= self.retry_config.max_retries {
                        self.circuit_breaker.record_failure();
                        return Err(error);
                    }
                    attempt += 1;
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, %error, "ledger rpc failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = Duration::from_secs_f64(
                        (delay.as_secs_f64() * self.retry_config.backoff_multiplier)
                            .min(self.retry_config.max_retry_delay.as_secs_f64()),
                    );
                }
                Err(other) => return Err(other),
            }
        }
    }

    pub fn get_circuit_breaker_status(&self) -> String {
        self.circuit_breaker.get_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retries(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            retry_delay: Duration::from_millis(1),
            backoff_multiplier: 2.0,
            max_retry_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn retries_unavailable_then_succeeds() {
        let handler = ErrorHandler::new().with_retry_config(fast_retries(3));
        let calls = AtomicU32::new(0);
        let out = handler
            .execute_with_retry(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(BridgeError::RpcUnavailable("down".into()))
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(out, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_other_errors() {
        let handler = ErrorHandler::new().with_retry_config(fast_retries(3));
        let calls = AtomicU32::new(0);
        let out: Result<()> = handler
            .execute_with_retry(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BridgeError::LedgerRejected("insufficient fee".into()))
            })
            .await;
        assert!(matches!(out, Err(BridgeError::LedgerRejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn opens_circuit_after_threshold() {
        let handler = ErrorHandler::new()
            .with_retry_config(fast_retries(0))
            .with_circuit_breaker(2, Duration::from_secs(60));
        for _ in 0..2 {
            let _: Result<()> =
                handler.execute_with_retry(|| async { Err(BridgeError::RpcUnavailable("down".into())) }).await;
        }
        assert!(handler.get_circuit_breaker_status().starts_with("open"));
        let out: Result<()> = handler.execute_with_retry(|| async { Ok(()) }).await;
        assert!(matches!(out, Err(BridgeError::RpcUnavailable(msg)) if msg.contains("circuit breaker")));
    }
}
