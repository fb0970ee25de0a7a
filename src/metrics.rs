use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::prometheus_metrics::PrometheusMetrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    // Bridge outcomes
    pub total_attempts: u64,
    pub confirmed: u64,
    pub broadcast_mismatches: u64,
    pub failed_attempts: u64,

    // Mining
    pub mining_runs: u64,
    pub total_iterations: u64,
    pub average_mining_ms: f64,
    pub min_mining_ms: u64,
    pub max_mining_ms: u64,
    pub hashes_per_second: f64,

    // Errors
    pub validation_errors: u64,
    pub funds_errors: u64,
    pub mining_timeouts: u64,
    pub signer_errors: u64,
    pub rpc_errors: u64,

    // Health
    pub uptime_seconds: u64,
    pub last_confirmed_attempt: Option<u64>,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Confirmed,
    BroadcastMismatch,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Validation,
    Funds,
    MiningTimeout,
    Signer,
    Rpc,
}

impl From<&BridgeError> for ErrorType {
    fn from(e: &BridgeError) -> Self {
        match e {
            BridgeError::InvalidAmount(_) | BridgeError::InvalidAddress(_) | BridgeError::MalformedPayload(_) => {
                ErrorType::Validation
            }
            BridgeError::InsufficientFunds { .. } => ErrorType::Funds,
            BridgeError::MiningTimeout { .. } => ErrorType::MiningTimeout,
            BridgeError::SignerRejected(_) | BridgeError::Signer(_) | BridgeError::Serialization(_) => {
                ErrorType::Signer
            }
            BridgeError::RpcUnavailable(_) | BridgeError::LedgerRejected(_) | BridgeError::Internal(_) => {
                ErrorType::Rpc
            }
        }
    }
}

#[derive(Debug)]
pub struct MetricsCollector {
    total_attempts: AtomicU64,
    confirmed: AtomicU64,
    broadcast_mismatches: AtomicU64,
    failed_attempts: AtomicU64,
    consecutive_failures: AtomicU32,

    mining_runs: AtomicU64,
    total_iterations: AtomicU64,
    total_mining_ms: AtomicU64,
    min_mining_ms: AtomicU64,
    max_mining_ms: AtomicU64,

    validation_errors: AtomicU64,
    funds_errors: AtomicU64,
    mining_timeouts: AtomicU64,
    signer_errors: AtomicU64,
    rpc_errors: AtomicU64,

    start_time: Instant,
    last_confirmed: Mutex<Option<Instant>>,
    prometheus: PrometheusMetrics,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            total_attempts: AtomicU64::new(0),
            confirmed: AtomicU64::new(0),
            broadcast_mismatches: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            mining_runs: AtomicU64::new(0),
            total_iterations: AtomicU64::new(0),
            total_mining_ms: AtomicU64::new(0),
            min_mining_ms: AtomicU64::new(u64::MAX),
            max_mining_ms: AtomicU64::new(0),
            validation_errors: AtomicU64::new(0),
            funds_errors: AtomicU64::new(0),
            mining_timeouts: AtomicU64::new(0),
            signer_errors: AtomicU64::new(0),
            rpc_errors: AtomicU64::new(0),
            start_time: Instant::now(),
            last_confirmed: Mutex::new(None),
            prometheus: PrometheusMetrics::new(),
        }
    }

    pub fn prometheus(&self) -> &PrometheusMetrics {
        &self.prometheus
    }

    pub fn record_attempt(&self, outcome: AttemptOutcome) {
        self.total_attempts.fetch_add(1, Ordering::Relaxed);
        match outcome {
            AttemptOutcome::Confirmed => {
                self.confirmed.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.store(0, Ordering::Relaxed);
                if let Ok(mut last) = self.last_confirmed.lock() {
                    *last = Some(Instant::now());
                }
            }
            // funds moved, but the sequencer will not pick it up
            AttemptOutcome::BroadcastMismatch => {
                self.broadcast_mismatches.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
            }
            AttemptOutcome::Failed => {
                self.failed_attempts.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.prometheus.record_attempt(outcome);
    }

    pub fn record_mining(&self, iterations: u64, elapsed_ms: u64) {
        self.mining_runs.fetch_add(1, Ordering::Relaxed);
        self.total_iterations.fetch_add(iterations, Ordering::Relaxed);
        self.total_mining_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        self.min_mining_ms.fetch_min(elapsed_ms, Ordering::Relaxed);
        self.max_mining_ms.fetch_max(elapsed_ms, Ordering::Relaxed);
        self.prometheus.record_mining(iterations, elapsed_ms);
    }

    pub fn record_error(&self, error_type: ErrorType) {
        match error_type {
            ErrorType::Validation => self.validation_errors.fetch_add(1, Ordering::Relaxed),
            ErrorType::Funds => self.funds_errors.fetch_add(1, Ordering::Relaxed),
            ErrorType::MiningTimeout => self.mining_timeouts.fetch_add(1, Ordering::Relaxed),
            ErrorType::Signer => self.signer_errors.fetch_add(1, Ordering::Relaxed),
            ErrorType::Rpc => self.rpc_errors.fetch_add(1, Ordering::Relaxed),
        };
        self.prometheus.record_error(error_type);
    }

    pub fn get_metrics(&self) -> Metrics {
        let mining_runs = self.mining_runs.load(Ordering::Relaxed);
        let total_iterations = self.total_iterations.load(Ordering::Relaxed);
        let total_mining_ms = self.total_mining_ms.load(Ordering::Relaxed);
        let min_mining_ms = self.min_mining_ms.load(Ordering::Relaxed);

        let average_mining_ms = if mining_runs > 0 { total_mining_ms as f64 / mining_runs as f64 } else { 0.0 };
        let hashes_per_second =
            if total_mining_ms > 0 { total_iterations as f64 * 1000.0 / total_mining_ms as f64 } else { 0.0 };

        let last_confirmed_attempt = self
            .last_confirmed
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.duration_since(self.start_time).as_secs()));

        Metrics {
            total_attempts: self.total_attempts.load(Ordering::Relaxed),
            confirmed: self.confirmed.load(Ordering::Relaxed),
            broadcast_mismatches: self.broadcast_mismatches.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            mining_runs,
            total_iterations,
            average_mining_ms,
            min_mining_ms: if min_mining_ms == u64::MAX { 0 } else { min_mining_ms },
            max_mining_ms: self.max_mining_ms.load(Ordering::Relaxed),
            hashes_per_second,
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
            funds_errors: self.funds_errors.load(Ordering::Relaxed),
            mining_timeouts: self.mining_timeouts.load(Ordering::Relaxed),
            signer_errors: self.signer_errors.load(Ordering::Relaxed),
            rpc_errors: self.rpc_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            last_confirmed_attempt,
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }

    pub fn get_health_status(&self) -> HealthStatus {
        let consecutive_failures = self.consecutive_failures.load(Ordering::Relaxed);
        let total = self.total_attempts.load(Ordering::Relaxed);
        let unsuccessful =
            self.failed_attempts.load(Ordering::Relaxed) + self.broadcast_mismatches.load(Ordering::Relaxed);

        let failure_rate = if total > 0 { unsuccessful as f64 / total as f64 } else { 0.0 };

        if consecutive_failures >= 10 {
            HealthStatus::Critical
        } else if consecutive_failures >= 5 || failure_rate > 0.5 {
            HealthStatus::Unhealthy
        } else if consecutive_failures >= 2 || failure_rate > 0.2 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Critical => write!(f, "critical"),
        }
    }
}
