use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::metrics::{HealthStatus, Metrics, MetricsCollector};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub metrics: Metrics,
    pub health_status: String,
}

pub struct HealthChecker {
    metrics: Arc<MetricsCollector>,
    config: Config,
    start_time: std::time::Instant,
}

impl HealthChecker {
    pub fn new(metrics: Arc<MetricsCollector>, config: Config) -> Self {
        Self { metrics, config, start_time: std::time::Instant::now() }
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn get_health(&self) -> HealthResponse {
        HealthResponse {
            status: self.metrics.get_health_status().to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn get_metrics(&self) -> MetricsResponse {
        MetricsResponse {
            metrics: self.metrics.get_metrics(),
            health_status: self.metrics.get_health_status().to_string(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.metrics.get_health_status(), HealthStatus::Healthy)
    }

    pub fn get_detailed_status(&self) -> DetailedStatus {
        let metrics = self.metrics.get_metrics();

        DetailedStatus {
            health: self.metrics.get_health_status().to_string(),
            uptime_seconds: metrics.uptime_seconds,
            total_attempts: metrics.total_attempts,
            confirmed: metrics.confirmed,
            broadcast_mismatches: metrics.broadcast_mismatches,
            failed_attempts: metrics.failed_attempts,
            confirmation_rate: if metrics.total_attempts > 0 {
                metrics.confirmed as f64 / metrics.total_attempts as f64
            } else {
                0.0
            },
            average_mining_ms: metrics.average_mining_ms,
            hashes_per_second: metrics.hashes_per_second,
            consecutive_failures: metrics.consecutive_failures,
            error_counts: ErrorCounts {
                validation_errors: metrics.validation_errors,
                funds_errors: metrics.funds_errors,
                mining_timeouts: metrics.mining_timeouts,
                signer_errors: metrics.signer_errors,
                rpc_errors: metrics.rpc_errors,
            },
            config_summary: ConfigSummary {
                entry_address: self.config.entry_address.clone(),
                ledger_api_url: self.config.ledger_api_url.clone(),
                signer_url: self.config.signer_url.clone(),
                required_prefix: self.config.required_prefix.clone(),
                max_iterations: self.config.max_iterations,
                mining_workers: self.config.mining_workers,
                max_retries: self.config.max_retries,
            },
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetailedStatus {
    pub health: String,
    pub uptime_seconds: u64,
    pub total_attempts: u64,
    pub confirmed: u64,
    pub broadcast_mismatches: u64,
    pub failed_attempts: u64,
    pub confirmation_rate: f64,
    pub average_mining_ms: f64,
    pub hashes_per_second: f64,
    pub consecutive_failures: u32,
    pub error_counts: ErrorCounts,
    pub config_summary: ConfigSummary,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorCounts {
    pub validation_errors: u64,
    pub funds_errors: u64,
    pub mining_timeouts: u64,
    pub signer_errors: u64,
    pub rpc_errors: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub entry_address: String,
    pub ledger_api_url: String,
    pub signer_url: String,
    pub required_prefix: String,
    pub max_iterations: u64,
    pub mining_workers: usize,
    pub max_retries: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::AttemptOutcome;

    #[test]
    fn detailed_status_reflects_outcomes() {
        let metrics = Arc::new(MetricsCollector::new());
        let checker = HealthChecker::new(metrics.clone(), Config::default());
        assert!(checker.is_healthy());

        metrics.record_attempt(AttemptOutcome::Confirmed);
        metrics.record_attempt(AttemptOutcome::BroadcastMismatch);
        let status = checker.get_detailed_status();
        assert_eq!(status.total_attempts, 2);
        assert_eq!(status.confirmed, 1);
        assert_eq!(status.broadcast_mismatches, 1);
        assert_eq!(status.confirmation_rate, 0.5);
        assert_eq!(status.config_summary.required_prefix, "97b4");

        let health = checker.get_health();
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }
}
