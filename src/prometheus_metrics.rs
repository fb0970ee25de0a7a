use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, gauge::Gauge, histogram::Histogram},
    registry::Registry,
};

use crate::metrics::{AttemptOutcome, ErrorType, Metrics};

#[derive(Debug)]
pub struct PrometheusMetrics {
    registry: Registry,

    // Counters
    attempts: Counter,
    confirmed: Counter,
    broadcast_mismatches: Counter,
    failed: Counter,
    iterations: Counter,
    validation_errors: Counter,
    funds_errors: Counter,
    mining_timeouts: Counter,
    signer_errors: Counter,
    rpc_errors: Counter,

    // Gauges
    uptime_seconds: Gauge,
    consecutive_failures: Gauge,

    // Histograms
    mining_duration_ms: Histogram,
    mining_iterations: Histogram,
    rpc_latency_ms: Histogram,
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let attempts = Counter::default();
        let confirmed = Counter::default();
        let broadcast_mismatches = Counter::default();
        let failed = Counter::default();
        let iterations = Counter::default();
        let validation_errors = Counter::default();
        let funds_errors = Counter::default();
        let mining_timeouts = Counter::default();
        let signer_errors = Counter::default();
        let rpc_errors = Counter::default();

        let uptime_seconds = Gauge::default();
        let consecutive_failures = Gauge::default();

        // ~65k iterations expected for a 4 hex char prefix
        let mining_duration_ms =
            Histogram::new([50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0].into_iter());
        let mining_iterations =
            Histogram::new([1e3, 1e4, 3.2e4, 6.5e4, 1.3e5, 2.6e5, 1e6, 1e7].into_iter());
        let rpc_latency_ms = Histogram::new([5.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0].into_iter());

        registry.register("entry_bridge_attempts", "Bridge attempts started", attempts.clone());
        registry.register("entry_bridge_confirmed", "Attempts broadcast with a matching id", confirmed.clone());
        registry.register(
            "entry_bridge_broadcast_mismatches",
            "Attempts broadcast with an id the sequencer will not recognize",
            broadcast_mismatches.clone(),
        );
        registry.register("entry_bridge_failed", "Attempts that failed before broadcast", failed.clone());
        registry.register("entry_bridge_mining_iterations", "Candidate ids hashed", iterations.clone());
        registry.register("entry_bridge_validation_errors", "Rejected bridge parameters", validation_errors.clone());
        registry.register("entry_bridge_funds_errors", "Insufficient funds errors", funds_errors.clone());
        registry.register("entry_bridge_mining_timeouts", "Nonce searches that hit the bound", mining_timeouts.clone());
        registry.register("entry_bridge_signer_errors", "Signer rejections and failures", signer_errors.clone());
        registry.register("entry_bridge_rpc_errors", "Ledger RPC failures", rpc_errors.clone());
        registry.register("entry_bridge_uptime_seconds", "Process uptime in seconds", uptime_seconds.clone());
        registry.register(
            "entry_bridge_consecutive_failures",
            "Attempts since the last confirmed one",
            consecutive_failures.clone(),
        );
        registry.register("entry_bridge_mining_duration_ms", "Nonce search wall time", mining_duration_ms.clone());
        registry.register(
            "entry_bridge_mining_iterations_per_run",
            "Iterations needed per successful search",
            mining_iterations.clone(),
        );
        registry.register("entry_bridge_rpc_latency_ms", "Ledger API request latency", rpc_latency_ms.clone());

        Self {
            registry,
            attempts,
            confirmed,
            broadcast_mismatches,
            failed,
            iterations,
            validation_errors,
            funds_errors,
            mining_timeouts,
            signer_errors,
            rpc_errors,
            uptime_seconds,
            consecutive_failures,
            mining_duration_ms,
            mining_iterations,
            rpc_latency_ms,
        }
    }

    pub fn update_from_metrics(&self, metrics: &Metrics) {
        self.uptime_seconds.set(metrics.uptime_seconds as i64);
        self.consecutive_failures.set(i64::from(metrics.consecutive_failures));
    }

    pub fn record_attempt(&self, outcome: AttemptOutcome) {
        self.attempts.inc();
        match outcome {
            AttemptOutcome::Confirmed => self.confirmed.inc(),
            AttemptOutcome::BroadcastMismatch => self.broadcast_mismatches.inc(),
            AttemptOutcome::Failed => self.failed.inc(),
        };
    }

    pub fn record_mining(&self, iterations: u64, elapsed_ms: u64) {
        self.iterations.inc_by(iterations);
        self.mining_duration_ms.observe(elapsed_ms as f64);
        self.mining_iterations.observe(iterations as f64);
    }

    pub fn record_error(&self, error_type: ErrorType) {
        match error_type {
            ErrorType::Validation => self.validation_errors.inc(),
            ErrorType::Funds => self.funds_errors.inc(),
            ErrorType::MiningTimeout => self.mining_timeouts.inc(),
            ErrorType::Signer => self.signer_errors.inc(),
            ErrorType::Rpc => self.rpc_errors.inc(),
        };
    }

    pub fn record_rpc_latency(&self, latency_ms: f64) {
        self.rpc_latency_ms.observe(latency_ms);
    }

    pub fn export_metrics(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}
