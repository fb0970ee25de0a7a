use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::address::L2Address;
use crate::amount::{self, format_sompi};
use crate::builder::{TransactionBuilder, TransactionTemplate};
use crate::error::{BridgeError, Result};
use crate::ledger::LedgerCodec;
use crate::metrics::{AttemptOutcome, ErrorType, MetricsCollector};
use crate::miner::{MinerConfig, MiningProgress, NonceMiner};
use crate::prng::NonceSource;
use crate::rpc::{LedgerQuery, TransactionSigner};
use crate::types::{BridgeParams, IdPrefix, MiningResult, SignerResponse, TransactionId, TransactionRequest};

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub entry_address: String,
    pub required_prefix: IdPrefix,
    pub min_amount_sompi: u64,
    pub fee_sompi: u64,
    pub max_iterations: u64,
    pub progress_interval: u64,
    pub workers: usize,
}

impl BridgeSettings {
    fn miner_config(&self) -> MinerConfig {
        MinerConfig {
            required_prefix: self.required_prefix.clone(),
            max_iterations: self.max_iterations,
            progress_interval: self.progress_interval,
            workers: self.workers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedParams {
    pub amount_sompi: u64,
    pub l2_address: L2Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// Broadcast id carries the required prefix; the sequencer will pick it up.
    Confirmed { mined: MiningResult, broadcast_id: TransactionId },
    /// Funds moved, but the broadcast id lost the prefix.
    BroadcastMismatch { mined: MiningResult, broadcast_id: TransactionId },
}

impl BridgeOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, BridgeOutcome::Confirmed { .. })
    }

    pub fn mined(&self) -> &MiningResult {
        match self {
            BridgeOutcome::Confirmed { mined, .. } | BridgeOutcome::BroadcastMismatch { mined, .. } => mined,
        }
    }

    pub fn broadcast_id(&self) -> TransactionId {
        match self {
            BridgeOutcome::Confirmed { broadcast_id, .. } | BridgeOutcome::BroadcastMismatch { broadcast_id, .. } => {
                *broadcast_id
            }
        }
    }
}

pub fn validate(params: &BridgeParams, min_amount_sompi: u64) -> Result<ValidatedParams> {
    let amount_sompi = amount::parse_coins(&params.amount)?;
    if amount_sompi == 0 {
        return Err(BridgeError::InvalidAmount("amount must be positive".to_string()));
    }
    if amount_sompi < min_amount_sompi {
        return Err(BridgeError::InvalidAmount(format!(
            "{} is below the minimum of {}",
            params.amount,
            format_sompi(min_amount_sompi)
        )));
    }
    let l2_address = L2Address::parse(&params.l2_address)?;
    Ok(ValidatedParams { amount_sompi, l2_address })
}

pub struct Bridge {
    settings: BridgeSettings,
    codec: Arc<dyn LedgerCodec>,
    ledger: Arc<dyn LedgerQuery>,
    signer: Arc<dyn TransactionSigner>,
    metrics: Arc<MetricsCollector>,
    nonce_source: Mutex<NonceSource>,
    progress: Option<Sender<MiningProgress>>,
}

impl Bridge {
    pub fn new(
        settings: BridgeSettings,
        codec: Arc<dyn LedgerCodec>,
        ledger: Arc<dyn LedgerQuery>,
        signer: Arc<dyn TransactionSigner>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            settings,
            codec,
            ledger,
            signer,
            metrics,
            nonce_source: Mutex::new(NonceSource::from_entropy()),
            progress: None,
        }
    }

    pub fn with_nonce_source(mut self, source: NonceSource) -> Self {
        self.nonce_source = Mutex::new(source);
        self
    }

    pub fn with_progress(mut self, tx: Sender<MiningProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub async fn execute(&self, params: &BridgeParams, sender_address: &str) -> Result<BridgeOutcome> {
        let result = self.run(params, sender_address).await;
        match &result {
            Ok(BridgeOutcome::Confirmed { .. }) => self.metrics.record_attempt(AttemptOutcome::Confirmed),
            Ok(BridgeOutcome::BroadcastMismatch { .. }) => {
                self.metrics.record_attempt(AttemptOutcome::BroadcastMismatch)
            }
            Err(e) => {
                self.metrics.record_error(ErrorType::from(e));
                self.metrics.record_attempt(AttemptOutcome::Failed);
                if e.is_retryable() {
                    tracing::warn!(error = %e, "bridge attempt failed, a retry may succeed");
                } else {
                    tracing::error!(error = %e, "bridge attempt failed");
                }
            }
        }
        result
    }

    async fn run(&self, params: &BridgeParams, sender_address: &str) -> Result<BridgeOutcome> {
        // no network interaction before parameters are valid
        let valid = validate(params, self.settings.min_amount_sompi)?;
        tracing::info!(
            amount = %format_sompi(valid.amount_sompi),
            l2_address = %valid.l2_address,
            "starting bridge attempt"
        );

        let utxos = self.ledger.get_utxos(sender_address).await?;
        let template = TransactionBuilder::new(self.codec.as_ref())
            .with_fee_buffer(self.settings.fee_sompi)
            .prepare(
                &utxos,
                sender_address,
                &self.settings.entry_address,
                valid.amount_sompi,
                &valid.l2_address.to_string(),
            )?;
        tracing::debug!(
            inputs = template.inputs.len(),
            change = template.change(),
            fee = template.fee,
            "prepared entry transaction"
        );

        let mined = self.mine(template).await?;

        let request = TransactionRequest::from_mined(&mined);
        let broadcast_id = match self.signer.sign_and_send(&request).await? {
            SignerResponse::Broadcast { transaction_id } => transaction_id,
            SignerResponse::Signed { transaction } => self.ledger.submit(&transaction).await?,
            SignerResponse::Rejected { reason } => return Err(BridgeError::SignerRejected(reason)),
        };

        if !self.settings.required_prefix.matches(&broadcast_id) {
            tracing::warn!(
                mined_id = %mined.transaction_id,
                broadcast_id = %broadcast_id,
                prefix = %self.settings.required_prefix,
                "broadcast id lost the required prefix; the sequencer will not recognize this transfer"
            );
            return Ok(BridgeOutcome::BroadcastMismatch { mined, broadcast_id });
        }
        if broadcast_id != mined.transaction_id {
            tracing::warn!(mined_id = %mined.transaction_id, broadcast_id = %broadcast_id, "signer changed the transaction id");
        }
        tracing::info!(tx_id = %broadcast_id, nonce = mined.nonce, "entry transaction broadcast");
        Ok(BridgeOutcome::Confirmed { mined, broadcast_id })
    }

    async fn mine(&self, template: TransactionTemplate) -> Result<MiningResult> {
        let start_nonce = self
            .nonce_source
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .start_nonce();
        let codec = self.codec.clone();
        let config = self.settings.miner_config();
        let progress = self.progress.clone();

        let t0 = Instant::now();
        let mined = tokio::task::spawn_blocking(move || {
            let mut miner = NonceMiner::new(codec.as_ref(), config);
            if let Some(tx) = progress {
                miner = miner.with_progress(tx);
            }
            miner.mine(&template, start_nonce)
        })
        .await
        .map_err(|e| BridgeError::Internal(format!("mining task failed: {e}")))?;

        let elapsed_ms = t0.elapsed().as_millis() as u64;
        match &mined {
            Ok(found) => self.metrics.record_mining(found.iterations, elapsed_ms),
            Err(BridgeError::MiningTimeout { attempts }) => self.metrics.record_mining(*attempts, elapsed_ms),
            Err(_) => {}
        }
        mined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const L2: &str = "0x5f102e8aff08f647681de13009ab313fdc55fba8";

    #[test]
    fn validates_amount_and_address() {
        let v = validate(&BridgeParams::new("20", L2), 100_000_000).unwrap();
        assert_eq!(v.amount_sompi, 2_000_000_000);
        assert_eq!(v.l2_address.to_string(), L2);
    }

    #[test]
    fn rejects_small_zero_and_garbage_amounts() {
        for amount in ["0", "0.5", "0.0", "-3", "abc", "inf"] {
            assert!(
                matches!(validate(&BridgeParams::new(amount, L2), 100_000_000), Err(BridgeError::InvalidAmount(_))),
                "accepted {amount}"
            );
        }
    }

    #[test]
    fn rejects_bad_address() {
        assert!(matches!(
            validate(&BridgeParams::new("5", "0x1234"), 100_000_000),
            Err(BridgeError::InvalidAddress(_))
        ));
    }
}
