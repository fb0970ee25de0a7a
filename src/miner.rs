//! Nonce search over the Entry payload until the transaction id carries the required prefix.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::time::Instant;

use crate::builder::TransactionTemplate;
use crate::error::{BridgeError, Result};
use crate::ledger::LedgerCodec;
use crate::types::{IdPrefix, MiningResult};

pub const DEFAULT_MAX_ITERATIONS: u64 = 10_000_000;
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;
const NONCE_SPACE: u64 = 1 << 32;
const PROGRESS_HEAD_BYTES: usize = 4;

#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub required_prefix: IdPrefix,
    pub max_iterations: u64,
    pub progress_interval: u64,
    pub workers: usize,
}

impl MinerConfig {
    pub fn new(required_prefix: IdPrefix) -> Self {
        Self {
            required_prefix,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            workers: 1,
        }
    }

    /// Per-worker iteration budgets. No worker leaves its shard, so each is capped at the shard size.
    fn worker_budgets(&self) -> Vec<u64> {
        let workers = self.workers.max(1) as u64;
        let span = NONCE_SPACE / workers;
        let base = self.max_iterations / workers;
        let remainder = self.max_iterations % workers;
        (0..workers).map(|w| (base + u64::from(w < remainder)).min(span)).collect()
    }

    /// Iterations a search that never matches actually performs.
    pub fn effective_budget(&self) -> u64 {
        self.worker_budgets().iter().sum()
    }
}

/// Emitted every `progress_interval` iterations per worker. Order across workers is unspecified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningProgress {
    pub worker: usize,
    pub iterations: u64,
    pub nonce: u32,
    pub id_head: Vec<u8>,
}

/// One worker's search state. `step` hashes the candidate for the current nonce.
pub struct NonceSearch<'a> {
    template: &'a TransactionTemplate,
    codec: &'a dyn LedgerCodec,
    prefix: &'a IdPrefix,
    nonce: u32,
    iterations: u64,
}

impl<'a> NonceSearch<'a> {
    pub fn new(
        template: &'a TransactionTemplate,
        codec: &'a dyn LedgerCodec,
        prefix: &'a IdPrefix,
        start_nonce: u32,
    ) -> Self {
        Self { template, codec, prefix, nonce: start_nonce, iterations: 0 }
    }

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn step(&mut self) -> std::result::Result<MiningResult, MiningProgress> {
        let transaction = self.template.candidate(self.nonce);
        let transaction_id = self.codec.transaction_id(&transaction);
        self.iterations += 1;

        if self.prefix.matches(&transaction_id) {
            return Ok(MiningResult { transaction, transaction_id, nonce: self.nonce, iterations: self.iterations });
        }

        let miss = MiningProgress {
            worker: 0,
            iterations: self.iterations,
            nonce: self.nonce,
            id_head: transaction_id.head(PROGRESS_HEAD_BYTES),
        };
        self.nonce = self.nonce.wrapping_add(1);
        Err(miss)
    }
}

pub struct NonceMiner<'a> {
    codec: &'a dyn LedgerCodec,
    config: MinerConfig,
    progress: Option<Sender<MiningProgress>>,
}

impl<'a> NonceMiner<'a> {
    pub fn new(codec: &'a dyn LedgerCodec, config: MinerConfig) -> Self {
        Self { codec, config, progress: None }
    }

    pub fn with_progress(mut self, tx: Sender<MiningProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    pub fn mine(&self, template: &TransactionTemplate, start_nonce: u32) -> Result<MiningResult> {
        let t0 = Instant::now();
        let budgets = self.config.worker_budgets();
        let result = if budgets.len() == 1 {
            let found = AtomicBool::new(false);
            let mut search = NonceSearch::new(template, self.codec, &self.config.required_prefix, start_nonce);
            self.run_guarded(0, &mut search, budgets[0], &found, self.progress.clone())?
        } else {
            self.mine_sharded(template, start_nonce, &budgets)?
        };

        match result {
            Some(found) => {
                tracing::info!(
                    nonce = found.nonce,
                    iterations = found.iterations,
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    tx_id = %found.transaction_id,
                    "found matching transaction id"
                );
                Ok(found)
            }
            None => {
                let attempts: u64 = budgets.iter().sum();
                tracing::warn!(attempts, prefix = %self.config.required_prefix, "nonce search exhausted");
                Err(BridgeError::MiningTimeout { attempts })
            }
        }
    }

    /// Disjoint contiguous shards of the nonce space, one scoped thread each.
    fn mine_sharded(
        &self,
        template: &TransactionTemplate,
        start_nonce: u32,
        budgets: &[u64],
    ) -> Result<Option<MiningResult>> {
        let found = AtomicBool::new(false);
        let total = AtomicU64::new(0);
        let span = NONCE_SPACE / budgets.len() as u64;

        let outcomes = std::thread::scope(|scope| {
            let handles: Vec<_> = budgets
                .iter()
                .enumerate()
                .map(|(w, &budget)| {
                    let shard_start = start_nonce.wrapping_add((w as u64 * span) as u32);
                    let progress = self.progress.clone();
                    let (found, total) = (&found, &total);
                    scope.spawn(move || {
                        let mut search =
                            NonceSearch::new(template, self.codec, &self.config.required_prefix, shard_start);
                        let hit = self.run_guarded(w, &mut search, budget, found, progress);
                        total.fetch_add(search.iterations(), Ordering::Relaxed);
                        hit
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|_| Err(BridgeError::Internal("mining worker panicked".to_string()))))
                .collect::<Vec<_>>()
        });

        let mut winner = None;
        for outcome in outcomes {
            let hit = outcome?;
            if winner.is_none() {
                winner = hit;
            }
        }
        Ok(winner.map(|mut r| {
            r.iterations = total.load(Ordering::Relaxed);
            r
        }))
    }

    /// Runs one worker, turning a panic (e.g. in the codec) into `Internal` and stopping the siblings.
    fn run_guarded(
        &self,
        worker: usize,
        search: &mut NonceSearch<'_>,
        budget: u64,
        found: &AtomicBool,
        progress: Option<Sender<MiningProgress>>,
    ) -> Result<Option<MiningResult>> {
        panic::catch_unwind(AssertUnwindSafe(|| self.run_worker(worker, search, budget, found, progress))).map_err(
            |payload| {
                found.store(true, Ordering::Release);
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(worker, %reason, "mining worker panicked");
                BridgeError::Internal(format!("mining worker {worker} panicked: {reason}"))
            },
        )
    }

    fn run_worker(
        &self,
        worker: usize,
        search: &mut NonceSearch<'_>,
        budget: u64,
        found: &AtomicBool,
        progress: Option<Sender<MiningProgress>>,
    ) -> Option<MiningResult> {
        let interval = self.config.progress_interval;
        while search.iterations() < budget {
            if found.load(Ordering::Relaxed) {
                return None;
            }
            match search.step() {
                Ok(result) => {
                    // first finder wins; siblings see the flag and stop
                    if found.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                        return Some(result);
                    }
                    return None;
                }
                Err(mut miss) => {
                    if interval > 0 && miss.iterations % interval == 0 {
                        miss.worker = worker;
                        tracing::debug!(
                            worker,
                            iterations = miss.iterations,
                            head = %hex::encode(&miss.id_head),
                            "mining progress"
                        );
                        if let Some(tx) = &progress {
                            let _ = tx.send(miss);
                        }
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::L2Address;
    use crate::payload;
    use crate::types::{CandidateTransaction, ScriptPublicKey, TransactionId, TxOutput};
    use std::sync::mpsc;

    /// Id starts with 0x97b4 whenever the payload nonce is a multiple of 7.
    struct EveryNth(u32);

    impl LedgerCodec for EveryNth {
        fn script_for_address(&self, _address: &str) -> Result<ScriptPublicKey> {
            Ok(ScriptPublicKey::new(0, vec![]))
        }

        fn transaction_id(&self, tx: &CandidateTransaction) -> TransactionId {
            let nonce = payload::decode(&tx.payload).unwrap().nonce;
            let mut id = [0u8; 32];
            id[..4].copy_from_slice(&nonce.to_be_bytes());
            if nonce % self.0 == 0 {
                id[0] = 0x97;
                id[1] = 0xb4;
            } else {
                id[0] = 0x00;
            }
            TransactionId(id)
        }
    }

    fn template() -> TransactionTemplate {
        TransactionTemplate {
            inputs: vec![],
            outputs: vec![TxOutput { amount: 100, script_public_key: ScriptPublicKey::new(0, vec![]) }],
            l2_address: L2Address::parse("0x5f102e8aff08f647681de13009ab313fdc55fba8").unwrap(),
            amount_sompi: 100,
            total_input: 10_100,
            fee: 10_000,
        }
    }

    fn config(max_iterations: u64) -> MinerConfig {
        MinerConfig {
            required_prefix: IdPrefix::parse("97b4").unwrap(),
            max_iterations,
            progress_interval: 0,
            workers: 1,
        }
    }

    #[test]
    fn finds_on_deterministic_schedule() {
        let codec = EveryNth(7);
        let miner = NonceMiner::new(&codec, config(100));
        let result = miner.mine(&template(), 1).unwrap();
        assert_eq!(result.nonce, 7);
        assert_eq!(result.iterations, 7);
        assert_eq!(result.nonce, 1u32.wrapping_add(result.iterations as u32 - 1));
        assert!(result.transaction_id.to_string().starts_with("97b4"));
        assert_eq!(payload::decode(&result.transaction.payload).unwrap().nonce, 7);
    }

    #[test]
    fn times_out_with_bound() {
        let codec = EveryNth(7);
        let miner = NonceMiner::new(&codec, config(5));
        assert_eq!(miner.mine(&template(), 1).unwrap_err(), BridgeError::MiningTimeout { attempts: 5 });
        assert!(miner.mine(&template(), 1).unwrap_err().is_retryable());
    }

    #[test]
    fn nonce_wraps_around() {
        let codec = EveryNth(1_000_003);
        let tpl = template();
        let prefix = IdPrefix::parse("97b4").unwrap();
        let mut search = NonceSearch::new(&tpl, &codec, &prefix, 0xFFFF_FFFE);
        assert!(search.step().is_err());
        assert!(search.step().is_err());
        assert_eq!(search.nonce(), 0x0000_0000);
        assert_eq!(search.iterations(), 2);
        // 0 % n == 0, so the wrapped nonce matches
        assert_eq!(search.step().unwrap().nonce, 0);
    }

    #[test]
    fn progress_at_fixed_cadence() {
        let codec = EveryNth(7);
        let (tx, rx) = mpsc::channel();
        let mut cfg = config(100);
        cfg.progress_interval = 2;
        let miner = NonceMiner::new(&codec, cfg).with_progress(tx);
        let result = miner.mine(&template(), 8).unwrap();
        assert_eq!(result.nonce, 14);
        drop(miner);

        let events: Vec<MiningProgress> = rx.try_iter().collect();
        let counts: Vec<u64> = events.iter().map(|e| e.iterations).collect();
        assert_eq!(counts, vec![2, 4, 6]);
        assert_eq!(events[0].nonce, 9);
        assert_eq!(events[0].id_head, vec![0x00, 0x00, 0x00, 0x09]);
    }

    #[test]
    fn sharded_search_finds_and_stops() {
        let codec = EveryNth(5_000);
        let mut cfg = config(1_000_000);
        cfg.workers = 4;
        let miner = NonceMiner::new(&codec, cfg);
        let result = miner.mine(&template(), 1).unwrap();
        assert_eq!(result.nonce % 5_000, 0);
        assert!(result.iterations >= 1);
        assert!(result.iterations < 1_000_000);
    }

    struct Panicking;

    impl LedgerCodec for Panicking {
        fn script_for_address(&self, _address: &str) -> Result<ScriptPublicKey> {
            Ok(ScriptPublicKey::new(0, vec![]))
        }

        fn transaction_id(&self, _tx: &CandidateTransaction) -> TransactionId {
            panic!("codec exploded")
        }
    }

    #[test]
    fn worker_panic_is_internal_not_timeout() {
        for workers in [1, 3] {
            let mut cfg = config(1_000);
            cfg.workers = workers;
            let miner = NonceMiner::new(&Panicking, cfg);
            let err = miner.mine(&template(), 1).unwrap_err();
            assert!(
                matches!(&err, BridgeError::Internal(msg) if msg.contains("codec exploded")),
                "{workers} workers gave {err:?}"
            );
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn budget_is_capped_by_nonce_space() {
        let mut cfg = config(u64::MAX);
        assert_eq!(cfg.effective_budget(), NONCE_SPACE);
        cfg.workers = 4;
        assert_eq!(cfg.effective_budget(), NONCE_SPACE);
        cfg.max_iterations = 10;
        assert_eq!(cfg.effective_budget(), 10);
        assert_eq!(cfg.worker_budgets(), vec![3, 3, 2, 2]);
    }

    #[test]
    fn sharded_search_exhausts() {
        let codec = EveryNth(u32::MAX);
        let mut cfg = config(40);
        cfg.workers = 3;
        let miner = NonceMiner::new(&codec, cfg);
        assert_eq!(miner.mine(&template(), 1).unwrap_err(), BridgeError::MiningTimeout { attempts: 40 });
    }
}
