use crate::address::L2Address;
use crate::error::Result;
use crate::ledger::LedgerCodec;
use crate::payload::EntryPayload;
use crate::types::{CandidateTransaction, SUBNETWORK_ID_NATIVE, TxInput, TxOutput, UtxoEntry};
use crate::utxo::{self, Selection};

pub const TX_VERSION: u16 = 0;
pub const INPUT_SEQUENCE: u64 = 0;
pub const INPUT_SIG_OP_COUNT: u8 = 1;

/// Everything of an Entry transaction except the nonce-bearing payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionTemplate {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub l2_address: L2Address,
    pub amount_sompi: u64,
    pub total_input: u64,
    pub fee: u64,
}

impl TransactionTemplate {
    pub fn payload(&self, nonce: u32) -> EntryPayload {
        EntryPayload::new(self.l2_address, self.amount_sompi, nonce)
    }

    pub fn candidate(&self, nonce: u32) -> CandidateTransaction {
        CandidateTransaction {
            version: TX_VERSION,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            lock_time: 0,
            subnetwork_id: SUBNETWORK_ID_NATIVE,
            gas: 0,
            payload: self.payload(nonce).to_bytes().to_vec(),
        }
    }

    pub fn change(&self) -> u64 {
        self.outputs.get(1).map(|o| o.amount).unwrap_or(0)
    }
}

struct FundedSelection {
    selected: Vec<UtxoEntry>,
    total: u64,
    fee: u64,
}

pub struct TransactionBuilder<'a> {
    codec: &'a dyn LedgerCodec,
    fee_buffer: u64,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(codec: &'a dyn LedgerCodec) -> Self {
        Self { codec, fee_buffer: utxo::MIN_FEE_SOMPI }
    }

    pub fn with_fee_buffer(mut self, fee_buffer: u64) -> Self {
        self.fee_buffer = fee_buffer;
        self
    }

    pub fn prepare(
        &self,
        utxos: &[UtxoEntry],
        sender_address: &str,
        entry_address: &str,
        amount_sompi: u64,
        l2_address: &str,
    ) -> Result<TransactionTemplate> {
        let l2_address = L2Address::parse(l2_address)?;
        let entry_script = self.codec.script_for_address(entry_address)?;
        let sender_script = self.codec.script_for_address(sender_address)?;

        let FundedSelection { selected, total, fee } = self.select_with_fee(utxos, amount_sompi)?;
        let change = utxo::change_amount(total, amount_sompi, fee);

        let inputs = selected
            .iter()
            .map(|u| TxInput {
                previous_outpoint: u.outpoint,
                signature_script: Vec::new(),
                sequence: INPUT_SEQUENCE,
                sig_op_count: INPUT_SIG_OP_COUNT,
            })
            .collect();

        // Entry output must stay at index 0 for the sequencer.
        let mut outputs = vec![TxOutput { amount: amount_sompi, script_public_key: entry_script }];
        if change > 0 {
            outputs.push(TxOutput { amount: change, script_public_key: sender_script });
        }

        Ok(TransactionTemplate { inputs, outputs, l2_address, amount_sompi, total_input: total, fee })
    }

    /// Selects against the same fee that is charged; reselects if more inputs raise the estimate.
    fn select_with_fee(&self, utxos: &[UtxoEntry], amount_sompi: u64) -> Result<FundedSelection> {
        let mut fee = self.fee_buffer.max(utxo::estimate_fee(1, true));
        loop {
            let Selection { selected, total } = utxo::select(utxos, amount_sompi, fee)?;
            let charged = self.fee_buffer.max(utxo::estimate_fee(selected.len(), true));
            if charged <= fee {
                return Ok(FundedSelection { selected, total, fee });
            }
            fee = charged;
        }
    }

    pub fn build(
        &self,
        utxos: &[UtxoEntry],
        sender_address: &str,
        entry_address: &str,
        amount_sompi: u64,
        l2_address: &str,
        nonce: u32,
    ) -> Result<CandidateTransaction> {
        let template = self.prepare(utxos, sender_address, entry_address, amount_sompi, l2_address)?;
        Ok(template.candidate(nonce))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::ledger::Blake3Ledger;
    use crate::payload;
    use crate::types::{Outpoint, ScriptPublicKey, TransactionId};

    const SENDER: &str = "kaspa:qyppzyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zygem5xjym5";
    const ENTRY: &str = "kaspa:qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqkx9awp4e";
    const L2: &str = "0x5f102e8aff08f647681de13009ab313fdc55fba8";

    fn utxo(index: u32, amount: u64) -> UtxoEntry {
        UtxoEntry {
            outpoint: Outpoint { transaction_id: TransactionId([9u8; 32]), index },
            amount,
            script_public_key: ScriptPublicKey::new(0, vec![]),
            block_daa_score: 10,
            is_coinbase: false,
        }
    }

    #[test]
    fn entry_output_first_then_change() {
        let codec = Blake3Ledger;
        let utxos = vec![utxo(0, 1_500_000_000), utxo(1, 1_000_000_000)];
        let tx = TransactionBuilder::new(&codec).build(&utxos, SENDER, ENTRY, 2_000_000_000, L2, 1).unwrap();

        assert_eq!(tx.inputs.len(), 2);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].amount, 2_000_000_000);
        assert_eq!(tx.outputs[0].script_public_key, codec.script_for_address(ENTRY).unwrap());
        assert_eq!(tx.outputs[1].amount, 500_000_000 - utxo::MIN_FEE_SOMPI);
        assert_eq!(tx.outputs[1].script_public_key, codec.script_for_address(SENDER).unwrap());
        assert!(tx.inputs.iter().all(|i| i.signature_script.is_empty() && i.sig_op_count == 1));
        assert_eq!(tx.subnetwork_id, [0u8; 20]);
        assert_eq!(tx.gas, 0);

        let decoded = payload::decode(&tx.payload).unwrap();
        assert_eq!(decoded.nonce, 1);
        assert_eq!(decoded.amount_sompi, 2_000_000_000);
    }

    #[test]
    fn no_change_output_when_exact() {
        let codec = Blake3Ledger;
        let utxos = vec![utxo(0, 100_000_000 + utxo::MIN_FEE_SOMPI)];
        let tx = TransactionBuilder::new(&codec).build(&utxos, SENDER, ENTRY, 100_000_000, L2, 0).unwrap();
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].amount, 100_000_000);
    }

    #[test]
    fn fee_below_estimate_still_charges_estimate() {
        let codec = Blake3Ledger;
        let builder = TransactionBuilder::new(&codec).with_fee_buffer(0);

        let exact = vec![utxo(0, 100_000_000)];
        assert_eq!(
            builder.prepare(&exact, SENDER, ENTRY, 100_000_000, L2).unwrap_err(),
            BridgeError::InsufficientFunds { have: 100_000_000, need: 100_000_000 + utxo::MIN_FEE_SOMPI }
        );

        let covered = vec![utxo(0, 100_000_000 + utxo::MIN_FEE_SOMPI + 7)];
        let template = builder.prepare(&covered, SENDER, ENTRY, 100_000_000, L2).unwrap();
        let outputs: u64 = template.outputs.iter().map(|o| o.amount).sum();
        assert_eq!(template.fee, utxo::MIN_FEE_SOMPI);
        assert_eq!(template.total_input - outputs, template.fee);
    }

    #[test]
    fn nonce_only_changes_payload() {
        let codec = Blake3Ledger;
        let utxos = vec![utxo(0, 5_000_000_000)];
        let template = TransactionBuilder::new(&codec).prepare(&utxos, SENDER, ENTRY, 100_000_000, L2).unwrap();
        let a = template.candidate(1);
        let b = template.candidate(2);
        assert_eq!(a.inputs, b.inputs);
        assert_eq!(a.outputs, b.outputs);
        assert_ne!(a.payload, b.payload);
        assert_ne!(codec.transaction_id(&a), codec.transaction_id(&b));
        assert_eq!(template.candidate(1), a);
    }

    #[test]
    fn propagates_errors() {
        let codec = Blake3Ledger;
        let builder = TransactionBuilder::new(&codec);
        let utxos = vec![utxo(0, 1_000)];
        assert!(matches!(
            builder.build(&utxos, SENDER, ENTRY, 100_000_000, L2, 0),
            Err(BridgeError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            builder.build(&utxos, SENDER, ENTRY, 100, "0x1234", 0),
            Err(BridgeError::InvalidAddress(_))
        ));
    }
}
