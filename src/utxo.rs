use crate::error::{BridgeError, Result};
use crate::types::UtxoEntry;

/// Flat fee for an Entry transaction. Not mass-based.
pub const MIN_FEE_SOMPI: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub selected: Vec<UtxoEntry>,
    pub total: u64,
}

/// Accumulate UTXOs in the order given until `amount + fee_buffer` is covered.
pub fn select(utxos: &[UtxoEntry], amount: u64, fee_buffer: u64) -> Result<Selection> {
    let need = amount.saturating_add(fee_buffer);
    let mut selected = Vec::new();
    let mut total: u64 = 0;

    for utxo in utxos {
        if total >= need {
            break;
        }
        total = total.saturating_add(utxo.amount);
        selected.push(utxo.clone());
    }

    if total < need || selected.is_empty() {
        return Err(BridgeError::InsufficientFunds { have: total, need });
    }
    tracing::debug!(inputs = selected.len(), total, need, "selected utxos");
    Ok(Selection { selected, total })
}

/// Entry transactions carry a fixed-size payload, so the fee is a constant for now.
pub fn estimate_fee(_input_count: usize, _has_change: bool) -> u64 {
    MIN_FEE_SOMPI
}

pub fn change_amount(total: u64, amount: u64, fee: u64) -> u64 {
    total.saturating_sub(amount).saturating_sub(fee)
}
