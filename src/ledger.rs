//! Ledger codec capability: address-to-script mapping and canonical transaction ids.
//!
//! `Blake3Ledger` is the offline codec used by default. It understands Kaspa-format
//! addresses and derives ids from a canonical serialization that leaves signature
//! scripts out, so signing does not move the id. Consensus-exact ids come from
//! `KaspaLedger` behind the `kaspa` feature.

use std::sync::Arc;

use blake3::Hasher;

use crate::error::{BridgeError, Result};
use crate::types::{CandidateTransaction, ScriptPublicKey, TransactionId};

pub trait LedgerCodec: Send + Sync {
    fn script_for_address(&self, address: &str) -> Result<ScriptPublicKey>;
    fn transaction_id(&self, tx: &CandidateTransaction) -> TransactionId;
}

const TX_ID_CONTEXT: &str = "entry-bridge 2024 transaction id";

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const CHECKSUM_LEN: usize = 8;
const KNOWN_PREFIXES: [&str; 4] = ["kaspa", "kaspatest", "kaspasim", "kaspadev"];

const OP_DATA_32: u8 = 0x20;
const OP_DATA_33: u8 = 0x21;
const OP_EQUAL: u8 = 0x87;
const OP_BLAKE2B: u8 = 0xaa;
const OP_CHECKSIG_ECDSA: u8 = 0xab;
const OP_CHECKSIG: u8 = 0xac;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressVersion {
    PubKey,
    PubKeyEcdsa,
    ScriptHash,
}

impl AddressVersion {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::PubKey),
            1 => Some(Self::PubKeyEcdsa),
            8 => Some(Self::ScriptHash),
            _ => None,
        }
    }

    fn payload_len(self) -> usize {
        match self {
            Self::PubKey | Self::ScriptHash => 32,
            Self::PubKeyEcdsa => 33,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Ledger;

impl Blake3Ledger {
    pub fn new() -> Self {
        Self
    }
}

impl LedgerCodec for Blake3Ledger {
    fn script_for_address(&self, address: &str) -> Result<ScriptPublicKey> {
        let (version, payload) = decode_address(address)?;
        let script = match version {
            AddressVersion::PubKey => {
                let mut s = Vec::with_capacity(34);
                s.push(OP_DATA_32);
                s.extend_from_slice(&payload);
                s.push(OP_CHECKSIG);
                s
            }
            AddressVersion::PubKeyEcdsa => {
                let mut s = Vec::with_capacity(35);
                s.push(OP_DATA_33);
                s.extend_from_slice(&payload);
                s.push(OP_CHECKSIG_ECDSA);
                s
            }
            AddressVersion::ScriptHash => {
                let mut s = Vec::with_capacity(35);
                s.push(OP_BLAKE2B);
                s.push(OP_DATA_32);
                s.extend_from_slice(&payload);
                s.push(OP_EQUAL);
                s
            }
        };
        Ok(ScriptPublicKey::new(0, script))
    }

    fn transaction_id(&self, tx: &CandidateTransaction) -> TransactionId {
        let mut h = Hasher::new_derive_key(TX_ID_CONTEXT);
        h.update(&tx.version.to_le_bytes());
        h.update(&(tx.inputs.len() as u64).to_le_bytes());
        for input in &tx.inputs {
            h.update(input.previous_outpoint.transaction_id.as_bytes());
            h.update(&input.previous_outpoint.index.to_le_bytes());
            // signature script excluded
            write_var_bytes(&mut h, &[]);
            h.update(&input.sequence.to_le_bytes());
        }
        h.update(&(tx.outputs.len() as u64).to_le_bytes());
        for output in &tx.outputs {
            h.update(&output.amount.to_le_bytes());
            h.update(&output.script_public_key.version.to_le_bytes());
            write_var_bytes(&mut h, &output.script_public_key.script);
        }
        h.update(&tx.lock_time.to_le_bytes());
        h.update(&tx.subnetwork_id);
        h.update(&tx.gas.to_le_bytes());
        write_var_bytes(&mut h, &tx.payload);
        TransactionId(h.finalize().into())
    }
}

fn write_var_bytes(h: &mut Hasher, bytes: &[u8]) {
    h.update(&(bytes.len() as u64).to_le_bytes());
    h.update(bytes);
}

fn decode_address(address: &str) -> Result<(AddressVersion, Vec<u8>)> {
    let invalid = |why: &str| BridgeError::InvalidAddress(format!("{address}: {why}"));

    let (prefix, data) = address.split_once(':').ok_or_else(|| invalid("missing network prefix"))?;
    if !KNOWN_PREFIXES.contains(&prefix) {
        return Err(invalid("unknown network prefix"));
    }
    if data.len() <= CHECKSUM_LEN {
        return Err(invalid("too short"));
    }

    let values = data
        .bytes()
        .map(|c| CHARSET.iter().position(|&x| x == c).map(|p| p as u8))
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(|| invalid("invalid character"))?;

    let (payload5, checksum5) = values.split_at(values.len() - CHECKSUM_LEN);
    let expected = checksum5.iter().fold(0u64, |acc, &v| (acc << 5) | u64::from(v));
    if checksum(prefix, payload5) != expected {
        return Err(invalid("bad checksum"));
    }

    let bytes = convert_bits(payload5, 5, 8).ok_or_else(|| invalid("bad padding"))?;
    let (&version, payload) = bytes.split_first().ok_or_else(|| invalid("empty payload"))?;
    let version = AddressVersion::from_byte(version).ok_or_else(|| invalid("unknown address version"))?;
    if payload.len() != version.payload_len() {
        return Err(invalid("payload length does not match version"));
    }
    Ok((version, payload.to_vec()))
}

fn polymod(values: impl Iterator<Item = u8>) -> u64 {
    let mut c = 1u64;
    for d in values {
        let c0 = c >> 35;
        c = ((c & 0x07_ffff_ffff) << 5) ^ u64::from(d);
        if c0 & 0x01 != 0 {
            c ^= 0x98_f2bc_8e61;
        }
        if c0 & 0x02 != 0 {
            c ^= 0x79_b76d_99e2;
        }
        if c0 & 0x04 != 0 {
            c ^= 0xf3_3e5f_b3c4;
        }
        if c0 & 0x08 != 0 {
            c ^= 0xae_2eab_e2a8;
        }
        if c0 & 0x10 != 0 {
            c ^= 0x1e_4f43_e470;
        }
    }
    c ^ 1
}

fn checksum(prefix: &str, payload5: &[u8]) -> u64 {
    polymod(
        prefix
            .bytes()
            .map(|c| c & 0x1f)
            .chain([0u8])
            .chain(payload5.iter().copied())
            .chain([0u8; CHECKSUM_LEN]),
    )
}

/// Regroup bits; decoding direction only, trailing padding must be zero and shorter than `from`.
fn convert_bits(data: &[u8], from: u32, to: u32) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize);
    let max = (1u32 << to) - 1;
    for &v in data {
        acc = (acc << from) | u32::from(v);
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max) as u8);
        }
        acc &= (1u32 << bits) - 1;
    }
    if bits >= from || acc != 0 {
        return None;
    }
    Some(out)
}

#[cfg(feature = "kaspa")]
pub use kaspa_codec::KaspaLedger;

/// Codec whose ids match the ones the network assigns, if one is compiled in.
#[cfg(feature = "kaspa")]
pub fn consensus_codec() -> Option<Arc<dyn LedgerCodec>> {
    Some(Arc::new(KaspaLedger))
}

#[cfg(not(feature = "kaspa"))]
pub fn consensus_codec() -> Option<Arc<dyn LedgerCodec>> {
    None
}

#[cfg(feature = "kaspa")]
mod kaspa_codec {
    use kaspa_addresses::Address;
    use kaspa_consensus_core::subnets::SubnetworkId;
    use kaspa_consensus_core::tx::{
        ScriptPublicKey as KaspaScript, Transaction, TransactionInput, TransactionOutpoint, TransactionOutput,
    };
    use kaspa_txscript::pay_to_address_script;

    use super::LedgerCodec;
    use crate::error::{BridgeError, Result};
    use crate::types::{CandidateTransaction, ScriptPublicKey, TransactionId};

    /// Consensus transaction ids and scripts via the rusty-kaspa crates.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct KaspaLedger;

    impl LedgerCodec for KaspaLedger {
        fn script_for_address(&self, address: &str) -> Result<ScriptPublicKey> {
            let addr = Address::try_from(address).map_err(|e| BridgeError::InvalidAddress(e.to_string()))?;
            let spk = pay_to_address_script(&addr);
            Ok(ScriptPublicKey::new(spk.version(), spk.script().to_vec()))
        }

        fn transaction_id(&self, tx: &CandidateTransaction) -> TransactionId {
            let inputs = tx
                .inputs
                .iter()
                .map(|i| {
                    let prev = TransactionOutpoint::new(
                        kaspa_consensus_core::tx::TransactionId::from_bytes(i.previous_outpoint.transaction_id.0),
                        i.previous_outpoint.index,
                    );
                    TransactionInput::new(prev, i.signature_script.clone(), i.sequence, i.sig_op_count)
                })
                .collect();
            let outputs = tx
                .outputs
                .iter()
                .map(|o| {
                    let spk = KaspaScript::from_vec(o.script_public_key.version, o.script_public_key.script.clone());
                    TransactionOutput::new(o.amount, spk)
                })
                .collect();
            let consensus_tx = Transaction::new(
                tx.version,
                inputs,
                outputs,
                tx.lock_time,
                SubnetworkId::from_bytes(tx.subnetwork_id),
                tx.gas,
                tx.payload.clone(),
            );
            TransactionId(consensus_tx.id().as_bytes())
        }
    }
}
