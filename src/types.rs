use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BridgeError;

pub const TX_ID_LEN: usize = 32;
pub const SUBNETWORK_ID_LEN: usize = 20;

/// Subnetwork of native (non-gas) transactions.
pub const SUBNETWORK_ID_NATIVE: [u8; SUBNETWORK_ID_LEN] = [0u8; SUBNETWORK_ID_LEN];

mod hex_bytes {
    use super::*;

    pub fn serialize<S: Serializer, T: AsRef<[u8]>>(value: &T, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&hex::encode(value.as_ref()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

mod hex_array {
    use super::*;

    pub fn serialize<S: Serializer, const N: usize>(value: &[u8; N], s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(d: D) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(d)?;
        let mut out = [0u8; N];
        hex::decode_to_slice(s, &mut out).map_err(serde::de::Error::custom)?;
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransactionId(pub [u8; TX_ID_LEN]);

impl TransactionId {
    pub fn as_bytes(&self) -> &[u8; TX_ID_LEN] {
        &self.0
    }

    /// Leading bytes, used for progress reporting.
    pub fn head(&self, n: usize) -> Vec<u8> {
        self.0[..n.min(TX_ID_LEN)].to_vec()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for TransactionId {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; TX_ID_LEN];
        hex::decode_to_slice(s, &mut out)
            .map_err(|e| BridgeError::Serialization(format!("bad transaction id {s}: {e}")))?;
        Ok(Self(out))
    }
}

impl Serialize for TransactionId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Required leading hex characters of a transaction id, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdPrefix {
    nibbles: Vec<u8>,
}

impl IdPrefix {
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() || s.len() > TX_ID_LEN * 2 {
            return None;
        }
        let nibbles = s
            .chars()
            .map(|c| c.to_digit(16).map(|d| d as u8))
            .collect::<Option<Vec<u8>>>()?;
        Some(Self { nibbles })
    }

    pub fn len(&self) -> usize {
        self.nibbles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nibbles.is_empty()
    }

    pub fn matches(&self, id: &TransactionId) -> bool {
        self.nibbles.iter().enumerate().all(|(i, &want)| {
            let byte = id.0[i / 2];
            let got = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            got == want
        })
    }
}

impl fmt::Display for IdPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for n in &self.nibbles {
            write!(f, "{n:x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptPublicKey {
    pub version: u16,
    #[serde(rename = "scriptPublicKey", with = "hex_bytes")]
    pub script: Vec<u8>,
}

impl ScriptPublicKey {
    pub fn new(version: u16, script: Vec<u8>) -> Self {
        Self { version, script }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outpoint {
    pub transaction_id: TransactionId,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoEntry {
    pub outpoint: Outpoint,
    pub amount: u64,
    pub script_public_key: ScriptPublicKey,
    pub block_daa_score: u64,
    pub is_coinbase: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInput {
    pub previous_outpoint: Outpoint,
    #[serde(with = "hex_bytes")]
    pub signature_script: Vec<u8>,
    pub sequence: u64,
    pub sig_op_count: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOutput {
    pub amount: u64,
    pub script_public_key: ScriptPublicKey,
}

/// Unsigned transaction as built for one nonce. Never mutated once its id is computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTransaction {
    pub version: u16,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u64,
    #[serde(with = "hex_array")]
    pub subnetwork_id: [u8; SUBNETWORK_ID_LEN],
    pub gas: u64,
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningResult {
    pub transaction: CandidateTransaction,
    pub transaction_id: TransactionId,
    pub nonce: u32,
    pub iterations: u64,
}

/// User-facing bridge request, amount in display units (e.g. `"20"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeParams {
    pub amount: String,
    pub l2_address: String,
}

impl BridgeParams {
    pub fn new(amount: impl Into<String>, l2_address: impl Into<String>) -> Self {
        Self { amount: amount.into(), l2_address: l2_address.into() }
    }
}

/// Request handed to the external signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionRequest {
    #[serde(rename_all = "camelCase")]
    SignAndBroadcast {
        transaction: CandidateTransaction,
        expected_transaction_id: TransactionId,
        nonce: u32,
    },
}

impl TransactionRequest {
    pub fn from_mined(result: &MiningResult) -> Self {
        TransactionRequest::SignAndBroadcast {
            transaction: result.transaction.clone(),
            expected_transaction_id: result.transaction_id,
            nonce: result.nonce,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignerResponse {
    #[serde(rename_all = "camelCase")]
    Broadcast { transaction_id: TransactionId },
    Signed { transaction: CandidateTransaction },
    Rejected { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_with_head(head: &[u8]) -> TransactionId {
        let mut raw = [0x11u8; TX_ID_LEN];
        raw[..head.len()].copy_from_slice(head);
        TransactionId(raw)
    }

    #[test]
    fn prefix_matching_is_case_insensitive() {
        let id = id_with_head(&[0x97, 0xb4, 0x00]);
        assert!(IdPrefix::parse("97b4").unwrap().matches(&id));
        assert!(IdPrefix::parse("97B4").unwrap().matches(&id));
        assert!(!IdPrefix::parse("97b5").unwrap().matches(&id));
    }

    #[test]
    fn odd_length_prefix() {
        let id = id_with_head(&[0x97, 0xb4]);
        assert!(IdPrefix::parse("97b").unwrap().matches(&id));
        assert!(!IdPrefix::parse("97c").unwrap().matches(&id));
        assert_eq!(IdPrefix::parse("97B").unwrap().to_string(), "97b");
    }

    #[test]
    fn rejects_invalid_prefix() {
        assert!(IdPrefix::parse("").is_none());
        assert!(IdPrefix::parse("97g4").is_none());
        assert!(IdPrefix::parse(&"a".repeat(65)).is_none());
    }

    #[test]
    fn request_serializes_with_tag_and_hex_fields() {
        let tx = CandidateTransaction {
            version: 0,
            inputs: vec![],
            outputs: vec![TxOutput { amount: 5, script_public_key: ScriptPublicKey::new(0, vec![0xab]) }],
            lock_time: 0,
            subnetwork_id: SUBNETWORK_ID_NATIVE,
            gas: 0,
            payload: vec![0x92, 0x01],
        };
        let req = TransactionRequest::SignAndBroadcast {
            transaction: tx.clone(),
            expected_transaction_id: id_with_head(&[0x97, 0xb4]),
            nonce: 7,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["kind"], "sign_and_broadcast");
        assert_eq!(json["nonce"], 7);
        assert_eq!(json["transaction"]["payload"], "9201");
        assert_eq!(json["transaction"]["subnetworkId"], "0".repeat(40));
        assert_eq!(json["transaction"]["outputs"][0]["scriptPublicKey"]["scriptPublicKey"], "ab");
        assert!(json["expectedTransactionId"].as_str().unwrap().starts_with("97b4"));

        let back: TransactionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn signer_response_variants() {
        let id = "97b4".to_string() + &"00".repeat(30);
        let r: SignerResponse =
            serde_json::from_str(&format!(r#"{{"status":"broadcast","transactionId":"{id}"}}"#)).unwrap();
        assert!(matches!(r, SignerResponse::Broadcast { .. }));
        let r: SignerResponse = serde_json::from_str(r#"{"status":"rejected","reason":"user declined"}"#).unwrap();
        assert_eq!(r, SignerResponse::Rejected { reason: "user declined".into() });
    }
}
