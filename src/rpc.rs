//! Ledger-query and signer collaborators.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::error_handling::ErrorHandler;
use crate::metrics::MetricsCollector;
use crate::types::{
    CandidateTransaction, Outpoint, ScriptPublicKey, SignerResponse, TransactionId, TransactionRequest, UtxoEntry,
};

#[async_trait]
pub trait LedgerQuery: Send + Sync {
    async fn get_utxos(&self, address: &str) -> Result<Vec<UtxoEntry>>;
    async fn submit(&self, transaction: &CandidateTransaction) -> Result<TransactionId>;
}

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign_and_send(&self, request: &TransactionRequest) -> Result<SignerResponse>;
}

fn u64_from_str_or_num<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }
    match Raw::deserialize(d)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestUtxo {
    outpoint: Outpoint,
    utxo_entry: RestUtxoEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestUtxoEntry {
    #[serde(deserialize_with = "u64_from_str_or_num")]
    amount: u64,
    script_public_key: RestScript,
    #[serde(default, deserialize_with = "u64_from_str_or_num")]
    block_daa_score: u64,
    #[serde(default)]
    is_coinbase: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestScript {
    #[serde(default)]
    version: u16,
    script_public_key: String,
}

impl TryFrom<RestUtxo> for UtxoEntry {
    type Error = BridgeError;

    fn try_from(raw: RestUtxo) -> Result<Self> {
        let script = hex::decode(&raw.utxo_entry.script_public_key.script_public_key)
            .map_err(|e| BridgeError::Serialization(format!("utxo script: {e}")))?;
        Ok(UtxoEntry {
            outpoint: raw.outpoint,
            amount: raw.utxo_entry.amount,
            script_public_key: ScriptPublicKey::new(raw.utxo_entry.script_public_key.version, script),
            block_daa_score: raw.utxo_entry.block_daa_score,
            is_coinbase: raw.utxo_entry.is_coinbase,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    transaction_id: Option<TransactionId>,
    error: Option<String>,
}

pub(crate) fn parse_utxos(body: &str) -> Result<Vec<UtxoEntry>> {
    let raw: Vec<RestUtxo> = serde_json::from_str(body)?;
    raw.into_iter().map(UtxoEntry::try_from).collect()
}

fn unavailable(e: reqwest::Error) -> BridgeError {
    BridgeError::RpcUnavailable(e.to_string())
}

/// Kaspa REST-style ledger API.
pub struct HttpLedgerClient {
    client: reqwest::Client,
    base_url: String,
    handler: ErrorHandler,
    metrics: Arc<MetricsCollector>,
}

impl HttpLedgerClient {
    pub fn new(config: &Config, metrics: Arc<MetricsCollector>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.get_rpc_timeout())
            .build()
            .map_err(unavailable)?;
        let handler = ErrorHandler::new().with_retry_config(config.retry_config());
        Ok(Self { client, base_url: config.ledger_api_url.clone(), handler, metrics })
    }

    async fn fetch_utxos(&self, address: &str) -> Result<Vec<UtxoEntry>> {
        let url = format!("{}/addresses/{}/utxos", self.base_url, address);
        let t0 = Instant::now();
        let resp = self.client.get(&url).send().await.map_err(unavailable)?;
        self.metrics.prometheus().record_rpc_latency(t0.elapsed().as_secs_f64() * 1000.0);

        let status = resp.status();
        let body = resp.text().await.map_err(unavailable)?;
        if status.is_server_error() {
            return Err(BridgeError::RpcUnavailable(format!("{url}: {status}")));
        }
        if !status.is_success() {
            return Err(BridgeError::InvalidAddress(format!("{address}: ledger answered {status}: {body}")));
        }
        parse_utxos(&body)
    }

    async fn post_transaction(&self, transaction: &CandidateTransaction) -> Result<TransactionId> {
        let url = format!("{}/transactions", self.base_url);
        let body = serde_json::json!({ "transaction": transaction, "allowOrphan": false });
        let resp = self.client.post(&url).json(&body).send().await.map_err(unavailable)?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(BridgeError::RpcUnavailable(format!("{url}: {status}")));
        }
        let text = resp.text().await.map_err(unavailable)?;
        let parsed: SubmitResponse = serde_json::from_str(&text)
            .map_err(|_| BridgeError::LedgerRejected(format!("{status}: {text}")))?;
        match (status.is_success(), parsed.transaction_id, parsed.error) {
            (true, Some(id), None) => Ok(id),
            (_, _, Some(error)) => Err(BridgeError::LedgerRejected(error)),
            _ => Err(BridgeError::LedgerRejected(format!("{status}: {text}"))),
        }
    }
}

#[async_trait]
impl LedgerQuery for HttpLedgerClient {
    async fn get_utxos(&self, address: &str) -> Result<Vec<UtxoEntry>> {
        let utxos = self.handler.execute_with_retry(|| self.fetch_utxos(address)).await?;
        tracing::debug!(address, count = utxos.len(), "fetched utxos");
        Ok(utxos)
    }

    async fn submit(&self, transaction: &CandidateTransaction) -> Result<TransactionId> {
        // a resubmitted transaction is idempotent on the ledger side
        self.handler.execute_with_retry(|| self.post_transaction(transaction)).await
    }
}

/// Hands the request to an external wallet over HTTP.
pub struct HttpSigner {
    client: reqwest::Client,
    url: String,
}

impl HttpSigner {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.get_rpc_timeout())
            .build()
            .map_err(|e| BridgeError::Signer(e.to_string()))?;
        Ok(Self { client, url: config.signer_url.clone() })
    }
}

#[async_trait]
impl TransactionSigner for HttpSigner {
    async fn sign_and_send(&self, request: &TransactionRequest) -> Result<SignerResponse> {
        let resp = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| BridgeError::Signer(e.to_string()))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| BridgeError::Signer(e.to_string()))?;
        if !status.is_success() {
            return Err(BridgeError::Signer(format!("signer answered {status}: {text}")));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rest_utxos_with_string_amounts() {
        let tx_id = "ab".repeat(32);
        let body = format!(
            r#"[{{"address":"kaspa:x","outpoint":{{"transactionId":"{tx_id}","index":2}},
                "utxoEntry":{{"amount":"2500000000","scriptPublicKey":{{"scriptPublicKey":"20aaac"}},
                "blockDaaScore":"1234","isCoinbase":false}}}},
               {{"outpoint":{{"transactionId":"{tx_id}","index":3}},
                "utxoEntry":{{"amount":77,"scriptPublicKey":{{"version":0,"scriptPublicKey":""}}}}}}]"#
        );
        let utxos = parse_utxos(&body).unwrap();
        assert_eq!(utxos.len(), 2);
        assert_eq!(utxos[0].amount, 2_500_000_000);
        assert_eq!(utxos[0].outpoint.index, 2);
        assert_eq!(utxos[0].script_public_key.script, vec![0x20, 0xaa, 0xac]);
        assert_eq!(utxos[0].block_daa_score, 1234);
        assert_eq!(utxos[1].amount, 77);
        assert_eq!(utxos[1].block_daa_score, 0);
    }

    #[test]
    fn rejects_malformed_utxo_script() {
        let tx_id = "00".repeat(32);
        let body = format!(
            r#"[{{"outpoint":{{"transactionId":"{tx_id}","index":0}},
                "utxoEntry":{{"amount":"1","scriptPublicKey":{{"scriptPublicKey":"zz"}}}}}}]"#
        );
        assert!(matches!(parse_utxos(&body), Err(BridgeError::Serialization(_))));
    }
}
