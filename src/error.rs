use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Insufficient funds: have {have} sompi, need {need} sompi")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("No matching transaction id after {attempts} attempts")]
    MiningTimeout { attempts: u64 },
    #[error("Signer rejected the transaction: {0}")]
    SignerRejected(String),
    #[error("Signer error: {0}")]
    Signer(String),
    #[error("Ledger RPC unavailable: {0}")]
    RpcUnavailable(String),
    #[error("Ledger rejected the transaction: {0}")]
    LedgerRejected(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Whether a fresh attempt (new UTXOs, new random nonce) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::MiningTimeout { .. } | BridgeError::RpcUnavailable(_))
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
