use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

pub const L2_ADDRESS_LEN: usize = 20;

/// An L2 (EVM-style) recipient: `0x` followed by exactly 40 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct L2Address([u8; L2_ADDRESS_LEN]);

impl L2Address {
    pub fn parse(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| BridgeError::InvalidAddress(format!("missing 0x prefix: {s}")))?;
        if digits.len() != L2_ADDRESS_LEN * 2 {
            return Err(BridgeError::InvalidAddress(format!(
                "expected {} hex digits, got {}",
                L2_ADDRESS_LEN * 2,
                digits.len()
            )));
        }
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(BridgeError::InvalidAddress(format!("non-hex characters in {s}")));
        }
        let mut raw = [0u8; L2_ADDRESS_LEN];
        hex::decode_to_slice(digits, &mut raw)
            .map_err(|e| BridgeError::InvalidAddress(e.to_string()))?;
        Ok(Self(raw))
    }

    pub fn from_bytes(raw: [u8; L2_ADDRESS_LEN]) -> Self {
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; L2_ADDRESS_LEN] {
        &self.0
    }
}

impl FromStr for L2Address {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for L2Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}
