//! Entry payload codec.
//!
//! Wire layout (33 bytes):
//! ```text
//! offset 0      : 0x92 (version 9, tx type 2)
//! offset 1..20  : recipient L2 address, raw
//! offset 21..28 : amount in sompi, little-endian
//! offset 29..32 : nonce, big-endian
//! ```
//! The mixed endianness is part of the wire contract with the sequencer.

use crate::address::{L2Address, L2_ADDRESS_LEN};
use crate::error::{BridgeError, Result};

pub const ENTRY_PREFIX: u8 = 0x92;
pub const PAYLOAD_LEN: usize = 33;

const ADDRESS_OFFSET: usize = 1;
const AMOUNT_OFFSET: usize = ADDRESS_OFFSET + L2_ADDRESS_LEN;
const NONCE_OFFSET: usize = AMOUNT_OFFSET + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPayload {
    pub l2_address: L2Address,
    pub amount_sompi: u64,
    pub nonce: u32,
}

impl EntryPayload {
    pub fn new(l2_address: L2Address, amount_sompi: u64, nonce: u32) -> Self {
        Self { l2_address, amount_sompi, nonce }
    }

    pub fn prefix(&self) -> u8 {
        ENTRY_PREFIX
    }

    pub fn to_bytes(&self) -> [u8; PAYLOAD_LEN] {
        let mut out = [0u8; PAYLOAD_LEN];
        out[0] = ENTRY_PREFIX;
        out[ADDRESS_OFFSET..AMOUNT_OFFSET].copy_from_slice(self.l2_address.as_bytes());
        out[AMOUNT_OFFSET..NONCE_OFFSET].copy_from_slice(&self.amount_sompi.to_le_bytes());
        out[NONCE_OFFSET..].copy_from_slice(&self.nonce.to_be_bytes());
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| BridgeError::MalformedPayload(e.to_string()))?;
        decode(&bytes)
    }
}

/// Validate the textual address and encode a payload.
pub fn encode(l2_address: &str, amount_sompi: u64, nonce: u32) -> Result<EntryPayload> {
    let address = L2Address::parse(l2_address)?;
    Ok(EntryPayload::new(address, amount_sompi, nonce))
}

pub fn decode(bytes: &[u8]) -> Result<EntryPayload> {
    if bytes.len() != PAYLOAD_LEN {
        return Err(BridgeError::MalformedPayload(format!(
            "expected {PAYLOAD_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    if bytes[0] != ENTRY_PREFIX {
        return Err(BridgeError::MalformedPayload(format!(
            "unexpected prefix byte {:#04x}",
            bytes[0]
        )));
    }

    let mut address = [0u8; L2_ADDRESS_LEN];
    address.copy_from_slice(&bytes[ADDRESS_OFFSET..AMOUNT_OFFSET]);
    let mut amount = [0u8; 8];
    amount.copy_from_slice(&bytes[AMOUNT_OFFSET..NONCE_OFFSET]);
    let mut nonce = [0u8; 4];
    nonce.copy_from_slice(&bytes[NONCE_OFFSET..]);

    Ok(EntryPayload {
        l2_address: L2Address::from_bytes(address),
        amount_sompi: u64::from_le_bytes(amount),
        nonce: u32::from_be_bytes(nonce),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x5f102e8aff08f647681de13009ab313fdc55fba8";
    const TWENTY_COINS: u64 = 0x0000_0000_7735_9400;

    #[test]
    fn documented_vector() {
        let payload = encode(ADDR, TWENTY_COINS, 1).unwrap();
        let expected = format!(
            "92{}{}{}",
            "5f102e8aff08f647681de13009ab313fdc55fba8", "0094357700000000", "00000001"
        );
        assert_eq!(payload.to_hex(), expected);

        let decoded = EntryPayload::from_hex(&expected).unwrap();
        assert_eq!(decoded.amount_sompi, 2_000_000_000);
        assert_eq!(decoded.nonce, 1);
        assert_eq!(decoded.l2_address.to_string(), ADDR);
    }

    #[test]
    fn field_byte_order() {
        let bytes = encode(ADDR, TWENTY_COINS, 1).unwrap().to_bytes();
        assert_eq!(bytes[0], ENTRY_PREFIX);
        assert_eq!(&bytes[21..29], &[0x00, 0x94, 0x35, 0x77, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(&bytes[29..33], &[0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn round_trips_edge_values() {
        for (amount, nonce) in [(1u64, 0u32), (u64::MAX, u32::MAX), (TWENTY_COINS, 0xdead_beef)] {
            let payload = encode(ADDR, amount, nonce).unwrap();
            let bytes = payload.to_bytes();
            assert_eq!(bytes.len(), PAYLOAD_LEN);
            assert_eq!(decode(&bytes).unwrap(), payload);
        }
    }

    #[test]
    fn rejects_wrong_length() {
        for len in [0usize, 32, 34] {
            let bytes = vec![ENTRY_PREFIX; len];
            assert!(matches!(decode(&bytes), Err(BridgeError::MalformedPayload(_))));
        }
    }

    #[test]
    fn rejects_foreign_prefix() {
        let mut bytes = encode(ADDR, 1, 1).unwrap().to_bytes();
        bytes[0] = 0x91;
        assert!(matches!(decode(&bytes), Err(BridgeError::MalformedPayload(_))));
    }

    #[test]
    fn invalid_address_never_encodes() {
        assert!(matches!(encode("5f102e8aff08f647681de13009ab313fdc55fba8", 1, 1), Err(BridgeError::InvalidAddress(_))));
    }
}
