use crate::error::{BridgeError, Result};

pub const SOMPI_PER_COIN: u64 = 100_000_000;
const DECIMALS: usize = 8;

/// Parse a display amount such as `"20"` or `"0.5"` into sompi without floating point.
pub fn parse_coins(input: &str) -> Result<u64> {
    let s = input.trim();
    if s.is_empty() {
        return Err(BridgeError::InvalidAmount("empty amount".to_string()));
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(BridgeError::InvalidAmount(format!("not a number: {input}")));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BridgeError::InvalidAmount(format!("not a finite positive decimal: {input}")));
    }
    if frac.len() > DECIMALS {
        return Err(BridgeError::InvalidAmount(format!(
            "at most {DECIMALS} fractional digits allowed: {input}"
        )));
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| BridgeError::InvalidAmount(format!("amount too large: {input}")))?
    };
    let mut frac_sompi: u64 = 0;
    for (i, b) in frac.bytes().enumerate() {
        frac_sompi += u64::from(b - b'0') * 10u64.pow((DECIMALS - 1 - i) as u32);
    }

    whole
        .checked_mul(SOMPI_PER_COIN)
        .and_then(|v| v.checked_add(frac_sompi))
        .ok_or_else(|| BridgeError::InvalidAmount(format!("amount too large: {input}")))
}

pub fn format_sompi(sompi: u64) -> String {
    let whole = sompi / SOMPI_PER_COIN;
    let frac = sompi % SOMPI_PER_COIN;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:08}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}
