use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro128PlusPlus;

/// Source of starting nonces. OS entropy by default, seedable for reproducible runs.
pub enum NonceSource {
    Os,
    Seeded(Xoshiro128PlusPlus),
}

impl NonceSource {
    pub fn from_entropy() -> Self {
        NonceSource::Os
    }

    pub fn from_seed(seed: [u8; 16]) -> Self {
        NonceSource::Seeded(Xoshiro128PlusPlus::from_seed(seed))
    }

    /// Uniform non-zero `u32`.
    pub fn start_nonce(&mut self) -> u32 {
        loop {
            let n = match self {
                NonceSource::Os => OsRng.next_u32(),
                NonceSource::Seeded(rng) => rng.next_u32(),
            };
            if n != 0 {
                return n;
            }
        }
    }
}

/// Derive a 128-bit seed from arbitrary context bytes.
pub fn derive_seed(context: &[u8]) -> [u8; 16] {
    let out = blake3::hash(context);
    let mut s = [0u8; 16];
    s.copy_from_slice(&out.as_bytes()[..16]);
    s
}
