use sha2::{Digest, Sha256};

use crate::text::tokenize;

/// Texts with fewer tokens carry too little signal to fingerprint.
pub const MIN_SIGNAL_TOKENS: usize = 30;

/// 64-bit SimHash of a token multiset.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn new(bits: u64) -> Self { Fingerprint(bits) }

    pub fn bits(self) -> u64 { self.0 }

    /// Coarse locality prefix: the high 16 bits.
    pub fn bucket(self) -> u16 { (self.0 >> 48) as u16 }

    pub fn distance(self, other: Fingerprint) -> u32 { hamming(self.0, other.0) }
}

#[derive(Copy, Clone, Debug)]
pub struct FingerprintOpts {
    pub min_tokens: usize,
    pub min_token_len: usize,
}

impl Default for FingerprintOpts {
    fn default() -> Self { FingerprintOpts { min_tokens: MIN_SIGNAL_TOKENS, min_token_len: 1 } }
}

/// Fingerprint of `text`, or `None` below the signal floor.
pub fn fingerprint_text(text: &str, opts: &FingerprintOpts) -> Option<Fingerprint> {
    let tokens = tokenize(text, opts.min_token_len);
    if tokens.len() < opts.min_tokens { return None; }
    Some(simhash(tokens.iter().map(String::as_str)))
}

/// First 8 bytes of SHA-256, big-endian. Stable across processes.
pub fn token_hash(token: &str) -> u64 {
    let digest = Sha256::digest(token.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(buf)
}

pub fn simhash<'a, I>(tokens: I) -> Fingerprint
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counters = [0i64; 64];
    for tok in tokens {
        let h = token_hash(tok);
        for (i, c) in counters.iter_mut().enumerate() {
            if (h >> i) & 1 == 1 { *c += 1 } else { *c -= 1 }
        }
    }
    // ties resolve toward a set bit
    let bits = counters
        .iter()
        .enumerate()
        .filter(|(_, c)| **c >= 0)
        .fold(0u64, |acc, (i, _)| acc | (1u64 << i));
    Fingerprint(bits)
}

pub fn hamming(a: u64, b: u64) -> u32 { (a ^ b).count_ones() }
