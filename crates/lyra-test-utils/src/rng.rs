//! Deterministic payload generation.

/// Minimal xorshift64 PRNG, reproducible across runs.
pub struct Xorshift64(u64);

impl Xorshift64 {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    pub fn fill(&mut self, buf: &mut [u8]) {
        for chunk in buf.chunks_mut(8) {
            let word = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }
}

/// `len` pseudo-random bytes for `seed`. Equal inputs give equal output.
#[must_use]
pub fn pattern_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut out = vec![0; len];
    Xorshift64::new(seed).fill(&mut out);
    out
}
