//! Deterministic random source for identifier suffixes
//!
//! Uses xorshift64 so that a world built from the same seed issues the same
//! identifiers on every platform.

use serde::{Deserialize, Serialize};

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A deterministic random number generator for id suffixes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdRng {
    state: u64,
}

impl IdRng {
    /// Create a new RNG with the given seed
    pub fn new(seed: u64) -> Self {
        // xorshift requires a non-zero state
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Get the current state (useful for saving/loading)
    pub fn state(&self) -> u64 {
        self.state
    }

    /// Generate the next raw u64 value
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Generate an uppercase base-36 string of `len` characters
    pub fn base36(&mut self, len: usize) -> String {
        let mut out = String::with_capacity(len);
        let mut bits = self.next_u64();
        for i in 0..len {
            // 12 base-36 digits fit in one u64 draw
            if i > 0 && i % 12 == 0 {
                bits = self.next_u64();
            }
            out.push(BASE36[(bits % 36) as usize] as char);
            bits /= 36;
        }
        out
    }
}

impl Default for IdRng {
    fn default() -> Self {
        Self::new(0x5EED_F1E1D)
    }
}
