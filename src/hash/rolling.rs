// Rabin-Karp fingerprint over a fixed-width window, rolled one byte at a
// time in O(1).

/// LCG multiplier used as the polynomial base (xdelta3's
/// `xd3_hash_multiplier32`).
pub const HASH_MULT_32: u32 = 1_597_334_677;

#[derive(Debug, Clone, Copy)]
pub struct RollingHash {
    look: usize,
    /// `HASH_MULT_32^(look - 1)`, the weight of the byte leaving the window.
    out_factor: u32,
}

impl RollingHash {
    pub fn new(look: usize) -> Self {
        assert!(look > 0, "rolling hash window must be non-empty");
        let out_factor = (1..look).fold(1u32, |acc, _| acc.wrapping_mul(HASH_MULT_32));
        Self { look, out_factor }
    }

    #[inline]
    pub fn look(&self) -> usize {
        self.look
    }

    /// Fingerprint of `data[..look]`.
    #[inline]
    pub fn hash(&self, data: &[u8]) -> u32 {
        data[..self.look].iter().fold(0u32, |h, &b| {
            h.wrapping_mul(HASH_MULT_32).wrapping_add(u32::from(b))
        })
    }

    /// Slide the window one byte: drop `out`, append `inp`.
    #[inline]
    pub fn roll(&self, h: u32, out: u8, inp: u8) -> u32 {
        h.wrapping_sub(u32::from(out).wrapping_mul(self.out_factor))
            .wrapping_mul(HASH_MULT_32)
            .wrapping_add(u32::from(inp))
    }
}
