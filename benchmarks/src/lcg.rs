//! Linear congruential generator (`x = 214013 x + 2531011`), 15-bit output.

/// Generator state
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    /// Generator starting from `seed`
    pub const fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Advance and return a value in `0..=0x7fff`
    pub fn sample(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(214_013).wrapping_add(2_531_011);
        (self.state >> 16) & 0x7fff
    }

    /// Next byte of the test stream, `b'a'..=b'z'`
    pub fn letter(&mut self) -> u8 {
        b'a' + (self.sample() % 26) as u8
    }
}
