//! Two bit gray code decoder

use crate::hal::Level;

/// Decodes successive (A, B) samples of one quadrature encoder.
///
/// The forward sequence is `00 -> 10 -> 11 -> 01 -> 00`, each step counts
/// `+1`. The reverse sequence counts `-1`. A sample in which both channels
/// changed can't be attributed to a direction and is flagged as invalid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuadratureDecoder {
    prev_a: bool,
    prev_b: bool
}

/// Result of decoding one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStep {
    /// Tick change in `{-1, 0, +1}`
    pub delta: i64,

    /// Both channels changed since the previous sample
    pub invalid: bool
}

impl QuadratureDecoder {
    /// A decoder whose previous state is `00`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a new sample and make it the previous state.
    ///
    /// An unchanged sample gives no ticks. A double transition gives no ticks
    /// and is reported as invalid.
    pub fn step(&mut self, a: Level, b: Level) -> DecodeStep {
        let a = a.is_high();
        let b = b.is_high();

        let delta = (a ^ self.prev_b) as i64 - (b ^ self.prev_a) as i64;
        let invalid = a != self.prev_a && b != self.prev_b;

        self.prev_a = a;
        self.prev_b = b;

        DecodeStep { delta, invalid }
    }
}
