use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a loan inside its portfolio. Assigned once at generation and
/// never reassigned: replacing a loan keeps its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LoanId(pub usize);

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of proposals consumed in a session (accepted or rejected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Turn(pub u32);

impl Turn {
    pub fn next(self) -> Self {
        Turn(self.0 + 1)
    }
}

/// Simulated wall-clock time in seconds since the session started.
///
/// The clock only moves when the driver ticks it; there is no real timer.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Seconds(pub f64);

impl Seconds {
    pub const ZERO: Seconds = Seconds(0.0);

    pub fn offset(self, dt: f64) -> Self {
        Seconds(self.0 + dt)
    }
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_two_decimals() {
        assert_eq!(round_to(0.123, 2), 0.12);
        assert_eq!(round_to(0.127, 2), 0.13);
        assert_eq!(round_to(1.0, 2), 1.0);
    }

    #[test]
    fn round_to_zero_decimals() {
        assert_eq!(round_to(1.369, 0), 1.0);
        assert_eq!(round_to(56.9, 0), 57.0);
    }

    #[test]
    fn round_to_is_idempotent() {
        let once = round_to(12.5, 0);
        assert_eq!(round_to(once, 0), once);
    }

    #[test]
    fn seconds_offset_accumulates() {
        let t = Seconds::ZERO.offset(1.5).offset(2.0);
        assert_eq!(t, Seconds(3.5));
    }

    #[test]
    fn turn_next_increments() {
        assert_eq!(Turn(0).next(), Turn(1));
    }
}
