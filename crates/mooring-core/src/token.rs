// crates/mooring-core/src/token.rs
//
// $MOR token units.
//
// The smallest unit of $MOR is the "knot". 1 MOR = 10^9 knots. All internal
// accounting uses integer knots to avoid floating-point precision issues in
// the escrow decay math and the pro-rata reward splits; `Mor` renders a knot
// amount in whole-MOR terms for error messages and logs.

use std::fmt;

/// Number of knots in one MOR. 1 MOR = 10^9 knots.
pub const KNOTS_PER_MOR: u64 = 1_000_000_000;

/// Type alias for knots — the smallest unit of $MOR.
pub type Knots = u64;

/// Display wrapper rendering a knot amount in whole-MOR terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mor(pub Knots);

impl fmt::Display for Mor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / KNOTS_PER_MOR;
        let frac = self.0 % KNOTS_PER_MOR;
        if frac == 0 {
            write!(f, "{} MOR", whole)
        } else {
            // Up to 9 decimal places, trimming trailing zeros
            let frac_str = format!("{:09}", frac);
            write!(f, "{}.{} MOR", whole, frac_str.trim_end_matches('0'))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knots_per_mor() {
        assert_eq!(KNOTS_PER_MOR, 1_000_000_000);
    }

    #[test]
    fn test_display_whole() {
        assert_eq!(format!("{}", Mor(42 * KNOTS_PER_MOR)), "42 MOR");
    }

    #[test]
    fn test_display_fractional() {
        assert_eq!(format!("{}", Mor(1_500_000_000)), "1.5 MOR");
    }

    #[test]
    fn test_display_sub_mor() {
        assert_eq!(format!("{}", Mor(1)), "0.000000001 MOR");
        assert_eq!(format!("{}", Mor(0)), "0 MOR");
    }
}
