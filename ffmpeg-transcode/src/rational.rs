//! Rational time bases and timestamp rescaling.
//!
//! Timestamps are plain `i64` tick counts; an unset timestamp is `None`.
//! Conversions between time bases go through [`rescale_q`] / [`rescale_ts`],
//! which compute `a * b / c` in 128-bit arithmetic so intermediate products
//! never overflow.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Internal time base resolution (ticks per second).
pub const TIME_BASE: i64 = 1_000_000;

/// [`TIME_BASE`] as a rational, the canonical base for decode positions.
pub const TIME_BASE_Q: Rational = Rational {
    num: 1,
    den: TIME_BASE as i32,
};

/// Lower bound, in bytes, for the decoded-audio scratch buffer
/// (one second of 48 kHz 32-bit audio).
pub const MAX_AUDIO_FRAME_SIZE: usize = 192_000;

/// Rational number used for time bases and frame rates, e.g. 1/90000.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    /// # Panics
    ///
    /// Panics if `den` is zero.
    pub const fn new(num: i32, den: i32) -> Self {
        assert!(den != 0, "denominator cannot be zero");
        Self { num, den }
    }

    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Swap numerator and denominator.
    ///
    /// # Panics
    ///
    /// Panics if the numerator is zero.
    pub const fn invert(self) -> Self {
        assert!(self.num != 0, "cannot invert zero");
        Self {
            num: self.den,
            den: self.num,
        }
    }

    /// Both parts strictly positive, i.e. usable as a time base or frame rate.
    pub fn is_valid(self) -> bool {
        self.num > 0 && self.den > 0
    }

    /// Closest rational to `value` whose numerator and denominator do not
    /// exceed `max` in magnitude.
    ///
    /// NaN maps to `0/1`; infinities and out-of-range values saturate to
    /// `±max/1`.
    pub fn from_f64(value: f64, max: i32) -> Self {
        if value.is_nan() || max <= 0 {
            return Self { num: 0, den: 1 };
        }
        if value.is_infinite() || value.abs() > max as f64 {
            let num = if value < 0.0 { -max } else { max };
            return Self { num, den: 1 };
        }

        let negative = value < 0.0;
        let target = value.abs();
        let max = max as i64;

        // Continued fraction expansion; (p1/q1) is the last convergent that fit.
        let (mut p0, mut q0, mut p1, mut q1) = (0i64, 1i64, 1i64, 0i64);
        let mut x = target;
        loop {
            let a = x.floor();
            if a > max as f64 {
                break;
            }
            let a = a as i64;
            let p2 = a * p1 + p0;
            let q2 = a * q1 + q0;
            if p2 > max || q2 > max {
                // Best semiconvergent between the last two convergents.
                let k = ((max - p0) / p1.max(1)).min((max - q0) / q1.max(1));
                let (ps, qs) = (k * p1 + p0, k * q1 + q0);
                if qs > 0
                    && (ps as f64 / qs as f64 - target).abs()
                        < (p1 as f64 / q1.max(1) as f64 - target).abs()
                {
                    p1 = ps;
                    q1 = qs;
                }
                break;
            }
            (p0, q0, p1, q1) = (p1, q1, p2, q2);
            let frac = x - a as f64;
            if frac < 1e-12 {
                break;
            }
            x = 1.0 / frac;
        }

        if q1 == 0 {
            return Self { num: 0, den: 1 };
        }
        let num = if negative { -p1 } else { p1 };
        Self {
            num: num as i32,
            den: q1 as i32,
        }
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl From<(i32, i32)> for Rational {
    fn from((num, den): (i32, i32)) -> Self {
        Self::new(num, den)
    }
}

/// Rounding policy applied to the final division of a rescale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rounding {
    /// Toward zero.
    Zero,
    /// Away from zero.
    Inf,
    /// Toward negative infinity.
    Down,
    /// Toward positive infinity.
    Up,
    /// To nearest, halfway cases away from zero.
    #[default]
    NearInf,
}

/// `a * b / c` rounded with `rounding`.
///
/// Returns `None` when `c` is zero or the result does not fit in an `i64`.
pub fn rescale_rnd(a: i64, b: i64, c: i64, rounding: Rounding) -> Option<i64> {
    if c == 0 {
        return None;
    }
    let mut num = a as i128 * b as i128;
    let mut den = c as i128;
    if den < 0 {
        num = -num;
        den = -den;
    }

    let floor = num.div_euclid(den);
    let exact = num.rem_euclid(den) == 0;
    let q = match rounding {
        Rounding::Zero => num / den,
        Rounding::Down => floor,
        Rounding::Up | Rounding::Inf if exact => floor,
        Rounding::Up => floor + 1,
        // floor already points away from zero for negative quotients
        Rounding::Inf if num < 0 => floor,
        Rounding::Inf => floor + 1,
        Rounding::NearInf => {
            let magnitude = (num.abs() * 2 + den) / (den * 2);
            if num < 0 { -magnitude } else { magnitude }
        }
    };
    i64::try_from(q).ok()
}

/// Convert `value` from `from` units to `to` units with the given rounding.
pub fn rescale_q_rnd(value: i64, from: Rational, to: Rational, rounding: Rounding) -> Option<i64> {
    let b = from.num as i64 * to.den as i64;
    let c = to.num as i64 * from.den as i64;
    rescale_rnd(value, b, c, rounding)
}

/// Convert `value` from `from` units to `to` units, rounding to nearest.
pub fn rescale_q(value: i64, from: Rational, to: Rational) -> Option<i64> {
    rescale_q_rnd(value, from, to, Rounding::NearInf)
}

/// Rescale a possibly-unset timestamp. Unset stays unset.
pub fn rescale_ts(ts: Option<i64>, from: Rational, to: Rational) -> Option<i64> {
    ts.and_then(|value| rescale_q(value, from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TB_90K: Rational = Rational::new(1, 90000);
    const TB_25: Rational = Rational::new(1, 25);
    const TB_44K1: Rational = Rational::new(1, 44100);
    const TB_NTSC: Rational = Rational::new(1001, 30000);

    #[test]
    fn test_identity() {
        for base in [TB_90K, TB_25, TB_44K1, TB_NTSC, TIME_BASE_Q] {
            for x in [-1_000_003, -1, 0, 1, 7, 123_456_789, i64::MAX / 2] {
                assert_eq!(rescale_q(x, base, base), Some(x), "{x} in {base}");
            }
        }
    }

    #[test]
    fn test_unset_stays_unset() {
        assert_eq!(rescale_ts(None, TB_90K, TB_25), None);
        assert_eq!(rescale_ts(None, TB_25, TB_25), None);
        assert_eq!(rescale_ts(Some(90000), TB_90K, TB_25), Some(25));
    }

    #[test]
    fn test_round_trip_within_one_unit() {
        // Coarse -> fine -> coarse is exact; fine -> coarse -> fine is off by
        // at most half a coarse tick expressed in fine units, i.e. one unit
        // of the coarse base.
        let pairs = [
            (TB_25, TB_90K),
            (TB_NTSC, TIME_BASE_Q),
            (TB_44K1, TIME_BASE_Q),
            (TB_90K, TIME_BASE_Q),
        ];
        for (coarse, fine) in pairs {
            for x in (-5000i64..5000).step_by(37) {
                let there = rescale_q(x, coarse, fine).unwrap();
                let back = rescale_q(there, fine, coarse).unwrap();
                assert!((back - x).abs() <= 1, "{x}: {coarse} -> {fine} -> {back}");
            }
        }
    }

    #[test]
    fn test_near_inf_rounds_half_away_from_zero() {
        assert_eq!(rescale_rnd(1, 1, 2, Rounding::NearInf), Some(1));
        assert_eq!(rescale_rnd(-1, 1, 2, Rounding::NearInf), Some(-1));
        assert_eq!(rescale_rnd(3, 1, 2, Rounding::NearInf), Some(2));
        assert_eq!(rescale_rnd(1, 1, 3, Rounding::NearInf), Some(0));
        assert_eq!(rescale_rnd(2, 1, 3, Rounding::NearInf), Some(1));
        assert_eq!(rescale_rnd(-2, 1, 3, Rounding::NearInf), Some(-1));
    }

    #[test]
    fn test_directed_rounding() {
        assert_eq!(rescale_rnd(7, 1, 2, Rounding::Zero), Some(3));
        assert_eq!(rescale_rnd(-7, 1, 2, Rounding::Zero), Some(-3));
        assert_eq!(rescale_rnd(7, 1, 2, Rounding::Down), Some(3));
        assert_eq!(rescale_rnd(-7, 1, 2, Rounding::Down), Some(-4));
        assert_eq!(rescale_rnd(7, 1, 2, Rounding::Up), Some(4));
        assert_eq!(rescale_rnd(-7, 1, 2, Rounding::Up), Some(-3));
        assert_eq!(rescale_rnd(7, 1, 2, Rounding::Inf), Some(4));
        assert_eq!(rescale_rnd(-7, 1, 2, Rounding::Inf), Some(-4));
        assert_eq!(rescale_rnd(8, 1, 2, Rounding::Inf), Some(4));
    }

    #[test]
    fn test_wide_intermediate() {
        // a * b overflows 64 bits but the quotient fits
        let x = 9_000_000_000_000i64;
        assert_eq!(rescale_q(x, TB_90K, TIME_BASE_Q), Some(100_000_000_000_000));
        let scaled = rescale_q(i64::MAX, TIME_BASE_Q, TB_90K).unwrap();
        assert!(scaled > 0 && scaled < i64::MAX / 10);
        // quotient itself overflows
        assert_eq!(rescale_q(i64::MAX, TB_25, TB_90K), None);
    }

    #[test]
    fn test_zero_divisor_is_unset() {
        let bad = Rational { num: 0, den: 1 };
        assert_eq!(rescale_q(10, TB_25, bad), None);
        assert_eq!(rescale_ts(Some(10), TB_25, bad), None);
    }

    #[test]
    fn test_from_f64() {
        assert_eq!(Rational::from_f64(0.5, 100), Rational::new(1, 2));
        assert_eq!(Rational::from_f64(30000.0 / 1001.0, 100_000), Rational::new(30000, 1001));
        assert_eq!(Rational::from_f64(-0.25, 10), Rational::new(-1, 4));
        assert_eq!(Rational::from_f64(25.0, 1000), Rational::new(25, 1));
        assert_eq!(Rational::from_f64(f64::NAN, 10), Rational::new(0, 1));
        assert_eq!(Rational::from_f64(f64::INFINITY, 10), Rational::new(10, 1));
        let pi = Rational::from_f64(std::f64::consts::PI, 1000);
        assert_eq!(pi, Rational::new(355, 113));
    }

    #[test]
    fn test_helpers() {
        assert_eq!(TB_90K.invert(), Rational::new(90000, 1));
        assert!(TB_25.is_valid());
        assert!(!Rational { num: 0, den: 1 }.is_valid());
        assert_eq!(TB_NTSC.to_string(), "1001/30000");
        assert_eq!(format!("{:?}", TIME_BASE_Q), "1/1000000");
        let r: Rational = (24000, 1001).into();
        assert_eq!(r, Rational::new(24000, 1001));
    }

    #[test]
    #[should_panic(expected = "denominator cannot be zero")]
    fn test_zero_denominator_panics() {
        Rational::new(1, 0);
    }
}
