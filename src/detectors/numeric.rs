//! Exact decimal arithmetic for fact value comparison.
//!
//! Reported values are decimal strings; comparing them as floats would make
//! `0.1 + 0.2` style noise decide whether two facts conflict. Values here are
//! `mantissa × 10^exponent` with an `i128` mantissa. Anything that does not
//! fit (more than 38 significant digits, or a rescale that overflows) yields
//! `None`, and callers fall back to exact string comparison.

use std::cmp::Ordering;

/// Largest number of significant digits an `i128` mantissa can hold safely.
const MAX_DIGITS: usize = 38;

/// Exact decimal `mantissa × 10^exponent`, normalized so equal values are equal structs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: i128,
    exponent: i32,
}

impl Decimal {
    /// Build and normalize.
    pub fn new(mantissa: i128, exponent: i32) -> Self {
        let (mut mantissa, mut exponent) = (mantissa, exponent);
        if mantissa == 0 {
            return Self { mantissa: 0, exponent: 0 };
        }
        while mantissa % 10 == 0 {
            mantissa /= 10;
            exponent += 1;
        }
        Self { mantissa, exponent }
    }

    /// Parse `[-+]digits[.digits][(e|E)[-+]digits]`, ignoring surrounding whitespace.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (negative, unsigned) = match text.as_bytes().first()? {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };
        let (coefficient, exp_part) = match unsigned.find(['e', 'E']) {
            Some(pos) => (&unsigned[..pos], Some(&unsigned[pos + 1..])),
            None => (unsigned, None),
        };
        let mut exponent: i32 = match exp_part {
            Some(e) if !e.is_empty() => e.parse().ok()?,
            Some(_) => return None,
            None => 0,
        };

        let (int_part, frac_part) = match coefficient.split_once('.') {
            Some((i, f)) => (i, f),
            None => (coefficient, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        exponent = exponent.checked_sub(i32::try_from(frac_part.len()).ok()?)?;

        let digits = format!("{int_part}{frac_part}");
        let digits = digits.trim_start_matches('0');
        let significant = digits.trim_end_matches('0');
        exponent = exponent.checked_add(i32::try_from(digits.len() - significant.len()).ok()?)?;
        if significant.is_empty() {
            return Some(Self::new(0, 0));
        }
        if significant.len() > MAX_DIGITS {
            return None;
        }
        let magnitude: i128 = significant.parse().ok()?;
        Some(Self::new(if negative { -magnitude } else { magnitude }, exponent))
    }

    /// Whether the value is zero.
    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// Exponent of the most significant digit (`adjusted()` in IEEE 854 terms).
    pub fn adjusted(&self) -> i32 {
        let digits = self.mantissa.unsigned_abs().checked_ilog10().map_or(0, |d| d as i32);
        self.exponent + digits
    }

    fn mantissa_at(&self, exponent: i32) -> Option<i128> {
        let shift = u32::try_from(self.exponent.checked_sub(exponent)?).ok()?;
        10i128.checked_pow(shift)?.checked_mul(self.mantissa)
    }

    fn aligned(&self, other: &Self) -> Option<(i128, i128, i32)> {
        let exponent = self.exponent.min(other.exponent);
        Some((self.mantissa_at(exponent)?, other.mantissa_at(exponent)?, exponent))
    }

    /// Exact sum, or `None` on overflow.
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        let (a, b, e) = self.aligned(other)?;
        Some(Self::new(a.checked_add(b)?, e))
    }

    /// Exact difference, or `None` on overflow.
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        let (a, b, e) = self.aligned(other)?;
        Some(Self::new(a.checked_sub(b)?, e))
    }

    /// Exact comparison, or `None` on overflow.
    pub fn checked_cmp(&self, other: &Self) -> Option<Ordering> {
        let (a, b, _) = self.aligned(other)?;
        Some(a.cmp(&b))
    }
}

/// Closed interval a reported value stands for after rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundingInterval {
    /// Lower bound.
    pub low: Decimal,
    /// Upper bound.
    pub high: Decimal,
}

impl RoundingInterval {
    /// Interval implied by `decimals` or, failing that, `precision`.
    ///
    /// `decimals = d` gives `v ± 0.5·10^-d`. `precision = p > 0` on a non-zero
    /// value gives `v ± 0.5·10^(adjusted(v) - p + 1)`. Otherwise the value is
    /// exact. `INF` or unparseable attributes count as absent.
    pub fn for_value(value: Decimal, decimals: Option<&str>, precision: Option<&str>) -> Option<Self> {
        let parse_int = |raw: Option<&str>| raw.and_then(|r| r.trim().parse::<i32>().ok());
        let half_unit_exponent = match (parse_int(decimals), parse_int(precision)) {
            (Some(d), _) => Some(d.checked_neg()?.checked_sub(1)?),
            (None, Some(p)) if p > 0 && !value.is_zero() => Some(value.adjusted().checked_sub(p)?),
            _ => None,
        };
        match half_unit_exponent {
            None => Some(Self { low: value, high: value }),
            Some(e) => {
                let tolerance = Decimal::new(5, e);
                Some(Self {
                    low: value.checked_sub(&tolerance)?,
                    high: value.checked_add(&tolerance)?,
                })
            }
        }
    }
}

/// Whether a set of intervals has no common point. `None` on overflow.
pub fn intervals_disjoint(intervals: &[RoundingInterval]) -> Option<bool> {
    let mut iter = intervals.iter();
    let first = iter.next()?;
    let (mut max_low, mut min_high) = (first.low, first.high);
    for interval in iter {
        if interval.low.checked_cmp(&max_low)? == Ordering::Greater {
            max_low = interval.low;
        }
        if interval.high.checked_cmp(&min_high)? == Ordering::Less {
            min_high = interval.high;
        }
    }
    Some(max_low.checked_cmp(&min_high)? == Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(text: &str) -> Decimal {
        Decimal::parse(text).unwrap()
    }

    #[test]
    fn test_parse_normalizes_equal_values() {
        assert_eq!(d("1000"), d("1000.00"));
        assert_eq!(d("1e3"), d("1000"));
        assert_eq!(d("-0.50"), d("-.5"));
        assert_eq!(d("0"), d("-0.000"));
        assert_eq!(d(" 42 "), d("+42"));
    }

    #[test]
    fn test_parse_rejects_non_numbers() {
        for bad in ["", "-", "1,000", "abc", "1.2.3", "1e", "NaN", "Infinity"] {
            assert!(Decimal::parse(bad).is_none(), "{bad:?}");
        }
    }

    #[test]
    fn test_parse_rejects_oversized_mantissa() {
        assert!(Decimal::parse(&"1".repeat(39)).is_none());
        assert!(Decimal::parse(&format!("1{}", "0".repeat(60))).is_some());
    }

    #[test]
    fn test_adjusted() {
        assert_eq!(d("1234.5").adjusted(), 3);
        assert_eq!(d("0.00123").adjusted(), -3);
        assert_eq!(d("1000000").adjusted(), 6);
    }

    #[test]
    fn test_interval_from_decimals() {
        let i = RoundingInterval::for_value(d("1000000"), Some("-6"), None).unwrap();
        assert_eq!(i.low, d("500000"));
        assert_eq!(i.high, d("1500000"));
        let exact = RoundingInterval::for_value(d("12"), Some("INF"), None).unwrap();
        assert_eq!(exact.low, exact.high);
    }

    #[test]
    fn test_interval_from_precision() {
        let i = RoundingInterval::for_value(d("1234"), None, Some("2")).unwrap();
        assert_eq!(i.low, d("1184"));
        assert_eq!(i.high, d("1284"));
        let zero = RoundingInterval::for_value(d("0"), None, Some("2")).unwrap();
        assert_eq!(zero.low, zero.high);
    }

    #[test]
    fn test_disjoint_intervals() {
        let a = RoundingInterval::for_value(d("1000000"), Some("0"), None).unwrap();
        let b = RoundingInterval::for_value(d("1500000"), Some("0"), None).unwrap();
        assert_eq!(intervals_disjoint(&[a, b]), Some(true));

        let c = RoundingInterval::for_value(d("1000000"), Some("-6"), None).unwrap();
        let e = RoundingInterval::for_value(d("1400000"), Some("-6"), None).unwrap();
        assert_eq!(intervals_disjoint(&[c, e]), Some(false));
    }
}
