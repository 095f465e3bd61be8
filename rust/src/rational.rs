//! Exact rational arithmetic for job sizes, ratios and load ceilings.
//!
//! Every quantity the search touches is an exact fraction. Before a query reaches the
//! oracle, values are multiplied by a common denominator so the oracle works on plain
//! integers. That conversion is checked: it never rounds and never wraps.

use num_integer::Integer;
use num_rational::Ratio;
use num_traits::{CheckedAdd, CheckedDiv, CheckedMul, Signed, ToPrimitive, Zero};

/// Exact job size / ratio type used throughout the crate.
pub type Rational = Ratio<i128>;

/// Widest magnitude (in bits) a scaled value may occupy.
///
/// Keeps every scaled size and ceiling inside `i64` with room for one addition.
pub const MAX_SCALED_BITS: u32 = 62;

/// Errors raised by parsing and scaling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RationalError {
    /// Text could not be read as a fraction, decimal or integer.
    Parse(String),
    /// A scaled value (or the scale factor itself) needs more than `MAX_SCALED_BITS`.
    ScaleOverflow(String),
    /// The scale factor is not a multiple of the value's denominator.
    NotIntegral { value: String, scale_factor: i128 },
}

impl std::fmt::Display for RationalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(s) => write!(f, "Cannot parse rational number: {:?}", s),
            Self::ScaleOverflow(s) => write!(f, "Scaled value too wide for exact integers: {}", s),
            Self::NotIntegral {
                value,
                scale_factor,
            } => write!(f, "{} is not integral after scaling by {}", value, scale_factor),
        }
    }
}

impl std::error::Error for RationalError {}

/// Parse `"p/q"`, decimal (`"1.25"`, `"-0.5"`) or integer text.
pub fn parse_rational(text: &str) -> Result<Rational, RationalError> {
    let trimmed = text.trim();
    let err = || RationalError::Parse(text.to_string());

    if let Some((numer, denom)) = trimmed.split_once('/') {
        let numer: i128 = numer.trim().parse().map_err(|_| err())?;
        let denom: i128 = denom.trim().parse().map_err(|_| err())?;
        if denom == 0 {
            return Err(err());
        }
        return Ok(Rational::new(numer, denom));
    }

    if let Some((whole, frac)) = trimmed.split_once('.') {
        let negative = whole.starts_with('-');
        let digits = whole.trim_start_matches(['-', '+']);
        if frac.is_empty() && digits.is_empty() {
            return Err(err());
        }
        if !frac.chars().all(|c| c.is_ascii_digit()) || !digits.chars().all(|c| c.is_ascii_digit())
        {
            return Err(err());
        }
        let whole_value: i128 = if digits.is_empty() {
            0
        } else {
            digits.parse().map_err(|_| err())?
        };
        let frac_value: i128 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| err())?
        };
        let step = 10i128.checked_pow(frac.len() as u32).ok_or_else(err)?;
        let magnitude = Rational::from_integer(whole_value) + Rational::new(frac_value, step);
        return Ok(if negative { -magnitude } else { magnitude });
    }

    let value: i128 = trimmed.parse().map_err(|_| err())?;
    Ok(Rational::from_integer(value))
}

fn checked_lcm(a: i128, b: i128) -> Option<i128> {
    let g = a.gcd(&b);
    if g == 0 {
        return Some(0);
    }
    (a / g).checked_mul(b).map(|v| v.abs())
}

/// Least common multiple of the denominators of `ratio` and every value in `values`.
///
/// This is the scale factor that maps all of them onto integers exactly.
pub fn common_denominator<'a, I>(values: I, ratio: &Rational) -> Result<i128, RationalError>
where
    I: IntoIterator<Item = &'a Rational>,
{
    let mut lcm = *ratio.denom();
    for value in values {
        lcm = checked_lcm(lcm, *value.denom()).ok_or_else(|| {
            RationalError::ScaleOverflow(format!("common denominator beyond i128 at {}", value))
        })?;
        if lcm.unsigned_abs() >> MAX_SCALED_BITS != 0 {
            return Err(RationalError::ScaleOverflow(format!(
                "common denominator {} exceeds {} bits",
                lcm, MAX_SCALED_BITS
            )));
        }
    }
    Ok(lcm)
}

/// Multiply `value` by `scale_factor`, requiring an exact integer that fits the safe width.
pub fn scale(value: &Rational, scale_factor: i128) -> Result<i64, RationalError> {
    if scale_factor % value.denom() != 0 {
        return Err(RationalError::NotIntegral {
            value: value.to_string(),
            scale_factor,
        });
    }
    let product = value
        .numer()
        .checked_mul(&(scale_factor / value.denom()))
        .ok_or_else(|| RationalError::ScaleOverflow(format!("{} * {}", value, scale_factor)))?;
    if product.unsigned_abs() >> MAX_SCALED_BITS != 0 {
        return Err(RationalError::ScaleOverflow(format!(
            "{} * {} = {} exceeds {} bits",
            value, scale_factor, product, MAX_SCALED_BITS
        )));
    }
    // Guarded by the width check above
    Ok(product as i64)
}

/// Inverse of [`scale`].
pub fn unscale(scaled: i64, scale_factor: i128) -> Rational {
    Rational::new(scaled as i128, scale_factor)
}

/// `10^precision` as the grid step denominator.
pub fn precision_step(precision: u32) -> Result<i128, RationalError> {
    10i128
        .checked_pow(precision)
        .filter(|step| step.unsigned_abs() >> MAX_SCALED_BITS == 0)
        .ok_or_else(|| RationalError::ScaleOverflow(format!("precision of {} digits", precision)))
}

fn grid_scaled(value: &Rational, step: i128) -> Result<Rational, RationalError> {
    value
        .checked_mul(&Rational::from_integer(step))
        .ok_or_else(|| RationalError::ScaleOverflow(format!("{} on grid 1/{}", value, step)))
}

/// Largest grid index `k` with `k / step <= value`.
pub fn grid_floor(value: &Rational, step: i128) -> Result<i128, RationalError> {
    Ok(grid_scaled(value, step)?.floor().to_integer())
}

/// Smallest grid index `k` with `k / step >= value`.
pub fn grid_ceil(value: &Rational, step: i128) -> Result<i128, RationalError> {
    Ok(grid_scaled(value, step)?.ceil().to_integer())
}

/// Sum that reports overflow instead of wrapping.
pub fn checked_sum<'a, I>(values: I) -> Result<Rational, RationalError>
where
    I: IntoIterator<Item = &'a Rational>,
{
    values
        .into_iter()
        .try_fold(Rational::from_integer(0), |acc, value| checked_add(&acc, value))
}

pub fn checked_add(a: &Rational, b: &Rational) -> Result<Rational, RationalError> {
    a.checked_add(b)
        .ok_or_else(|| RationalError::ScaleOverflow(format!("{} + {}", a, b)))
}

pub fn checked_div(a: &Rational, b: &Rational) -> Result<Rational, RationalError> {
    a.checked_div(b)
        .ok_or_else(|| RationalError::ScaleOverflow(format!("{} / {}", a, b)))
}

/// Lossy conversion for logs and plots.
pub fn to_f64(value: &Rational) -> f64 {
    let numer = value.numer().to_f64().unwrap_or(f64::NAN);
    let denom = value.denom().to_f64().unwrap_or(f64::NAN);
    numer / denom
}

/// True when `value` is strictly positive.
pub fn is_positive(value: &Rational) -> bool {
    !value.is_zero() && value.is_positive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i128, d: i128) -> Rational {
        Rational::new(n, d)
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(parse_rational("3/2").unwrap(), r(3, 2));
        assert_eq!(parse_rational(" 6 / 4 ").unwrap(), r(3, 2));
        assert_eq!(parse_rational("1.25").unwrap(), r(5, 4));
        assert_eq!(parse_rational("-0.5").unwrap(), r(-1, 2));
        assert_eq!(parse_rational(".5").unwrap(), r(1, 2));
        assert_eq!(parse_rational("7").unwrap(), r(7, 1));
        assert_eq!(parse_rational("0").unwrap(), r(0, 1));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_rational("").is_err());
        assert!(parse_rational("1/0").is_err());
        assert!(parse_rational("abc").is_err());
        assert!(parse_rational("1.2.3").is_err());
        assert!(parse_rational(".").is_err());
        assert!(parse_rational("1.x").is_err());
    }

    #[test]
    fn test_common_denominator() {
        let jobs = vec![r(1, 3), r(5, 4), r(2, 1)];
        assert_eq!(common_denominator(&jobs, &r(3, 2)).unwrap(), 12);
        assert_eq!(common_denominator(std::iter::empty(), &r(7, 5)).unwrap(), 5);
    }

    #[test]
    fn test_scaling_round_trip() {
        let jobs = vec![r(1, 3), r(5, 4), r(7, 6), r(11, 10), r(0, 1)];
        let ceiling = r(17, 9);
        let ratio = r(3, 2);
        let mut all = jobs.clone();
        all.push(ceiling);
        let factor = common_denominator(&all, &ratio).unwrap();
        for value in &all {
            let scaled = scale(value, factor).unwrap();
            assert_eq!(unscale(scaled, factor), *value);
            assert_eq!(Rational::from_integer(scaled as i128) / factor, *value);
        }
    }

    #[test]
    fn test_scale_requires_multiple_of_denominator() {
        let err = scale(&r(1, 3), 4).unwrap_err();
        assert!(matches!(err, RationalError::NotIntegral { .. }));
    }

    #[test]
    fn test_scale_overflow_is_reported() {
        let huge = Rational::from_integer(1i128 << 61);
        assert!(scale(&huge, 1).is_ok());
        assert!(matches!(
            scale(&huge, 2),
            Err(RationalError::ScaleOverflow(_))
        ));

        let coprime: Vec<Rational> = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53]
            .iter()
            .map(|p| r(1, *p))
            .collect();
        assert!(matches!(
            common_denominator(&coprime, &r(3, 2)),
            Err(RationalError::ScaleOverflow(_))
        ));
    }

    #[test]
    fn test_checked_sum_reports_overflow() {
        assert_eq!(checked_sum(&[r(1, 2), r(1, 3)]).unwrap(), r(5, 6));
        let wide = [r(1, (1i128 << 100) + 1), r(1, (1i128 << 100) + 3)];
        assert!(matches!(
            checked_sum(&wide),
            Err(RationalError::ScaleOverflow(_))
        ));
        assert!(checked_div(&r(1, i128::MAX), &r(2, 1)).is_err());
    }

    #[test]
    fn test_grid_rounding() {
        let step = precision_step(2).unwrap();
        assert_eq!(step, 100);
        assert_eq!(grid_floor(&r(2, 3), step).unwrap(), 66);
        assert_eq!(grid_ceil(&r(2, 3), step).unwrap(), 67);
        assert_eq!(grid_floor(&r(1, 2), step).unwrap(), 50);
        assert_eq!(grid_ceil(&r(1, 2), step).unwrap(), 50);
        assert!(precision_step(40).is_err());
    }

    #[test]
    fn test_to_f64() {
        assert!((to_f64(&r(3, 2)) - 1.5).abs() < 1e-12);
        assert!(is_positive(&r(1, 9)));
        assert!(!is_positive(&r(0, 1)));
        assert!(!is_positive(&r(-1, 9)));
    }
}
