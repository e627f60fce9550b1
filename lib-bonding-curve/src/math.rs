//! Curve Math Oracle
//!
//! Pure, deterministic power and summation primitives used by the pricing
//! evaluator.
//!
//! # Design Principles
//!
//! 1. **No floats** - all arithmetic is integer, 256-bit intermediates
//! 2. **Deterministic** - same inputs produce identical outputs on every platform
//! 3. **Checked** - overflow surfaces as `ArithmeticFault`, never wraps
//!
//! `pow` returns a rational `(numerator, denominator)` where the denominator is
//! a power of two and the numerator is the floor of the exact value scaled by
//! it. `int_power_sum` is the exact Faulhaber closed form for powers 0-10.

use lib_types::Amount;
use uint::construct_uint;

use crate::errors::{CurveError, CurveResult};
use crate::types::MAX_CLOSED_FORM_EXPONENT;

construct_uint! {
    /// 256-bit unsigned integer for intermediate curve math.
    pub struct U256(4);
}

/// Upper bound on the binary precision of `pow` results
pub const MAX_POW_PRECISION: usize = 64;

/// Bernoulli numbers B0..B10 (B1 = +1/2) scaled by [`BERNOULLI_SCALE`]
const BERNOULLI_SCALED: [i64; 11] = [2310, 1155, 385, 0, -77, 0, 55, 0, -77, 0, 175];

/// lcm of the Bernoulli denominators up to B10
const BERNOULLI_SCALE: u128 = 2310;

/// Power and summation capability consumed by the pricing evaluator
pub trait CurveMath {
    /// Rational approximation of `(base_n / base_d)^(exp_n / exp_d)`
    ///
    /// # Returns
    /// `(numerator, denominator)`, rounded down
    fn pow(&self, base_n: Amount, base_d: Amount, exp_n: u32, exp_d: u32) -> CurveResult<(Amount, Amount)>;

    /// Exact `Σ_{i=1}^{upper} i^power`
    fn int_power_sum(&self, power: u32, upper: u64) -> CurveResult<Amount>;
}

/// Reference math oracle with exact integer results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExactCurveMath;

impl CurveMath for ExactCurveMath {
    fn pow(&self, base_n: Amount, base_d: Amount, exp_n: u32, exp_d: u32) -> CurveResult<(Amount, Amount)> {
        if base_d == 0 || exp_d == 0 {
            return Err(CurveError::ArithmeticFault("pow division by zero"));
        }

        // x^(n/d) = x^q · x^(r/d) with n/d in lowest terms, so only the
        // fractional part goes through the root
        let g = gcd(exp_n, exp_d);
        let (exp_n, exp_d) = (exp_n / g, exp_d / g);
        let (whole, rem) = (exp_n / exp_d, exp_n % exp_d);

        let overflow = || CurveError::ArithmeticFault("pow base overflow");
        let int_num = checked_pow(U256::from(base_n), whole).ok_or_else(overflow)?;
        let int_den = checked_pow(U256::from(base_d), whole).ok_or_else(overflow)?;
        let num = checked_pow(U256::from(base_n), rem).ok_or_else(overflow)?;
        let den = checked_pow(U256::from(base_d), rem).ok_or_else(overflow)?;

        // Largest precision whose scaled radicand and scaled product still fit
        let root_degree = exp_d as usize;
        let root_bits = (num.bits() + root_degree - 1) / root_degree;
        let mut precision = (255usize.saturating_sub(num.bits()) / root_degree)
            .min(255usize.saturating_sub(int_num.bits() + root_bits))
            .min(MAX_POW_PRECISION);
        let radicand = (num << (precision * root_degree)) / den;

        let mut root = integer_root(radicand, exp_d)
            .checked_mul(int_num)
            .ok_or(CurveError::ArithmeticFault("pow result exceeds 256 bits"))?
            / int_den;
        if root.bits() > 128 {
            let excess = root.bits() - 128;
            if excess > precision {
                return Err(CurveError::ArithmeticFault("pow result exceeds 128 bits"));
            }
            root = root >> excess;
            precision -= excess;
        }

        Ok((root.low_u128(), 1u128 << precision))
    }

    fn int_power_sum(&self, power: u32, upper: u64) -> CurveResult<Amount> {
        if power > MAX_CLOSED_FORM_EXPONENT {
            return Err(CurveError::ArithmeticFault("power sum exponent above closed-form bound"));
        }
        if upper == 0 {
            return Ok(0);
        }

        let n = U256::from(upper);
        let overflow = CurveError::ArithmeticFault("power sum overflow");
        let mut positive = U256::zero();
        let mut negative = U256::zero();
        // C(power + 1, j)
        let mut binomial: u128 = 1;

        for j in 0..=power {
            let bernoulli = BERNOULLI_SCALED[j as usize];
            if bernoulli != 0 {
                let term = checked_pow(n, power + 1 - j)
                    .and_then(|p| p.checked_mul(U256::from(binomial)))
                    .and_then(|p| p.checked_mul(U256::from(bernoulli.unsigned_abs())))
                    .ok_or_else(|| overflow.clone())?;
                if bernoulli > 0 {
                    positive = positive.checked_add(term).ok_or_else(|| overflow.clone())?;
                } else {
                    negative = negative.checked_add(term).ok_or_else(|| overflow.clone())?;
                }
            }
            binomial = binomial * (power + 1 - j) as u128 / (j + 1) as u128;
        }

        let total = positive
            .checked_sub(negative)
            .ok_or(CurveError::ArithmeticFault("power sum underflow"))?;
        let denominator = U256::from(BERNOULLI_SCALE * (power as u128 + 1));
        narrow(total / denominator)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// `base^exp`, `None` on overflow
pub fn checked_pow(base: U256, mut exp: u32) -> Option<U256> {
    let mut result = U256::one();
    let mut square = base;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.checked_mul(square)?;
        }
        exp >>= 1;
        if exp > 0 {
            square = square.checked_mul(square)?;
        }
    }
    Some(result)
}

/// Largest `r` with `r^degree <= x`
pub fn integer_root(x: U256, degree: u32) -> U256 {
    if degree == 1 || x.is_zero() {
        return x;
    }

    let bound_bits = (x.bits() + degree as usize - 1) / degree as usize;
    let mut lo = U256::zero();
    let mut hi = (U256::one() << bound_bits) - U256::one();
    while lo < hi {
        let mid = lo + (hi - lo + U256::one()) / 2;
        match checked_pow(mid, degree) {
            Some(p) if p <= x => lo = mid,
            _ => hi = mid - U256::one(),
        }
    }
    lo
}

/// Narrow a 256-bit intermediate back to an [`Amount`]
pub fn narrow(value: U256) -> CurveResult<Amount> {
    if value.bits() > 128 {
        Err(CurveError::ArithmeticFault("value exceeds 128 bits"))
    } else {
        Ok(value.low_u128())
    }
}

/// `a * b / d` with a 256-bit product
pub fn mul_div(a: Amount, b: Amount, d: Amount) -> CurveResult<Amount> {
    if d == 0 {
        return Err(CurveError::ArithmeticFault("division by zero"));
    }
    let product = U256::from(a)
        .checked_mul(U256::from(b))
        .ok_or(CurveError::ArithmeticFault("mul_div overflow"))?;
    narrow(product / U256::from(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_power_sum(power: u32, upper: u64) -> u128 {
        (1..=upper as u128).map(|i| i.pow(power)).sum()
    }

    #[test]
    fn test_power_sum_matches_iteration() {
        let math = ExactCurveMath;
        for power in 0..=MAX_CLOSED_FORM_EXPONENT {
            for upper in [0u64, 1, 2, 3, 7, 25, 60] {
                assert_eq!(
                    math.int_power_sum(power, upper).unwrap(),
                    brute_power_sum(power, upper),
                    "power={} upper={}",
                    power,
                    upper
                );
            }
        }
    }

    #[test]
    fn test_power_sum_squares() {
        let math = ExactCurveMath;
        // 1 + 4 + 9
        assert_eq!(math.int_power_sum(2, 3).unwrap(), 14);
        // n(n+1)/2
        assert_eq!(math.int_power_sum(1, 1_000_000).unwrap(), 500_000_500_000);
    }

    #[test]
    fn test_power_sum_rejects_high_exponent() {
        let math = ExactCurveMath;
        assert!(matches!(
            math.int_power_sum(11, 5),
            Err(CurveError::ArithmeticFault(_))
        ));
    }

    #[test]
    fn test_power_sum_overflow_faults() {
        let math = ExactCurveMath;
        assert!(matches!(
            math.int_power_sum(10, u64::MAX),
            Err(CurveError::ArithmeticFault(_))
        ));
    }

    #[test]
    fn test_pow_exact_values() {
        let math = ExactCurveMath;

        let (num, den) = math.pow(4, 1, 1, 2).unwrap();
        assert_eq!(num / den, 2);
        assert_eq!(num % den, 0);

        let (num, den) = math.pow(8, 1, 2, 3).unwrap();
        assert_eq!(num, 4 * den);

        let (num, den) = math.pow(9, 4, 1, 2).unwrap();
        assert_eq!(num * 2, 3 * den);

        let (num, den) = math.pow(1, 1, 3, 2).unwrap();
        assert_eq!(num, den);

        let (num, _) = math.pow(0, 1, 3, 2).unwrap();
        assert_eq!(num, 0);
    }

    #[test]
    fn test_pow_rounds_down() {
        let math = ExactCurveMath;
        let (num, den) = math.pow(2, 1, 1, 2).unwrap();
        assert_eq!(den, 1u128 << MAX_POW_PRECISION);

        // num^2 <= 2 * den^2 < (num + 1)^2
        let num = U256::from(num);
        let den = U256::from(den);
        let two_den_sq = den * den * U256::from(2u8);
        assert!(num * num <= two_den_sq);
        assert!((num + U256::one()) * (num + U256::one()) > two_den_sq);
    }

    #[test]
    fn test_pow_reduces_precision_for_large_results() {
        let math = ExactCurveMath;
        let (num, den) = math.pow(u64::MAX as u128, 1, 3, 2).unwrap();
        assert!(den < 1u128 << MAX_POW_PRECISION);
        assert!(num > 0);
    }

    #[test]
    fn test_pow_splits_integer_part() {
        let math = ExactCurveMath;

        // 4^(6/4) reduces to 4^1 · 4^(1/2)
        let (num, den) = math.pow(4, 1, 6, 4).unwrap();
        assert_eq!(num, 8 * den);

        // 10^100 alone overflows 256 bits; 10^(100/3) is about 2.154e33
        let (num, den) = math.pow(10, 1, 100, 3).unwrap();
        assert_eq!(num / den / 10u128.pow(21), 2_154_434_690_031);
    }

    #[test]
    fn test_pow_zero_denominator() {
        let math = ExactCurveMath;
        assert!(math.pow(4, 0, 1, 2).is_err());
        assert!(math.pow(4, 1, 1, 0).is_err());
    }

    #[test]
    fn test_integer_root() {
        assert_eq!(integer_root(U256::from(26u8), 3), U256::from(2u8));
        assert_eq!(integer_root(U256::from(27u8), 3), U256::from(3u8));
        assert_eq!(integer_root(U256::from(1u8), 5), U256::one());
        assert_eq!(integer_root(U256::zero(), 2), U256::zero());
    }

    #[test]
    fn test_mul_div() {
        assert_eq!(mul_div(u128::MAX, 2, 4).unwrap(), u128::MAX / 2);
        assert!(mul_div(1, 1, 0).is_err());
        assert!(mul_div(u128::MAX, u128::MAX, 1).is_err());
    }
}
