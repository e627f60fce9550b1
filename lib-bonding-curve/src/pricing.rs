//! Pricing Evaluator
//!
//! Evaluates the definite sum of `price(i) = m · i^(n/d) + v` over contiguous
//! unit ranges.
//!
//! # Strategies
//! - **Integer exponent ≤ 10**: closed form `m · (S(p, b) - S(p, a - 1)) + v · q`
//! - **Integer exponent > 10**: unit-by-unit `m · i^p + v`
//! - **Fractional exponent**: unit-by-unit `v + m · num / den`, memoized per index
//!
//! # Cache Access
//! Quotes (`cost_to_mint`, `return_on_burn`) read the cache but never write it.
//! Settlement variants collect newly computed prices into a caller-owned
//! [`PriceCache`] that is only merged when the settlement commits.

use lib_types::{Amount, UnitIndex};
use tracing::debug;

use crate::errors::{CurveError, CurveResult};
use crate::math::{checked_pow, mul_div, narrow, CurveMath, ExactCurveMath, U256};
use crate::state::{CurveState, PriceCache};
use crate::types::{CurveParams, PricingMode};

/// Curve pricing over a pluggable math oracle
#[derive(Debug, Clone, Default)]
pub struct PricingEvaluator<M: CurveMath = ExactCurveMath> {
    math: M,
}

impl<M: CurveMath> PricingEvaluator<M> {
    pub fn new(math: M) -> Self {
        Self { math }
    }

    pub fn math(&self) -> &M {
        &self.math
    }

    /// Price of a single unit, computed fresh
    ///
    /// Unit indices are 1-based; index 0 is rejected.
    pub fn unit_price(&self, params: &CurveParams, index: UnitIndex) -> CurveResult<Amount> {
        if index == 0 {
            return Err(CurveError::ArithmeticFault("unit index starts at 1"));
        }

        match params.mode {
            PricingMode::Integer { exponent } => {
                let scaled = checked_pow(U256::from(index), exponent)
                    .and_then(|p| p.checked_mul(U256::from(params.slope)))
                    .and_then(|p| p.checked_add(U256::from(params.virtual_balance)))
                    .ok_or(CurveError::ArithmeticFault("unit price overflow"))?;
                narrow(scaled)
            }
            PricingMode::Fractional {
                numerator,
                denominator,
            } => {
                let (num, den) = self.math.pow(index as Amount, 1, numerator, denominator)?;
                mul_div(params.slope, num, den)?
                    .checked_add(params.virtual_balance)
                    .ok_or(CurveError::ArithmeticFault("unit price overflow"))
            }
        }
    }

    /// Quote the cost of the next `quantity` units. Never writes the cache.
    pub fn cost_to_mint(&self, state: &CurveState, quantity: u64) -> CurveResult<Amount> {
        let (first, last) = mint_range(state.current_supply(), quantity)?;
        self.range_sum(state, first, last, None)
    }

    /// Quote the net return for burning the top `quantity` units
    ///
    /// Requests above the live supply are clamped to it. The gross curve value
    /// is scaled down by the configured commission rates.
    pub fn return_on_burn(&self, state: &CurveState, quantity: u64) -> CurveResult<Amount> {
        let supply = state.current_supply();
        let (first, last) = burn_range(supply, quantity.min(supply));
        let gross = self.range_sum(state, first, last, None)?;
        state.fees().net_of_commission(gross)
    }

    /// Settlement cost of the next `quantity` units
    ///
    /// Fractional prices not yet in the state cache are written to `fills`.
    pub fn settle_mint_cost(
        &self,
        state: &CurveState,
        quantity: u64,
        fills: &mut PriceCache,
    ) -> CurveResult<Amount> {
        let (first, last) = mint_range(state.current_supply(), quantity)?;
        self.range_sum(state, first, last, Some(fills))
    }

    /// Settlement return for burning the top `quantity` units
    ///
    /// Unlike the quote, a request above the live supply is an error.
    pub fn settle_burn_return(
        &self,
        state: &CurveState,
        quantity: u64,
        fills: &mut PriceCache,
    ) -> CurveResult<Amount> {
        let supply = state.current_supply();
        if quantity > supply {
            return Err(CurveError::InvalidQuantity(format!(
                "Cannot burn {} units, supply is {}",
                quantity, supply
            )));
        }
        let (first, last) = burn_range(supply, quantity);
        let gross = self.range_sum(state, first, last, Some(fills))?;
        state.fees().net_of_commission(gross)
    }

    /// Pure `Σ_{i=first}^{last} price(i)` ignoring the cache
    pub fn interval_sum(
        &self,
        params: &CurveParams,
        first: UnitIndex,
        last: UnitIndex,
    ) -> CurveResult<Amount> {
        if first == 0 {
            return Err(CurveError::ArithmeticFault("interval lower bound must be at least 1"));
        }
        if first > last {
            return Ok(0);
        }
        match params.mode {
            PricingMode::Integer { exponent } if params.mode.uses_closed_form() => {
                self.closed_form_sum(params, exponent, first, last)
            }
            _ => {
                let mut total: Amount = 0;
                for index in first..=last {
                    total = add_price(total, self.unit_price(params, index)?)?;
                }
                Ok(total)
            }
        }
    }

    fn range_sum(
        &self,
        state: &CurveState,
        first: UnitIndex,
        last: UnitIndex,
        mut fills: Option<&mut PriceCache>,
    ) -> CurveResult<Amount> {
        if first > last {
            return Ok(0);
        }
        let params = state.params();
        debug!(
            "Pricing units {}..={} with {} strategy ({})",
            first,
            last,
            params.mode.name(),
            params.mode
        );

        if !params.mode.is_fractional() {
            return self.interval_sum(params, first, last);
        }

        let mut total: Amount = 0;
        let mut computed = 0usize;
        for index in first..=last {
            let price = match state.cached_price(index) {
                Some(price) => price,
                None => {
                    let price = self.unit_price(params, index)?;
                    if let Some(fills) = fills.as_deref_mut() {
                        fills.insert(index, price);
                    }
                    computed += 1;
                    price
                }
            };
            total = add_price(total, price)?;
        }

        if computed > 0 {
            debug!(
                "Computed {} uncached fractional prices (staged: {})",
                computed,
                fills.is_some()
            );
        }
        Ok(total)
    }

    fn closed_form_sum(
        &self,
        params: &CurveParams,
        exponent: u32,
        first: UnitIndex,
        last: UnitIndex,
    ) -> CurveResult<Amount> {
        let upper = self.math.int_power_sum(exponent, last)?;
        let lower = self.math.int_power_sum(exponent, first - 1)?;
        let powers = upper
            .checked_sub(lower)
            .ok_or(CurveError::ArithmeticFault("power sum underflow"))?;
        let quantity = (last - first + 1) as Amount;

        params
            .slope
            .checked_mul(powers)
            .and_then(|v| {
                params
                    .virtual_balance
                    .checked_mul(quantity)
                    .and_then(|base| v.checked_add(base))
            })
            .ok_or(CurveError::ArithmeticFault("range cost overflow"))
    }
}

/// `[S + 1, S + quantity]`
fn mint_range(supply: u64, quantity: u64) -> CurveResult<(UnitIndex, UnitIndex)> {
    let first = supply
        .checked_add(1)
        .ok_or(CurveError::ArithmeticFault("supply overflow"))?;
    let last = supply
        .checked_add(quantity)
        .ok_or(CurveError::ArithmeticFault("supply overflow"))?;
    Ok((first, last))
}

/// `[E - quantity + 1, E]`, caller guarantees `quantity <= supply`
fn burn_range(supply: u64, quantity: u64) -> (UnitIndex, UnitIndex) {
    (supply - quantity + 1, supply)
}

fn add_price(total: Amount, price: Amount) -> CurveResult<Amount> {
    total
        .checked_add(price)
        .ok_or(CurveError::ArithmeticFault("range cost overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollateralAsset, CommissionPolicy, FeeConfig, MAX_CLOSED_FORM_EXPONENT};
    use lib_types::Address;

    fn state_with(initial: Amount, slope: Amount, n: u32, d: u32) -> CurveState {
        let params = CurveParams::new(initial, slope, n, d).unwrap();
        CurveState::new(params, CollateralAsset::Native, CommissionPolicy::Deferred)
    }

    fn default_evaluator() -> PricingEvaluator {
        PricingEvaluator::default()
    }

    fn advance(state: &mut CurveState, evaluator: &PricingEvaluator, quantity: u64) {
        let mut fills = PriceCache::new();
        let cost = evaluator.settle_mint_cost(state, quantity, &mut fills).unwrap();
        let mut transition = state.transition();
        transition.total_supply += quantity;
        transition.reserve += cost;
        transition.cache_fills = fills;
        state.commit(transition);
    }

    #[test]
    fn test_squares_scenario() {
        let evaluator = default_evaluator();
        let mut state = state_with(1, 1, 2, 1);

        assert_eq!(evaluator.cost_to_mint(&state, 3).unwrap(), 14);
        advance(&mut state, &evaluator, 3);
        assert_eq!(evaluator.return_on_burn(&state, 2).unwrap(), 13);
    }

    #[test]
    fn test_zero_quantity_quotes_zero() {
        let evaluator = default_evaluator();
        let state = state_with(1, 1, 2, 1);
        assert_eq!(evaluator.cost_to_mint(&state, 0).unwrap(), 0);
        assert_eq!(evaluator.return_on_burn(&state, 0).unwrap(), 0);
    }

    #[test]
    fn test_linear_with_virtual_balance() {
        let evaluator = default_evaluator();
        // m = 2, v = 8: prices 10, 12, 14
        let state = state_with(10, 2, 1, 1);
        assert_eq!(evaluator.unit_price(state.params(), 1).unwrap(), 10);
        assert_eq!(evaluator.cost_to_mint(&state, 3).unwrap(), 36);
    }

    #[test]
    fn test_high_exponent_iterates() {
        let evaluator = default_evaluator();
        let state = state_with(1, 1, 11, 1);
        // 1 + 2048 + 177147
        assert_eq!(evaluator.cost_to_mint(&state, 3).unwrap(), 179_196);
    }

    #[test]
    fn test_steep_fractional_exponent_prices() {
        let evaluator = default_evaluator();
        // 10^(100/3) fits in 128 bits although 10^100 does not fit in 256
        let params = CurveParams::new(1, 1, 100, 3).unwrap();
        let price = evaluator.unit_price(&params, 10).unwrap();
        assert_eq!(price / 10u128.pow(21), 2_154_434_690_031);
    }

    #[test]
    fn test_closed_form_matches_iteration() {
        let evaluator = default_evaluator();
        for exponent in 1..=MAX_CLOSED_FORM_EXPONENT {
            let params = CurveParams::new(7, 3, exponent, 1).unwrap();
            let closed = evaluator.interval_sum(&params, 5, 40).unwrap();
            let iterated = (5..=40u64)
                .map(|i| evaluator.unit_price(&params, i).unwrap())
                .sum::<Amount>();
            assert_eq!(closed, iterated, "exponent {}", exponent);
        }
    }

    #[test]
    fn test_interval_rejects_zero_lower_bound() {
        let evaluator = default_evaluator();
        let params = CurveParams::new(1, 1, 2, 1).unwrap();
        assert!(matches!(
            evaluator.interval_sum(&params, 0, 3),
            Err(CurveError::ArithmeticFault(_))
        ));
        assert!(evaluator.unit_price(&params, 0).is_err());
    }

    #[test]
    fn test_fractional_prices_truncate() {
        let evaluator = default_evaluator();
        // m = 1, v = 0, x^(1/2)
        let state = state_with(1, 1, 1, 2);
        let params = state.params();
        assert_eq!(evaluator.unit_price(params, 1).unwrap(), 1);
        assert_eq!(evaluator.unit_price(params, 2).unwrap(), 1);
        assert_eq!(evaluator.unit_price(params, 4).unwrap(), 2);
        assert_eq!(evaluator.unit_price(params, 8).unwrap(), 2);
        assert_eq!(evaluator.unit_price(params, 9).unwrap(), 3);
    }

    #[test]
    fn test_fractional_three_halves() {
        let evaluator = default_evaluator();
        // m = 10, v = 0: 10 * i^1.5 for i = 1, 4
        let state = state_with(10, 10, 3, 2);
        let params = state.params();
        assert_eq!(evaluator.unit_price(params, 1).unwrap(), 10);
        assert_eq!(evaluator.unit_price(params, 4).unwrap(), 80);
        // 10 * 2^1.5 = 28.28..
        assert_eq!(evaluator.unit_price(params, 2).unwrap(), 28);
    }

    #[test]
    fn test_quote_never_writes_cache() {
        let evaluator = default_evaluator();
        let state = state_with(5, 2, 3, 2);
        let before = state.clone();

        let quoted = evaluator.cost_to_mint(&state, 10).unwrap();
        assert_eq!(state, before);
        assert_eq!(state.cached_prices(), 0);

        let mut fills = PriceCache::new();
        let settled = evaluator.settle_mint_cost(&state, 10, &mut fills).unwrap();
        assert_eq!(quoted, settled);
        assert_eq!(fills.len(), 10);
        assert_eq!(state.cached_prices(), 0);
    }

    #[test]
    fn test_settle_reuses_cached_prices() {
        let evaluator = default_evaluator();
        let mut state = state_with(5, 2, 3, 2);
        advance(&mut state, &evaluator, 4);
        assert_eq!(state.cached_prices(), 4);

        // Burning the top units reads the cache and stages nothing
        let mut fills = PriceCache::new();
        evaluator.settle_burn_return(&state, 4, &mut fills).unwrap();
        assert!(fills.is_empty());

        for index in 1..=4 {
            assert_eq!(
                state.cached_price(index).unwrap(),
                evaluator.unit_price(state.params(), index).unwrap()
            );
        }
    }

    #[test]
    fn test_burn_quote_clamps_but_settlement_rejects() {
        let evaluator = default_evaluator();
        let mut state = state_with(1, 1, 2, 1);
        advance(&mut state, &evaluator, 3);

        assert_eq!(evaluator.return_on_burn(&state, 50).unwrap(), 14);
        let mut fills = PriceCache::new();
        assert!(matches!(
            evaluator.settle_burn_return(&state, 4, &mut fills),
            Err(CurveError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn test_burn_return_net_of_commission() {
        let evaluator = default_evaluator();
        let mut state = state_with(1, 1, 2, 1);
        let fees = FeeConfig::new(Address::new([1u8; 32]), 5, Address::new([2u8; 32]), 5).unwrap();
        state.configure_fees(fees).unwrap();
        advance(&mut state, &evaluator, 10);

        // Σ i^2 for 1..=10 = 385, 90% truncated
        assert_eq!(evaluator.return_on_burn(&state, 10).unwrap(), 346);
    }

    #[test]
    fn test_overflow_is_a_fault() {
        let evaluator = default_evaluator();
        let state = state_with(u128::MAX, u128::MAX, 2, 1);
        assert!(matches!(
            evaluator.cost_to_mint(&state, 2),
            Err(CurveError::ArithmeticFault(_))
        ));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_cost_is_additive(
                slope in 1u128..=1_000,
                extra in 0u128..=1_000,
                exponent in 1u32..=12,
                supply in 0u64..=50,
                a in 0u64..=20,
                b in 0u64..=20,
            ) {
                let evaluator = default_evaluator();
                let params = CurveParams::new(slope + extra, slope, exponent, 1).unwrap();
                let whole = evaluator.interval_sum(&params, supply + 1, supply + a + b).unwrap();
                let left = evaluator.interval_sum(&params, supply + 1, supply + a).unwrap();
                let right = evaluator.interval_sum(&params, supply + a + 1, supply + a + b).unwrap();
                prop_assert_eq!(whole, left + right);
            }

            #[test]
            fn prop_integer_prices_strictly_increase(
                slope in 1u128..=1_000,
                extra in 0u128..=1_000,
                exponent in 1u32..=12,
                index in 1u64..=200,
            ) {
                let evaluator = default_evaluator();
                let params = CurveParams::new(slope + extra, slope, exponent, 1).unwrap();
                let here = evaluator.unit_price(&params, index).unwrap();
                let next = evaluator.unit_price(&params, index + 1).unwrap();
                prop_assert!(next > here);
            }

            #[test]
            fn prop_fractional_prices_never_decrease(
                slope in 1u128..=1_000_000,
                numerator in 1u32..=7,
                denominator in 2u32..=5,
                index in 1u64..=10_000,
            ) {
                let evaluator = default_evaluator();
                let params = CurveParams::new(slope, slope, numerator, denominator).unwrap();
                let here = evaluator.unit_price(&params, index).unwrap();
                let next = evaluator.unit_price(&params, index + 1).unwrap();
                prop_assert!(next >= here);
            }

            #[test]
            fn prop_cached_prices_match_fresh_computation(
                slope in 1u128..=10_000,
                mints in proptest::collection::vec(1u64..=8, 1..6),
            ) {
                let evaluator = default_evaluator();
                let mut state = state_with(slope, slope, 5, 3);
                for quantity in mints {
                    let snapshot: Vec<_> = (1..=state.current_supply())
                        .map(|i| state.cached_price(i))
                        .collect();
                    advance(&mut state, &evaluator, quantity);
                    for (offset, before) in snapshot.into_iter().enumerate() {
                        prop_assert_eq!(before, state.cached_price(offset as u64 + 1));
                    }
                }
                for index in 1..=state.current_supply() {
                    prop_assert_eq!(
                        state.cached_price(index).unwrap(),
                        evaluator.unit_price(state.params(), index).unwrap()
                    );
                }
            }
        }
    }
}
