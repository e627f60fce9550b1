//! Curve Settlement
//!
//! Orchestrates mint and burn settlements against a single curve:
//! price → validate → move collateral → ledger → commit → event.
//!
//! # Invariants
//! - Every check and every computed value is settled before the first
//!   collaborator call; state is committed last
//! - `custodied == reserve + accrued commission` after each settlement
//! - Ledger supply equals curve supply
//! - Settlements take `&mut self`, so at most one is in flight
//!
//! The collaborators are expected to run inside the host's transaction. The
//! one compensation done here is returning pulled collateral when the ledger
//! refuses a mint.

use lib_types::{Address, Amount, BatchId, Percent, TokenId};
use tracing::{debug, error, info, warn};

use crate::collateral::CollateralTransfer;
use crate::config::{ConfigError, CurveConfig};
use crate::errors::{CurveError, CurveResult};
use crate::events::CurveEvent;
use crate::ledger::TokenLedger;
use crate::math::{CurveMath, ExactCurveMath};
use crate::pricing::PricingEvaluator;
use crate::state::{CurveState, Transition};
use crate::types::{
    Beneficiary, CollateralAsset, CommissionPolicy, CurveParams, CurveStats, FeeConfig, FeeSplit,
};

/// Construction parameters for a curve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveSetup {
    pub curve_id: [u8; 32],
    pub name: String,
    pub symbol: String,
    pub metadata_base_uri: String,
    /// Account holding the curve's collateral
    pub custody: Address,
    pub params: CurveParams,
    pub collateral: CollateralAsset,
    pub commission_policy: CommissionPolicy,
}

/// Mint request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintRequest {
    pub buyer: Address,
    pub quantity: u64,
    /// Most the buyer will pay; attached value on native curves
    pub payment: Amount,
    /// Reject the mint if the next unit costs more than this
    pub max_first_unit_price: Option<Amount>,
}

impl MintRequest {
    pub fn new(buyer: Address, quantity: u64, payment: Amount) -> Self {
        Self {
            buyer,
            quantity,
            payment,
            max_first_unit_price: None,
        }
    }

    pub fn with_max_first_unit_price(mut self, ceiling: Amount) -> Self {
        self.max_first_unit_price = Some(ceiling);
        self
    }
}

/// Outcome of a committed mint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    pub batch_id: BatchId,
    pub quantity: u64,
    pub cost: Amount,
    /// Excess attached payment returned (native curves only)
    pub refund: Amount,
    pub split: FeeSplit,
    pub reserve_after: Amount,
    pub event: CurveEvent,
}

/// Outcome of a committed burn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnReceipt {
    pub quantity: u64,
    pub return_amount: Amount,
    pub reserve_after: Amount,
    pub event: CurveEvent,
}

struct PreparedBurn {
    transition: Transition,
    return_amount: Amount,
}

/// Bonding curve bound to its ledger and collateral collaborators
#[derive(Debug)]
pub struct BondingCurve<L: TokenLedger, C: CollateralTransfer, M: CurveMath = ExactCurveMath> {
    curve_id: [u8; 32],
    name: String,
    symbol: String,
    metadata_base_uri: String,
    custody: Address,
    state: CurveState,
    evaluator: PricingEvaluator<M>,
    ledger: L,
    collateral: C,
    events: Vec<CurveEvent>,
}

impl<L: TokenLedger, C: CollateralTransfer, M: CurveMath> BondingCurve<L, C, M> {
    /// Deploy a new curve at zero supply
    pub fn deploy(setup: CurveSetup, ledger: L, collateral: C, math: M) -> CurveResult<Self> {
        Self::validate_setup(&setup, &collateral)?;
        if ledger.total_supply() != 0 {
            return Err(CurveError::InvalidParameters(
                "Token ledger must start empty".to_string(),
            ));
        }

        info!(
            "Deployed curve {} ({}) pricing {} in {} collateral, {} commission",
            setup.name, setup.symbol, setup.params.mode, setup.collateral, setup.commission_policy
        );

        let state = CurveState::new(setup.params, setup.collateral, setup.commission_policy);
        Ok(Self::assemble(setup, state, ledger, collateral, math))
    }

    /// Resume a curve from a saved state
    ///
    /// The state must describe the same curve as `setup`, the ledger must hold
    /// exactly the state's supply, and custody must cover what the curve owes.
    /// Event sequence numbers continue from the saved state.
    pub fn restore(
        setup: CurveSetup,
        state: CurveState,
        ledger: L,
        collateral: C,
        math: M,
    ) -> CurveResult<Self> {
        Self::validate_setup(&setup, &collateral)?;
        if state.params() != &setup.params
            || state.collateral() != setup.collateral
            || state.commission_policy() != setup.commission_policy
        {
            return Err(CurveError::InvalidParameters(
                "Saved state belongs to a different curve".to_string(),
            ));
        }
        if ledger.total_supply() != state.current_supply() {
            return Err(CurveError::InvariantViolated(format!(
                "ledger supply {}, saved supply {}",
                ledger.total_supply(),
                state.current_supply()
            )));
        }
        let custodied = collateral.balance_of(&setup.custody);
        let owed = state.obligations()?;
        if custodied < owed {
            return Err(CurveError::InvariantViolated(format!(
                "custody holds {}, saved state owes {}",
                custodied, owed
            )));
        }

        info!(
            "Restored curve {} ({}) at supply {}, reserve {}, event sequence {}",
            setup.name,
            setup.symbol,
            state.current_supply(),
            state.reserve(),
            state.last_sequence()
        );

        Ok(Self::assemble(setup, state, ledger, collateral, math))
    }

    fn validate_setup(setup: &CurveSetup, collateral: &C) -> CurveResult<()> {
        if setup.name.is_empty() {
            return Err(CurveError::InvalidParameters("Name cannot be empty".to_string()));
        }
        if setup.symbol.is_empty() {
            return Err(CurveError::InvalidParameters("Symbol cannot be empty".to_string()));
        }
        if setup.symbol.len() > 10 {
            return Err(CurveError::InvalidParameters("Symbol too long (max 10)".to_string()));
        }
        if collateral.asset() != setup.collateral {
            return Err(CurveError::AssetMismatch {
                expected: setup.collateral,
                actual: collateral.asset(),
            });
        }
        Ok(())
    }

    fn assemble(setup: CurveSetup, state: CurveState, ledger: L, collateral: C, math: M) -> Self {
        Self {
            curve_id: setup.curve_id,
            name: setup.name,
            symbol: setup.symbol,
            metadata_base_uri: setup.metadata_base_uri,
            custody: setup.custody,
            state,
            evaluator: PricingEvaluator::new(math),
            ledger,
            collateral,
            events: Vec::new(),
        }
    }

    /// Deploy from a loaded configuration, applying its fee section
    pub fn from_config(
        config: &CurveConfig,
        curve_id: [u8; 32],
        custody: Address,
        ledger: L,
        collateral: C,
        math: M,
    ) -> Result<Self, ConfigError> {
        let setup = CurveSetup {
            curve_id,
            name: config.name.clone(),
            symbol: config.symbol.clone(),
            metadata_base_uri: config.metadata_base_uri.clone(),
            custody,
            params: config.curve_params()?,
            collateral: config.collateral_asset()?,
            commission_policy: config.commission_policy,
        };
        let mut curve = Self::deploy(setup, ledger, collateral, math)?;
        if let Some(fees) = config.fee_config()? {
            curve.apply_fee_config(fees)?;
        }
        Ok(curve)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn curve_id(&self) -> &[u8; 32] {
        &self.curve_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn custody(&self) -> &Address {
        &self.custody
    }

    pub fn state(&self) -> &CurveState {
        &self.state
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn collateral(&self) -> &C {
        &self.collateral
    }

    /// Mutable collateral access for hosts funding accounts or approving custody
    pub fn collateral_mut(&mut self) -> &mut C {
        &mut self.collateral
    }

    pub fn current_supply(&self) -> u64 {
        self.state.current_supply()
    }

    pub fn cached_price(&self, index: u64) -> Option<Amount> {
        self.state.cached_price(index)
    }

    pub fn reserve(&self) -> Amount {
        self.state.reserve()
    }

    /// Quote the cost of the next `quantity` units
    pub fn cost_to_mint(&self, quantity: u64) -> CurveResult<Amount> {
        self.evaluator.cost_to_mint(&self.state, quantity)
    }

    /// Quote the net return for burning `quantity` units, clamped to supply
    pub fn return_on_burn(&self, quantity: u64) -> CurveResult<Amount> {
        self.evaluator.return_on_burn(&self.state, quantity)
    }

    /// Uncached price of a single unit
    pub fn unit_price(&self, index: u64) -> CurveResult<Amount> {
        self.evaluator.unit_price(self.state.params(), index)
    }

    /// Metadata URI for a batch
    pub fn uri(&self, batch_id: BatchId) -> String {
        format!("{}{}", self.metadata_base_uri, batch_id)
    }

    pub fn stats(&self) -> CurveResult<CurveStats> {
        Ok(CurveStats {
            total_supply: self.state.current_supply(),
            reserve: self.state.reserve(),
            custodied: self.collateral.balance_of(&self.custody),
            next_unit_price: self.cost_to_mint(1)?,
            accrued_platform: self.state.accrued(Beneficiary::Platform),
            accrued_creator: self.state.accrued(Beneficiary::Creator),
            cached_prices: self.state.cached_prices(),
        })
    }

    /// Emitted events, oldest first
    pub fn events(&self) -> &[CurveEvent] {
        &self.events
    }

    /// Hand emitted events to an indexer, leaving the log empty
    pub fn take_events(&mut self) -> Vec<CurveEvent> {
        std::mem::take(&mut self.events)
    }

    /// Check conservation and ledger agreement
    ///
    /// Collateral sent straight to custody shows up as a violation until
    /// [`BondingCurve::withdraw`] sweeps it.
    pub fn verify_invariants(&self) -> CurveResult<()> {
        let custodied = self.collateral.balance_of(&self.custody);
        let owed = self.state.obligations()?;
        if custodied != owed {
            return Err(CurveError::InvariantViolated(format!(
                "custody holds {}, curve owes {}",
                custodied, owed
            )));
        }
        if self.state.reserve() > custodied {
            return Err(CurveError::InvariantViolated(format!(
                "reserve {} exceeds custody {}",
                self.state.reserve(),
                custodied
            )));
        }
        if self.ledger.total_supply() != self.state.current_supply() {
            return Err(CurveError::InvariantViolated(format!(
                "ledger supply {}, curve supply {}",
                self.ledger.total_supply(),
                self.state.current_supply()
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// One-time commission setup
    pub fn configure_fees(
        &mut self,
        platform_account: Address,
        platform_rate: Percent,
        creator_account: Address,
        creator_rate: Percent,
    ) -> CurveResult<CurveEvent> {
        if self.state.fees().is_configured() {
            return Err(CurveError::ConfigurationAlreadySet);
        }
        let fees = FeeConfig::new(platform_account, platform_rate, creator_account, creator_rate)?;
        self.apply_fee_config(fees)
    }

    fn apply_fee_config(&mut self, fees: FeeConfig) -> CurveResult<CurveEvent> {
        let (Some(platform_account), Some(creator_account)) =
            (fees.platform_account, fees.creator_account)
        else {
            return Err(CurveError::InvalidParameters(
                "Both beneficiary accounts are required".to_string(),
            ));
        };
        self.state.configure_fees(fees)?;

        info!(
            "Curve {} fees set: platform {}%, creator {}%",
            self.symbol, fees.platform_rate, fees.creator_rate
        );
        let event = CurveEvent::FeesConfigured {
            curve_id: self.curve_id,
            sequence: self.next_sequence(),
            platform_account,
            platform_rate: fees.platform_rate,
            creator_account,
            creator_rate: fees.creator_rate,
        };
        Ok(self.record(event))
    }

    // ========================================================================
    // Mint
    // ========================================================================

    /// Mint against a token-collateral curve, paying in `token`
    ///
    /// Pulls exactly the cost through the buyer's allowance to custody.
    pub fn mint_with_token(&mut self, token: TokenId, request: MintRequest) -> CurveResult<MintReceipt> {
        self.settle_mint(CollateralAsset::Token(token), request)
    }

    /// Mint against a native-collateral curve
    ///
    /// `request.payment` is the attached value; the excess over cost is refunded.
    pub fn mint_with_native(&mut self, request: MintRequest) -> CurveResult<MintReceipt> {
        self.settle_mint(CollateralAsset::Native, request)
    }

    fn settle_mint(&mut self, paid_with: CollateralAsset, request: MintRequest) -> CurveResult<MintReceipt> {
        let asset = self.state.collateral();
        if paid_with != asset {
            return Err(CurveError::AssetMismatch {
                expected: asset,
                actual: paid_with,
            });
        }
        if request.quantity == 0 {
            return Err(CurveError::InvalidQuantity("Mint quantity must be positive".to_string()));
        }

        if let Some(ceiling) = request.max_first_unit_price {
            let price = self.evaluator.cost_to_mint(&self.state, 1)?;
            if price > ceiling {
                warn!(
                    "Mint of {} {} rejected: next unit costs {}, ceiling {}",
                    request.quantity, self.symbol, price, ceiling
                );
                return Err(CurveError::SlippageExceeded { price, ceiling });
            }
        }

        let mut transition = self.state.transition();
        let cost = self
            .evaluator
            .settle_mint_cost(&self.state, request.quantity, &mut transition.cache_fills)?;
        if request.payment < cost {
            return Err(CurveError::InsufficientPayment {
                required: cost,
                provided: request.payment,
            });
        }

        let split = self.state.fees().split(cost)?;
        transition.total_supply = transition
            .total_supply
            .checked_add(request.quantity)
            .ok_or(CurveError::ArithmeticFault("supply overflow"))?;
        transition.reserve = transition
            .reserve
            .checked_add(split.reserve_cut)
            .ok_or(CurveError::ArithmeticFault("reserve overflow"))?;

        let forwards = match self.state.commission_policy() {
            CommissionPolicy::Immediate => self.commission_forwards(&split)?,
            CommissionPolicy::Deferred => {
                transition.accrued_platform = transition
                    .accrued_platform
                    .checked_add(split.platform_cut)
                    .ok_or(CurveError::ArithmeticFault("platform commission overflow"))?;
                transition.accrued_creator = transition
                    .accrued_creator
                    .checked_add(split.creator_cut)
                    .ok_or(CurveError::ArithmeticFault("creator commission overflow"))?;
                Vec::new()
            }
        };
        let (pulled, refund) = if asset.is_native() {
            (request.payment, request.payment - cost)
        } else {
            (cost, 0)
        };

        // Collateral in, units out
        self.collateral.pull(asset, &request.buyer, &self.custody, pulled)?;
        let batch_id = match self.ledger.mint(&request.buyer, request.quantity) {
            Ok(batch_id) => batch_id,
            Err(e) => {
                warn!("Ledger refused mint for {}: {}; returning {}", request.buyer, e, pulled);
                if let Err(refund_err) = self.collateral.push(asset, &self.custody, &request.buyer, pulled) {
                    error!("Failed to return pulled collateral to {}: {}", request.buyer, refund_err);
                }
                return Err(e);
            }
        };
        if refund > 0 {
            self.collateral.push(asset, &self.custody, &request.buyer, refund)?;
        }
        for (beneficiary, account, amount) in forwards {
            debug!("Forwarding {} {} commission to {}", amount, beneficiary, account);
            self.collateral.push(asset, &self.custody, &account, amount)?;
        }

        let fills = transition.cache_fills.len();
        let reserve_after = transition.reserve;
        self.state.commit(transition);

        info!(
            "Minted {} {} as batch {} for {}: cost {}, reserve {}, {} prices cached",
            request.quantity, self.symbol, batch_id, request.buyer, cost, reserve_after, fills
        );

        let event = CurveEvent::Minted {
            curve_id: self.curve_id,
            sequence: self.next_sequence(),
            buyer: request.buyer,
            batch_id,
            quantity: request.quantity,
            cost,
            reserve_after,
            platform_cut: split.platform_cut,
            creator_cut: split.creator_cut,
        };
        Ok(MintReceipt {
            batch_id,
            quantity: request.quantity,
            cost,
            refund,
            split,
            reserve_after,
            event: self.record(event),
        })
    }

    /// Non-zero cuts paired with their destination accounts
    fn commission_forwards(&self, split: &FeeSplit) -> CurveResult<Vec<(Beneficiary, Address, Amount)>> {
        let mut forwards = Vec::new();
        for (beneficiary, amount) in [
            (Beneficiary::Platform, split.platform_cut),
            (Beneficiary::Creator, split.creator_cut),
        ] {
            if amount > 0 {
                forwards.push((beneficiary, self.beneficiary_account(beneficiary)?, amount));
            }
        }
        Ok(forwards)
    }

    fn beneficiary_account(&self, beneficiary: Beneficiary) -> CurveResult<Address> {
        self.state
            .fees()
            .account(beneficiary)
            .ok_or(CurveError::FeesNotConfigured)
    }

    // ========================================================================
    // Burn
    // ========================================================================

    /// Burn units of one batch for their net curve value
    pub fn burn(&mut self, owner: Address, batch_id: BatchId, quantity: u64) -> CurveResult<BurnReceipt> {
        if quantity == 0 {
            return Err(CurveError::InvalidQuantity("Burn quantity must be positive".to_string()));
        }
        let prepared = self.prepare_burn(quantity)?;
        self.ledger.burn(&owner, batch_id, quantity)?;
        let (return_amount, reserve_after) = self.finish_burn(&owner, prepared)?;

        info!(
            "Burned {} {} of batch {} for {}: returned {}, reserve {}",
            quantity, self.symbol, batch_id, owner, return_amount, reserve_after
        );

        let event = CurveEvent::Burned {
            curve_id: self.curve_id,
            sequence: self.next_sequence(),
            owner,
            batch_id,
            quantity,
            return_amount,
            reserve_after,
        };
        Ok(BurnReceipt {
            quantity,
            return_amount,
            reserve_after,
            event: self.record(event),
        })
    }

    /// Burn units across several batches in one settlement
    pub fn burn_batch(
        &mut self,
        owner: Address,
        batch_ids: &[BatchId],
        quantities: &[u64],
    ) -> CurveResult<BurnReceipt> {
        if batch_ids.is_empty() || batch_ids.len() != quantities.len() {
            return Err(CurveError::InvalidQuantity(format!(
                "{} batch ids for {} quantities",
                batch_ids.len(),
                quantities.len()
            )));
        }
        let mut total: u64 = 0;
        for &quantity in quantities {
            if quantity == 0 {
                return Err(CurveError::InvalidQuantity("Burn quantity must be positive".to_string()));
            }
            total = total
                .checked_add(quantity)
                .ok_or(CurveError::ArithmeticFault("burn quantity overflow"))?;
        }

        let prepared = self.prepare_burn(total)?;
        self.ledger.burn_batch(&owner, batch_ids, quantities)?;
        let (return_amount, reserve_after) = self.finish_burn(&owner, prepared)?;

        info!(
            "Burned {} {} across {} batches for {}: returned {}, reserve {}",
            total,
            self.symbol,
            batch_ids.len(),
            owner,
            return_amount,
            reserve_after
        );

        let event = CurveEvent::BatchBurned {
            curve_id: self.curve_id,
            sequence: self.next_sequence(),
            owner,
            batch_ids: batch_ids.to_vec(),
            quantities: quantities.to_vec(),
            return_amount,
            reserve_after,
        };
        Ok(BurnReceipt {
            quantity: total,
            return_amount,
            reserve_after,
            event: self.record(event),
        })
    }

    fn prepare_burn(&self, quantity: u64) -> CurveResult<PreparedBurn> {
        let mut transition = self.state.transition();
        let return_amount =
            self.evaluator
                .settle_burn_return(&self.state, quantity, &mut transition.cache_fills)?;

        let reserve = self.state.reserve();
        transition.reserve = reserve
            .checked_sub(return_amount)
            .ok_or(CurveError::ReserveUnderflow {
                reserve,
                requested: return_amount,
            })?;
        transition.total_supply = transition
            .total_supply
            .checked_sub(quantity)
            .ok_or(CurveError::ArithmeticFault("supply underflow"))?;

        Ok(PreparedBurn {
            transition,
            return_amount,
        })
    }

    fn finish_burn(&mut self, owner: &Address, prepared: PreparedBurn) -> CurveResult<(Amount, Amount)> {
        let asset = self.state.collateral();
        self.collateral
            .push(asset, &self.custody, owner, prepared.return_amount)?;
        let reserve_after = prepared.transition.reserve;
        self.state.commit(prepared.transition);
        Ok((prepared.return_amount, reserve_after))
    }

    // ========================================================================
    // Withdraw / claim
    // ========================================================================

    /// Sweep custody beyond reserve and accrued commission to the creator
    ///
    /// Anyone may call this. Returns the amount swept.
    pub fn withdraw(&mut self) -> CurveResult<Amount> {
        let creator = self.beneficiary_account(Beneficiary::Creator)?;
        let custodied = self.collateral.balance_of(&self.custody);
        let owed = self.state.obligations()?;
        let surplus = custodied.checked_sub(owed).ok_or_else(|| {
            CurveError::InvariantViolated(format!(
                "custody holds {}, curve owes {}",
                custodied, owed
            ))
        })?;
        if surplus == 0 {
            debug!("Nothing to withdraw from curve {}", self.symbol);
            return Ok(0);
        }

        self.collateral
            .push(self.state.collateral(), &self.custody, &creator, surplus)?;
        info!("Withdrew {} surplus from curve {} to {}", surplus, self.symbol, creator);

        let event = CurveEvent::Withdrawn {
            curve_id: self.curve_id,
            sequence: self.next_sequence(),
            to: creator,
            amount: surplus,
        };
        self.record(event);
        Ok(surplus)
    }

    /// Pay accrued platform commission to the platform account
    pub fn claim_platform_commission(&mut self, caller: Address) -> CurveResult<Amount> {
        self.claim(Beneficiary::Platform, caller)
    }

    /// Pay accrued creator commission to the creator account
    pub fn claim_creator_commission(&mut self, caller: Address) -> CurveResult<Amount> {
        self.claim(Beneficiary::Creator, caller)
    }

    fn claim(&mut self, beneficiary: Beneficiary, caller: Address) -> CurveResult<Amount> {
        let account = self.beneficiary_account(beneficiary)?;
        if caller != account {
            return Err(CurveError::Unauthorized(format!(
                "{} is not the {} account",
                caller, beneficiary
            )));
        }

        let amount = self.state.accrued(beneficiary);
        if amount == 0 {
            return Ok(0);
        }

        let mut transition = self.state.transition();
        match beneficiary {
            Beneficiary::Platform => transition.accrued_platform = 0,
            Beneficiary::Creator => transition.accrued_creator = 0,
        }
        self.collateral
            .push(self.state.collateral(), &self.custody, &account, amount)?;
        self.state.commit(transition);

        info!("Paid {} {} commission from curve {} to {}", amount, beneficiary, self.symbol, account);

        let event = CurveEvent::CommissionClaimed {
            curve_id: self.curve_id,
            sequence: self.next_sequence(),
            beneficiary,
            to: account,
            amount,
        };
        self.record(event);
        Ok(amount)
    }

    // ========================================================================
    // Events
    // ========================================================================

    fn next_sequence(&mut self) -> u64 {
        self.state.next_sequence()
    }

    fn record(&mut self, event: CurveEvent) -> CurveEvent {
        self.events.push(event.clone());
        event
    }
}
