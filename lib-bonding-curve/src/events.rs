//! Curve Settlement Events
//!
//! Every committed settlement and administrative transition emits one event.
//! Events are append-only; indexers consume them for history queries.

use lib_types::{Address, Amount, BatchId, Percent};
use serde::{Deserialize, Serialize};

use crate::types::Beneficiary;

/// Bonding curve settlement events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CurveEvent {
    /// Units minted from the curve
    Minted {
        curve_id: [u8; 32],
        sequence: u64,
        buyer: Address,
        batch_id: BatchId,
        quantity: u64,
        /// Total curve cost paid
        cost: Amount,
        /// Reserve after the mint committed
        reserve_after: Amount,
        platform_cut: Amount,
        creator_cut: Amount,
    },

    /// Units of one batch burned back into the curve
    Burned {
        curve_id: [u8; 32],
        sequence: u64,
        owner: Address,
        batch_id: BatchId,
        quantity: u64,
        return_amount: Amount,
        reserve_after: Amount,
    },

    /// Units of several batches burned in one settlement
    BatchBurned {
        curve_id: [u8; 32],
        sequence: u64,
        owner: Address,
        batch_ids: Vec<BatchId>,
        quantities: Vec<u64>,
        return_amount: Amount,
        reserve_after: Amount,
    },

    /// Custody surplus swept to the creator
    Withdrawn {
        curve_id: [u8; 32],
        sequence: u64,
        to: Address,
        amount: Amount,
    },

    /// Accrued commission paid out to a beneficiary
    CommissionClaimed {
        curve_id: [u8; 32],
        sequence: u64,
        beneficiary: Beneficiary,
        to: Address,
        amount: Amount,
    },

    /// One-time fee setup
    FeesConfigured {
        curve_id: [u8; 32],
        sequence: u64,
        platform_account: Address,
        platform_rate: Percent,
        creator_account: Address,
        creator_rate: Percent,
    },
}

impl CurveEvent {
    /// Get the curve ID associated with this event
    pub fn curve_id(&self) -> &[u8; 32] {
        match self {
            CurveEvent::Minted { curve_id, .. }
            | CurveEvent::Burned { curve_id, .. }
            | CurveEvent::BatchBurned { curve_id, .. }
            | CurveEvent::Withdrawn { curve_id, .. }
            | CurveEvent::CommissionClaimed { curve_id, .. }
            | CurveEvent::FeesConfigured { curve_id, .. } => curve_id,
        }
    }

    /// Per-curve sequence number, starting at 1
    pub fn sequence(&self) -> u64 {
        match self {
            CurveEvent::Minted { sequence, .. }
            | CurveEvent::Burned { sequence, .. }
            | CurveEvent::BatchBurned { sequence, .. }
            | CurveEvent::Withdrawn { sequence, .. }
            | CurveEvent::CommissionClaimed { sequence, .. }
            | CurveEvent::FeesConfigured { sequence, .. } => *sequence,
        }
    }

    /// Get event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            CurveEvent::Minted { .. } => "minted",
            CurveEvent::Burned { .. } => "burned",
            CurveEvent::BatchBurned { .. } => "batch_burned",
            CurveEvent::Withdrawn { .. } => "withdrawn",
            CurveEvent::CommissionClaimed { .. } => "commission_claimed",
            CurveEvent::FeesConfigured { .. } => "fees_configured",
        }
    }

    /// Reserve after the settlement, for events that move it
    pub fn reserve_after(&self) -> Option<Amount> {
        match self {
            CurveEvent::Minted { reserve_after, .. }
            | CurveEvent::Burned { reserve_after, .. }
            | CurveEvent::BatchBurned { reserve_after, .. } => Some(*reserve_after),
            _ => None,
        }
    }

    pub fn is_burn(&self) -> bool {
        matches!(self, CurveEvent::Burned { .. } | CurveEvent::BatchBurned { .. })
    }
}

/// Event indexer interface
///
/// Implement this to index curve events for history queries.
pub trait EventIndexer {
    /// Index a new event
    fn index_event(&mut self, event: CurveEvent);

    /// Get all events for a curve, in sequence order
    fn get_curve_events(&self, curve_id: [u8; 32]) -> Vec<CurveEvent>;

    /// Get mint events for a curve
    fn get_mint_events(&self, curve_id: [u8; 32]) -> Vec<CurveEvent>;

    /// Get single and batch burn events for a curve
    fn get_burn_events(&self, curve_id: [u8; 32]) -> Vec<CurveEvent>;

    /// Get a curve's events with sequence in `start..=end`
    fn get_events_in_range(&self, curve_id: [u8; 32], start: u64, end: u64) -> Vec<CurveEvent>;

    /// Get latest event for a curve
    fn get_latest_event(&self, curve_id: [u8; 32]) -> Option<CurveEvent>;
}

/// In-memory event indexer
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventIndexer {
    events: Vec<CurveEvent>,
}

impl InMemoryEventIndexer {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    fn select<F>(&self, curve_id: [u8; 32], filter: F) -> Vec<CurveEvent>
    where
        F: Fn(&CurveEvent) -> bool,
    {
        let mut events: Vec<CurveEvent> = self
            .events
            .iter()
            .filter(|e| e.curve_id() == &curve_id && filter(*e))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sequence());
        events
    }
}

impl EventIndexer for InMemoryEventIndexer {
    fn index_event(&mut self, event: CurveEvent) {
        self.events.push(event);
    }

    fn get_curve_events(&self, curve_id: [u8; 32]) -> Vec<CurveEvent> {
        self.select(curve_id, |_| true)
    }

    fn get_mint_events(&self, curve_id: [u8; 32]) -> Vec<CurveEvent> {
        self.select(curve_id, |e| matches!(e, CurveEvent::Minted { .. }))
    }

    fn get_burn_events(&self, curve_id: [u8; 32]) -> Vec<CurveEvent> {
        self.select(curve_id, CurveEvent::is_burn)
    }

    fn get_events_in_range(&self, curve_id: [u8; 32], start: u64, end: u64) -> Vec<CurveEvent> {
        self.select(curve_id, |e| e.sequence() >= start && e.sequence() <= end)
    }

    fn get_latest_event(&self, curve_id: [u8; 32]) -> Option<CurveEvent> {
        self.events
            .iter()
            .filter(|e| e.curve_id() == &curve_id)
            .max_by_key(|e| e.sequence())
            .cloned()
    }
}
