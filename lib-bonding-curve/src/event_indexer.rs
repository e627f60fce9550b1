//! Sled-backed Persistent Event Indexer
//!
//! Events are keyed `<curve hex>/<sequence, zero padded>` so a prefix scan
//! yields one curve's history in sequence order. Re-indexing an event with the
//! same curve and sequence overwrites it.

use crate::events::{CurveEvent, EventIndexer};

/// Sled-backed persistent event indexer
#[derive(Debug)]
pub struct SledEventIndexer {
    db: sled::Db,
    events: sled::Tree,
    type_index: sled::Tree,
}

const TREE_EVENTS: &str = "curve_events";
const TREE_TYPE_INDEX: &str = "curve_events_type_idx";

impl SledEventIndexer {
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    pub fn from_db(db: sled::Db) -> Result<Self, sled::Error> {
        let events = db.open_tree(TREE_EVENTS)?;
        let type_index = db.open_tree(TREE_TYPE_INDEX)?;
        Ok(Self {
            db,
            events,
            type_index,
        })
    }

    fn event_key(curve_id: &[u8; 32], sequence: u64) -> String {
        format!("{}/{:020}", hex::encode(curve_id), sequence)
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn flush(&self) -> Result<(), sled::Error> {
        self.events.flush()?;
        self.type_index.flush()?;
        self.db.flush()?;
        Ok(())
    }

    /// Store an event and its type index entry
    pub fn store_event(&self, event: &CurveEvent) -> Result<(), sled::Error> {
        let event_key = Self::event_key(event.curve_id(), event.sequence());
        let serialized = bincode::serialize(event)
            .map_err(|e| sled::Error::Unsupported(format!("event encoding: {}", e)))?;

        // An overwritten event may change type; drop its old index entry
        if let Some(previous) = self.events.insert(event_key.as_bytes(), serialized)? {
            if let Some(previous) = Self::decode(&previous) {
                let stale_key = format!("{}/{}", previous.event_type(), &event_key);
                self.type_index.remove(stale_key.as_bytes())?;
            }
        }

        let type_idx_key = format!("{}/{}", event.event_type(), &event_key);
        self.type_index
            .insert(type_idx_key.as_bytes(), event_key.as_bytes())?;
        Ok(())
    }

    fn decode(data: &[u8]) -> Option<CurveEvent> {
        match bincode::deserialize::<CurveEvent>(data) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::error!("Failed to decode stored event: {}", e);
                None
            }
        }
    }

    fn collect<I>(iter: I) -> Vec<CurveEvent>
    where
        I: Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>,
    {
        let mut events = Vec::new();
        for result in iter {
            match result {
                Ok((_, data)) => events.extend(Self::decode(&data)),
                Err(e) => tracing::error!("Error reading events: {}", e),
            }
        }
        events
    }

    pub fn get_curve_events_by_type(&self, curve_id: [u8; 32], event_type: &str) -> Vec<CurveEvent> {
        let prefix = format!("{}/{}/", event_type, hex::encode(curve_id));
        let mut events = Vec::new();

        for result in self.type_index.scan_prefix(prefix.as_bytes()) {
            match result {
                Ok((_, event_key)) => match self.events.get(&event_key) {
                    Ok(Some(data)) => events.extend(Self::decode(&data)),
                    Ok(None) => tracing::warn!("Type index points at a missing event"),
                    Err(e) => tracing::error!("Error reading event: {}", e),
                },
                Err(e) => {
                    tracing::error!("Error reading type index: {}", e);
                }
            }
        }

        events
    }
}

impl EventIndexer for SledEventIndexer {
    fn index_event(&mut self, event: CurveEvent) {
        if let Err(e) = self.store_event(&event) {
            tracing::error!(
                "Failed to store {} event {}: {}",
                event.event_type(),
                event.sequence(),
                e
            );
        }
    }

    fn get_curve_events(&self, curve_id: [u8; 32]) -> Vec<CurveEvent> {
        let prefix = format!("{}/", hex::encode(curve_id));
        Self::collect(self.events.scan_prefix(prefix.as_bytes()))
    }

    fn get_mint_events(&self, curve_id: [u8; 32]) -> Vec<CurveEvent> {
        self.get_curve_events_by_type(curve_id, "minted")
    }

    fn get_burn_events(&self, curve_id: [u8; 32]) -> Vec<CurveEvent> {
        let mut events = self.get_curve_events_by_type(curve_id, "burned");
        events.extend(self.get_curve_events_by_type(curve_id, "batch_burned"));
        events.sort_by_key(|e| e.sequence());
        events
    }

    fn get_events_in_range(&self, curve_id: [u8; 32], start: u64, end: u64) -> Vec<CurveEvent> {
        if start > end {
            return Vec::new();
        }
        let from = Self::event_key(&curve_id, start);
        let to = Self::event_key(&curve_id, end);
        Self::collect(self.events.range(from.as_bytes()..=to.as_bytes()))
    }

    fn get_latest_event(&self, curve_id: [u8; 32]) -> Option<CurveEvent> {
        let prefix = format!("{}/", hex::encode(curve_id));
        match self.events.scan_prefix(prefix.as_bytes()).next_back()? {
            Ok((_, data)) => Self::decode(&data),
            Err(e) => {
                tracing::error!("Error reading latest event: {}", e);
                None
            }
        }
    }
}
