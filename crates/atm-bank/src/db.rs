//! `StateDb`: the bank's sled-backed persistence layer.
//!
//! Two named trees, `cards` and `atms`, mirroring the two record shapes in
//! `model`. Opening a path that doesn't exist yet creates the trees empty —
//! this is the Rust-native analogue of "a deployment-supplied SQL schema
//! file initializes them" from a schemaless store.

use std::path::Path;

use atm_core::AtmError;

use crate::model::{AtmRecord, CardRecord};

pub struct StateDb {
    _db: sled::Db,
    cards: sled::Tree,
    atms: sled::Tree,
}

impl StateDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AtmError> {
        let db = sled::open(path).map_err(|e| AtmError::Storage(e.to_string()))?;
        let cards = db
            .open_tree("cards")
            .map_err(|e| AtmError::Storage(e.to_string()))?;
        let atms = db
            .open_tree("atms")
            .map_err(|e| AtmError::Storage(e.to_string()))?;
        Ok(Self {
            _db: db,
            cards,
            atms,
        })
    }

    // ── Cards ──────────────────────────────────────────────────────────────

    pub fn get_card(&self, card_id: &str) -> Result<Option<CardRecord>, AtmError> {
        match self
            .cards
            .get(card_id.as_bytes())
            .map_err(|e| AtmError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let record = bincode::deserialize(&bytes)
                    .map_err(|e| AtmError::Serialization(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn put_card(&self, record: &CardRecord) -> Result<(), AtmError> {
        let bytes =
            bincode::serialize(record).map_err(|e| AtmError::Serialization(e.to_string()))?;
        self.cards
            .insert(record.card_id.as_bytes(), bytes)
            .map_err(|e| AtmError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn card_exists(&self, card_id: &str) -> bool {
        self.cards.contains_key(card_id.as_bytes()).unwrap_or(false)
    }

    // ── ATMs ───────────────────────────────────────────────────────────────

    pub fn get_atm(&self, hsm_id: &str) -> Result<Option<AtmRecord>, AtmError> {
        match self
            .atms
            .get(hsm_id.as_bytes())
            .map_err(|e| AtmError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let record = bincode::deserialize(&bytes)
                    .map_err(|e| AtmError::Serialization(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn put_atm(&self, record: &AtmRecord) -> Result<(), AtmError> {
        let bytes =
            bincode::serialize(record).map_err(|e| AtmError::Serialization(e.to_string()))?;
        self.atms
            .insert(record.hsm_id.as_bytes(), bytes)
            .map_err(|e| AtmError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn atm_exists(&self, hsm_id: &str) -> bool {
        self.atms.contains_key(hsm_id.as_bytes()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_round_trips_through_storage() {
        let dir = tempfile_dir();
        let db = StateDb::open(&dir).unwrap();
        let mut record = CardRecord::new("c1".to_string(), "Alice".to_string(), 100);
        record.pk = Some([9u8; atm_core::constants::CARD_PK_LEN]);
        db.put_card(&record).unwrap();

        let loaded = db.get_card("c1").unwrap().unwrap();
        assert_eq!(loaded.balance, 100);
        assert_eq!(loaded.pk, record.pk);
    }

    #[test]
    fn unknown_card_is_none() {
        let dir = tempfile_dir();
        let db = StateDb::open(&dir).unwrap();
        assert!(db.get_card("nope").unwrap().is_none());
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("atm-bank-test-{}", std::process::id()));
        p.push(uuid_like());
        p
    }

    fn uuid_like() -> String {
        // Deterministic-enough disambiguator for parallel test runs without
        // pulling in a randomness dependency just for test scaffolding.
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        format!("{}", COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}
