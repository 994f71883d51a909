//! # Ledger Store
//!
//! Durable state of a node, on sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                                | Value                 |
//! |------------|------------------------------------|-----------------------|
//! | `ledgers`  | ledger address (20B)               | `bincode(Ledger)`     |
//! | `events`   | ledger address (20B) + seq (8B BE) | `bincode(EventRecord)`|
//! | `metadata` | key (UTF-8)                        | value (bytes)         |
//!
//! Sequence numbers are big-endian so that a prefix scan over one ledger's
//! events yields them in emission order.
//!
//! ## Atomicity
//!
//! [`LedgerStore::commit`] writes the touched ledgers, their new events and
//! the host bookkeeping in one sled transaction over all three trees, then
//! flushes. Either the whole outcome of an operation is on disk or none of
//! it is.

use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};
use sled::{Db, Transactional, Tree};
use std::path::Path;

use ce_contracts::{EventRecord, HostError, Ledger, LedgerHost};
use ce_protocol::Address;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt store: {0}")]
    Corrupt(String),

    #[error("rebuilding host: {0}")]
    Host(#[from] HostError),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<TransactionError<StoreError>> for StoreError {
    fn from(e: TransactionError<StoreError>) -> Self {
        match e {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(e) => StoreError::Sled(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Next deployment nonce of the host (8B BE).
const META_DEPLOY_NONCE: &[u8] = b"deploy_nonce";
/// Ledger addresses in deployment order (`bincode(Vec<Address>)`).
const META_LEDGER_ORDER: &[u8] = b"ledger_order";
/// Number of event records ever journaled (8B BE).
const META_JOURNAL_HEIGHT: &[u8] = b"journal_height";

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn read_u64(bytes: &[u8]) -> StoreResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("expected 8-byte counter, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

fn event_key(record: &EventRecord) -> Vec<u8> {
    let mut key = Vec::with_capacity(28);
    key.extend_from_slice(record.ledger.as_bytes());
    key.extend_from_slice(&record.seq.to_be_bytes());
    key
}

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

/// Persistent storage for a [`LedgerHost`] and its event journal.
///
/// Cheap to clone; sled handles are reference counted and safe to share
/// across tasks.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    db: Db,
    ledgers: Tree,
    events: Tree,
    metadata: Tree,
}

impl LedgerStore {
    /// Opens or creates a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory store, removed when dropped.
    #[cfg(test)]
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    /// Overwrites a raw metadata entry.
    #[cfg(test)]
    pub fn put_metadata(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.metadata.insert(key, value)?;
        Ok(())
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let ledgers = db.open_tree("ledgers")?;
        let events = db.open_tree("events")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            ledgers,
            events,
            metadata,
        })
    }

    // -- Writes -------------------------------------------------------------

    /// Persists the outcome of one host operation: the ledgers it touched,
    /// the events it emitted and the host's deployment bookkeeping.
    pub fn commit(
        &self,
        host: &LedgerHost,
        touched: &[&Ledger],
        events: &[EventRecord],
    ) -> StoreResult<()> {
        let ledger_rows = touched
            .iter()
            .map(|l| -> StoreResult<_> { Ok((l.address(), encode(*l)?)) })
            .collect::<StoreResult<Vec<_>>>()?;
        let event_rows = events
            .iter()
            .map(|r| -> StoreResult<_> { Ok((event_key(r), encode(r)?)) })
            .collect::<StoreResult<Vec<_>>>()?;
        let order = encode(&host.addresses().to_vec())?;
        let nonce = host.deploy_nonce().to_be_bytes();

        (&self.ledgers, &self.events, &self.metadata).transaction(
            |(ledgers, journal, meta)| -> ConflictableTransactionResult<(), StoreError> {
                for (address, bytes) in &ledger_rows {
                    ledgers.insert(&address.as_bytes()[..], bytes.as_slice())?;
                }
                let mut height = match meta.get(META_JOURNAL_HEIGHT)? {
                    Some(v) => read_u64(&v).map_err(ConflictableTransactionError::Abort)?,
                    None => 0,
                };
                for (key, bytes) in &event_rows {
                    if journal.insert(key.as_slice(), bytes.as_slice())?.is_none() {
                        height += 1;
                    }
                }
                meta.insert(META_JOURNAL_HEIGHT, height.to_be_bytes().to_vec())?;
                meta.insert(META_DEPLOY_NONCE, nonce.to_vec())?;
                meta.insert(META_LEDGER_ORDER, order.as_slice())?;
                Ok(())
            },
        )?;

        self.db.flush()?;
        tracing::debug!(
            ledgers = ledger_rows.len(),
            events = event_rows.len(),
            "store commit"
        );
        Ok(())
    }

    // -- Reads --------------------------------------------------------------

    /// Loads a single ledger.
    pub fn get_ledger(&self, address: &Address) -> StoreResult<Option<Ledger>> {
        match self.ledgers.get(address.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Rebuilds the host from disk. An empty store yields an empty host.
    pub fn load_host(&self) -> StoreResult<LedgerHost> {
        let mut host = LedgerHost::new();

        let order: Vec<Address> = match self.metadata.get(META_LEDGER_ORDER)? {
            Some(bytes) => decode(&bytes)?,
            None => Vec::new(),
        };
        for address in order {
            let ledger = self.get_ledger(&address)?.ok_or_else(|| {
                StoreError::Corrupt(format!("ledger {} listed but not stored", address))
            })?;
            host.insert(ledger)?;
        }

        if let Some(bytes) = self.metadata.get(META_DEPLOY_NONCE)? {
            host.set_deploy_nonce(read_u64(&bytes)?);
        }

        tracing::info!(
            ledgers = host.len(),
            deploy_nonce = host.deploy_nonce(),
            "host loaded from store"
        );
        Ok(host)
    }

    /// Journaled events of one ledger with `seq >= from`, oldest first, at
    /// most `limit` of them.
    pub fn events_for(
        &self,
        ledger: &Address,
        from: u64,
        limit: usize,
    ) -> StoreResult<Vec<EventRecord>> {
        let mut start = ledger.as_bytes().to_vec();
        start.extend_from_slice(&from.to_be_bytes());
        let mut end = ledger.as_bytes().to_vec();
        end.extend_from_slice(&u64::MAX.to_be_bytes());

        let mut out = Vec::new();
        for item in self.events.range(start..=end).take(limit) {
            let (_, value) = item?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    /// Total number of journaled events across all ledgers.
    pub fn journal_height(&self) -> StoreResult<u64> {
        match self.metadata.get(META_JOURNAL_HEIGHT)? {
            Some(bytes) => read_u64(&bytes),
            None => Ok(0),
        }
    }

    /// Number of stored ledgers.
    pub fn ledger_count(&self) -> usize {
        self.ledgers.len()
    }
}
