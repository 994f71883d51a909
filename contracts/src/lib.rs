//! # CE Ledger Contracts
//!
//! The ledger state machine behind the CE token:
//!
//! - **Token** ([`token`]): balances, allowances, total supply and every
//!   ERC-20 style operation on them, including mint, burn and burn-from.
//! - **Ownable** ([`ownable`]): the single privileged account and its check.
//! - **Recovery** ([`recovery`]): owner-only withdrawal of tokens stuck at a
//!   ledger's own address, for its own asset or a foreign one.
//! - **Host** ([`host`]): a set of deployed ledgers, so that foreign
//!   recovery has two real ledgers to route between.
//!
//! ## Design Principles
//!
//! 1. All monetary operations use checked arithmetic on 256-bit amounts.
//! 2. Every check runs before the first write. An `Err` leaves the ledger
//!    exactly as it was and emits nothing.
//! 3. The caller is an explicit argument of every operation. Authenticating
//!    it is the embedding host's job.
//! 4. Every public state type is serializable (serde) for wire transport and
//!    persistent storage.

pub mod error;
pub mod events;
pub mod host;
pub mod ownable;
pub mod recovery;
pub mod token;

pub use error::{LedgerError, LedgerResult};
pub use events::{EventLog, EventRecord, LedgerEvent};
pub use host::{HostError, HostResult, LedgerHost};
pub use ownable::Ownable;
pub use recovery::FungibleAsset;
pub use token::{Ledger, LedgerConfig, TokenMetadata};
