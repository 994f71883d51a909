//! # Ownership
//!
//! A single stored owner and an explicit capability check. Privileged
//! ledger operations call [`Ownable::check_owner`] before doing anything
//! else.
//!
//! Renouncing leaves the ledger ownerless for good: `check_owner` then fails
//! for every caller, including the null account.

use ce_protocol::Address;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// The owner slot of a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownable {
    owner: Option<Address>,
}

impl Ownable {
    /// Creates the slot with an initial owner.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidOwner`] for the null account.
    pub fn new(owner: Address) -> LedgerResult<Self> {
        if owner.is_zero() {
            return Err(LedgerError::InvalidOwner(owner));
        }
        Ok(Self { owner: Some(owner) })
    }

    /// The current owner, or `None` once renounced.
    pub fn owner(&self) -> Option<Address> {
        self.owner
    }

    /// Succeeds with the owner's address iff `caller` is the owner.
    pub fn check_owner(&self, caller: &Address) -> LedgerResult<Address> {
        match self.owner {
            Some(owner) if owner == *caller => Ok(owner),
            _ => Err(LedgerError::Unauthorized { account: *caller }),
        }
    }

    /// Hands ownership to `new_owner`. Returns the previous owner.
    pub fn transfer(&mut self, caller: &Address, new_owner: Address) -> LedgerResult<Address> {
        let previous = self.check_owner(caller)?;
        if new_owner.is_zero() {
            return Err(LedgerError::InvalidOwner(new_owner));
        }
        self.owner = Some(new_owner);
        Ok(previous)
    }

    /// Gives ownership up. Returns the previous owner.
    pub fn renounce(&mut self, caller: &Address) -> LedgerResult<Address> {
        let previous = self.check_owner(caller)?;
        self.owner = None;
        Ok(previous)
    }
}
