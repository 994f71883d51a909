//! # Stuck Asset Recovery
//!
//! Tokens sent to a ledger's own address cannot be moved by anyone: the
//! ledger never acts as a caller on its own behalf. The owner can pull them
//! out again:
//!
//! - [`Ledger::withdraw_stuck_self`] recovers this ledger's own tokens.
//! - [`Ledger::withdraw_stuck_foreign`] recovers tokens of *another*
//!   fungible asset that this ledger's address happens to hold, by calling
//!   that asset's own `transfer` with the ledger as caller.
//!
//! ## Re-entrancy
//!
//! `withdraw_stuck_foreign` holds `&mut self` and `&mut dyn FungibleAsset`
//! for the whole call. The foreign asset has no path back into the
//! recovering ledger while its `transfer` runs, so a misbehaving asset can
//! fail the call but cannot interleave with it.

use ce_protocol::{Address, Amount};

use crate::error::LedgerResult;
use crate::token::Ledger;

/// The slice of a fungible asset that recovery needs.
pub trait FungibleAsset {
    /// Address of the asset's ledger.
    fn asset_address(&self) -> Address;

    /// Balance of `account` in this asset.
    fn balance_of(&self, account: &Address) -> Amount;

    /// Moves `amount` from `caller` to `to`, with the asset's own rules.
    fn transfer(&mut self, caller: Address, to: Address, amount: Amount) -> LedgerResult<()>;
}

impl FungibleAsset for Ledger {
    fn asset_address(&self) -> Address {
        self.address()
    }

    fn balance_of(&self, account: &Address) -> Amount {
        Ledger::balance_of(self, account)
    }

    fn transfer(&mut self, caller: Address, to: Address, amount: Amount) -> LedgerResult<()> {
        Ledger::transfer(self, caller, to, amount)
    }
}

impl Ledger {
    /// Sends the ledger's entire self-held balance to the owner and returns
    /// the amount moved.
    ///
    /// Emits `Transfer(ledger, owner, amount)`. With nothing stuck the call
    /// succeeds, returns zero, and emits nothing.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`](crate::LedgerError::Unauthorized) if
    /// `caller` is not the owner.
    pub fn withdraw_stuck_self(&mut self, caller: Address) -> LedgerResult<Amount> {
        let owner = self.check_owner(&caller)?;
        let this = self.address();
        let stuck = Ledger::balance_of(self, &this);
        if stuck.is_zero() {
            tracing::debug!(ledger = %this, "no stuck balance to withdraw");
            return Ok(stuck);
        }
        Ledger::transfer(self, this, owner, stuck)?;
        tracing::info!(ledger = %this, %owner, amount = %stuck, "withdrew stuck balance");
        Ok(stuck)
    }

    /// Sends everything `foreign` credits to this ledger's address over to
    /// the owner, through `foreign`'s own transfer. Returns the amount moved.
    ///
    /// Whatever `foreign` emits is emitted on its stream, not this one. A
    /// zero foreign balance is a successful no-op that never calls `foreign`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`](crate::LedgerError::Unauthorized) if
    ///   `caller` is not the owner.
    /// - Any error `foreign.transfer` returns, unchanged.
    pub fn withdraw_stuck_foreign(
        &mut self,
        caller: Address,
        foreign: &mut dyn FungibleAsset,
    ) -> LedgerResult<Amount> {
        let owner = self.check_owner(&caller)?;
        let this = self.address();
        let asset = foreign.asset_address();
        let stuck = foreign.balance_of(&this);
        if stuck.is_zero() {
            tracing::debug!(ledger = %this, %asset, "no foreign balance to withdraw");
            return Ok(stuck);
        }
        foreign.transfer(this, owner, stuck).map_err(|e| {
            tracing::warn!(ledger = %this, %asset, error = %e, "foreign withdrawal rejected");
            e
        })?;
        tracing::info!(ledger = %this, %asset, %owner, amount = %stuck, "withdrew foreign balance");
        Ok(stuck)
    }
}
