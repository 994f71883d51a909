//! # CE Token Ledger
//!
//! The ledger state machine: balances, allowances, total supply and the
//! owner slot of a single fungible token, plus every operation that may
//! change them.
//!
//! ## Invariants
//!
//! - **Conservation**: `total_supply` equals the sum of all balances,
//!   including the ledger's own account, after every call.
//! - **Atomicity**: each operation first computes every new value with
//!   checked arithmetic and only then writes. An `Err` leaves all tables
//!   untouched and emits nothing.
//! - **Unlimited allowance**: an allowance of `U256::MAX` is never
//!   decremented by spending.
//!
//! Zero-amount transfers, mints and burns are valid no-ops on balances;
//! they still emit their `Transfer` event, as ERC-20 observers expect.

use ce_protocol::amount::{self, UNLIMITED};
use ce_protocol::config::{
    INITIAL_SUPPLY_WHOLE, MAX_DECIMALS, TOKEN_DECIMALS, TOKEN_NAME, TOKEN_SYMBOL,
};
use ce_protocol::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{LedgerError, LedgerResult};
use crate::events::{EventLog, EventRecord, LedgerEvent};
use crate::ownable::Ownable;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Construction parameters for a ledger. `Default` yields the CE token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Human-readable name.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Implied decimal places.
    pub decimals: u8,
    /// Supply minted to the initial holder, in whole tokens.
    pub initial_supply: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            name: TOKEN_NAME.to_string(),
            symbol: TOKEN_SYMBOL.to_string(),
            decimals: TOKEN_DECIMALS,
            initial_supply: INITIAL_SUPPLY_WHOLE,
        }
    }
}

/// Immutable token metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

// ---------------------------------------------------------------------------
// Planned mutations
// ---------------------------------------------------------------------------

/// Validated outcome of a debit/credit pair, not yet written.
struct BalanceMove {
    from: Address,
    to: Address,
    new_from: Amount,
    new_to: Amount,
}

/// Validated allowance update. `None` means the allowance is unlimited and
/// stays as it is.
struct AllowanceSpend {
    owner: Address,
    spender: Address,
    remaining: Option<Amount>,
}

/// Validated burn, not yet written.
struct Burn {
    from: Address,
    new_balance: Amount,
    new_supply: Amount,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// A fungible-token ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    /// The ledger's own account.
    address: Address,
    metadata: TokenMetadata,
    total_supply: Amount,
    /// Zero balances are not stored.
    balances: BTreeMap<Address, Amount>,
    /// `owner -> spender -> remaining`. Zero allowances are not stored.
    allowances: BTreeMap<Address, BTreeMap<Address, Amount>>,
    ownable: Ownable,
    events: EventLog,
}

impl Ledger {
    /// Instantiates a ledger at `address`, minting the configured supply to
    /// `holder` and making `owner` the owner.
    ///
    /// Emits `OwnershipTransferred(0, owner)` followed by
    /// `Transfer(0, holder, supply)`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidOwner`] if `owner` is null.
    /// - [`LedgerError::InvalidRecipient`] if `holder` is null.
    /// - [`LedgerError::InvalidConfig`] for unusable decimals or a supply
    ///   that does not fit in 256 bits.
    pub fn new(
        address: Address,
        config: LedgerConfig,
        holder: Address,
        owner: Address,
    ) -> LedgerResult<Self> {
        if address.is_zero() {
            return Err(LedgerError::InvalidConfig(
                "ledger address cannot be null".into(),
            ));
        }
        if config.decimals > MAX_DECIMALS {
            return Err(LedgerError::InvalidConfig(format!(
                "decimals {} exceeds {}",
                config.decimals, MAX_DECIMALS
            )));
        }
        let supply = amount::whole_tokens(config.initial_supply, config.decimals)
            .map_err(|e| LedgerError::InvalidConfig(e.to_string()))?;

        let ownable = Ownable::new(owner)?;

        let mut ledger = Self {
            address,
            metadata: TokenMetadata {
                name: config.name,
                symbol: config.symbol,
                decimals: config.decimals,
            },
            total_supply: Amount::zero(),
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            ownable,
            events: EventLog::default(),
        };

        ledger.emit(LedgerEvent::OwnershipTransferred {
            previous_owner: Address::ZERO,
            new_owner: owner,
        });
        ledger.mint_unchecked(holder, supply)?;

        tracing::info!(
            ledger = %address,
            symbol = %ledger.metadata.symbol,
            %holder,
            %owner,
            supply = %supply,
            "ledger instantiated"
        );
        Ok(ledger)
    }

    // -- Queries ------------------------------------------------------------

    /// The ledger's own account.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn symbol(&self) -> &str {
        &self.metadata.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.metadata.decimals
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Balance of `account`; zero for accounts never seen.
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    /// Remaining amount `spender` may move out of `owner`'s balance.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or_default()
    }

    /// The current owner, or `None` once ownership has been renounced.
    pub fn owner(&self) -> Option<Address> {
        self.ownable.owner()
    }

    /// Every account with a non-zero balance.
    pub fn balances(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.balances.iter()
    }

    /// Number of accounts with a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Events emitted since the last drain.
    pub fn events(&self) -> &[EventRecord] {
        self.events.pending()
    }

    /// Takes the pending events.
    pub fn drain_events(&mut self) -> Vec<EventRecord> {
        self.events.drain()
    }

    /// Total number of events this ledger has ever emitted.
    pub fn event_count(&self) -> u64 {
        self.events.next_seq()
    }

    // -- Transfers ----------------------------------------------------------

    /// Moves `amount` from `caller` to `to`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSender`] if `caller` is null.
    /// - [`LedgerError::InvalidRecipient`] if `to` is null.
    /// - [`LedgerError::InsufficientBalance`] if `caller` holds less than `amount`.
    pub fn transfer(&mut self, caller: Address, to: Address, amount: Amount) -> LedgerResult<()> {
        let mv = self.plan_move(caller, to, amount)?;
        self.apply_move(mv, amount);
        tracing::debug!(ledger = %self.address, from = %caller, %to, %amount, "transfer");
        Ok(())
    }

    /// Sets `caller`'s allowance for `spender` to exactly `amount`.
    /// Zero revokes; [`UNLIMITED`] grants a never-decreasing allowance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidApprover`] if `caller` is null.
    /// - [`LedgerError::InvalidSpender`] if `spender` is null.
    pub fn approve(&mut self, caller: Address, spender: Address, amount: Amount) -> LedgerResult<()> {
        if caller.is_zero() {
            return Err(LedgerError::InvalidApprover(caller));
        }
        if spender.is_zero() {
            return Err(LedgerError::InvalidSpender(spender));
        }
        self.set_allowance(caller, spender, amount);
        self.emit(LedgerEvent::Approval {
            owner: caller,
            spender,
            value: amount,
        });
        tracing::debug!(ledger = %self.address, owner = %caller, %spender, %amount, "approve");
        Ok(())
    }

    /// Moves `amount` from `from` to `to` on `caller`'s allowance.
    ///
    /// The allowance is checked first, then the accounts, then `from`'s
    /// balance. Both the allowance and the balances change, or neither.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientAllowance`]
    /// - [`LedgerError::InvalidSender`] / [`LedgerError::InvalidRecipient`]
    /// - [`LedgerError::InsufficientBalance`]
    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> LedgerResult<()> {
        let spend = self.plan_spend(from, caller, amount)?;
        let mv = self.plan_move(from, to, amount)?;
        self.apply_spend(spend);
        self.apply_move(mv, amount);
        tracing::debug!(ledger = %self.address, spender = %caller, %from, %to, %amount, "transfer_from");
        Ok(())
    }

    // -- Supply -------------------------------------------------------------

    /// Creates `amount` new tokens in `to`'s balance. Owner only.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] if `caller` is not the owner.
    /// - [`LedgerError::InvalidRecipient`] if `to` is null.
    /// - [`LedgerError::SupplyOverflow`] if total supply would overflow.
    pub fn mint(&mut self, caller: Address, to: Address, amount: Amount) -> LedgerResult<()> {
        self.ownable.check_owner(&caller)?;
        self.mint_unchecked(to, amount)?;
        tracing::debug!(ledger = %self.address, %to, %amount, "mint");
        Ok(())
    }

    /// Destroys `amount` of `caller`'s own tokens.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSender`] if `caller` is null.
    /// - [`LedgerError::InsufficientBalance`] if `caller` holds less than `amount`.
    pub fn burn(&mut self, caller: Address, amount: Amount) -> LedgerResult<()> {
        let burn = self.plan_burn(caller, amount)?;
        self.apply_burn(burn, amount);
        tracing::debug!(ledger = %self.address, from = %caller, %amount, "burn");
        Ok(())
    }

    /// Destroys `amount` of `from`'s tokens on `caller`'s allowance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientAllowance`]
    /// - [`LedgerError::InvalidSender`] if `from` is null.
    /// - [`LedgerError::InsufficientBalance`]
    pub fn burn_from(&mut self, caller: Address, from: Address, amount: Amount) -> LedgerResult<()> {
        let spend = self.plan_spend(from, caller, amount)?;
        let burn = self.plan_burn(from, amount)?;
        self.apply_spend(spend);
        self.apply_burn(burn, amount);
        tracing::debug!(ledger = %self.address, spender = %caller, %from, %amount, "burn_from");
        Ok(())
    }

    // -- Ownership ----------------------------------------------------------

    /// Hands ownership to `new_owner`. Owner only.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] if `caller` is not the owner.
    /// - [`LedgerError::InvalidOwner`] if `new_owner` is null.
    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> LedgerResult<()> {
        let previous_owner = self.ownable.transfer(&caller, new_owner)?;
        self.emit(LedgerEvent::OwnershipTransferred {
            previous_owner,
            new_owner,
        });
        tracing::info!(ledger = %self.address, %previous_owner, %new_owner, "ownership transferred");
        Ok(())
    }

    /// Leaves the ledger without an owner. Mint and recovery become
    /// permanently unavailable.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] if `caller` is not the owner.
    pub fn renounce_ownership(&mut self, caller: Address) -> LedgerResult<()> {
        let previous_owner = self.ownable.renounce(&caller)?;
        self.emit(LedgerEvent::OwnershipTransferred {
            previous_owner,
            new_owner: Address::ZERO,
        });
        tracing::info!(ledger = %self.address, %previous_owner, "ownership renounced");
        Ok(())
    }

    // -- Internals ----------------------------------------------------------

    pub(crate) fn check_owner(&self, caller: &Address) -> LedgerResult<Address> {
        self.ownable.check_owner(caller)
    }

    fn emit(&mut self, event: LedgerEvent) {
        self.events.emit(self.address, event);
    }

    fn set_balance(&mut self, account: Address, value: Amount) {
        if value.is_zero() {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, value);
        }
    }

    fn set_allowance(&mut self, owner: Address, spender: Address, value: Amount) {
        if value.is_zero() {
            if let Some(per_owner) = self.allowances.get_mut(&owner) {
                per_owner.remove(&spender);
                if per_owner.is_empty() {
                    self.allowances.remove(&owner);
                }
            }
        } else {
            self.allowances
                .entry(owner)
                .or_default()
                .insert(spender, value);
        }
    }

    fn plan_move(
        &self,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> LedgerResult<BalanceMove> {
        if from.is_zero() {
            return Err(LedgerError::InvalidSender(from));
        }
        if to.is_zero() {
            return Err(LedgerError::InvalidRecipient(to));
        }
        let from_balance = self.balance_of(&from);
        let new_from = from_balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                account: from,
                balance: from_balance,
                needed: amount,
            })?;
        let new_to = if from == to {
            from_balance
        } else {
            self.balance_of(&to)
                .checked_add(amount)
                .ok_or(LedgerError::SupplyOverflow { amount })?
        };
        Ok(BalanceMove {
            from,
            to,
            new_from,
            new_to,
        })
    }

    fn apply_move(&mut self, mv: BalanceMove, amount: Amount) {
        if mv.from != mv.to {
            self.set_balance(mv.from, mv.new_from);
            self.set_balance(mv.to, mv.new_to);
        }
        self.emit(LedgerEvent::Transfer {
            from: mv.from,
            to: mv.to,
            value: amount,
        });
    }

    fn plan_spend(
        &self,
        owner: Address,
        spender: Address,
        amount: Amount,
    ) -> LedgerResult<AllowanceSpend> {
        let current = self.allowance(&owner, &spender);
        if current == UNLIMITED {
            return Ok(AllowanceSpend {
                owner,
                spender,
                remaining: None,
            });
        }
        let remaining = current
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientAllowance {
                spender,
                allowance: current,
                needed: amount,
            })?;
        Ok(AllowanceSpend {
            owner,
            spender,
            remaining: Some(remaining),
        })
    }

    fn apply_spend(&mut self, spend: AllowanceSpend) {
        if let Some(remaining) = spend.remaining {
            self.set_allowance(spend.owner, spend.spender, remaining);
        }
    }

    fn plan_burn(&self, from: Address, amount: Amount) -> LedgerResult<Burn> {
        if from.is_zero() {
            return Err(LedgerError::InvalidSender(from));
        }
        let balance = self.balance_of(&from);
        let insufficient = || LedgerError::InsufficientBalance {
            account: from,
            balance,
            needed: amount,
        };
        let new_balance = balance.checked_sub(amount).ok_or_else(insufficient)?;
        let new_supply = self
            .total_supply
            .checked_sub(amount)
            .ok_or_else(insufficient)?;
        Ok(Burn {
            from,
            new_balance,
            new_supply,
        })
    }

    fn apply_burn(&mut self, burn: Burn, amount: Amount) {
        self.set_balance(burn.from, burn.new_balance);
        self.total_supply = burn.new_supply;
        self.emit(LedgerEvent::Transfer {
            from: burn.from,
            to: Address::ZERO,
            value: amount,
        });
    }

    /// Mint without the owner check; used by construction and `mint`.
    fn mint_unchecked(&mut self, to: Address, amount: Amount) -> LedgerResult<()> {
        if to.is_zero() {
            return Err(LedgerError::InvalidRecipient(to));
        }
        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::SupplyOverflow { amount })?;
        let new_balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(LedgerError::SupplyOverflow { amount })?;
        self.total_supply = new_supply;
        self.set_balance(to, new_balance);
        self.emit(LedgerEvent::Transfer {
            from: Address::ZERO,
            to,
            value: amount,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ce_protocol::amount::whole_tokens;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn tokens(n: u64) -> Amount {
        whole_tokens(n, 18).unwrap()
    }

    const LEDGER: u64 = 0xce;
    const OWNER: u64 = 1;

    fn ledger() -> Ledger {
        let mut l = Ledger::new(addr(LEDGER), LedgerConfig::default(), addr(OWNER), addr(OWNER))
            .unwrap();
        l.drain_events();
        l
    }

    fn small_ledger(supply: u64) -> Ledger {
        let config = LedgerConfig {
            decimals: 0,
            initial_supply: supply,
            ..LedgerConfig::default()
        };
        let mut l = Ledger::new(addr(LEDGER), config, addr(OWNER), addr(OWNER)).unwrap();
        l.drain_events();
        l
    }

    fn sum_of_balances(l: &Ledger) -> Amount {
        l.balances()
            .fold(Amount::zero(), |acc, (_, b)| acc.checked_add(*b).unwrap())
    }

    #[test]
    fn construction_mints_supply_and_sets_owner() {
        let mut l =
            Ledger::new(addr(LEDGER), LedgerConfig::default(), addr(OWNER), addr(OWNER)).unwrap();
        assert_eq!(l.total_supply(), tokens(1_000_000_000));
        assert_eq!(l.balance_of(&addr(OWNER)), l.total_supply());
        assert_eq!(l.owner(), Some(addr(OWNER)));
        assert_eq!(l.name(), "CE Token");
        assert_eq!(l.symbol(), "CE");
        assert_eq!(l.decimals(), 18);

        let events: Vec<_> = l.drain_events().into_iter().map(|r| r.event).collect();
        assert_eq!(
            events,
            vec![
                LedgerEvent::OwnershipTransferred {
                    previous_owner: Address::ZERO,
                    new_owner: addr(OWNER),
                },
                LedgerEvent::Transfer {
                    from: Address::ZERO,
                    to: addr(OWNER),
                    value: tokens(1_000_000_000),
                },
            ]
        );
    }

    #[test]
    fn separate_owner_and_holder() {
        let l = Ledger::new(addr(LEDGER), LedgerConfig::default(), addr(5), addr(6)).unwrap();
        assert_eq!(l.balance_of(&addr(5)), l.total_supply());
        assert_eq!(l.owner(), Some(addr(6)));
    }

    #[test]
    fn construction_rejects_null_parties() {
        let cfg = LedgerConfig::default;
        assert_eq!(
            Ledger::new(addr(LEDGER), cfg(), Address::ZERO, addr(1)).unwrap_err(),
            LedgerError::InvalidRecipient(Address::ZERO)
        );
        assert_eq!(
            Ledger::new(addr(LEDGER), cfg(), addr(1), Address::ZERO).unwrap_err(),
            LedgerError::InvalidOwner(Address::ZERO)
        );
        assert!(matches!(
            Ledger::new(Address::ZERO, cfg(), addr(1), addr(1)),
            Err(LedgerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn construction_rejects_unusable_decimals() {
        let config = LedgerConfig {
            decimals: 78,
            ..LedgerConfig::default()
        };
        assert!(matches!(
            Ledger::new(addr(LEDGER), config, addr(1), addr(1)),
            Err(LedgerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn transfer_moves_balance_and_emits() {
        let mut l = ledger();
        l.transfer(addr(OWNER), addr(2), tokens(100)).unwrap();
        assert_eq!(l.balance_of(&addr(2)), tokens(100));
        assert_eq!(
            l.balance_of(&addr(OWNER)),
            tokens(1_000_000_000) - tokens(100)
        );
        assert_eq!(
            l.events()[0].event,
            LedgerEvent::Transfer {
                from: addr(OWNER),
                to: addr(2),
                value: tokens(100),
            }
        );
    }

    #[test]
    fn transfer_insufficient_balance_changes_nothing() {
        let mut l = ledger();
        let err = l.transfer(addr(2), addr(OWNER), tokens(1)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                account: addr(2),
                balance: Amount::zero(),
                needed: tokens(1),
            }
        );
        assert_eq!(l.balance_of(&addr(OWNER)), l.total_supply());
        assert!(l.events().is_empty());
    }

    #[test]
    fn transfer_to_null_rejected() {
        let mut l = ledger();
        assert_eq!(
            l.transfer(addr(OWNER), Address::ZERO, tokens(1)),
            Err(LedgerError::InvalidRecipient(Address::ZERO))
        );
        assert_eq!(
            l.transfer(Address::ZERO, addr(2), Amount::zero()),
            Err(LedgerError::InvalidSender(Address::ZERO))
        );
    }

    #[test]
    fn self_transfer_keeps_balance() {
        let mut l = small_ledger(10);
        l.transfer(addr(OWNER), addr(OWNER), Amount::from(4)).unwrap();
        assert_eq!(l.balance_of(&addr(OWNER)), Amount::from(10));
        assert!(l.transfer(addr(OWNER), addr(OWNER), Amount::from(11)).is_err());
    }

    #[test]
    fn zero_amount_operations_are_no_ops_on_balances() {
        let mut l = small_ledger(10);
        l.transfer(addr(2), addr(3), Amount::zero()).unwrap();
        l.mint(addr(OWNER), addr(2), Amount::zero()).unwrap();
        l.burn(addr(2), Amount::zero()).unwrap();
        assert_eq!(l.balance_of(&addr(2)), Amount::zero());
        assert_eq!(l.balance_of(&addr(3)), Amount::zero());
        assert_eq!(l.total_supply(), Amount::from(10));
        assert_eq!(l.holder_count(), 1);
        assert_eq!(l.events().len(), 3);
    }

    #[test]
    fn approve_overwrites_and_zero_revokes() {
        let mut l = small_ledger(10);
        l.approve(addr(OWNER), addr(2), Amount::from(5)).unwrap();
        l.approve(addr(OWNER), addr(2), Amount::from(3)).unwrap();
        assert_eq!(l.allowance(&addr(OWNER), &addr(2)), Amount::from(3));
        l.approve(addr(OWNER), addr(2), Amount::zero()).unwrap();
        assert_eq!(l.allowance(&addr(OWNER), &addr(2)), Amount::zero());
        assert_eq!(
            l.events().last().unwrap().event,
            LedgerEvent::Approval {
                owner: addr(OWNER),
                spender: addr(2),
                value: Amount::zero(),
            }
        );
    }

    #[test]
    fn approve_needs_no_balance_but_rejects_null_accounts() {
        let mut l = small_ledger(10);
        l.approve(addr(7), addr(8), Amount::from(1_000)).unwrap();
        assert_eq!(l.allowance(&addr(7), &addr(8)), Amount::from(1_000));
        assert_eq!(
            l.approve(addr(7), Address::ZERO, Amount::one()),
            Err(LedgerError::InvalidSpender(Address::ZERO))
        );
        assert_eq!(
            l.approve(Address::ZERO, addr(7), Amount::one()),
            Err(LedgerError::InvalidApprover(Address::ZERO))
        );
    }

    #[test]
    fn transfer_from_decrements_allowance() {
        let mut l = small_ledger(1_000);
        let (a, b, c) = (addr(OWNER), addr(2), addr(3));
        l.approve(a, b, Amount::from(100)).unwrap();
        l.transfer_from(b, a, c, Amount::from(40)).unwrap();
        assert_eq!(l.allowance(&a, &b), Amount::from(60));
        assert_eq!(l.balance_of(&c), Amount::from(40));

        let before = l.clone();
        let pending_before = l.events().len();
        assert_eq!(
            l.transfer_from(b, a, c, Amount::from(61)),
            Err(LedgerError::InsufficientAllowance {
                spender: b,
                allowance: Amount::from(60),
                needed: Amount::from(61),
            })
        );
        assert_eq!(l.allowance(&a, &b), before.allowance(&a, &b));
        assert_eq!(l.balance_of(&a), before.balance_of(&a));
        assert_eq!(l.balance_of(&c), before.balance_of(&c));
        assert_eq!(l.events().len(), pending_before);
    }

    #[test]
    fn transfer_from_balance_failure_keeps_allowance() {
        let mut l = small_ledger(10);
        l.transfer(addr(OWNER), addr(2), Amount::from(5)).unwrap();
        l.approve(addr(2), addr(3), Amount::from(100)).unwrap();
        assert!(matches!(
            l.transfer_from(addr(3), addr(2), addr(4), Amount::from(6)),
            Err(LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(l.allowance(&addr(2), &addr(3)), Amount::from(100));
        assert_eq!(l.balance_of(&addr(2)), Amount::from(5));
    }

    #[test]
    fn transfer_from_checks_allowance_before_recipient() {
        let mut l = small_ledger(10);
        assert!(matches!(
            l.transfer_from(addr(3), addr(OWNER), Address::ZERO, Amount::from(1)),
            Err(LedgerError::InsufficientAllowance { .. })
        ));
        l.approve(addr(OWNER), addr(3), Amount::from(1)).unwrap();
        assert_eq!(
            l.transfer_from(addr(3), addr(OWNER), Address::ZERO, Amount::from(1)),
            Err(LedgerError::InvalidRecipient(Address::ZERO))
        );
        assert_eq!(l.allowance(&addr(OWNER), &addr(3)), Amount::from(1));
    }

    #[test]
    fn unlimited_allowance_is_never_decremented() {
        let mut l = small_ledger(100);
        l.approve(addr(OWNER), addr(2), UNLIMITED).unwrap();
        l.transfer_from(addr(2), addr(OWNER), addr(3), Amount::from(30))
            .unwrap();
        l.burn_from(addr(2), addr(OWNER), Amount::from(20)).unwrap();
        assert_eq!(l.allowance(&addr(OWNER), &addr(2)), UNLIMITED);
        assert_eq!(l.total_supply(), Amount::from(80));
    }

    #[test]
    fn transfer_from_emits_only_transfer() {
        let mut l = small_ledger(100);
        l.approve(addr(OWNER), addr(2), Amount::from(10)).unwrap();
        l.drain_events();
        l.transfer_from(addr(2), addr(OWNER), addr(3), Amount::from(10))
            .unwrap();
        let events: Vec<_> = l.drain_events().into_iter().map(|r| r.event).collect();
        assert_eq!(
            events,
            vec![LedgerEvent::Transfer {
                from: addr(OWNER),
                to: addr(3),
                value: Amount::from(10),
            }]
        );
    }

    #[test]
    fn mint_is_owner_only() {
        let mut l = small_ledger(100);
        assert_eq!(
            l.mint(addr(2), addr(2), Amount::from(5)),
            Err(LedgerError::Unauthorized { account: addr(2) })
        );
        l.mint(addr(OWNER), addr(2), Amount::from(5)).unwrap();
        assert_eq!(l.total_supply(), Amount::from(105));
        assert_eq!(
            l.events().last().unwrap().event,
            LedgerEvent::Transfer {
                from: Address::ZERO,
                to: addr(2),
                value: Amount::from(5),
            }
        );
    }

    #[test]
    fn mint_to_null_rejected() {
        let mut l = small_ledger(100);
        assert_eq!(
            l.mint(addr(OWNER), Address::ZERO, Amount::one()),
            Err(LedgerError::InvalidRecipient(Address::ZERO))
        );
    }

    #[test]
    fn mint_overflow_rejected_without_change() {
        let mut l = small_ledger(100);
        let err = l.mint(addr(OWNER), addr(2), Amount::MAX).unwrap_err();
        assert_eq!(err, LedgerError::SupplyOverflow { amount: Amount::MAX });
        assert_eq!(l.total_supply(), Amount::from(100));
        assert_eq!(l.balance_of(&addr(2)), Amount::zero());
    }

    #[test]
    fn burn_reduces_balance_and_supply() {
        let mut l = small_ledger(100);
        l.burn(addr(OWNER), Amount::from(40)).unwrap();
        assert_eq!(l.balance_of(&addr(OWNER)), Amount::from(60));
        assert_eq!(l.total_supply(), Amount::from(60));

        assert!(matches!(
            l.burn(addr(OWNER), Amount::from(61)),
            Err(LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(l.total_supply(), Amount::from(60));
    }

    #[test]
    fn burn_from_requires_allowance() {
        let mut l = small_ledger(100);
        l.transfer(addr(OWNER), addr(2), Amount::from(50)).unwrap();
        assert!(matches!(
            l.burn_from(addr(OWNER), addr(2), Amount::from(10)),
            Err(LedgerError::InsufficientAllowance { .. })
        ));
        l.approve(addr(2), addr(OWNER), Amount::from(10)).unwrap();
        l.burn_from(addr(OWNER), addr(2), Amount::from(10)).unwrap();
        assert_eq!(l.balance_of(&addr(2)), Amount::from(40));
        assert_eq!(l.total_supply(), Amount::from(90));
        assert_eq!(l.allowance(&addr(2), &addr(OWNER)), Amount::zero());
    }

    #[test]
    fn ownership_transfer_and_renounce() {
        let mut l = small_ledger(100);
        l.transfer_ownership(addr(OWNER), addr(9)).unwrap();
        assert_eq!(l.owner(), Some(addr(9)));
        assert!(l.mint(addr(OWNER), addr(2), Amount::one()).is_err());
        l.mint(addr(9), addr(2), Amount::one()).unwrap();

        l.renounce_ownership(addr(9)).unwrap();
        assert_eq!(l.owner(), None);
        assert_eq!(
            l.mint(addr(9), addr(2), Amount::one()),
            Err(LedgerError::Unauthorized { account: addr(9) })
        );
        assert_eq!(
            l.events().last().unwrap().event,
            LedgerEvent::OwnershipTransferred {
                previous_owner: addr(9),
                new_owner: Address::ZERO,
            }
        );
    }

    #[test]
    fn conservation_after_mixed_operations() {
        let mut l = small_ledger(1_000);
        l.transfer(addr(OWNER), addr(2), Amount::from(300)).unwrap();
        l.approve(addr(2), addr(3), Amount::from(200)).unwrap();
        l.transfer_from(addr(3), addr(2), addr(4), Amount::from(150))
            .unwrap();
        l.burn_from(addr(3), addr(2), Amount::from(50)).unwrap();
        l.mint(addr(OWNER), addr(5), Amount::from(25)).unwrap();
        l.burn(addr(4), Amount::from(10)).unwrap();
        assert_eq!(sum_of_balances(&l), l.total_supply());
        assert_eq!(l.total_supply(), Amount::from(965));
    }

    #[test]
    fn state_survives_serialization() {
        let mut l = small_ledger(100);
        l.approve(addr(OWNER), addr(2), Amount::from(7)).unwrap();
        let bytes = bincode::serialize(&l).unwrap();
        let restored: Ledger = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored.total_supply(), l.total_supply());
        assert_eq!(restored.allowance(&addr(OWNER), &addr(2)), Amount::from(7));
        assert_eq!(restored.owner(), l.owner());
        assert_eq!(restored.event_count(), l.event_count());
        assert!(restored.events().is_empty());
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: LedgerConfig = serde_json::from_str(r#"{"symbol":"XT"}"#).unwrap();
        assert_eq!(config.symbol, "XT");
        assert_eq!(config.name, "CE Token");
        assert_eq!(config.initial_supply, INITIAL_SUPPLY_WHOLE);
    }
}
