//! # Ledger Host
//!
//! Owns every deployed ledger, keyed by address. The host is what makes a
//! "foreign asset handle" concrete: recovering another ledger's tokens is a
//! call routed between two ledgers that both live here.
//!
//! Deployment derives each ledger's address from the deployer and the
//! host's deployment nonce (see [`ce_protocol::hash::derive_ledger_address`]).

use ce_protocol::hash::derive_ledger_address;
use ce_protocol::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::error::LedgerError;
use crate::events::EventRecord;
use crate::token::{Ledger, LedgerConfig};

/// Errors raised by the host itself, or passed through from a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// No ledger is deployed at this address.
    #[error("unknown ledger: {0}")]
    UnknownLedger(Address),

    /// A ledger was asked to recover its own tokens as a foreign asset.
    #[error("ledger {0} cannot recover itself as a foreign asset; use withdraw_stuck_self")]
    SelfRecovery(Address),

    /// A ledger with this address is already hosted.
    #[error("ledger already deployed at {0}")]
    AlreadyDeployed(Address),

    /// The ledger rejected the operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result alias for host operations.
pub type HostResult<T> = Result<T, HostError>;

/// The set of ledgers served by one process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerHost {
    ledgers: BTreeMap<Address, Ledger>,
    /// Deployment order; event draining follows it.
    order: Vec<Address>,
    deploy_nonce: u64,
}

impl LedgerHost {
    /// Creates an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploys a new ledger and returns its address.
    ///
    /// # Errors
    ///
    /// Whatever [`Ledger::new`] rejects, wrapped in [`HostError::Ledger`].
    pub fn deploy(
        &mut self,
        deployer: Address,
        config: LedgerConfig,
        holder: Address,
        owner: Address,
    ) -> HostResult<Address> {
        let mut address = derive_ledger_address(&deployer, self.deploy_nonce);
        while self.ledgers.contains_key(&address) {
            self.deploy_nonce += 1;
            address = derive_ledger_address(&deployer, self.deploy_nonce);
        }
        let ledger = Ledger::new(address, config, holder, owner)?;
        self.deploy_nonce += 1;
        self.ledgers.insert(address, ledger);
        self.order.push(address);
        tracing::info!(%address, %deployer, nonce = self.deploy_nonce - 1, "ledger deployed");
        Ok(address)
    }

    /// Adds an already-built ledger, e.g. one loaded from storage.
    pub fn insert(&mut self, ledger: Ledger) -> HostResult<()> {
        let address = ledger.address();
        if self.ledgers.contains_key(&address) {
            return Err(HostError::AlreadyDeployed(address));
        }
        self.ledgers.insert(address, ledger);
        self.order.push(address);
        Ok(())
    }

    /// Looks up a ledger.
    pub fn ledger(&self, address: &Address) -> HostResult<&Ledger> {
        self.ledgers
            .get(address)
            .ok_or(HostError::UnknownLedger(*address))
    }

    /// Looks up a ledger for mutation.
    pub fn ledger_mut(&mut self, address: &Address) -> HostResult<&mut Ledger> {
        self.ledgers
            .get_mut(address)
            .ok_or(HostError::UnknownLedger(*address))
    }

    /// Ledgers in deployment order.
    pub fn ledgers(&self) -> impl Iterator<Item = &Ledger> {
        self.order.iter().filter_map(|a| self.ledgers.get(a))
    }

    /// Addresses in deployment order.
    pub fn addresses(&self) -> &[Address] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }

    /// Nonce the next deployment will use.
    pub fn deploy_nonce(&self) -> u64 {
        self.deploy_nonce
    }

    /// Restores the deployment nonce after loading ledgers from storage.
    pub fn set_deploy_nonce(&mut self, nonce: u64) {
        self.deploy_nonce = nonce;
    }

    /// Has `ledger`'s owner pull everything `foreign` credits to `ledger`'s
    /// address.
    ///
    /// The foreign ledger is taken out of the host for the duration of the
    /// call and put back afterwards, whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`HostError::SelfRecovery`] if both addresses are the same.
    /// - [`HostError::UnknownLedger`] if either is not hosted.
    /// - [`HostError::Ledger`] for anything either ledger rejects.
    pub fn withdraw_stuck_foreign(
        &mut self,
        ledger: &Address,
        caller: Address,
        foreign: &Address,
    ) -> HostResult<Amount> {
        if ledger == foreign {
            return Err(HostError::SelfRecovery(*ledger));
        }
        if !self.ledgers.contains_key(ledger) {
            return Err(HostError::UnknownLedger(*ledger));
        }
        let mut foreign_ledger = self
            .ledgers
            .remove(foreign)
            .ok_or(HostError::UnknownLedger(*foreign))?;

        let result = match self.ledgers.get_mut(ledger) {
            Some(recovering) => recovering
                .withdraw_stuck_foreign(caller, &mut foreign_ledger)
                .map_err(HostError::from),
            None => Err(HostError::UnknownLedger(*ledger)),
        };

        self.ledgers.insert(*foreign, foreign_ledger);
        result
    }

    /// Drains pending events of every ledger, in deployment order.
    pub fn drain_events(&mut self) -> Vec<EventRecord> {
        let mut out = Vec::new();
        for address in &self.order {
            if let Some(ledger) = self.ledgers.get_mut(address) {
                out.extend(ledger.drain_events());
            }
        }
        out
    }
}
