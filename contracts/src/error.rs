//! Errors raised by ledger operations.
//!
//! Every variant is a precondition failure: it is detected before any table
//! is touched, so an `Err` always means the ledger is exactly as it was
//! before the call.

use ce_protocol::{Address, Amount};
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The debited account holds less than the requested amount.
    #[error("insufficient balance: {account} has {balance}, needs {needed}")]
    InsufficientBalance {
        /// Account being debited.
        account: Address,
        /// Its current balance.
        balance: Amount,
        /// Amount requested.
        needed: Amount,
    },

    /// The spender's remaining allowance is below the requested amount.
    #[error("insufficient allowance: {spender} may spend {allowance}, needs {needed}")]
    InsufficientAllowance {
        /// Account spending on the holder's behalf.
        spender: Address,
        /// Remaining allowance.
        allowance: Amount,
        /// Amount requested.
        needed: Amount,
    },

    /// The caller is not the owner (or ownership has been renounced).
    #[error("unauthorized account: {account}")]
    Unauthorized {
        /// The rejected caller.
        account: Address,
    },

    /// Tokens cannot be sent to the null account.
    #[error("invalid recipient: {0}")]
    InvalidRecipient(Address),

    /// Tokens cannot be moved out of the null account.
    #[error("invalid sender: {0}")]
    InvalidSender(Address),

    /// The null account cannot grant allowances.
    #[error("invalid approver: {0}")]
    InvalidApprover(Address),

    /// Allowances cannot be granted to the null account.
    #[error("invalid spender: {0}")]
    InvalidSpender(Address),

    /// Ownership cannot be assigned to the null account.
    #[error("invalid owner: {0}")]
    InvalidOwner(Address),

    /// Minting would push total supply past 2^256 - 1.
    #[error("supply overflow: minting {amount} would exceed the 256-bit range")]
    SupplyOverflow {
        /// The amount that was attempted.
        amount: Amount,
    },

    /// The ledger configuration cannot be instantiated.
    #[error("invalid ledger config: {0}")]
    InvalidConfig(String),
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
