// Copyright (c) 2026 CE Ledger Contributors. MIT License.
// See LICENSE for details.

//! # CE Protocol Core Primitives
//!
//! The vocabulary every other crate in the workspace speaks: who holds
//! value ([`Address`]), how much of it ([`Amount`]), and the constants that
//! pin down what a CE token is.
//!
//! ## Architecture
//!
//! - **address**: 20-byte account identifiers, hex encoded on the wire.
//! - **amount**: 256-bit unsigned quantities plus decimal unit helpers.
//! - **hash**: BLAKE3 helpers and deterministic ledger address derivation.
//! - **config**: Token defaults, ports, and other constants.
//!
//! ## Design Philosophy
//!
//! 1. Money never wraps. Anything that can overflow goes through
//!    `checked_*` and the caller decides what the failure means.
//! 2. Parsing is strict. A malformed address or amount is an error, not a
//!    silently zeroed value.

pub mod address;
pub mod amount;
pub mod config;
pub mod hash;

pub use address::{Address, AddressError};
pub use amount::{format_units, parse_units, Amount, AmountError};
