//! # Amounts
//!
//! Balances, allowances and supply are unsigned 256-bit integers counted in
//! the token's smallest unit. With 18 decimals, one whole token is `10^18`
//! base units, so the initial supply of one billion tokens is `10^27` base
//! units: comfortably inside 256 bits, and not inside 64.
//!
//! [`parse_units`] and [`format_units`] convert between decimal strings
//! ("100.5") and base units. The protocol itself never divides; these are
//! for humans and for the wire.

use primitive_types::U256;
use thiserror::Error;

use crate::config::MAX_DECIMALS;

/// A quantity of base units.
pub type Amount = U256;

/// The allowance sentinel meaning "no limit". Spending against it never
/// decrements it.
pub const UNLIMITED: Amount = U256::MAX;

/// Errors produced while parsing decimal amounts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// Input was empty or contained something other than digits and one dot.
    #[error("invalid decimal amount: {0:?}")]
    Malformed(String),

    /// More fractional digits than the token's decimals can represent.
    #[error("too many fractional digits: {digits} > {decimals} decimals")]
    TooPrecise {
        /// Fractional digits supplied.
        digits: usize,
        /// Decimals of the token.
        decimals: u8,
    },

    /// The value does not fit in 256 bits.
    #[error("amount overflows 256 bits: {0}")]
    Overflow(String),

    /// Decimals beyond what 256 bits can scale.
    #[error("unsupported decimals: {0}")]
    UnsupportedDecimals(u8),
}

/// `10^decimals` as an [`Amount`].
pub fn unit(decimals: u8) -> Result<Amount, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedDecimals(decimals));
    }
    Ok(U256::exp10(decimals as usize))
}

/// Scales a whole-token count to base units.
pub fn whole_tokens(count: u64, decimals: u8) -> Result<Amount, AmountError> {
    U256::from(count)
        .checked_mul(unit(decimals)?)
        .ok_or_else(|| AmountError::Overflow(count.to_string()))
}

/// Parses a decimal string into base units, e.g. `parse_units("1.5", 18)`
/// is `1_500_000_000_000_000_000`.
pub fn parse_units(s: &str, decimals: u8) -> Result<Amount, AmountError> {
    let scale = unit(decimals)?;
    let s = s.trim();
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };

    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty())
        || !all_digits(int_part)
        || !all_digits(frac_part)
        || (s.contains('.') && frac_part.is_empty())
    {
        return Err(AmountError::Malformed(s.to_string()));
    }
    if frac_part.len() > decimals as usize {
        return Err(AmountError::TooPrecise {
            digits: frac_part.len(),
            decimals,
        });
    }

    let overflow = || AmountError::Overflow(s.to_string());

    let whole = if int_part.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(int_part).map_err(|_| overflow())?
    };

    let frac = if frac_part.is_empty() {
        U256::zero()
    } else {
        let padding = decimals as usize - frac_part.len();
        U256::from_dec_str(frac_part)
            .map_err(|_| overflow())?
            .checked_mul(U256::exp10(padding))
            .ok_or_else(overflow)?
    };

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(overflow)
}

/// Renders base units as a decimal string, trimming trailing fractional
/// zeros: `format_units(1_500_000_000_000_000_000, 18) == "1.5"`.
pub fn format_units(amount: Amount, decimals: u8) -> String {
    if decimals == 0 || decimals > MAX_DECIMALS {
        return amount.to_string();
    }
    let scale = U256::exp10(decimals as usize);
    let whole = amount / scale;
    let frac = amount % scale;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

// ---------------------------------------------------------------------------
// Serde helper: decimal strings
// ---------------------------------------------------------------------------

/// Serializes an [`Amount`] as a decimal string of base units instead of
/// the `0x`-hex form `primitive-types` uses by default. Wire-facing types
/// opt in with `#[serde(with = "ce_protocol::amount::decimal")]`.
pub mod decimal {
    use super::Amount;
    use primitive_types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(serde::de::Error::custom("empty amount"));
        }
        U256::from_dec_str(&s).map_err(|e| serde::de::Error::custom(format!("{:?}", e)))
    }
}
