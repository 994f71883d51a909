//! # Hashing Utilities
//!
//! BLAKE3 is the only hash the ledger needs. It names ledgers: a ledger's
//! address is derived from whoever deployed it and how many ledgers that
//! host had deployed before, so redeploying the same configuration never
//! reuses an address.

use crate::address::Address;
use crate::config::{ADDRESS_LENGTH, LEDGER_ADDRESS_DOMAIN};

/// Compute the BLAKE3 hash of the input data.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Derives the address of a newly deployed ledger.
///
/// Preimage: `LEDGER_ADDRESS_DOMAIN || deployer (20B) || nonce (8B BE)`.
/// The address is the last 20 bytes of the digest.
pub fn derive_ledger_address(deployer: &Address, nonce: u64) -> Address {
    let mut preimage = Vec::with_capacity(LEDGER_ADDRESS_DOMAIN.len() + ADDRESS_LENGTH + 8);
    preimage.extend_from_slice(LEDGER_ADDRESS_DOMAIN);
    preimage.extend_from_slice(deployer.as_bytes());
    preimage.extend_from_slice(&nonce.to_be_bytes());

    let digest = blake3_hash(&preimage);
    let mut bytes = [0u8; ADDRESS_LENGTH];
    bytes.copy_from_slice(&digest[32 - ADDRESS_LENGTH..]);
    Address::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let deployer = Address::from_low_u64_be(1);
        assert_eq!(
            derive_ledger_address(&deployer, 0),
            derive_ledger_address(&deployer, 0)
        );
    }

    #[test]
    fn nonce_and_deployer_change_the_address() {
        let a = Address::from_low_u64_be(1);
        let b = Address::from_low_u64_be(2);
        assert_ne!(derive_ledger_address(&a, 0), derive_ledger_address(&a, 1));
        assert_ne!(derive_ledger_address(&a, 0), derive_ledger_address(&b, 0));
        assert!(!derive_ledger_address(&a, 0).is_zero());
    }
}
