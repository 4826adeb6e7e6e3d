// crates/mooring-core/src/identity.rs

use sha2::{Digest, Sha256};

/// Opaque account identity (32-byte public key or address).
///
/// The escrow and rewards ledgers never reason about "real owners" —
/// delegation and proxying are identity remaps consulted only at claim
/// resolution and injection time. The bias/slope core sees opaque ids.
pub type AccountId = [u8; 32];

/// Derive the deterministic proxy identity for a migrated legacy position.
///
/// One proxy per owner: `sha256("mooring/proxy" || owner)`. The derived id
/// lives in the same namespace as ordinary accounts but cannot collide with
/// a real key except by hash collision.
pub fn derive_proxy_id(owner: &AccountId) -> AccountId {
    let mut hasher = Sha256::new();
    hasher.update(b"mooring/proxy");
    hasher.update(owner);
    let digest = hasher.finalize();
    let mut id = [0u8; 32];
    id.copy_from_slice(&digest);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_id_is_deterministic() {
        let owner = [7u8; 32];
        assert_eq!(derive_proxy_id(&owner), derive_proxy_id(&owner));
    }

    #[test]
    fn test_proxy_id_differs_per_owner() {
        assert_ne!(derive_proxy_id(&[1u8; 32]), derive_proxy_id(&[2u8; 32]));
    }

    #[test]
    fn test_proxy_id_differs_from_owner() {
        let owner = [9u8; 32];
        assert_ne!(derive_proxy_id(&owner), owner);
    }
}
