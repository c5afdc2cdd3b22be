//! Mapping from lock names to advisory-lock integer keys.
//!
//! PostgreSQL's two-integer advisory locks take a pair of signed 32-bit
//! values. The first is a fixed namespace that partitions this library's
//! locks from every other advisory-lock user of the database; the second is
//! derived from the lock name.

/// Fixed first component of every advisory-lock key pair issued by this
/// library. Other advisory-lock users of the same database must avoid this
/// namespace for the partitioning to hold.
pub const LOCK_NAMESPACE: i32 = i32::MIN;

/// Derives the signed 32-bit advisory-lock key for a lock name.
///
/// The key is the CRC-32 checksum of the name. Checksums above `i32::MAX`
/// are folded into the negative range by two's-complement wraparound, so
/// every possible checksum maps to a valid key. Pure and deterministic;
/// distinct names may collide, bounded by the birthday bound of a 32-bit
/// hash.
pub fn lock_key(name: &str) -> i32 {
    crc32fast::hash(name.as_bytes()) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_checksums() {
        // CRC-32 vectors; names at or below i32::MAX pass through unchanged.
        assert_eq!(lock_key(""), 0);
        assert_eq!(lock_key("The quick brown fox jumps over the lazy dog"), 0x414FA339);
    }

    #[test]
    fn wraps_checksums_above_signed_max() {
        // crc32("a") = 0xE8B7BE43, which exceeds i32::MAX and must fold
        // into the negative range rather than truncate.
        assert_eq!(crc32fast::hash(b"a"), 0xE8B7_BE43);
        assert_eq!(lock_key("a"), -0x1748_41BD);
    }

    #[test]
    fn namespace_is_signed_32_minimum() {
        assert_eq!(LOCK_NAMESPACE, -2_147_483_648);
    }

    proptest! {
        #[test]
        fn key_is_deterministic(name in ".{0,64}") {
            prop_assert_eq!(lock_key(&name), lock_key(&name));
        }

        #[test]
        fn fold_matches_twos_complement(checksum in any::<u32>()) {
            // Reference fold: v > INT32_MAX  →  -((-v) & 0xFFFFFFFF).
            let folded = if checksum > i32::MAX as u32 {
                -((checksum as i64).wrapping_neg() & 0xFFFF_FFFF)
            } else {
                checksum as i64
            };
            prop_assert_eq!(checksum as i32 as i64, folded);
        }
    }
}
