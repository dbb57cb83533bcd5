//! Deterministic veth names derived from a container ID.
//!
//! Teardown re-derives the host name instead of looking it up, so the prefix
//! length and suffixes below must never change.

use crate::error::{DataplaneError, Result};
use crate::types::InterfacePair;

/// Number of leading container ID characters used in both names.
pub const ID_PREFIX_LEN: usize = 12;
/// Suffix of the host end.
pub const HOST_SUFFIX: &str = "_h";
/// Suffix of the container end.
pub const CONTAINER_SUFFIX: &str = "_c";

/// Derive the `(host, container)` interface names for a container.
pub fn derive_names(container_id: &str) -> Result<InterfacePair> {
    let prefix = container_id
        .get(..ID_PREFIX_LEN)
        .ok_or_else(|| DataplaneError::InvalidContainerId(container_id.to_string()))?;

    Ok(InterfacePair {
        host_name: format!("{}{}", prefix, HOST_SUFFIX),
        container_name: format!("{}{}", prefix, CONTAINER_SUFFIX),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_names_scenario() {
        let pair = derive_names("abc123def456ghi789").unwrap();
        assert_eq!(pair.host_name, "abc123def456_h");
        assert_eq!(pair.container_name, "abc123def456_c");
    }

    #[test]
    fn test_derive_names_is_deterministic_and_distinct() {
        let ids = [
            "abc123def456",
            "abc123def456ghi789",
            "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
            "ffffffffffff-suffix",
        ];
        for id in ids {
            let first = derive_names(id).unwrap();
            let second = derive_names(id).unwrap();
            assert_eq!(first, second);
            assert_ne!(first.host_name, first.container_name);
            // IFNAMSIZ is 16 including the terminator
            assert!(first.host_name.len() <= 15);
        }
    }

    #[test]
    fn test_ids_sharing_prefix_collide() {
        let a = derive_names("abc123def456aaaa").unwrap();
        let b = derive_names("abc123def456bbbb").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_id_rejected() {
        let err = derive_names("abc123").unwrap_err();
        assert!(matches!(err, DataplaneError::InvalidContainerId(ref id) if id == "abc123"));
    }

    #[test]
    fn test_prefix_splitting_multibyte_char_rejected() {
        // 11 ASCII bytes followed by a 2-byte character straddling byte 12
        let id = "abcdefghijké-more";
        assert!(derive_names(id).is_err());
    }
}
