// address.rs

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{CensusError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Width of an address in bytes.
pub const ADDRESS_SIZE: usize = 20;

/// Reserved account holding records in the pre-world-state format.
pub const LEGACY_ACCOUNT: Address = Address([
    0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
]);

/// A fixed-width account or entity identifier.
///
/// Rendered as 40 lowercase hex digits without a prefix.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl Address {
    /// Reinterpret raw bytes as an address. Fails unless there are exactly
    /// `ADDRESS_SIZE` of them.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; ADDRESS_SIZE] = bytes.try_into().map_err(|_| CensusError::MalformedAddress {
            input: hex::encode(bytes),
            reason: format!("expected {} bytes, got {}", ADDRESS_SIZE, bytes.len()),
        })?;
        Ok(Address(raw))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Derive a child address from this one and a tag.
    ///
    /// HMAC-SHA1 keyed with the UTF-8 tag over the parent's bytes. The digest
    /// is exactly `ADDRESS_SIZE` bytes long.
    pub fn derive(&self, tag: &str) -> Address {
        let mut mac = HmacSha1::new_from_slice(tag.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(&self.0);
        let digest = mac.finalize().into_bytes();

        let mut child = [0u8; ADDRESS_SIZE];
        child.copy_from_slice(&digest);
        Address(child)
    }
}

impl FromStr for Address {
    type Err = CensusError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.len() != ADDRESS_SIZE * 2 {
            return Err(CensusError::MalformedAddress {
                input: s.to_string(),
                reason: format!("expected {} hex digits, got {}", ADDRESS_SIZE * 2, digits.len()),
            });
        }

        let mut raw = [0u8; ADDRESS_SIZE];
        hex::decode_to_slice(digits, &mut raw).map_err(|e| CensusError::MalformedAddress {
            input: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Address(raw))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}
