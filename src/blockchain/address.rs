//! Account addresses and their textual forms.
//!
//! An address is the last 20 bytes of `SHA-256(compressed public key)`.
//! Three interchangeable encodings are supported:
//! - raw hex: `0x` followed by 40 lowercase hex characters
//! - checksummed hex: mixed case, the case of each letter chosen by the
//!   SHA-256 of the address bytes
//! - bech32 with the `zil` human-readable part

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32, Hrp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// Length of an address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Human-readable part of bech32 addresses.
pub const ZIL_HRP: Hrp = Hrp::parse_unchecked("zil");

/// A 20-byte account address.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    pub fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Derive the address of a compressed (33-byte) public key.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let hash = Sha256::digest(public_key);
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&hash[hash.len() - ADDRESS_LEN..]);
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> BlockchainResult<Self> {
        let bytes: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
            BlockchainError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                ADDRESS_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// `0x`-prefixed checksummed (mixed-case) hex.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = Sha256::digest(self.0);

        let mut out = String::with_capacity(2 + lower.len());
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            if c.is_ascii_digit() {
                out.push(c);
                continue;
            }
            // bit (255 - 6i) of the hash, read as a big-endian integer
            let bit = 255 - 6 * i;
            let byte = hash[31 - bit / 8];
            if (byte >> (bit % 8)) & 1 == 1 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Bech32 form, e.g. `zil1...`.
    pub fn to_bech32(&self) -> String {
        bech32::encode::<Bech32>(ZIL_HRP, &self.0)
            .expect("a 20-byte payload always fits in a bech32 string")
    }

    /// Parse hex with or without `0x`.
    ///
    /// Single-case input is accepted as-is; mixed-case input must carry a
    /// valid checksum.
    pub fn from_hex(s: &str) -> BlockchainResult<Self> {
        let body = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        if body.len() != ADDRESS_LEN * 2 {
            return Err(BlockchainError::InvalidAddress(format!(
                "expected {} hex characters, got {}",
                ADDRESS_LEN * 2,
                body.len()
            )));
        }

        let bytes = hex::decode(body)
            .map_err(|e| BlockchainError::InvalidAddress(format!("invalid hex: {}", e)))?;
        let address = Self::from_slice(&bytes)?;

        let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
        if has_upper && has_lower && address.to_checksum()[2..] != *body {
            return Err(BlockchainError::InvalidAddress(format!(
                "bad checksum in {}",
                s
            )));
        }

        Ok(address)
    }

    /// Parse a `zil1...` bech32 address. Bech32m strings are rejected.
    pub fn from_bech32(s: &str) -> BlockchainResult<Self> {
        let checked = CheckedHrpstring::new::<Bech32>(s)
            .map_err(|e| BlockchainError::InvalidAddress(format!("invalid bech32: {}", e)))?;
        let hrp = checked.hrp();
        if hrp != ZIL_HRP {
            return Err(BlockchainError::InvalidAddress(format!(
                "unexpected prefix '{}'",
                hrp
            )));
        }
        let data: Vec<u8> = checked.byte_iter().collect();
        Self::from_slice(&data)
    }

    pub fn is_bech32(s: &str) -> bool {
        s.len() > 4 && s[..4].eq_ignore_ascii_case("zil1")
    }
}

impl FromStr for Address {
    type Err = BlockchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if Self::is_bech32(s) {
            Self::from_bech32(s)
        } else {
            Self::from_hex(s)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
