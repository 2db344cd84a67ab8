//! Validated Schnorr signature components.

use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, Scalar};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// Width of one encoded component.
pub const COMPONENT_LEN: usize = 32;

/// Width of the `r || s` encoding.
pub const SIGNATURE_LEN: usize = COMPONENT_LEN * 2;

/// A `(r, s)` pair, each in `[1, n-1]` for the secp256k1 order `n`.
///
/// Construction is the only place validation happens; an existing value is
/// always well-formed.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    r: [u8; COMPONENT_LEN],
    s: [u8; COMPONENT_LEN],
}

impl Signature {
    /// Build from big-endian component bytes (at most 32 bytes each).
    pub fn new(r: &[u8], s: &[u8]) -> BlockchainResult<Self> {
        Ok(Self {
            r: validate_component("r", r)?,
            s: validate_component("s", s)?,
        })
    }

    /// Build from hex components, optionally `0x`-prefixed.
    ///
    /// A leading `-` is rejected as a negative value.
    pub fn from_hex_parts(r: &str, s: &str) -> BlockchainResult<Self> {
        Self::new(&decode_component("r", r)?, &decode_component("s", s)?)
    }

    pub(crate) fn from_scalars(r: &Scalar, s: &Scalar) -> BlockchainResult<Self> {
        Self::new(&r.to_bytes(), &s.to_bytes())
    }

    /// Decode the fixed-width `r || s` encoding.
    pub fn from_bytes(bytes: &[u8]) -> BlockchainResult<Self> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(BlockchainError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LEN,
                bytes.len()
            )));
        }
        Self::new(&bytes[..COMPONENT_LEN], &bytes[COMPONENT_LEN..])
    }

    /// Decode the 128-character hex wire form.
    pub fn from_hex(s: &str) -> BlockchainResult<Self> {
        let body = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(body)
            .map_err(|e| BlockchainError::InvalidSignature(format!("invalid hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Fixed-width `r || s` encoding.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        let mut out = [0u8; SIGNATURE_LEN];
        out[..COMPONENT_LEN].copy_from_slice(&self.r);
        out[COMPONENT_LEN..].copy_from_slice(&self.s);
        out
    }

    /// Lowercase hex of the `r || s` encoding, no prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn r(&self) -> &[u8; COMPONENT_LEN] {
        &self.r
    }

    pub fn s(&self) -> &[u8; COMPONENT_LEN] {
        &self.s
    }

    pub(crate) fn r_scalar(&self) -> Scalar {
        to_scalar(&self.r)
    }

    pub(crate) fn s_scalar(&self) -> Scalar {
        to_scalar(&self.s)
    }
}

fn decode_component(name: &str, value: &str) -> BlockchainResult<Vec<u8>> {
    let value = value.trim();
    if value.starts_with('-') {
        return Err(BlockchainError::InvalidSignature(format!("{} is negative", name)));
    }
    let body = value.strip_prefix("0x").unwrap_or(value);
    let padded = if body.len() % 2 == 1 {
        format!("0{}", body)
    } else {
        body.to_string()
    };
    hex::decode(padded)
        .map_err(|e| BlockchainError::InvalidSignature(format!("{} is not hex: {}", name, e)))
}

fn validate_component(name: &str, bytes: &[u8]) -> BlockchainResult<[u8; COMPONENT_LEN]> {
    // Strip leading zeros so over-long but small values are still accepted.
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let significant = &bytes[first..];
    if significant.is_empty() {
        return Err(BlockchainError::InvalidSignature(format!("{} is zero", name)));
    }
    if significant.len() > COMPONENT_LEN {
        return Err(BlockchainError::InvalidSignature(format!(
            "{} exceeds the curve order",
            name
        )));
    }

    let mut out = [0u8; COMPONENT_LEN];
    out[COMPONENT_LEN - significant.len()..].copy_from_slice(significant);

    let in_range: Option<Scalar> = Scalar::from_repr(FieldBytes::from(out)).into();
    if in_range.is_none() {
        return Err(BlockchainError::InvalidSignature(format!(
            "{} exceeds the curve order",
            name
        )));
    }
    Ok(out)
}

fn to_scalar(bytes: &[u8; COMPONENT_LEN]) -> Scalar {
    // Components were range-checked on construction.
    Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(*bytes))).unwrap_or(Scalar::ZERO)
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("r", &hex::encode(self.r))
            .field("s", &hex::encode(self.s))
            .finish()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Signature::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
