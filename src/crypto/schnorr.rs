//! Schnorr signatures over secp256k1.
//!
//! ```text
//! sign:   k  = nonce(x, entropy, m)
//!         Q  = k·G
//!         r  = H(Q || P || m) mod n
//!         s  = k + r·x mod n
//! verify: Q' = s·G − r·P
//!         r == H(Q' || P || m) mod n
//! ```
//!
//! `H` is SHA-256, points are SEC1-compressed (33 bytes) and `m` is a 32-byte
//! digest.

use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{ProjectivePoint, PublicKey, Scalar, SecretKey, U256};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::blockchain::types::{BlockchainError, BlockchainResult};
use crate::crypto::signature::Signature;

/// Compressed public key length.
pub const PUBLIC_KEY_LEN: usize = 33;

/// Private key length.
pub const PRIVATE_KEY_LEN: usize = 32;

/// Upper bound on nonce redraws before giving up.
const MAX_NONCE_ATTEMPTS: u32 = 64;

/// Generate a fresh private key from the OS CSPRNG.
pub fn generate_secret_key() -> SecretKey {
    SecretKey::random(&mut OsRng)
}

/// Compressed SEC1 encoding of a secret key's public key.
pub fn public_key_bytes(secret: &SecretKey) -> [u8; PUBLIC_KEY_LEN] {
    let encoded = secret.public_key().to_encoded_point(true);
    let mut out = [0u8; PUBLIC_KEY_LEN];
    out.copy_from_slice(encoded.as_bytes());
    out
}

/// Sign a 32-byte digest.
///
/// Every call draws 32 bytes of fresh OS entropy into the nonce derivation,
/// so two signatures over the same digest never share `k`.
pub fn sign(digest: &[u8; 32], secret: &SecretKey) -> BlockchainResult<Signature> {
    let x = Zeroizing::new(*secret.to_nonzero_scalar());
    let public_key = public_key_bytes(secret);

    let mut key_bytes = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
    key_bytes.copy_from_slice(&secret.to_bytes());

    let mut entropy = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(&mut entropy[..]);

    for counter in 0..MAX_NONCE_ATTEMPTS {
        let k = Zeroizing::new(derive_nonce(&key_bytes, &entropy, digest, counter));
        if *k == Scalar::ZERO {
            continue;
        }

        let q = ProjectivePoint::GENERATOR * *k;
        let r = challenge(&q, &public_key, digest);
        if r == Scalar::ZERO {
            continue;
        }

        let s = *k + r * *x;
        if s == Scalar::ZERO {
            continue;
        }

        return Signature::from_scalars(&r, &s);
    }

    Err(BlockchainError::InvalidSignature(
        "could not derive a usable nonce".to_string(),
    ))
}

/// Verify a signature against a SEC1-encoded public key.
///
/// Returns `Ok(false)` for well-formed inputs that simply don't match; a
/// malformed public key is `InvalidKey`.
pub fn verify(public_key: &[u8], digest: &[u8; 32], signature: &Signature) -> BlockchainResult<bool> {
    let public_key = PublicKey::from_sec1_bytes(public_key)
        .map_err(|_| BlockchainError::InvalidKey("malformed public key".to_string()))?;
    let compressed = public_key.to_encoded_point(true);

    let r = signature.r_scalar();
    let s = signature.s_scalar();

    let q = ProjectivePoint::GENERATOR * s - public_key.to_projective() * r;
    if q == ProjectivePoint::IDENTITY {
        return Ok(false);
    }

    Ok(challenge(&q, compressed.as_bytes(), digest) == r)
}

/// `H(compress(Q) || pubkey || msg) mod n`
fn challenge(q: &ProjectivePoint, public_key: &[u8], msg: &[u8]) -> Scalar {
    let q = q.to_affine().to_encoded_point(true);
    let hash = Sha256::new()
        .chain_update(q.as_bytes())
        .chain_update(public_key)
        .chain_update(msg)
        .finalize();
    <Scalar as Reduce<U256>>::reduce_bytes(&hash)
}

fn derive_nonce(key: &[u8; PRIVATE_KEY_LEN], entropy: &[u8; 32], msg: &[u8; 32], counter: u32) -> Scalar {
    let hash = Sha256::new()
        .chain_update(key)
        .chain_update(entropy)
        .chain_update(msg)
        .chain_update(counter.to_be_bytes())
        .finalize();
    <Scalar as Reduce<U256>>::reduce_bytes(&hash)
}
