//! Key custody and transaction signing.
//!
//! # Security
//! - Keys live only in memory for the lifetime of the `Wallet`
//! - Secret scalars are zeroed when an account is removed or the wallet drops
//! - Keys are never logged or serialized; only addresses are

use dashmap::DashMap;
use k256::SecretKey;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use zeroize::Zeroizing;

use crate::blockchain::address::Address;
use crate::blockchain::client::BlockchainClient;
use crate::blockchain::transaction::Transaction;
use crate::blockchain::types::{BlockchainError, BlockchainResult, TxStatus};
use crate::crypto::schnorr::{self, PRIVATE_KEY_LEN, PUBLIC_KEY_LEN};
use crate::crypto::Signature;

/// Environment variable name for the private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "ZIL_PRIVATE_KEY";

/// A single key pair. `SecretKey` zeroes itself on drop.
struct Account {
    secret: SecretKey,
    public_key: [u8; PUBLIC_KEY_LEN],
}

impl Account {
    fn new(secret: SecretKey) -> (Address, Self) {
        let public_key = schnorr::public_key_bytes(&secret);
        let address = Address::from_public_key(&public_key);
        (address, Self { secret, public_key })
    }
}

/// In-memory key store.
///
/// All methods take `&self`; signing for different (or the same) addresses
/// from many tasks at once is safe since each signature draws its own nonce.
pub struct Wallet {
    accounts: DashMap<Address, Account>,
    default_account: RwLock<Option<Address>>,
}

impl Wallet {
    /// Create an empty wallet.
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            default_account: RwLock::new(None),
        }
    }

    /// Import a raw 32-byte private key and return its address.
    ///
    /// The key must be a nonzero scalar below the curve order.
    pub fn add_key(&self, private_key: &[u8]) -> BlockchainResult<Address> {
        if private_key.len() != PRIVATE_KEY_LEN {
            return Err(BlockchainError::InvalidKey(format!(
                "expected {} bytes, got {}",
                PRIVATE_KEY_LEN,
                private_key.len()
            )));
        }

        let secret = SecretKey::from_slice(private_key).map_err(|_| {
            BlockchainError::InvalidKey("scalar is zero or not below the curve order".to_string())
        })?;

        Ok(self.insert(secret))
    }

    /// Import a hex-encoded private key (with or without 0x prefix).
    pub fn add_key_hex(&self, private_key_hex: &str) -> BlockchainResult<Address> {
        let trimmed = private_key_hex.trim();
        let key_hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if key_hex.len() != PRIVATE_KEY_LEN * 2 {
            return Err(BlockchainError::InvalidKey(format!(
                "expected {} hex characters, got {}",
                PRIVATE_KEY_LEN * 2,
                key_hex.len()
            )));
        }

        let bytes = Zeroizing::new(
            hex::decode(key_hex)
                .map_err(|_| BlockchainError::InvalidKey("Invalid private key format".to_string()))?,
        );
        self.add_key(&bytes)
    }

    /// Import a key from an environment variable.
    pub fn add_key_from_env(&self, var: &str) -> BlockchainResult<Address> {
        let private_key = Zeroizing::new(std::env::var(var).map_err(|_| {
            BlockchainError::InvalidKey(format!("Environment variable {} not set", var))
        })?);
        self.add_key_hex(&private_key)
    }

    /// Generate a fresh key pair and return its address.
    pub fn create(&self) -> Address {
        self.insert(schnorr::generate_secret_key())
    }

    fn insert(&self, secret: SecretKey) -> Address {
        let (address, account) = Account::new(secret);
        self.accounts.insert(address, account);

        let mut default = self
            .default_account
            .write()
            .expect("wallet default lock poisoned");
        if default.is_none() {
            *default = Some(address);
        }

        tracing::info!(address = %address, "Key added to wallet");
        address
    }

    /// Remove a key, zeroing it. Returns false if it wasn't held.
    pub fn remove(&self, address: &Address) -> bool {
        let removed = self.accounts.remove(address).is_some();
        if removed {
            let mut default = self
                .default_account
                .write()
                .expect("wallet default lock poisoned");
            if default.as_ref() == Some(address) {
                *default = None;
            }
            tracing::info!(address = %address, "Key removed from wallet");
        }
        removed
    }

    /// Drop every key.
    pub fn clear(&self) {
        self.accounts.clear();
        *self
            .default_account
            .write()
            .expect("wallet default lock poisoned") = None;
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    /// Held addresses, sorted.
    pub fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.accounts.iter().map(|r| *r.key()).collect();
        addresses.sort();
        addresses
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// The first key added, unless changed with [`Wallet::set_default`].
    pub fn default_address(&self) -> Option<Address> {
        *self
            .default_account
            .read()
            .expect("wallet default lock poisoned")
    }

    pub fn set_default(&self, address: &Address) -> BlockchainResult<()> {
        if !self.contains(address) {
            return Err(BlockchainError::UnknownAddress(*address));
        }
        *self
            .default_account
            .write()
            .expect("wallet default lock poisoned") = Some(*address);
        Ok(())
    }

    /// Compressed public key for a held address.
    pub fn public_key(&self, address: &Address) -> BlockchainResult<[u8; PUBLIC_KEY_LEN]> {
        self.accounts
            .get(address)
            .map(|account| account.public_key)
            .ok_or(BlockchainError::UnknownAddress(*address))
    }

    /// Sign a 32-byte digest with the key held for `address`.
    pub fn sign(&self, address: &Address, digest: &[u8; 32]) -> BlockchainResult<Signature> {
        let account = self
            .accounts
            .get(address)
            .ok_or(BlockchainError::UnknownAddress(*address))?;
        schnorr::sign(digest, &account.secret)
    }

    /// Verify a signature; needs no key material.
    pub fn verify(public_key: &[u8], digest: &[u8; 32], signature: &Signature) -> BlockchainResult<bool> {
        schnorr::verify(public_key, digest, signature)
    }

    /// Sign a transaction in place with the sender's key.
    ///
    /// Attaches the signature and signer public key; no other field changes.
    pub fn sign_transaction(&self, tx: &mut Transaction) -> BlockchainResult<()> {
        let sender = tx.sender();
        let public_key = self.public_key(&sender)?;
        let digest = tx.signing_digest(&public_key);
        let signature = self.sign(&sender, &digest)?;
        tx.attach_signature(public_key, signature)?;

        tracing::debug!(sender = %sender, nonce = tx.nonce(), "Transaction signed");
        Ok(())
    }

    /// Sign a run of transactions with consecutive nonces.
    ///
    /// Each sender's nonces continue from its account nonce on the node, in
    /// slice order. Nothing is changed unless every transaction is
    /// `Initialized` and its sender's key is held here.
    pub async fn sign_batch(&self, client: &BlockchainClient, txs: &mut [Transaction]) -> BlockchainResult<()> {
        for tx in txs.iter() {
            if tx.status() != TxStatus::Initialized {
                return Err(BlockchainError::InvalidTransition {
                    from: tx.status(),
                    to: TxStatus::Initialized,
                });
            }
            if !self.contains(&tx.sender()) {
                return Err(BlockchainError::UnknownAddress(tx.sender()));
            }
        }

        let mut next_nonces: HashMap<Address, u64> = HashMap::new();
        for tx in txs.iter() {
            let sender = tx.sender();
            if !next_nonces.contains_key(&sender) {
                let nonce = client.next_nonce(&sender).await?;
                next_nonces.insert(sender, nonce);
            }
        }

        for tx in txs.iter_mut() {
            let next = next_nonces.entry(tx.sender()).or_default();
            let nonce = *next;
            *next = nonce.checked_add(1).ok_or_else(|| {
                BlockchainError::Decode(format!("nonce {} cannot be incremented", nonce))
            })?;
            tx.set_nonce(nonce)?;
            self.sign_transaction(tx)?;
        }

        tracing::info!(count = txs.len(), senders = next_nonces.len(), "Transaction batch signed");
        Ok(())
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Wallet {
    fn drop(&mut self) {
        let held = self.accounts.len();
        self.accounts.clear();
        if held > 0 {
            tracing::debug!(keys = held, "Wallet dropped, key material cleared");
        }
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("addresses", &self.addresses())
            .finish()
    }
}
