//! Transaction value object and lifecycle.
//!
//! # Responsibilities
//! - Hold transfer parameters and the attached signature
//! - Produce the canonical signing digest
//! - Enforce the status machine `Initialized → Pending → {Confirmed, Rejected}`
//! - Submit to a node
//!
//! # Design Decisions
//! - Fields are private; edits go through setters that refuse to run after
//!   submission and drop any signature that would no longer verify
//! - Only the tracker moves a transaction out of `Pending`
//! - A failed submission leaves the transaction `Initialized` so the caller
//!   can retry it unchanged

use alloy::primitives::U256;
use sha2::{Digest, Sha256};

use crate::blockchain::address::Address;
use crate::blockchain::client::{BlockchainClient, CreateTxParams, TxCreated, TxReceipt};
use crate::blockchain::types::{BlockchainError, BlockchainResult, TxId, TxStatus};
use crate::crypto::schnorr::{self, PUBLIC_KEY_LEN};
use crate::crypto::Signature;
use crate::observability::metrics;

/// Fold a chain id and message version into the transaction version field.
pub fn pack_version(chain_id: u16, msg_version: u16) -> u32 {
    (u32::from(chain_id) << 16) | u32::from(msg_version)
}

/// Construction parameters for a [`Transaction`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxParams {
    pub version: u32,
    pub sender: Address,
    pub to: Address,
    pub amount: U256,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub code: Option<String>,
    pub data: Option<Vec<u8>>,
}

/// A transfer plus its signing and lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    params: TxParams,
    pub_key: Option<[u8; PUBLIC_KEY_LEN]>,
    signature: Option<Signature>,
    id: Option<TxId>,
    receipt: Option<TxReceipt>,
    rejection: Option<String>,
    status: TxStatus,
}

impl Transaction {
    /// New, unsigned transaction in `Initialized`.
    pub fn new(params: TxParams) -> Self {
        Self {
            params,
            pub_key: None,
            signature: None,
            id: None,
            receipt: None,
            rejection: None,
            status: TxStatus::Initialized,
        }
    }

    pub fn version(&self) -> u32 {
        self.params.version
    }

    pub fn sender(&self) -> Address {
        self.params.sender
    }

    pub fn to(&self) -> Address {
        self.params.to
    }

    pub fn amount(&self) -> U256 {
        self.params.amount
    }

    pub fn nonce(&self) -> u64 {
        self.params.nonce
    }

    pub fn gas_price(&self) -> U256 {
        self.params.gas_price
    }

    pub fn gas_limit(&self) -> u64 {
        self.params.gas_limit
    }

    pub fn code(&self) -> Option<&str> {
        self.params.code.as_deref()
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.params.data.as_deref()
    }

    pub fn params(&self) -> &TxParams {
        &self.params
    }

    pub fn status(&self) -> TxStatus {
        self.status
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Public key of the signer, if signed.
    pub fn public_key(&self) -> Option<&[u8; PUBLIC_KEY_LEN]> {
        self.pub_key.as_ref()
    }

    /// Node-assigned identifier, once submitted.
    pub fn id(&self) -> Option<&TxId> {
        self.id.as_ref()
    }

    pub fn receipt(&self) -> Option<&TxReceipt> {
        self.receipt.as_ref()
    }

    /// Why the transaction was rejected, if it was.
    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection.as_deref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn set_to(&mut self, to: Address) -> BlockchainResult<()> {
        self.edit(|p| p.to = to)
    }

    pub fn set_amount(&mut self, amount: U256) -> BlockchainResult<()> {
        self.edit(|p| p.amount = amount)
    }

    pub fn set_nonce(&mut self, nonce: u64) -> BlockchainResult<()> {
        self.edit(|p| p.nonce = nonce)
    }

    pub fn set_gas_price(&mut self, gas_price: U256) -> BlockchainResult<()> {
        self.edit(|p| p.gas_price = gas_price)
    }

    pub fn set_gas_limit(&mut self, gas_limit: u64) -> BlockchainResult<()> {
        self.edit(|p| p.gas_limit = gas_limit)
    }

    pub fn set_code(&mut self, code: Option<String>) -> BlockchainResult<()> {
        self.edit(|p| p.code = code)
    }

    pub fn set_data(&mut self, data: Option<Vec<u8>>) -> BlockchainResult<()> {
        self.edit(|p| p.data = data)
    }

    fn edit(&mut self, apply: impl FnOnce(&mut TxParams)) -> BlockchainResult<()> {
        self.require(TxStatus::Initialized, TxStatus::Initialized)?;
        apply(&mut self.params);
        self.pub_key = None;
        self.signature = None;
        Ok(())
    }

    fn require(&self, expected: TxStatus, target: TxStatus) -> BlockchainResult<()> {
        if self.status != expected {
            return Err(BlockchainError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        Ok(())
    }

    /// SHA-256 of the canonical encoding as signed by `pub_key`.
    ///
    /// ```text
    /// version u32 BE || nonce u64 BE || to (20) || pub_key (33)
    /// || amount u256 BE || gas_price u256 BE || gas_limit u64 BE
    /// || len(code) u32 BE || code || len(data) u32 BE || data
    /// ```
    pub fn signing_digest(&self, pub_key: &[u8; PUBLIC_KEY_LEN]) -> [u8; 32] {
        let code = self.params.code.as_deref().unwrap_or("").as_bytes();
        let data = self.params.data.as_deref().unwrap_or(&[]);

        Sha256::new()
            .chain_update(self.params.version.to_be_bytes())
            .chain_update(self.params.nonce.to_be_bytes())
            .chain_update(self.params.to.as_bytes())
            .chain_update(pub_key)
            .chain_update(self.params.amount.to_be_bytes::<32>())
            .chain_update(self.params.gas_price.to_be_bytes::<32>())
            .chain_update(self.params.gas_limit.to_be_bytes())
            .chain_update((code.len() as u32).to_be_bytes())
            .chain_update(code)
            .chain_update((data.len() as u32).to_be_bytes())
            .chain_update(data)
            .finalize()
            .into()
    }

    /// Attach a signature produced by `pub_key`'s owner.
    ///
    /// Only permitted before submission.
    pub fn attach_signature(
        &mut self,
        pub_key: [u8; PUBLIC_KEY_LEN],
        signature: Signature,
    ) -> BlockchainResult<()> {
        self.require(TxStatus::Initialized, TxStatus::Initialized)?;
        self.pub_key = Some(pub_key);
        self.signature = Some(signature);
        Ok(())
    }

    /// Check the attached signature against the current contents.
    pub fn verify_signature(&self) -> BlockchainResult<bool> {
        match (&self.pub_key, &self.signature) {
            (Some(pub_key), Some(signature)) => {
                schnorr::verify(pub_key, &self.signing_digest(pub_key), signature)
            }
            _ => Err(BlockchainError::NotSigned),
        }
    }

    /// Wire form for `CreateTransaction`.
    pub fn to_create_params(&self) -> BlockchainResult<CreateTxParams> {
        let (pub_key, signature) = match (&self.pub_key, &self.signature) {
            (Some(pub_key), Some(signature)) => (pub_key, signature),
            _ => return Err(BlockchainError::NotSigned),
        };

        let checksum = self.params.to.to_checksum();
        Ok(CreateTxParams {
            version: self.params.version,
            nonce: self.params.nonce,
            to_addr: checksum.trim_start_matches("0x").to_string(),
            amount: self.params.amount.to_string(),
            pub_key: hex::encode(pub_key),
            gas_price: self.params.gas_price.to_string(),
            gas_limit: self.params.gas_limit.to_string(),
            code: self.params.code.clone().unwrap_or_default(),
            data: encode_data(self.params.data.as_deref()),
            signature: signature.to_hex(),
            priority: false,
        })
    }

    /// Submit to the node behind `client`.
    ///
    /// On success the transaction is `Pending` with its id recorded. On any
    /// failure it stays `Initialized` and the error is returned.
    pub async fn submit(&mut self, client: &BlockchainClient) -> BlockchainResult<TxId> {
        self.require(TxStatus::Initialized, TxStatus::Pending)?;
        let params = self.to_create_params()?;

        let reply = client.create_transaction(&params).await;
        self.record_submission(reply)
    }

    /// Submit several transactions in one batch request.
    ///
    /// Nothing is sent unless every transaction is `Initialized` and signed.
    /// Accepted transactions become `Pending`; refused ones stay
    /// `Initialized` and their error is returned in the matching slot.
    pub async fn submit_batch(
        txs: &mut [Transaction],
        client: &BlockchainClient,
    ) -> BlockchainResult<Vec<BlockchainResult<TxId>>> {
        let params = txs
            .iter()
            .map(|tx| {
                tx.require(TxStatus::Initialized, TxStatus::Pending)?;
                tx.to_create_params()
            })
            .collect::<BlockchainResult<Vec<_>>>()?;

        let replies = match client.create_transactions(&params).await {
            Ok(replies) => replies,
            Err(e) => {
                tracing::warn!(count = txs.len(), error = %e, "Batch submission failed");
                metrics::record_submission(if e.is_transport() { "transport_error" } else { "refused" });
                return Err(e);
            }
        };

        let results: Vec<_> = txs
            .iter_mut()
            .zip(replies)
            .map(|(tx, reply)| tx.record_submission(reply))
            .collect();
        tracing::info!(
            count = results.len(),
            accepted = results.iter().filter(|r| r.is_ok()).count(),
            "Transaction batch submitted"
        );
        Ok(results)
    }

    fn record_submission(&mut self, reply: BlockchainResult<TxCreated>) -> BlockchainResult<TxId> {
        match reply {
            Ok(created) => {
                tracing::info!(
                    tx_id = %created.id,
                    sender = %self.params.sender,
                    nonce = self.params.nonce,
                    info = %created.info,
                    "Transaction submitted"
                );
                metrics::record_submission("accepted");
                self.id = Some(created.id.clone());
                self.status = TxStatus::Pending;
                Ok(created.id)
            }
            Err(e) => {
                tracing::warn!(
                    sender = %self.params.sender,
                    nonce = self.params.nonce,
                    error = %e,
                    "Transaction submission failed"
                );
                metrics::record_submission(if e.is_transport() { "transport_error" } else { "refused" });
                Err(e)
            }
        }
    }

    pub(crate) fn mark_confirmed(&mut self, receipt: TxReceipt) -> BlockchainResult<()> {
        self.require(TxStatus::Pending, TxStatus::Confirmed)?;
        self.receipt = Some(receipt);
        self.status = TxStatus::Confirmed;
        Ok(())
    }

    pub(crate) fn mark_rejected(&mut self, reason: String) -> BlockchainResult<()> {
        self.require(TxStatus::Pending, TxStatus::Rejected)?;
        self.rejection = Some(reason);
        self.status = TxStatus::Rejected;
        Ok(())
    }
}

/// Payload bytes go on the wire as text when they are UTF-8, hex otherwise.
fn encode_data(data: Option<&[u8]>) -> String {
    match data {
        None => String::new(),
        Some(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => format!("0x{}", hex::encode(bytes)),
        },
    }
}
