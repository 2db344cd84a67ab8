//! Blockchain RPC client with typed method wrappers.
//!
//! # Responsibilities
//! - Wrap the node methods the client needs over any [`Transport`]
//! - Decode untyped JSON results into typed structs once, at this boundary
//! - Classify transaction lookups into not-found, confirmed and failed
//! - Provide health check for node connectivity

use alloy::primitives::U256;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::blockchain::address::Address;
use crate::blockchain::types::{BlockchainError, BlockchainResult, TxId, TxStatus};
use crate::config::RpcConfig;
use crate::observability::metrics;
use crate::rpc::methods;
use crate::rpc::{HttpTransport, RpcCall, Transport};

/// Wire parameters of `CreateTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTxParams {
    pub version: u32,
    pub nonce: u64,
    /// Checksummed hex without `0x`.
    pub to_addr: String,
    /// Decimal string.
    pub amount: String,
    /// Compressed public key, hex without `0x`.
    pub pub_key: String,
    /// Decimal string.
    pub gas_price: String,
    /// Decimal string.
    pub gas_limit: String,
    pub code: String,
    pub data: String,
    /// 128 hex characters, `r || s`.
    pub signature: String,
    pub priority: bool,
}

/// Result of `CreateTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxCreated {
    #[serde(rename = "TranID")]
    pub id: TxId,
    #[serde(rename = "Info", default)]
    pub info: String,
    #[serde(rename = "ContractAddress", default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
}

/// A contract exception recorded in a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptException {
    #[serde(default)]
    pub line: u64,
    #[serde(default)]
    pub message: String,
}

/// On-chain execution receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub success: bool,
    #[serde(default, deserialize_with = "u64_from_string_or_number")]
    pub cumulative_gas: Option<u64>,
    #[serde(default, deserialize_with = "u64_from_string_or_number")]
    pub epoch_num: Option<u64>,
    /// Error codes keyed by call depth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<i64>>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exceptions: Vec<ReceiptException>,
}

impl TxReceipt {
    /// Human-readable failure reason, taken from exceptions then error codes.
    pub fn failure_reason(&self) -> String {
        if let Some(first) = self.exceptions.first() {
            if !first.message.is_empty() {
                return first.message.clone();
            }
        }

        let codes: Vec<i64> = self
            .errors
            .iter()
            .flat_map(|by_depth| by_depth.values().flatten().copied())
            .collect();
        if codes.is_empty() {
            "transaction failed on-chain".to_string()
        } else {
            let codes: Vec<String> = codes.iter().map(i64::to_string).collect();
            format!("transaction failed on-chain with error codes [{}]", codes.join(", "))
        }
    }
}

/// Classified result of `GetTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxLookup {
    /// The node doesn't know the transaction (yet).
    NotFound,
    /// Included with a successful receipt.
    Confirmed(TxReceipt),
    /// Included with a failed receipt.
    Failed { reason: String, receipt: TxReceipt },
}

#[derive(Debug, Deserialize)]
struct GetTransactionResult {
    receipt: TxReceipt,
}

/// Processing status reported by `GetTransactionStatus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxStatusInfo {
    pub modification_state: u8,
    pub code: u8,
    pub message: &'static str,
}

impl TxStatusInfo {
    pub fn new(modification_state: u8, code: u8) -> Self {
        Self {
            modification_state,
            code,
            message: status_message(code),
        }
    }

    /// Lifecycle status this node-side code corresponds to.
    pub fn lifecycle_status(&self) -> TxStatus {
        match self.code {
            3 => TxStatus::Confirmed,
            0..=2 | 4..=6 => TxStatus::Pending,
            _ => TxStatus::Rejected,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxStatusResult {
    #[serde(deserialize_with = "u8_from_string_or_number")]
    modification_state: u8,
    #[serde(deserialize_with = "u8_from_string_or_number")]
    status: u8,
}

/// Describe a `GetTransactionStatus` code.
pub fn status_message(code: u8) -> &'static str {
    match code {
        0 => "Transaction not found",
        1 => "Pending - Dispatched",
        2 => "Pending - Soft-confirmed (awaiting Tx block generation)",
        3 => "Confirmed",
        4 => "Pending - Nonce is higher than expected",
        5 => "Pending - Microblock gas limit exceeded",
        6 => "Pending - Consensus failure in network",
        10 => "Rejected - Transaction caused math error",
        11 => "Rejected - Scilla invocation error",
        12 => "Rejected - Contract account initialization error",
        13 => "Rejected - Invalid source account",
        14 => "Rejected - Gas limit higher than shard gas limit",
        15 => "Rejected - Unknown transaction type",
        16 => "Rejected - Transaction sent to wrong shard",
        17 => "Rejected - Contract & source account cross-shard issue",
        18 => "Rejected - Code size exceeded limit",
        19 => "Rejected - Transaction verification failed",
        20 => "Rejected - Gas limit too low",
        21 => "Rejected - Insufficient balance",
        22 => "Rejected - Insufficient gas to invoke Scilla checker",
        23 => "Rejected - Duplicate transaction exists",
        24 => "Rejected - Transaction with same nonce but same/higher gas price exists",
        25 => "Rejected - Invalid destination address",
        26 => "Rejected - Failed to add contract account to state",
        27 => "Rejected - Nonce is lower than expected",
        255 => "Rejected - Internal error",
        _ => "Unknown status",
    }
}

/// Balance and latest nonce of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    pub balance: U256,
    pub nonce: u64,
}

#[derive(Debug, Deserialize)]
struct BalanceResult {
    balance: String,
    #[serde(deserialize_with = "u64_required")]
    nonce: u64,
}

/// Typed client over a JSON-RPC transport.
#[derive(Clone)]
pub struct BlockchainClient {
    transport: Arc<dyn Transport>,
    config: RpcConfig,
}

impl BlockchainClient {
    /// Create a client over an existing transport.
    pub fn new(transport: Arc<dyn Transport>, config: RpcConfig) -> Self {
        Self { transport, config }
    }

    /// Create a client speaking HTTP to `config.url`.
    pub fn from_config(config: RpcConfig) -> BlockchainResult<Self> {
        let transport = HttpTransport::new(&config.url, config.timeout())?;
        tracing::info!(
            rpc_url = %config.url,
            chain_id = config.chain_id,
            "Blockchain client initialized"
        );
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Submit a signed transaction.
    pub async fn create_transaction(&self, params: &CreateTxParams) -> BlockchainResult<TxCreated> {
        let value = serde_json::to_value(params)
            .map_err(|e| BlockchainError::Decode(format!("cannot encode transaction: {}", e)))?;
        let result = self.transport.send(methods::CREATE_TRANSACTION, vec![value]).await?;
        decode(methods::CREATE_TRANSACTION, result)
    }

    /// Submit several signed transactions in one batch request.
    ///
    /// The outer error covers the request as a whole. Each item carries the
    /// node's answer for that transaction, in input order.
    pub async fn create_transactions(
        &self,
        params: &[CreateTxParams],
    ) -> BlockchainResult<Vec<BlockchainResult<TxCreated>>> {
        if params.is_empty() {
            return Ok(Vec::new());
        }

        let calls = params
            .iter()
            .map(|p| {
                serde_json::to_value(p)
                    .map(|value| RpcCall::new(methods::CREATE_TRANSACTION, vec![value]))
                    .map_err(|e| BlockchainError::Decode(format!("cannot encode transaction: {}", e)))
            })
            .collect::<BlockchainResult<Vec<_>>>()?;

        let replies = self.transport.send_batch(calls).await?;
        Ok(replies
            .into_iter()
            .map(|reply| reply.and_then(|value| decode(methods::CREATE_TRANSACTION, value)))
            .collect())
    }

    /// Look a transaction up and classify it.
    ///
    /// "Not present" errors and `null` results are [`TxLookup::NotFound`];
    /// every other RPC error is returned as is.
    pub async fn get_transaction(&self, id: &TxId) -> BlockchainResult<TxLookup> {
        let params = vec![json!(id.normalized())];
        let result = match self.transport.send(methods::GET_TRANSACTION, params).await {
            Ok(value) => value,
            Err(BlockchainError::Rpc { code, .. }) if code == methods::TX_NOT_FOUND_CODE => {
                return Ok(TxLookup::NotFound);
            }
            Err(e) => return Err(e),
        };

        if result.is_null() {
            return Ok(TxLookup::NotFound);
        }

        let tx: GetTransactionResult = decode(methods::GET_TRANSACTION, result)?;
        if tx.receipt.success {
            Ok(TxLookup::Confirmed(tx.receipt))
        } else {
            Ok(TxLookup::Failed {
                reason: tx.receipt.failure_reason(),
                receipt: tx.receipt,
            })
        }
    }

    /// Node-side processing status, including pending states.
    pub async fn get_transaction_status(&self, id: &TxId) -> BlockchainResult<TxStatusInfo> {
        let params = vec![json!(id.normalized())];
        let result = self.transport.send(methods::GET_TRANSACTION_STATUS, params).await?;
        let status: TxStatusResult = decode(methods::GET_TRANSACTION_STATUS, result)?;
        Ok(TxStatusInfo::new(status.modification_state, status.status))
    }

    /// Balance and nonce; an account the chain hasn't seen yet is zero.
    pub async fn get_balance(&self, address: &Address) -> BlockchainResult<Balance> {
        let params = vec![json!(hex::encode(address.as_bytes()))];
        let result = match self.transport.send(methods::GET_BALANCE, params).await {
            Ok(value) => value,
            Err(BlockchainError::Rpc { code, .. }) if code == methods::ACCOUNT_NOT_CREATED_CODE => {
                return Ok(Balance {
                    balance: U256::ZERO,
                    nonce: 0,
                });
            }
            Err(e) => return Err(e),
        };

        let raw: BalanceResult = decode(methods::GET_BALANCE, result)?;
        Ok(Balance {
            balance: parse_decimal(methods::GET_BALANCE, &raw.balance)?,
            nonce: raw.nonce,
        })
    }

    /// Nonce to use for the next transaction from `address`.
    pub async fn next_nonce(&self, address: &Address) -> BlockchainResult<u64> {
        let nonce = self.get_balance(address).await?.nonce;
        nonce
            .checked_add(1)
            .ok_or_else(|| BlockchainError::Decode(format!("account nonce {} cannot be incremented", nonce)))
    }

    pub async fn get_network_id(&self) -> BlockchainResult<String> {
        let result = self.transport.send(methods::GET_NETWORK_ID, Vec::new()).await?;
        match result {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(BlockchainError::Decode(format!(
                "{}: unexpected result {}",
                methods::GET_NETWORK_ID,
                other
            ))),
        }
    }

    pub async fn get_minimum_gas_price(&self) -> BlockchainResult<U256> {
        let result = self.transport.send(methods::GET_MINIMUM_GAS_PRICE, Vec::new()).await?;
        match result {
            Value::String(s) => parse_decimal(methods::GET_MINIMUM_GAS_PRICE, &s),
            Value::Number(n) => parse_decimal(methods::GET_MINIMUM_GAS_PRICE, &n.to_string()),
            other => Err(BlockchainError::Decode(format!(
                "{}: unexpected result {}",
                methods::GET_MINIMUM_GAS_PRICE,
                other
            ))),
        }
    }

    /// Check if the node is reachable and answering.
    pub async fn is_healthy(&self) -> bool {
        let healthy = self.get_network_id().await.is_ok();
        metrics::record_node_health(healthy);
        healthy
    }

    /// Transaction version for the configured chain.
    pub fn tx_version(&self) -> u32 {
        crate::blockchain::transaction::pack_version(self.config.chain_id, self.config.msg_version)
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }
}

impl std::fmt::Debug for BlockchainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainClient")
            .field("rpc_url", &self.config.url)
            .field("chain_id", &self.config.chain_id)
            .field("timeout_secs", &self.config.timeout_secs)
            .finish()
    }
}

fn decode<T: serde::de::DeserializeOwned>(method: &str, value: Value) -> BlockchainResult<T> {
    serde_json::from_value(value)
        .map_err(|e| BlockchainError::Decode(format!("{}: unexpected result: {}", method, e)))
}

fn parse_decimal(method: &str, text: &str) -> BlockchainResult<U256> {
    U256::from_str_radix(text.trim(), 10)
        .map_err(|e| BlockchainError::Decode(format!("{}: invalid amount '{}': {}", method, text, e)))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(u64),
}

impl StringOrNumber {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            StringOrNumber::Number(n) => Ok(n),
            StringOrNumber::String(s) => s.trim().parse().map_err(E::custom),
        }
    }
}

fn u64_from_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Option::<StringOrNumber>::deserialize(d)?
        .map(|v| v.into_u64::<D::Error>())
        .transpose()
}

fn u64_required<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    StringOrNumber::deserialize(d)?.into_u64::<D::Error>()
}

fn u8_from_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    let value = u64_required(d)?;
    u8::try_from(value).map_err(serde::de::Error::custom)
}
