//! Node method names and protocol constants.

/// Submit a signed transaction.
pub const CREATE_TRANSACTION: &str = "CreateTransaction";

/// Fetch a transaction and its receipt once it is on-chain.
pub const GET_TRANSACTION: &str = "GetTransaction";

/// Fetch the processing status of a transaction, including pending states.
pub const GET_TRANSACTION_STATUS: &str = "GetTransactionStatus";

/// Balance and latest nonce of an account.
pub const GET_BALANCE: &str = "GetBalance";

/// Network (chain) identifier.
pub const GET_NETWORK_ID: &str = "GetNetworkId";

/// Current minimum gas price.
pub const GET_MINIMUM_GAS_PRICE: &str = "GetMinimumGasPrice";

/// Error code for a transaction hash the node doesn't know (yet).
pub const TX_NOT_FOUND_CODE: i64 = -20;

/// Error code for a balance query on an account that doesn't exist yet.
pub const ACCOUNT_NOT_CREATED_CODE: i64 = -5;
