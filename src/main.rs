//! zil-client command line.
//!
//! ```text
//! zil-client [--config FILE] [--rpc-url URL] <command>
//!
//!   address              addresses of the key in $ZIL_PRIVATE_KEY
//!   new-key              generate a key and print it with its addresses
//!   convert <ADDRESS>    print every textual form of an address
//!   balance <ADDRESS>    balance and nonce
//!   transfer             sign, submit and (by default) wait for confirmation
//!   track <TX_ID>        follow an already submitted transaction
//! ```

use alloy::primitives::U256;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

use zil_client::blockchain::wallet::PRIVATE_KEY_ENV_VAR;
use zil_client::config::{load_or_default, ClientConfig};
use zil_client::crypto::schnorr;
use zil_client::observability::logging;
use zil_client::{
    Address, BlockchainClient, Transaction, TrackingEvent, TransactionTracker, TxId, TxParams, Wallet,
};

#[derive(Parser)]
#[command(name = "zil-client")]
#[command(about = "Sign, submit and track Zilliqa transactions", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured RPC endpoint
    #[arg(long)]
    rpc_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the addresses of the key in the environment
    Address,
    /// Generate a new private key
    NewKey,
    /// Print hex, checksummed and bech32 forms of an address
    Convert { address: String },
    /// Query balance and nonce
    Balance { address: String },
    /// Send funds from the key in the environment
    Transfer {
        /// Recipient (hex or bech32)
        #[arg(long)]
        to: String,
        /// Amount in the smallest unit (Qa)
        #[arg(long)]
        amount: String,
        /// Gas price in Qa; defaults to the node's minimum
        #[arg(long)]
        gas_price: Option<String>,
        #[arg(long, default_value_t = 50)]
        gas_limit: u64,
        /// Nonce; defaults to the account nonce + 1
        #[arg(long)]
        nonce: Option<u64>,
        /// Return after submission instead of waiting for confirmation
        #[arg(long)]
        no_wait: bool,
    },
    /// Follow a submitted transaction until it settles
    Track { tx_id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config: ClientConfig = load_or_default(cli.config.as_deref())?;
    if let Some(url) = cli.rpc_url {
        config.rpc.url = url;
    }
    logging::init(&config.observability);

    match cli.command {
        Commands::Address => {
            let wallet = Wallet::new();
            let address = wallet.add_key_from_env(PRIVATE_KEY_ENV_VAR)?;
            print_address(&address);
        }
        Commands::NewKey => {
            let secret = schnorr::generate_secret_key();
            let public_key = schnorr::public_key_bytes(&secret);
            println!("private key: {}", hex::encode(secret.to_bytes()));
            println!("public key:  {}", hex::encode(public_key));
            print_address(&Address::from_public_key(&public_key));
        }
        Commands::Convert { address } => {
            print_address(&Address::from_str(&address)?);
        }
        Commands::Balance { address } => {
            let client = BlockchainClient::from_config(config.rpc.clone())?;
            let balance = client.get_balance(&Address::from_str(&address)?).await?;
            println!("balance: {}", balance.balance);
            println!("nonce:   {}", balance.nonce);
        }
        Commands::Transfer {
            to,
            amount,
            gas_price,
            gas_limit,
            nonce,
            no_wait,
        } => {
            let wallet = Wallet::new();
            let sender = wallet.add_key_from_env(PRIVATE_KEY_ENV_VAR)?;
            let client = BlockchainClient::from_config(config.rpc.clone())?;

            let nonce = match nonce {
                Some(nonce) => nonce,
                None => client.next_nonce(&sender).await?,
            };
            let gas_price = match gas_price {
                Some(price) => U256::from_str_radix(&price, 10)?,
                None => client.get_minimum_gas_price().await?,
            };

            let mut tx = Transaction::new(TxParams {
                version: client.tx_version(),
                sender,
                to: Address::from_str(&to)?,
                amount: U256::from_str_radix(&amount, 10)?,
                nonce,
                gas_price,
                gas_limit,
                ..TxParams::default()
            });
            wallet.sign_transaction(&mut tx)?;

            let id = tx.submit(&client).await?;
            println!("submitted: {}", id);

            if !no_wait {
                let tracker = TransactionTracker::new(client, config.tracker.clone())?;
                let receipt = tracker.confirm(&mut tx).await?;
                println!("status:    {}", tx.status());
                println!("receipt:   {}", serde_json::to_string_pretty(&receipt)?);
            }
        }
        Commands::Track { tx_id } => {
            let client = BlockchainClient::from_config(config.rpc.clone())?;
            let tracker = TransactionTracker::new(client, config.tracker.clone())?;
            let mut subscription = tracker.track(&TxId::from(tx_id));

            while let Some(event) = subscription.next_event().await {
                println!("{}", event);
                if let TrackingEvent::Confirmed { receipt, .. } = &event {
                    println!("{}", serde_json::to_string_pretty(receipt)?);
                }
            }
        }
    }

    Ok(())
}

fn print_address(address: &Address) {
    println!("hex:      {}", address.to_hex());
    println!("checksum: {}", address.to_checksum());
    println!("bech32:   {}", address.to_bech32());
}
