// src/tools/wallet.rs
// Wallet tools over a blockchain RPC collaborator. The core consumes only
// this trait; the JSON-RPC implementation is the default wiring.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use super::{ToolBuilder, ToolSpec};

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// The agent's own address
    fn address(&self) -> String;
    /// Human-readable balance, e.g. "1.2534 ETH"
    async fn balance(&self) -> Result<String>;
}

/// eth-style JSON-RPC wallet
pub struct JsonRpcWallet {
    client: Client,
    rpc_url: String,
    address: String,
}

impl JsonRpcWallet {
    pub fn new(rpc_url: String, address: String) -> Self {
        Self {
            client: Client::new(),
            rpc_url,
            address,
        }
    }
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn balance(&self) -> Result<String> {
        debug!("Fetching balance for {}", self.address);

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getBalance",
            "params": [self.address, "latest"],
        });

        let response: Value = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .context("wallet RPC request failed")?
            .json()
            .await
            .context("wallet RPC returned invalid JSON")?;

        if let Some(error) = response.get("error") {
            return Err(anyhow!("wallet RPC error: {}", error));
        }

        let hex = response
            .get("result")
            .and_then(|r| r.as_str())
            .ok_or_else(|| anyhow!("wallet RPC response missing result"))?;

        let wei = u128::from_str_radix(hex.trim_start_matches("0x"), 16)
            .with_context(|| format!("unparseable balance: {}", hex))?;
        let eth = wei as f64 / 1e18;

        Ok(format!("{:.4} ETH", eth))
    }
}

pub fn wallet_tools(provider: Arc<dyn WalletProvider>) -> Vec<ToolSpec> {
    let address_schema = ToolBuilder::new(
        "wallet_address",
        "Get the agent's own wallet address. Use for any question about what the wallet or deposit address is.",
    )
    .build();

    let balance_schema = ToolBuilder::new(
        "wallet_balance",
        "Get the agent's current wallet balance from the chain. Use for any question about how much the wallet holds.",
    )
    .build();

    let for_address = provider.clone();
    let for_balance = provider;

    vec![
        ToolSpec::new(address_schema, move |_args| {
            let provider = for_address.clone();
            async move { Ok(format!("Wallet address: {}", provider.address())) }
        }),
        ToolSpec::new(balance_schema, move |_args| {
            let provider = for_balance.clone();
            async move {
                let balance = provider.balance().await?;
                Ok(format!("Wallet balance: {}", balance))
            }
        }),
    ]
}
