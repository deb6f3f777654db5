use crate::config::BlockchainConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("chain node unreachable: {0}")]
    Transport(String),

    #[error("chain node did not answer in time")]
    Timeout,

    #[error("chain node returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("unexpected response from chain node: {0}")]
    Malformed(String),
}

/// Transaction as reported by the node, before any checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: String,
    /// Lower-cased
    pub from: String,
    /// Lower-cased; `None` for contract creation
    pub to: Option<String>,
    pub value_wei: u128,
    /// `None` while still in the mempool
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainReceipt {
    pub succeeded: bool,
    pub block_number: u64,
}

/// Read access to an EVM chain
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_number(&self) -> Result<u64, ChainError>;

    async fn transaction(&self, tx_ref: &str) -> Result<Option<ChainTransaction>, ChainError>;

    async fn receipt(&self, tx_ref: &str) -> Result<Option<ChainReceipt>, ChainError>;
}

/// [`ChainClient`] over Ethereum JSON-RPC
pub struct JsonRpcChainClient {
    http_client: reqwest::Client,
    rpc_url: String,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    hash: String,
    from: String,
    #[serde(default)]
    to: Option<String>,
    value: String,
    #[serde(default)]
    block_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    #[serde(default)]
    status: Option<String>,
    block_number: String,
}

impl JsonRpcChainClient {
    pub fn new(config: &BlockchainConfig) -> Result<Self, ChainError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            rpc_url: config.rpc_url.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Option<Value>, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request_body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(method, id, "Calling chain node");

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request_body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(ChainError::Transport(format!(
                "HTTP {} from chain node",
                response.status()
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Malformed(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(body.result.filter(|result| !result.is_null()))
    }
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    async fn block_number(&self) -> Result<u64, ChainError> {
        let result = self
            .call("eth_blockNumber", json!([]))
            .await?
            .ok_or_else(|| ChainError::Malformed("empty eth_blockNumber result".to_string()))?;

        let hex = result
            .as_str()
            .ok_or_else(|| ChainError::Malformed("block number is not a string".to_string()))?;
        to_u64(parse_quantity(hex)?)
    }

    async fn transaction(&self, tx_ref: &str) -> Result<Option<ChainTransaction>, ChainError> {
        let Some(result) = self.call("eth_getTransactionByHash", json!([tx_ref])).await? else {
            return Ok(None);
        };

        let tx: RpcTransaction =
            serde_json::from_value(result).map_err(|e| ChainError::Malformed(e.to_string()))?;

        let block_number = match tx.block_number.as_deref() {
            Some(hex) => Some(to_u64(parse_quantity(hex)?)?),
            None => None,
        };

        Ok(Some(ChainTransaction {
            hash: tx.hash.to_lowercase(),
            from: tx.from.to_lowercase(),
            to: tx.to.map(|to| to.to_lowercase()),
            value_wei: parse_quantity(&tx.value)?,
            block_number,
        }))
    }

    async fn receipt(&self, tx_ref: &str) -> Result<Option<ChainReceipt>, ChainError> {
        let Some(result) = self.call("eth_getTransactionReceipt", json!([tx_ref])).await? else {
            return Ok(None);
        };

        let receipt: RpcReceipt =
            serde_json::from_value(result).map_err(|e| ChainError::Malformed(e.to_string()))?;

        // Pre-Byzantium receipts carry no status; treat as success
        let succeeded = match receipt.status.as_deref() {
            Some(status) => parse_quantity(status)? == 1,
            None => true,
        };

        Ok(Some(ChainReceipt {
            succeeded,
            block_number: to_u64(parse_quantity(&receipt.block_number)?)?,
        }))
    }
}

fn map_transport_error(e: reqwest::Error) -> ChainError {
    if e.is_timeout() {
        ChainError::Timeout
    } else {
        ChainError::Transport(e.to_string())
    }
}

/// Parse a `0x`-prefixed hex quantity
fn parse_quantity(hex: &str) -> Result<u128, ChainError> {
    let digits = hex
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Malformed(format!("quantity without 0x prefix: {}", hex)))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|_| ChainError::Malformed(format!("invalid hex quantity: {}", hex)))
}

fn to_u64(n: u128) -> Result<u64, ChainError> {
    u64::try_from(n).map_err(|_| ChainError::Malformed(format!("quantity out of range: {}", n)))
}
