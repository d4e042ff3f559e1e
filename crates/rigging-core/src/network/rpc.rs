//! JSON-RPC 2.0 client for a signing gateway.
//!
//! The gateway holds the sender's key, assigns nothing on its own and relays
//! each envelope exactly as submitted. Methods:
//! - `gateway_accountSequence(address) -> u64`
//! - `gateway_submit(envelope) -> hash`
//! - `gateway_status(hash) -> { status, ... }`
//! - `gateway_query({ target, function, args }) -> value`

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;

use super::{ComponentNetwork, Envelope, TxHash, TxStatus};
use crate::error::OrchestrationError;
use crate::types::Address;

/// Gateway error code for a sequence number the network will not accept.
pub const SEQUENCE_CONFLICT_CODE: i64 = -32010;
/// Gateway error code for an upstream node that is unavailable.
pub const UPSTREAM_UNAVAILABLE_CODE: i64 = -32011;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct RpcNetwork {
    client: reqwest::Client,
    endpoint: Url,
    next_id: AtomicU64,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcNetwork {
    pub fn new(endpoint: Url) -> Result<Self, OrchestrationError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rigging/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")
            .map_err(|e| OrchestrationError::Configuration(format!("{e:#}")))?;
        Ok(Self {
            client,
            endpoint,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, OrchestrationError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        tracing::trace!(method, id = request.id, "rpc request");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::NetworkFailure(format!(
                    "{} to {} failed: {}",
                    method, self.endpoint, e
                ))
            })?;

        if !response.status().is_success() {
            return Err(OrchestrationError::NetworkFailure(format!(
                "{}: HTTP {} from {}",
                method,
                response.status(),
                self.endpoint
            )));
        }

        let body: RpcResponse = response.json().await.map_err(|e| {
            OrchestrationError::NetworkFailure(format!("{method}: unreadable response: {e}"))
        })?;

        if let Some(error) = body.error {
            return Err(classify_rpc_error(method, error.code, &error.message));
        }
        body.result
            .ok_or_else(|| OrchestrationError::NetworkFailure(format!("{method}: empty result")))
    }
}

/// Map a gateway error onto the orchestration taxonomy.
pub fn classify_rpc_error(method: &str, code: i64, message: &str) -> OrchestrationError {
    let lowered = message.to_ascii_lowercase();
    let detail = format!("{method}: {message} (code {code})");
    if code == SEQUENCE_CONFLICT_CODE
        || lowered.contains("nonce")
        || lowered.contains("sequence")
        || lowered.contains("replacement transaction underpriced")
    {
        OrchestrationError::SequenceConflict(detail)
    } else if code == UPSTREAM_UNAVAILABLE_CODE
        || lowered.contains("timeout")
        || lowered.contains("unavailable")
    {
        OrchestrationError::NetworkFailure(detail)
    } else {
        OrchestrationError::RemoteRejection(detail)
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    method: &str,
    value: Value,
) -> Result<T, OrchestrationError> {
    serde_json::from_value(value).map_err(|e| {
        OrchestrationError::NetworkFailure(format!("{method}: unexpected result shape: {e}"))
    })
}

#[async_trait]
impl ComponentNetwork for RpcNetwork {
    async fn account_sequence(&self, account: &Address) -> Result<u64, OrchestrationError> {
        let method = "gateway_accountSequence";
        let value = self.call(method, json!([account])).await?;
        decode(method, value)
    }

    async fn submit(&self, envelope: &Envelope) -> Result<TxHash, OrchestrationError> {
        let method = "gateway_submit";
        let value = self.call(method, json!([envelope])).await?;
        decode(method, value)
    }

    async fn status(&self, hash: &TxHash) -> Result<TxStatus, OrchestrationError> {
        let method = "gateway_status";
        let value = self.call(method, json!([hash])).await?;
        decode(method, value)
    }

    async fn query(
        &self,
        target: &Address,
        function: &str,
        args: &[String],
    ) -> Result<Value, OrchestrationError> {
        self.call(
            "gateway_query",
            json!([{ "target": target, "function": function, "args": args }]),
        )
        .await
    }
}
