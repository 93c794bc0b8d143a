//! The pluggable confirmation seam used by [`crate::JsonRpcSigner::send_transaction`].
//!
//! Instead of handing `eth_sendTransaction` straight to the injected wallet,
//! a host application can route it through its own confirmation UI or relay.
//! The channel receives a fully-formed JSON-RPC request (with a correlation
//! id minted by the signer) and answers with a JSON-RPC shaped response.

use crate::errors::JsonRpcError;
use async_trait::async_trait;
use auto_impl::auto_impl;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;

/// A JSON-RPC 2.0 request envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Correlation id; unique per signer for the signer's lifetime
    pub id: u64,
    /// Always `"2.0"`
    pub jsonrpc: String,
    /// The RPC method name
    pub method: String,
    /// The RPC parameters
    pub params: Value,
}

impl JsonRpcRequest {
    /// Creates a new JSON-RPC 2.0 request
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self { id, jsonrpc: "2.0".to_owned(), method: method.into(), params }
    }
}

/// The response a [`ConfirmationChannel`] populates: either a `result` or an
/// `error`, mirroring a JSON-RPC response body.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConfirmationResponse {
    /// The successful result (for a send, the transaction hash)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The failure reported by the confirmation host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl ConfirmationResponse {
    /// A response carrying a successful result.
    pub fn from_result(result: Value) -> Self {
        Self { result: Some(result), error: None }
    }

    /// A response carrying an error.
    pub fn from_error(error: JsonRpcError) -> Self {
        Self { result: None, error: Some(error) }
    }

    /// Consume the response and return the result, treating a populated
    /// `error` field as authoritative. A response with neither field is an
    /// internal error on the confirmation host's part.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        if let Some(error) = self.error {
            return Err(error)
        }
        self.result.ok_or_else(|| JsonRpcError {
            code: -32603,
            message: "confirmation channel returned an empty response".to_owned(),
            data: None,
        })
    }
}

#[async_trait]
#[auto_impl(&, Box, Arc)]
/// A host-mediated path for confirming a transaction, distinct from sending
/// it directly to the injected wallet.
pub trait ConfirmationChannel: Debug + Send + Sync {
    /// Presents `request` for confirmation and reports the outcome.
    ///
    /// Implementations must populate either `result` (the transaction hash)
    /// or `error`; they must not swallow the request.
    async fn confirm_transaction(&self, request: &JsonRpcRequest) -> ConfirmationResponse;
}
