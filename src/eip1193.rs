//! The low-level channel to a browser-injected [EIP-1193](https://eips.ethereum.org/EIPS/eip-1193)
//! wallet.
//!
//! [`Eip1193Client`] wraps the wallet's raw `request` capability: every call
//! is announced on the provider's debug-event stream, and every failure is
//! rebuilt into a [`WalletError`] carrying the wallet's code/data plus the
//! exact payload that was attempted. No retrying happens at this layer;
//! retry policy belongs to the callers that know what they are sending.

use crate::errors::{ProviderError, WalletError};
use async_trait::async_trait;
use auto_impl::auto_impl;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::{
    fmt::{self, Debug},
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tracing::debug;

/// The `{method, params}` pair handed to a wallet's `request` capability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// The RPC method name, e.g. `eth_sendTransaction`
    pub method: String,
    /// The RPC parameters, serialized as a JSON array or object
    pub params: Value,
}

/// The error shape an EIP-1193 wallet rejects with.
#[derive(Clone, Debug, Error, Serialize, Deserialize)]
#[error("{message} (code: {code:?})")]
pub struct Eip1193Error {
    /// The message reported by the wallet
    pub message: String,
    /// The provider error code, if any
    pub code: Option<i64>,
    /// Additional data attached by the wallet
    pub data: Option<Value>,
}

#[async_trait]
#[auto_impl(&, Box, Arc)]
/// Trait which must be implemented by the injected wallet object (or a
/// binding to it) to be used with the [`crate::Provider`].
pub trait Eip1193Provider: Debug + Send + Sync {
    /// Submits a request to the wallet and returns the raw JSON result.
    async fn request(&self, payload: &RequestPayload) -> Result<Value, Eip1193Error>;
}

/// A notification emitted while talking to the wallet or while polling for a
/// submitted transaction. Events are fire-and-forget; nothing is retained.
#[derive(Clone, Debug)]
pub enum ProviderEvent {
    /// A request is about to be handed to the wallet
    SendEip1193Request {
        /// The payload being sent
        payload: RequestPayload,
    },
    /// The wallet answered a request
    ReceiveEip1193Result {
        /// The raw result, before deserialization
        result: Value,
    },
    /// The wallet rejected a request
    ReceiveEip1193Error {
        /// The enriched error that will be raised to the caller
        error: WalletError,
    },
    /// A non-fatal failure that the provider will retry internally
    Error {
        /// Human-readable description of what failed
        message: String,
    },
}

/// Observer interface for [`ProviderEvent`] notifications.
///
/// Implemented for any `Fn(&ProviderEvent) + Send + Sync` closure. Register
/// listeners with [`crate::Provider::on_event`].
pub trait EventListener: Send + Sync {
    /// Called synchronously for every emitted event.
    fn on_event(&self, event: &ProviderEvent);
}

impl<F> EventListener for F
where
    F: Fn(&ProviderEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProviderEvent) {
        self(event)
    }
}

/// The listener registry shared between a provider and its request channel.
#[derive(Default)]
pub(crate) struct Events {
    listeners: Mutex<Vec<Box<dyn EventListener>>>,
}

impl Events {
    pub(crate) fn subscribe(&self, listener: Box<dyn EventListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    pub(crate) fn emit(&self, event: ProviderEvent) {
        for listener in self.listeners.lock().unwrap().iter() {
            listener.on_event(&event);
        }
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Events")
            .field("listeners", &self.listeners.lock().unwrap().len())
            .finish()
    }
}

/// A typed JSON-RPC channel over a wallet's EIP-1193 `request` capability.
#[derive(Debug)]
pub struct Eip1193Client<W> {
    wallet: Arc<W>,
    events: Arc<Events>,
}

impl<W> Clone for Eip1193Client<W> {
    fn clone(&self) -> Self {
        Self { wallet: Arc::clone(&self.wallet), events: Arc::clone(&self.events) }
    }
}

impl<W: Eip1193Provider> Eip1193Client<W> {
    pub(crate) fn new(wallet: W, events: Arc<Events>) -> Self {
        Self { wallet: Arc::new(wallet), events }
    }

    /// Sends a request with the provided method and the params serialized as
    /// JSON through the wallet.
    ///
    /// Failures are returned as [`WalletError`]s carrying the wallet's
    /// code/data and the payload that was attempted.
    pub async fn request<T, R>(&self, method: &str, params: T) -> Result<R, ProviderError>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned,
    {
        let payload =
            RequestPayload { method: method.to_owned(), params: serde_json::to_value(params)? };
        self.events.emit(ProviderEvent::SendEip1193Request { payload: payload.clone() });
        debug!(method = %payload.method, "sending EIP-1193 request");

        match self.wallet.request(&payload).await {
            Ok(result) => {
                self.events.emit(ProviderEvent::ReceiveEip1193Result { result: result.clone() });
                Ok(serde_json::from_value(result)?)
            }
            Err(e) => {
                let error =
                    WalletError { message: e.message, code: e.code, data: e.data, payload };
                debug!(%error, "EIP-1193 request failed");
                self.events.emit(ProviderEvent::ReceiveEip1193Error { error: error.clone() });
                Err(ProviderError::WalletError(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn listeners_observe_every_emit() {
        let events = Events::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        events.subscribe(Box::new(move |_event: &ProviderEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        events.emit(ProviderEvent::Error { message: "one".to_owned() });
        events.emit(ProviderEvent::Error { message: "two".to_owned() });
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn payload_wire_shape() {
        let payload = RequestPayload {
            method: "eth_accounts".to_owned(),
            params: serde_json::json!([]),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({ "method": "eth_accounts", "params": [] }));
    }
}
