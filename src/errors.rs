use crate::eip1193::RequestPayload;
use ethers_core::types::{SignatureError, TxHash};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A JSON-RPC 2.0 error object, as returned inside a response envelope or
/// populated by a [`crate::ConfirmationChannel`].
#[derive(Clone, Debug, Serialize, Deserialize, Error)]
pub struct JsonRpcError {
    /// The error code
    pub code: i64,
    /// The error message
    pub message: String,
    /// Additional data
    pub data: Option<Value>,
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(code: {}, message: {}, data: {:?})", self.code, self.message, self.data)
    }
}

impl JsonRpcError {
    /// Classifies this error by its code; see [`WalletError::kind`] for the
    /// code table.
    pub fn kind(&self) -> ErrorKind {
        classify_code(Some(self.code))
    }
}

/// A failed wallet request, enriched with the exact payload that was
/// attempted so callers never have to reconstruct what went over the wire.
#[derive(Clone, Debug, Error)]
#[error("{message} (code: {code:?}, data: {data:?}, method: {})", .payload.method)]
pub struct WalletError {
    /// The message reported by the wallet
    pub message: String,
    /// The EIP-1193 or JSON-RPC error code, if the wallet provided one
    pub code: Option<i64>,
    /// Additional data attached by the wallet
    pub data: Option<Value>,
    /// The `{method, params}` pair that was being sent when the wallet failed
    pub payload: RequestPayload,
}

impl WalletError {
    /// Classifies this error using the standard EIP-1193 provider error codes
    /// and the JSON-RPC 2.0 protocol codes.
    ///
    /// `4001` is "user rejected request", `4200` is "unsupported method",
    /// `4900`/`4901` are the disconnected states, `-32600`/`-32602` are
    /// invalid request/params and `-32700` is a parse failure. Anything else
    /// (including provider-specific `-32000` range codes) is treated as
    /// unclassified and therefore presumed transient.
    pub fn kind(&self) -> ErrorKind {
        classify_code(self.code)
    }
}

fn classify_code(code: Option<i64>) -> ErrorKind {
    match code {
        Some(4001) => ErrorKind::Cancelled,
        Some(4200) => ErrorKind::UnsupportedOperation,
        Some(4900) | Some(4901) => ErrorKind::NetworkError,
        Some(-32600) | Some(-32602) => ErrorKind::InvalidArgument,
        Some(-32700) => ErrorKind::BadData,
        _ => ErrorKind::Unknown,
    }
}

/// A coarse classification of provider failures, used to decide whether an
/// operation is worth retrying.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The operation was cancelled, either by the user or by a deadline
    Cancelled,
    /// The backend returned data that could not be interpreted
    BadData,
    /// The connection to the wallet or node is unusable
    NetworkError,
    /// The wallet does not support the requested operation
    UnsupportedOperation,
    /// A request argument was rejected by the backend
    InvalidArgument,
    /// Anything else; presumed to be an intermittent service error
    Unknown,
}

/// A transaction lookup that was given up on, carrying the hash of the send
/// it belongs to as diagnostic context.
#[derive(Debug, Error)]
#[error("failed to fetch transaction {send_transaction_hash:?} after sending: {source}")]
pub struct TransactionLookupError {
    /// The hash returned when the transaction was submitted
    pub send_transaction_hash: TxHash,
    /// The lookup failure that ended the poll loop
    #[source]
    pub source: ProviderError,
}

#[derive(Debug, Error)]
/// An error thrown when making a call to the provider
pub enum ProviderError {
    /// A wallet request failed; carries the original request payload
    #[error(transparent)]
    WalletError(#[from] WalletError),

    /// A raw JSON-RPC error, e.g. propagated from a confirmation channel
    #[error(transparent)]
    JsonRpcError(#[from] JsonRpcError),

    /// Polling for a submitted transaction was abandoned
    #[error(transparent)]
    TransactionLookup(#[from] Box<TransactionLookupError>),

    /// Error in underlying lib `serde_json`
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// Error in underlying lib `hex`
    #[error(transparent)]
    HexError(#[from] hex::FromHexError),

    /// A signature returned by the wallet could not be parsed
    #[error(transparent)]
    SignatureError(#[from] SignatureError),

    /// An error during ENS name resolution
    #[error("ens name not found: {0}")]
    EnsError(String),

    /// The operation was cancelled before it could complete
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// The backend returned data that could not be interpreted
    #[error("bad data from backend: {0}")]
    BadData(String),

    /// The connection to the wallet or node is unusable
    #[error("network error: {0}")]
    NetworkError(String),

    /// The operation is not supported by this provider or signer
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// An argument supplied by the caller was rejected
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An account index beyond what the wallet exposes was requested
    #[error("no account at index {index}: the wallet exposes {count} accounts")]
    AccountOutOfRange { index: usize, count: usize },

    /// Custom error from unknown source
    #[error("custom error: {0}")]
    CustomError(String),
}

impl ProviderError {
    /// Classifies this error for retry decisions; see [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::WalletError(e) => e.kind(),
            ProviderError::JsonRpcError(e) => e.kind(),
            ProviderError::TransactionLookup(e) => e.source.kind(),
            ProviderError::SerdeJson(_) |
            ProviderError::HexError(_) |
            ProviderError::SignatureError(_) |
            ProviderError::BadData(_) => ErrorKind::BadData,
            ProviderError::Cancelled(_) => ErrorKind::Cancelled,
            ProviderError::NetworkError(_) => ErrorKind::NetworkError,
            ProviderError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            ProviderError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            _ => ErrorKind::Unknown,
        }
    }

    /// Access the underlying wallet error (if any).
    pub fn as_wallet_error(&self) -> Option<&WalletError> {
        match self {
            ProviderError::WalletError(e) => Some(e),
            ProviderError::TransactionLookup(e) => e.source.as_wallet_error(),
            _ => None,
        }
    }

    /// Access the abandoned transaction lookup (if any), e.g. to recover the
    /// hash of the send it belongs to.
    pub fn as_transaction_lookup(&self) -> Option<&TransactionLookupError> {
        match self {
            ProviderError::TransactionLookup(e) => Some(e),
            _ => None,
        }
    }

    pub(crate) fn transaction_lookup(hash: TxHash, source: ProviderError) -> Self {
        ProviderError::TransactionLookup(Box::new(TransactionLookupError {
            send_transaction_hash: hash,
            source,
        }))
    }
}
