#![deny(rustdoc::broken_intra_doc_links)]
#![doc = include_str!("../README.md")]

mod eip1193;
pub use eip1193::{
    Eip1193Client, Eip1193Error, Eip1193Provider, EventListener, ProviderEvent, RequestPayload,
};

mod confirmation;
pub use confirmation::{ConfirmationChannel, ConfirmationResponse, JsonRpcRequest};

mod errors;
pub use errors::{ErrorKind, JsonRpcError, ProviderError, TransactionLookupError, WalletError};

mod provider;
pub use provider::{AddressOrIndex, Provider};

mod signer;
pub use signer::{JsonRpcSigner, SentTransaction};

pub mod ens;

mod utils;

/// Re-exported for convenience when displaying addresses.
pub use ethers_core::utils::to_checksum;
