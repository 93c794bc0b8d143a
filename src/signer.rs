use crate::{
    confirmation::JsonRpcRequest,
    eip1193::{Eip1193Provider, ProviderEvent},
    errors::{ErrorKind, ProviderError},
    provider::Provider,
    utils::{maybe, serialize, PinBoxFut},
};
use ethers_core::{
    types::{
        transaction::eip712::{TypedData, Types},
        Address, Bytes, NameOrAddress, Signature, Transaction, TransactionRequest, TxHash, U64,
    },
    utils::to_checksum,
};
use serde_json::Value;
use std::{
    ops::Deref,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::time::{sleep, Instant};
use tracing::warn;

/// Lookup failures classified as invalid arguments are tolerated this many
/// times before the poll loop gives up; some backends briefly reject the hash
/// of a transaction they themselves just returned.
const MAX_INVALID_ARGUMENT_LOOKUPS: u32 = 10;

/// The delay before poll attempt `attempt` (zero-based).
///
/// A submitted transaction usually becomes visible almost immediately, so the
/// schedule probes quickly right after the first wait and then settles into a
/// steady cadence. It is deliberately not exponential.
fn poll_delay(attempt: usize) -> Duration {
    Duration::from_millis(match attempt {
        0 => 1000,
        1 => 100,
        _ => 4000,
    })
}

/// A transaction record returned by [`JsonRpcSigner::send_transaction`],
/// stamped with the block number observed before the confirmation began.
///
/// The stamp gives replacement detection a sound baseline: whatever ends up
/// on chain for this send (including a fee-bumped replacement) cannot have
/// been mined before `start_block`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentTransaction {
    /// The transaction as reported by the node
    pub transaction: Transaction,
    /// The block number captured just before the wallet confirmation started
    pub start_block: U64,
}

impl Deref for SentTransaction {
    type Target = Transaction;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

/// A signer bound to a single wallet account for its whole lifetime.
///
/// Signers are created through [`Provider::get_signer`], which resolves the
/// account against the wallet first. All signing operations go through the
/// wallet, so any of them may pop a confirmation dialog.
#[derive(Debug)]
pub struct JsonRpcSigner<W> {
    provider: Provider<W>,
    address: Address,
    /// Correlation ids for confirmation-channel requests; strictly increasing
    /// and never reused, even across failed sends
    request_id: AtomicU64,
    poll_deadline: Option<Duration>,
}

impl<W: Eip1193Provider> JsonRpcSigner<W> {
    pub(crate) fn new(provider: Provider<W>, address: Address) -> Self {
        Self { provider, address, request_id: AtomicU64::new(1), poll_deadline: None }
    }

    /// The account this signer is bound to.
    pub fn get_address(&self) -> Address {
        self.address
    }

    /// The bound account in EIP-55 checksum notation.
    pub fn checksum_address(&self) -> String {
        to_checksum(&self.address, None)
    }

    /// The provider this signer was created from.
    pub fn provider(&self) -> &Provider<W> {
        &self.provider
    }

    /// Bounds how long [`send_transaction`](Self::send_transaction) keeps
    /// polling for a confirmed transaction. Unset by default: the poller runs
    /// until the node either returns the transaction or fails permanently.
    pub fn set_poll_deadline(&mut self, deadline: Option<Duration>) {
        self.poll_deadline = deadline;
    }

    /// Rebinding a signer to another provider is not supported; signers stay
    /// attached to the provider that created them.
    pub fn connect(&self, _provider: &Provider<W>) -> Result<Self, ProviderError> {
        Err(ProviderError::UnsupportedOperation("signer.connect".to_owned()))
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    ////// Population

    /// Returns a copy of the request with the provider-fillable fields
    /// completed; `from` defaults to the bound account.
    pub async fn populate_transaction(
        &self,
        tx: &TransactionRequest,
    ) -> Result<TransactionRequest, ProviderError> {
        let mut tx = tx.clone();
        if tx.from.is_none() {
            tx.from = Some(self.address);
        }
        self.provider.fill_transaction(&mut tx).await?;
        Ok(tx)
    }

    ////// Sending

    /// Submits the transaction straight to the wallet and returns just the
    /// hash, which is all the bare JSON-RPC API provides.
    pub async fn send_unchecked_transaction(
        &self,
        tx: &TransactionRequest,
    ) -> Result<TxHash, ProviderError> {
        let mut tx = tx.clone();
        self.check_from(&mut tx)?;

        // gas estimation and `to` resolution are independent of each other;
        // run both before encoding
        let tx_clone = tx.clone();
        let (gas, to) = futures_util::try_join!(
            maybe(tx.gas, self.provider.estimate_gas(&tx_clone)),
            self.resolve_to(tx.to.clone()),
        )?;
        tx.gas = Some(gas);
        tx.to = to.map(NameOrAddress::Address);

        let rpc_tx = self.provider.get_rpc_transaction(&tx);
        self.provider.send("eth_sendTransaction", [rpc_tx]).await
    }

    /// Submits the transaction through the provider's confirmation channel
    /// and polls the node until the submitted transaction is visible,
    /// returning it stamped with the pre-submission block number.
    ///
    /// The poll loop distinguishes permanent lookup failures (cancellation,
    /// undecodable data, a broken connection, an unsupported method) from
    /// transient ones; only the former end the loop. Invalid-argument
    /// responses are tolerated a bounded number of times. Without a poll
    /// deadline (the default) the loop runs until it resolves one way or the
    /// other.
    pub async fn send_transaction(
        &self,
        tx: &TransactionRequest,
    ) -> Result<SentTransaction, ProviderError> {
        let channel = self.provider.confirmation_channel().cloned().ok_or_else(|| {
            ProviderError::UnsupportedOperation(
                "send_transaction requires a confirmation channel; \
                 use send_unchecked_transaction to submit directly through the wallet"
                    .to_owned(),
            )
        })?;

        let request = JsonRpcRequest::new(
            self.next_request_id(),
            "eth_sendTransaction",
            Value::Array(vec![self.provider.get_rpc_transaction(tx)]),
        );

        // this cannot be mined any earlier than the block we see now, so read
        // it before the confirmation starts
        let start_block = self.provider.get_block_number().await?;

        let response = channel.confirm_transaction(&request).await;
        let hash: TxHash = serde_json::from_value(response.into_result()?)?;

        self.wait_for_transaction(hash, start_block).await
    }

    /// The JSON-RPC response to a send is only an opaque hash; poll the node
    /// until the actual transaction shows up.
    async fn wait_for_transaction(
        &self,
        hash: TxHash,
        start_block: U64,
    ) -> Result<SentTransaction, ProviderError> {
        let deadline = self.poll_deadline.map(|limit| Instant::now() + limit);
        let mut invalid_lookups = 0u32;
        let mut attempt = 0usize;

        loop {
            match self.provider.get_transaction(hash).await {
                Ok(Some(transaction)) => {
                    return Ok(SentTransaction { transaction, start_block })
                }
                // not visible yet, keep polling
                Ok(None) => {}
                Err(error) => match error.kind() {
                    // cancelled: stop polling
                    // bad data: the node keeps returning garbage
                    // network error: calling again will fail the same way
                    // unsupported: the backend cannot answer this at all
                    ErrorKind::Cancelled |
                    ErrorKind::BadData |
                    ErrorKind::NetworkError |
                    ErrorKind::UnsupportedOperation => {
                        return Err(ProviderError::transaction_lookup(hash, error))
                    }
                    // stop-gap for backends that briefly reject the hash they
                    // just handed out
                    ErrorKind::InvalidArgument => {
                        invalid_lookups += 1;
                        if invalid_lookups > MAX_INVALID_ARGUMENT_LOOKUPS {
                            return Err(ProviderError::transaction_lookup(hash, error))
                        }
                        self.notify_retry(&error);
                    }
                    // likely an intermittent service error; notify anyone
                    // that cares and try again
                    ErrorKind::Unknown => self.notify_retry(&error),
                },
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(ProviderError::transaction_lookup(
                        hash,
                        ProviderError::Cancelled("transaction poll deadline exceeded".to_owned()),
                    ))
                }
            }

            sleep(poll_delay(attempt)).await;
            attempt += 1;
        }
    }

    fn notify_retry(&self, error: &ProviderError) {
        warn!(%error, "failed to fetch transaction after sending, will try again");
        self.provider.emit(ProviderEvent::Error {
            message: format!("failed to fetch transaction after sending (will try again): {error}"),
        });
    }

    ////// Signing

    /// Signs the transaction without sending it, returning the raw signed
    /// transaction bytes.
    pub async fn sign_transaction(&self, tx: &TransactionRequest) -> Result<Bytes, ProviderError> {
        let mut tx = tx.clone();
        self.check_from(&mut tx)?;

        let rpc_tx = self.provider.get_rpc_transaction(&tx);
        self.provider.send("eth_signTransaction", [rpc_tx]).await
    }

    /// Signs a message with the bound account via `personal_sign`. Text is
    /// signed as its UTF-8 bytes.
    pub async fn sign_message<S: AsRef<[u8]> + Send + Sync>(
        &self,
        message: S,
    ) -> Result<Signature, ProviderError> {
        let message = Bytes::from(message.as_ref().to_vec());
        let signature: String = self
            .provider
            .send("personal_sign", [serialize(&message), serialize(&self.address)])
            .await?;
        parse_signature(&signature)
    }

    /// Signs an [EIP-712](https://eips.ethereum.org/EIPS/eip-712) typed-data
    /// payload via `eth_signTypedData_v4`.
    ///
    /// ENS names embedded in `address`-typed fields are resolved first; a
    /// name that does not resolve is an argument error, since the wallet
    /// would otherwise sign over the unresolved string.
    pub async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Signature, ProviderError> {
        let mut payload = typed_data.clone();
        let types = payload.types.clone();

        let fields = types.get(&payload.primary_type).cloned().unwrap_or_default();
        for field in &fields {
            if let Some(value) = payload.message.get_mut(&field.name) {
                self.resolve_typed_value(&types, &field.r#type, value).await?;
            }
        }

        let json = serde_json::to_string(&payload)?;
        let signature: String = self
            .provider
            .send("eth_signTypedData_v4", [serialize(&self.address), Value::String(json)])
            .await?;
        parse_signature(&signature)
    }

    /// Walks a typed-data value, replacing ENS names in `address`-typed
    /// positions (including arrays and nested structs) with resolved
    /// addresses.
    fn resolve_typed_value<'a>(
        &'a self,
        types: &'a Types,
        type_name: &'a str,
        value: &'a mut Value,
    ) -> PinBoxFut<'a, ()> {
        Box::pin(async move {
            if let Some(open) = type_name.find('[') {
                let element = &type_name[..open];
                if let Value::Array(items) = value {
                    for item in items {
                        self.resolve_typed_value(types, element, item).await?;
                    }
                }
                return Ok(())
            }

            if type_name == "address" {
                if let Value::String(text) = value {
                    if text.parse::<Address>().is_err() {
                        let resolved =
                            self.provider.resolve_name(text).await.map_err(|_| {
                                ProviderError::InvalidArgument(format!(
                                    "typed data value {text:?} does not resolve to an address"
                                ))
                            })?;
                        if resolved == Address::zero() {
                            return Err(ProviderError::InvalidArgument(
                                "typed data does not support the null address".to_owned(),
                            ))
                        }
                        *value = serialize(&resolved);
                    }
                }
                return Ok(())
            }

            if let Some(fields) = types.get(type_name) {
                if let Value::Object(object) = value {
                    for field in fields {
                        if let Some(nested) = object.get_mut(&field.name) {
                            self.resolve_typed_value(types, &field.r#type, nested).await?;
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// Unlocks the bound account on the node via `personal_unlockAccount`.
    pub async fn unlock(&self, password: &str) -> Result<bool, ProviderError> {
        self.provider
            .send(
                "personal_unlockAccount",
                [serialize(&self.address), serialize(&password), Value::Null],
            )
            .await
    }

    /// Signs a message with the legacy `eth_sign` API. Prefer
    /// [`sign_message`](Self::sign_message).
    pub async fn legacy_sign_message<S: AsRef<[u8]> + Send + Sync>(
        &self,
        message: S,
    ) -> Result<Signature, ProviderError> {
        let message = Bytes::from(message.as_ref().to_vec());
        let signature: String = self
            .provider
            .send("eth_sign", [serialize(&self.address), serialize(&message)])
            .await?;
        parse_signature(&signature)
    }

    ////// Internal helpers

    /// Verifies that a supplied `from` matches the bound account, defaulting
    /// it when absent. A mismatch fails before anything is sent.
    fn check_from(&self, tx: &mut TransactionRequest) -> Result<(), ProviderError> {
        match tx.from {
            Some(from) if from != self.address => Err(ProviderError::InvalidArgument(format!(
                "from address mismatch: transaction specifies {from:?} but the signer is bound to {:?}",
                self.address
            ))),
            Some(_) => Ok(()),
            None => {
                tx.from = Some(self.address);
                Ok(())
            }
        }
    }

    async fn resolve_to(
        &self,
        to: Option<NameOrAddress>,
    ) -> Result<Option<Address>, ProviderError> {
        match to {
            Some(target) => Ok(Some(self.provider.resolve_address(target).await?)),
            None => Ok(None),
        }
    }
}

fn parse_signature(raw: &str) -> Result<Signature, ProviderError> {
    Ok(Signature::from_str(raw.trim_start_matches("0x"))?)
}
