use crate::{
    confirmation::ConfirmationChannel,
    eip1193::{Eip1193Client, Eip1193Provider, EventListener, Events, ProviderEvent},
    ens,
    errors::ProviderError,
    signer::JsonRpcSigner,
    utils::{maybe, serialize},
};
use ethers_core::types::{
    Address, Bytes, NameOrAddress, Transaction, TransactionRequest, TxHash, U256, U64,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{fmt::Debug, sync::Arc};
use tracing::debug;

/// A signer selector: either a position in the wallet's account list or a
/// concrete account address. Defaults to index `0` when omitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressOrIndex {
    /// A concrete account address
    Address(Address),
    /// A zero-based position in the wallet's account list
    Index(usize),
}

impl From<Address> for AddressOrIndex {
    fn from(src: Address) -> Self {
        AddressOrIndex::Address(src)
    }
}

impl From<usize> for AddressOrIndex {
    fn from(src: usize) -> Self {
        AddressOrIndex::Index(src)
    }
}

/// A provider for interacting with a browser-injected wallet over its
/// [EIP-1193](https://eips.ethereum.org/EIPS/eip-1193) `request` capability.
///
/// The provider is the factory for [`JsonRpcSigner`]s and supplies the node
/// queries the signer depends on (block number, transaction lookup, gas
/// estimation, wire-transaction encoding). It is cheap to clone; clones share
/// the wallet channel, the event listeners and the confirmation channel.
#[derive(Debug)]
pub struct Provider<W> {
    client: Eip1193Client<W>,
    events: Arc<Events>,
    confirmation: Option<Arc<dyn ConfirmationChannel>>,
    ens: Option<Address>,
}

impl<W> Clone for Provider<W> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            events: Arc::clone(&self.events),
            confirmation: self.confirmation.clone(),
            ens: self.ens,
        }
    }
}

impl<W: Eip1193Provider> Provider<W> {
    /// Instantiate a new provider over an injected wallet.
    pub fn new(wallet: W) -> Self {
        let events = Arc::new(Events::default());
        Self {
            client: Eip1193Client::new(wallet, Arc::clone(&events)),
            events,
            confirmation: None,
            ens: None,
        }
    }

    /// Routes [`JsonRpcSigner::send_transaction`] through the given
    /// host-mediated confirmation channel instead of the wallet popup.
    pub fn with_confirmation_channel<C>(mut self, channel: C) -> Self
    where
        C: ConfirmationChannel + 'static,
    {
        self.confirmation = Some(Arc::new(channel));
        self
    }

    /// Overrides the ENS registry address (default: mainnet).
    pub fn with_ens<T: Into<Address>>(mut self, ens: T) -> Self {
        self.ens = Some(ens.into());
        self
    }

    /// Registers an observer for request/response debug events and non-fatal
    /// retry notifications.
    pub fn on_event<L: EventListener + 'static>(&self, listener: L) {
        self.events.subscribe(Box::new(listener));
    }

    pub(crate) fn emit(&self, event: ProviderEvent) {
        self.events.emit(event);
    }

    pub(crate) fn confirmation_channel(&self) -> Option<&Arc<dyn ConfirmationChannel>> {
        self.confirmation.as_ref()
    }

    /// Sends a raw request with the provided method and params through the
    /// wallet channel.
    pub async fn send<T, R>(&self, method: &str, params: T) -> Result<R, ProviderError>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned,
    {
        self.client.request(method, params).await
    }

    ////// Blockchain status
    //
    // Queries against the node behind the wallet

    /// Gets the latest block number via the `eth_blockNumber` API
    pub async fn get_block_number(&self) -> Result<U64, ProviderError> {
        self.send("eth_blockNumber", ()).await
    }

    /// Returns the currently configured chain id via the `eth_chainId` API
    pub async fn get_chainid(&self) -> Result<U256, ProviderError> {
        self.send("eth_chainId", ()).await
    }

    /// Gets the current gas price as estimated by the node
    pub async fn get_gas_price(&self) -> Result<U256, ProviderError> {
        self.send("eth_gasPrice", ()).await
    }

    /// Returns the accounts the wallet currently exposes, without prompting
    /// the user.
    pub async fn get_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.send("eth_accounts", ()).await
    }

    /// Asks the wallet for account access; typically opens the wallet popup.
    pub async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.send("eth_requestAccounts", ()).await
    }

    /// Gets the transaction with `transaction_hash`, or `None` if the node
    /// does not (yet) know about it.
    pub async fn get_transaction<T: Send + Sync + Into<TxHash>>(
        &self,
        transaction_hash: T,
    ) -> Result<Option<Transaction>, ProviderError> {
        let hash = transaction_hash.into();
        self.send("eth_getTransactionByHash", [serialize(&hash)]).await
    }

    /// Estimates the gas a transaction would consume via `eth_estimateGas`
    pub async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<U256, ProviderError> {
        self.send("eth_estimateGas", [serialize(tx)]).await
    }

    /// Executes a read-only call against the latest block
    pub async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, ProviderError> {
        self.send("eth_call", [serialize(tx), serialize(&"latest")]).await
    }

    /// Encodes a transaction request into the JSON shape expected on the
    /// wire: camel-cased keys, quantities as hex, absent fields omitted.
    pub fn get_rpc_transaction(&self, tx: &TransactionRequest) -> Value {
        serialize(tx)
    }

    ////// Name resolution

    /// Returns the address `ens_name` resolves to.
    pub async fn resolve_name(&self, ens_name: &str) -> Result<Address, ProviderError> {
        let registry = self.ens.unwrap_or(ens::ENS_ADDRESS);

        // first ask the registry which resolver is responsible for the name
        let data = self.call(&ens::get_resolver(registry, ens_name)).await?;
        let resolver = decode_address(&data)
            .ok_or_else(|| ProviderError::EnsError(ens_name.to_owned()))?;
        if resolver == Address::zero() {
            return Err(ProviderError::EnsError(ens_name.to_owned()))
        }

        let data = self.call(&ens::resolve(resolver, ens::ADDR_SELECTOR, ens_name)).await?;
        decode_address(&data).ok_or_else(|| ProviderError::EnsError(ens_name.to_owned()))
    }

    /// Resolves a [`NameOrAddress`] to a concrete address, consulting ENS for
    /// names.
    pub async fn resolve_address(&self, target: NameOrAddress) -> Result<Address, ProviderError> {
        match target {
            NameOrAddress::Address(addr) => Ok(addr),
            NameOrAddress::Name(name) => self.resolve_name(&name).await,
        }
    }

    ////// Transaction population

    /// Fills the provider-fillable fields of a transaction request: resolves
    /// a `to` name, and looks up `gas` and `gas_price` concurrently when they
    /// are absent. `nonce` is left for the wallet, which fills it on send.
    pub async fn fill_transaction(&self, tx: &mut TransactionRequest) -> Result<(), ProviderError> {
        if let Some(NameOrAddress::Name(ens_name)) = &tx.to {
            let addr = self.resolve_name(ens_name).await?;
            tx.to = Some(addr.into());
        }

        let tx_clone = tx.clone();
        let (gas_price, gas) = futures_util::try_join!(
            maybe(tx.gas_price, self.get_gas_price()),
            maybe(tx.gas, self.estimate_gas(&tx_clone)),
        )?;
        tx.gas = Some(gas);
        tx.gas_price = Some(gas_price);

        Ok(())
    }

    ////// Signers

    /// Resolves `address` to an account the wallet exposes and returns a
    /// [`JsonRpcSigner`] bound to it. Passing `None` selects index `0`.
    ///
    /// If the wallet does not currently expose the requested account, account
    /// access is requested first (usually a wallet popup). A numeric selector
    /// beyond the account list fails with
    /// [`ProviderError::AccountOutOfRange`]. A concrete address that is
    /// missing from the list still yields a signer bound to that address:
    /// some wallets can sign for accounts `eth_accounts` does not enumerate,
    /// so the lookup is deliberately permissive rather than an error.
    pub async fn get_signer(
        &self,
        address: Option<AddressOrIndex>,
    ) -> Result<JsonRpcSigner<W>, ProviderError> {
        let address = address.unwrap_or(AddressOrIndex::Index(0));

        let accounts = self.get_accounts().await?;
        let exposed = match &address {
            AddressOrIndex::Index(index) => *index < accounts.len(),
            AddressOrIndex::Address(address) => accounts.contains(address),
        };
        if !exposed {
            debug!(?address, "account not exposed, requesting wallet access");
            self.request_accounts().await?;
        }

        match address {
            AddressOrIndex::Index(index) => {
                let accounts = self.get_accounts().await?;
                match accounts.get(index) {
                    Some(account) => Ok(JsonRpcSigner::new(self.clone(), *account)),
                    None => {
                        Err(ProviderError::AccountOutOfRange { index, count: accounts.len() })
                    }
                }
            }
            AddressOrIndex::Address(address) => {
                // the network query is independent of the account list, so
                // run both at once
                let (accounts, _chain_id) =
                    futures_util::try_join!(self.get_accounts(), self.get_chainid())?;

                for account in accounts {
                    if account == address {
                        return Ok(JsonRpcSigner::new(self.clone(), account))
                    }
                }
                Ok(JsonRpcSigner::new(self.clone(), address))
            }
        }
    }
}

fn decode_address(data: &Bytes) -> Option<Address> {
    // an address is ABI-encoded as the rightmost 20 bytes of a 32 byte word
    if data.len() < 32 {
        return None
    }
    Some(Address::from_slice(&data[12..32]))
}
