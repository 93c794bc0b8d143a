//! [Ethereum Name Service](https://docs.ens.domains/) forward-resolution support.
//!
//! Only the two `eth_call` payloads the provider needs are built here: one to
//! look up the resolver responsible for a name, and one to ask that resolver
//! for the name's address.

use ethers_core::{
    types::{Address, NameOrAddress, Selector, TransactionRequest, H160, H256},
    utils::keccak256,
};

/// ENS registry address (`0x00000000000C2E074eC69A0dFb2997BA6C7d2e1e`)
pub const ENS_ADDRESS: Address = H160([
    // cannot set type aliases as constructors
    0, 0, 0, 0, 0, 12, 46, 7, 78, 198, 154, 13, 251, 41, 151, 186, 108, 125, 46, 30,
]);

/// resolver(bytes32)
const RESOLVER_SELECTOR: Selector = [1, 120, 184, 191];

/// addr(bytes32)
pub(crate) const ADDR_SELECTOR: Selector = [59, 59, 87, 222];

/// Returns a call request for the `resolver` method on the ENS registry
pub(crate) fn get_resolver(ens_address: Address, name: &str) -> TransactionRequest {
    let data = [&RESOLVER_SELECTOR[..], &namehash(name).0].concat();
    TransactionRequest {
        data: Some(data.into()),
        to: Some(NameOrAddress::Address(ens_address)),
        ..Default::default()
    }
}

/// Returns a call request for `selector` on the resolver responsible for `name`
pub(crate) fn resolve(resolver_address: Address, selector: Selector, name: &str) -> TransactionRequest {
    let data = [&selector[..], &namehash(name).0].concat();
    TransactionRequest {
        data: Some(data.into()),
        to: Some(NameOrAddress::Address(resolver_address)),
        ..Default::default()
    }
}

/// Returns the ENS namehash as specified in [EIP-137](https://eips.ethereum.org/EIPS/eip-137)
pub fn namehash(name: &str) -> H256 {
    if name.is_empty() {
        return H256::zero()
    }

    // iterate in reverse
    name.rsplit('.')
        .fold([0u8; 32], |node, label| keccak256([node, keccak256(label.as_bytes())].concat()))
        .into()
}
