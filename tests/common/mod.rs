#![allow(dead_code)]

use async_trait::async_trait;
use eip1193_providers::{
    ConfirmationChannel, ConfirmationResponse, Eip1193Error, Eip1193Provider, JsonRpcRequest,
    RequestPayload,
};
use ethers_core::types::{Address, TxHash};
use serde_json::{json, Value};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

/// The hash every mocked send resolves to unless a test scripts otherwise.
pub const TX_HASH: &str = "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b";

pub fn tx_hash() -> TxHash {
    TX_HASH.parse().unwrap()
}

pub fn account(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

/// A 65-byte r||s||v signature in hex, v = 27.
pub fn signature_hex() -> String {
    format!("0x{}{}1b", "11".repeat(32), "22".repeat(32))
}

/// A minimal but complete `eth_getTransactionByHash` result.
pub fn tx_json(hash: TxHash, block_number: u64) -> Value {
    json!({
        "hash": hash,
        "nonce": "0x0",
        "blockHash": null,
        "blockNumber": format!("{block_number:#x}"),
        "transactionIndex": "0x0",
        "from": account(1),
        "to": null,
        "value": "0x0",
        "gasPrice": "0x1",
        "gas": "0x5208",
        "input": "0x",
        "v": "0x1b",
        "r": "0x1",
        "s": "0x1",
    })
}

/// A scriptable in-memory wallet.
///
/// Every request is logged. Responses come from per-method override queues
/// when a test has pushed any, and fall back to sensible defaults otherwise.
#[derive(Debug)]
pub struct MockWallet {
    accounts: Vec<Address>,
    overrides: Mutex<HashMap<String, VecDeque<Result<Value, Eip1193Error>>>>,
    requests: Mutex<Vec<RequestPayload>>,
}

impl MockWallet {
    pub fn new(accounts: Vec<Address>) -> Self {
        Self { accounts, overrides: Mutex::new(HashMap::new()), requests: Mutex::new(Vec::new()) }
    }

    pub fn push_ok(&self, method: &str, value: Value) {
        self.overrides
            .lock()
            .unwrap()
            .entry(method.to_owned())
            .or_default()
            .push_back(Ok(value));
    }

    pub fn push_err(&self, method: &str, code: i64, message: &str) {
        self.overrides.lock().unwrap().entry(method.to_owned()).or_default().push_back(Err(
            Eip1193Error { message: message.to_owned(), code: Some(code), data: None },
        ));
    }

    /// How many times `method` has been requested.
    pub fn calls(&self, method: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| r.method == method).count()
    }

    /// The params of every request for `method`, in order.
    pub fn all_params(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method)
            .map(|r| r.params.clone())
            .collect()
    }

    /// The params of the most recent request for `method`.
    pub fn last_params(&self, method: &str) -> Option<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.method == method)
            .map(|r| r.params.clone())
    }

    fn default_response(&self, method: &str) -> Result<Value, Eip1193Error> {
        Ok(match method {
            "eth_accounts" | "eth_requestAccounts" => json!(self.accounts),
            "eth_chainId" => json!("0x539"),
            "eth_blockNumber" => json!("0xc8"),
            "eth_gasPrice" => json!("0x3b9aca00"),
            "eth_estimateGas" => json!("0x5208"),
            "eth_getTransactionByHash" => Value::Null,
            "eth_sendTransaction" => json!(TX_HASH),
            "eth_signTransaction" => json!("0x02deadbeef"),
            "personal_sign" | "eth_sign" | "eth_signTypedData_v4" => json!(signature_hex()),
            "personal_unlockAccount" => json!(true),
            other => {
                return Err(Eip1193Error {
                    message: format!("the method {other} does not exist"),
                    code: Some(4200),
                    data: None,
                })
            }
        })
    }
}

#[async_trait]
impl Eip1193Provider for MockWallet {
    async fn request(&self, payload: &RequestPayload) -> Result<Value, Eip1193Error> {
        self.requests.lock().unwrap().push(payload.clone());
        if let Some(queue) = self.overrides.lock().unwrap().get_mut(&payload.method) {
            if let Some(scripted) = queue.pop_front() {
                return scripted
            }
        }
        self.default_response(&payload.method)
    }
}

/// A scriptable confirmation channel. Responses pop from a queue; when the
/// queue is empty the channel approves with [`TX_HASH`].
#[derive(Debug, Default)]
pub struct MockChannel {
    responses: Mutex<VecDeque<ConfirmationResponse>>,
    requests: Mutex<Vec<JsonRpcRequest>>,
    watched: Option<Arc<MockWallet>>,
    block_calls_at_confirm: Mutex<Vec<usize>>,
}

impl MockChannel {
    /// A channel that snapshots how many `eth_blockNumber` requests the
    /// wallet had seen at the moment each confirmation arrived.
    pub fn watching(wallet: Arc<MockWallet>) -> Self {
        Self { watched: Some(wallet), ..Self::default() }
    }

    pub fn push(&self, response: ConfirmationResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<JsonRpcRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn block_calls_at_confirm(&self) -> Vec<usize> {
        self.block_calls_at_confirm.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfirmationChannel for MockChannel {
    async fn confirm_transaction(&self, request: &JsonRpcRequest) -> ConfirmationResponse {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(wallet) = &self.watched {
            self.block_calls_at_confirm.lock().unwrap().push(wallet.calls("eth_blockNumber"));
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ConfirmationResponse::from_result(json!(TX_HASH)))
    }
}
