//! # JSON-RPC Protocol & Client
//!
//! The ledger server speaks JSON-RPC 2.0 over `POST /rpc`. Method names are
//! prefixed with `kin_`; parameters are passed by name.
//!
//! ## Method Index
//!
//! | Method                  | Params                       | Result                |
//! |-------------------------|------------------------------|-----------------------|
//! | `kin_getAccount`        | `{ address }`                | [`AccountInfo`]       |
//! | `kin_fund`              | `{ address }`                | `{ created: bool }`   |
//! | `kin_submitTransaction` | `{ envelope }`               | `{ id }`              |
//! | `kin_requestTestKin`    | `{ address, kin }`           | `{ id }`              |
//! | `kin_networkPassphrase` | none                         | `string`              |
//!
//! Ledger rejections come back with code [`LEDGER_REJECTION`] and the
//! serialized [`GatewayError`] as `data`, so [`RpcGateway`] can rebuild the
//! exact error a [`LocalLedger`](super::LocalLedger) raised.

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::envelope::{Operation, SignedEnvelope, TransactionBody};
use super::local::LedgerAccount;
use super::{GatewayError, LedgerGateway, PaymentRequest, TransactionId};
use crate::address::{Asset, LedgerAddress};
use crate::config::RPC_PATH;
use crate::crypto::KinKeypair;
use crate::network::NetworkId;

/// Application error code for ledger rejections.
pub const LEDGER_REJECTION: i32 = -32010;

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

/// Supported JSON-RPC methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    GetAccount,
    Fund,
    SubmitTransaction,
    RequestTestKin,
    NetworkPassphrase,
}

impl RpcMethod {
    pub const ALL: [RpcMethod; 5] = [
        RpcMethod::GetAccount,
        RpcMethod::Fund,
        RpcMethod::SubmitTransaction,
        RpcMethod::RequestTestKin,
        RpcMethod::NetworkPassphrase,
    ];

    /// Wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcMethod::GetAccount => "kin_getAccount",
            RpcMethod::Fund => "kin_fund",
            RpcMethod::SubmitTransaction => "kin_submitTransaction",
            RpcMethod::RequestTestKin => "kin_requestTestKin",
            RpcMethod::NetworkPassphrase => "kin_networkPassphrase",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: RpcMethod, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: json!(id),
            method: method.as_str().to_string(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC 2.0 error object.
///
/// - `-32700`: Parse error
/// - `-32600`: Invalid request
/// - `-32601`: Method not found
/// - `-32602`: Invalid params
/// - `-32603`: Internal error
/// - `-32010`: Ledger rejection, `data` holds a [`GatewayError`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(-32600, msg)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, format!("method not found: {}", method))
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(-32602, msg)
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(-32603, msg)
    }

    /// Wraps a ledger-side error so the client can rebuild it.
    pub fn ledger_rejection(err: &GatewayError) -> Self {
        Self {
            code: LEDGER_REJECTION,
            message: err.to_string(),
            data: serde_json::to_value(err).ok(),
        }
    }

    /// Converts back into a [`GatewayError`] on the client side.
    pub fn into_gateway_error(self) -> GatewayError {
        if self.code == LEDGER_REJECTION {
            if let Some(err) = self
                .data
                .and_then(|d| serde_json::from_value::<GatewayError>(d).ok())
            {
                return err;
            }
        }
        GatewayError::Rpc {
            code: self.code,
            message: self.message,
        }
    }
}

// ---------------------------------------------------------------------------
// Params & results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressParams {
    pub address: LedgerAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitParams {
    pub envelope: SignedEnvelope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestKinParams {
    pub address: LedgerAddress,
    pub kin: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundResult {
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResult {
    pub id: TransactionId,
}

/// Balance of one asset held by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: Asset,
    pub quarks: u64,
}

/// Public view of a ledger account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub address: LedgerAddress,
    pub sequence: u64,
    pub native_balance: u64,
    pub balances: Vec<AssetBalance>,
}

impl AccountInfo {
    pub(crate) fn from_ledger(address: LedgerAddress, account: &LedgerAccount) -> Self {
        let mut balances: Vec<AssetBalance> = account
            .trustlines
            .iter()
            .map(|(asset, quarks)| AssetBalance {
                asset: asset.clone(),
                quarks: *quarks,
            })
            .collect();
        balances.sort_by_key(|b| b.asset.to_string());

        Self {
            address,
            sequence: account.sequence,
            native_balance: account.native,
            balances,
        }
    }

    /// Quarks of `asset` held, or `None` without a trustline.
    pub fn balance_of(&self, asset: &Asset) -> Option<u64> {
        self.balances
            .iter()
            .find(|b| &b.asset == asset)
            .map(|b| b.quarks)
    }
}

// ---------------------------------------------------------------------------
// RpcGateway
// ---------------------------------------------------------------------------

/// [`LedgerGateway`] over JSON-RPC.
#[derive(Debug)]
pub struct RpcGateway {
    http: reqwest::Client,
    endpoint: Url,
    network: NetworkId,
    next_id: AtomicU64,
}

impl RpcGateway {
    /// Binds a gateway to the server at `base` (the `/rpc` path is appended
    /// unless already present).
    pub fn new(base: &Url, network: NetworkId) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: rpc_endpoint(base),
            network,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn network_id(&self) -> &NetworkId {
        &self.network
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: RpcMethod,
        params: Value,
    ) -> Result<T, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);
        debug!(method = method.as_str(), id, "rpc call");

        let response: RpcResponse = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(error.into_gateway_error());
        }
        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| GatewayError::Codec(e.to_string()))
    }

    fn params<P: Serialize>(params: &P) -> Result<Value, GatewayError> {
        serde_json::to_value(params).map_err(|e| GatewayError::Codec(e.to_string()))
    }

    pub async fn account(&self, address: &LedgerAddress) -> Result<AccountInfo, GatewayError> {
        let params = Self::params(&AddressParams {
            address: address.clone(),
        })?;
        self.call(RpcMethod::GetAccount, params).await
    }

    /// Asks the friendbot to create `address`. `false` if it already existed.
    pub async fn fund(&self, address: &LedgerAddress) -> Result<bool, GatewayError> {
        let params = Self::params(&AddressParams {
            address: address.clone(),
        })?;
        let result: FundResult = self.call(RpcMethod::Fund, params).await?;
        Ok(result.created)
    }

    pub async fn submit(&self, envelope: SignedEnvelope) -> Result<TransactionId, GatewayError> {
        let params = Self::params(&SubmitParams { envelope })?;
        let result: TransactionResult = self.call(RpcMethod::SubmitTransaction, params).await?;
        Ok(result.id)
    }

    /// Test faucet. Refused by the server on the main network.
    pub async fn request_test_kin(
        &self,
        address: &LedgerAddress,
        kin: u64,
    ) -> Result<TransactionId, GatewayError> {
        let params = Self::params(&TestKinParams {
            address: address.clone(),
            kin,
        })?;
        let result: TransactionResult = self.call(RpcMethod::RequestTestKin, params).await?;
        Ok(result.id)
    }

    pub async fn network_passphrase(&self) -> Result<String, GatewayError> {
        self.call(RpcMethod::NetworkPassphrase, Value::Null).await
    }

    /// Fails if the server is bound to a different network.
    pub async fn check_network(&self) -> Result<(), GatewayError> {
        let actual = self.network_passphrase().await?;
        let expected = self.network.network_passphrase();
        if actual != expected {
            warn!(%expected, %actual, "endpoint serves a different network");
            return Err(GatewayError::NetworkMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    async fn sign_and_submit(
        &self,
        signer: &KinKeypair,
        operations: Vec<Operation>,
        memo: Option<String>,
    ) -> Result<TransactionId, GatewayError> {
        let address = signer.address();
        let account = self.account(&address).await?;
        let envelope = TransactionBody::new(address, account.sequence + 1, operations, memo)
            .sign(signer, &self.network)?;
        self.submit(envelope).await
    }
}

#[async_trait]
impl LedgerGateway for RpcGateway {
    async fn balance(&self, address: &LedgerAddress, asset: &Asset) -> Result<u64, GatewayError> {
        self.account(address)
            .await?
            .balance_of(asset)
            .ok_or_else(|| GatewayError::MissingTrustline(asset.clone()))
    }

    async fn fund_and_activate(
        &self,
        signer: &KinKeypair,
        asset: &Asset,
    ) -> Result<TransactionId, GatewayError> {
        let address = signer.address();
        match self.account(&address).await {
            Ok(_) => {}
            Err(GatewayError::AccountNotFound(_)) => {
                self.fund(&address).await?;
            }
            Err(e) => return Err(e),
        }
        self.sign_and_submit(
            signer,
            vec![Operation::ChangeTrust {
                asset: asset.clone(),
            }],
            None,
        )
        .await
    }

    async fn submit_payment(
        &self,
        signer: &KinKeypair,
        request: PaymentRequest,
    ) -> Result<TransactionId, GatewayError> {
        self.sign_and_submit(
            signer,
            vec![Operation::Payment {
                destination: request.destination,
                asset: request.asset,
                quarks: request.quarks,
            }],
            request.memo,
        )
        .await
    }
}

/// Appends the JSON-RPC path to a server base URL.
pub fn rpc_endpoint(base: &Url) -> Url {
    let mut url = base.clone();
    let path = base.path().trim_end_matches('/');
    if !path.ends_with(RPC_PATH) {
        url.set_path(&format!("{}{}", path, RPC_PATH));
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{PaymentError, TransactionError};

    #[test]
    fn method_names_roundtrip() {
        for m in RpcMethod::ALL {
            assert_eq!(RpcMethod::parse(m.as_str()), Some(m));
        }
        assert_eq!(RpcMethod::parse("kin_mine"), None);
    }

    #[test]
    fn endpoint_path_is_appended_once() {
        let base: Url = "http://127.0.0.1:8000".parse().unwrap();
        assert_eq!(rpc_endpoint(&base).as_str(), "http://127.0.0.1:8000/rpc");

        let with_slash: Url = "http://host/ledger/".parse().unwrap();
        assert_eq!(rpc_endpoint(&with_slash).as_str(), "http://host/ledger/rpc");

        let already: Url = "http://host/rpc".parse().unwrap();
        assert_eq!(rpc_endpoint(&already).as_str(), "http://host/rpc");
    }

    #[test]
    fn ledger_rejection_survives_the_wire() {
        let original = GatewayError::Payment(PaymentError::Underfunded);
        let wire = serde_json::to_string(&RpcError::ledger_rejection(&original)).unwrap();
        let back: RpcError = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.into_gateway_error(), original);

        let original = GatewayError::Transaction(TransactionError::BadAuth);
        let back = RpcError::ledger_rejection(&original).into_gateway_error();
        assert_eq!(back, original);
    }

    #[test]
    fn other_errors_become_rpc_errors() {
        let err = RpcError::method_not_found("kin_nope").into_gateway_error();
        assert!(matches!(err, GatewayError::Rpc { code: -32601, .. }));
    }

    #[test]
    fn request_shape() {
        let req = RpcRequest::new(7, RpcMethod::NetworkPassphrase, Value::Null);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert_eq!(json["method"], "kin_networkPassphrase");
    }

    #[test]
    fn balance_lookup_by_asset() {
        let asset = NetworkId::TestNet.asset();
        let info = AccountInfo {
            address: KinKeypair::generate().address(),
            sequence: 3,
            native_balance: 10,
            balances: vec![AssetBalance {
                asset: asset.clone(),
                quarks: 42,
            }],
        };
        assert_eq!(info.balance_of(&asset), Some(42));
        assert_eq!(info.balance_of(&NetworkId::MainNet.asset()), None);
    }
}
