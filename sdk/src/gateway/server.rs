//! JSON-RPC server for a [`LocalLedger`].
//!
//! | Method | Path      | Description           |
//! |--------|-----------|-----------------------|
//! | GET    | `/health` | Liveness check        |
//! | POST   | `/rpc`    | JSON-RPC 2.0 gateway  |

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;

use super::local::LocalLedger;
use super::rpc::{
    AddressParams, FundResult, RpcError, RpcMethod, RpcRequest, RpcResponse, SubmitParams,
    TestKinParams, TransactionResult,
};
use crate::config::RPC_PATH;

/// Builds the axum [`Router`] serving `ledger`.
pub fn rpc_router(ledger: Arc<LocalLedger>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(RPC_PATH, post(rpc_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(ledger)
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `POST /rpc`: dispatches one request. Transport status is always 200;
/// failures travel in the JSON-RPC error object.
async fn rpc_handler(
    State(ledger): State<Arc<LocalLedger>>,
    Json(req): Json<RpcRequest>,
) -> Json<RpcResponse> {
    if req.jsonrpc != "2.0" {
        return Json(RpcResponse::error(
            req.id,
            RpcError::invalid_request("jsonrpc must be \"2.0\""),
        ));
    }

    let Some(method) = RpcMethod::parse(&req.method) else {
        return Json(RpcResponse::error(
            req.id,
            RpcError::method_not_found(&req.method),
        ));
    };
    debug!(method = method.as_str(), "rpc request");

    let outcome = dispatch(&ledger, method, req.params);
    Json(match outcome {
        Ok(result) => RpcResponse::success(req.id, result),
        Err(error) => RpcResponse::error(req.id, error),
    })
}

fn dispatch(ledger: &LocalLedger, method: RpcMethod, params: Value) -> Result<Value, RpcError> {
    match method {
        RpcMethod::GetAccount => {
            let p: AddressParams = parse_params(params)?;
            let info = ledger
                .account_info(&p.address)
                .map_err(|e| RpcError::ledger_rejection(&e))?;
            to_result(&info)
        }
        RpcMethod::Fund => {
            let p: AddressParams = parse_params(params)?;
            to_result(&FundResult {
                created: ledger.fund(&p.address),
            })
        }
        RpcMethod::SubmitTransaction => {
            let p: SubmitParams = parse_params(params)?;
            let id = ledger
                .submit(&p.envelope)
                .map_err(|e| RpcError::ledger_rejection(&e))?;
            to_result(&TransactionResult { id })
        }
        RpcMethod::RequestTestKin => {
            let p: TestKinParams = parse_params(params)?;
            let id = ledger
                .request_test_kin(&p.address, p.kin)
                .map_err(|e| RpcError::ledger_rejection(&e))?;
            to_result(&TransactionResult { id })
        }
        RpcMethod::NetworkPassphrase => {
            Ok(Value::String(ledger.network_id().network_passphrase().to_string()))
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(e.to_string()))
}
