//! # REST + JSON-RPC + WebSocket API
//!
//! Builds the axum router that exposes the hosted ledgers. All endpoints
//! share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                                          | Description                    |
//! |--------|-----------------------------------------------|--------------------------------|
//! | GET    | `/health`                                     | Liveness probe                 |
//! | GET    | `/status`                                     | Node status summary            |
//! | POST   | `/rpc`                                        | JSON-RPC 2.0 gateway           |
//! | GET    | `/ws`                                         | WebSocket stream of events     |
//! | GET    | `/ledgers`                                    | All hosted ledgers             |
//! | GET    | `/ledgers/:address`                           | Metadata, supply and owner     |
//! | GET    | `/ledgers/:address/balances/:account`         | `balanceOf`                    |
//! | GET    | `/ledgers/:address/allowances/:owner/:spender`| `allowance`                    |
//! | GET    | `/ledgers/:address/events`                    | Journaled events (`from`, `limit`) |
//!
//! ## Callers
//!
//! Mutating RPC methods carry the acting account in a `caller` parameter.
//! The node does not authenticate it; deployments that expose the RPC port
//! beyond trusted clients must put an authenticating proxy in front.
//!
//! ## Ordering and durability
//!
//! A mutating call holds the host's write lock while it applies the
//! operation and commits the outcome to the store. If the commit fails the
//! touched ledgers are restored, so memory never runs ahead of disk.
//! Events are broadcast only after a successful commit.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ce_contracts::{EventRecord, HostError, HostResult, Ledger, LedgerConfig, LedgerError, LedgerHost};
use ce_protocol::{Address, Amount};

use crate::metrics::SharedMetrics;
use crate::store::LedgerStore;

/// Default page size of event queries.
const DEFAULT_EVENT_LIMIT: usize = 100;
/// Largest page of events a single query may return.
const MAX_EVENT_LIMIT: usize = 1_000;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Every hosted ledger.
    pub host: Arc<RwLock<LedgerHost>>,
    /// Durable copy of the host and the event journal.
    pub store: Arc<LedgerStore>,
    /// Broadcast channel feeding WebSocket subscribers.
    pub event_tx: broadcast::Sender<EventRecord>,
    /// Prometheus metrics.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .route("/ledgers", get(ledgers_handler))
        .route("/ledgers/:address", get(ledger_handler))
        .route("/ledgers/:address/balances/:account", get(balance_handler))
        .route(
            "/ledgers/:address/allowances/:owner/:spender",
            get(allowance_handler),
        )
        .route("/ledgers/:address/events", get(events_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Named parameters, or a one-element array holding them.
    pub params: Option<serde_json::Value>,
    /// Request identifier. Echoed back in the response.
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request identifier, echoed from the request.
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short human-readable error description.
    pub message: String,
    /// Structured error data. Ledger rejections carry `{"name": ...}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// -- Error codes ------------------------------------------------------------

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const UNKNOWN_LEDGER: i32 = -32001;
pub const INSUFFICIENT_BALANCE: i32 = -32010;
pub const INSUFFICIENT_ALLOWANCE: i32 = -32011;
pub const UNAUTHORIZED: i32 = -32012;
pub const INVALID_RECIPIENT: i32 = -32013;
pub const INVALID_SENDER: i32 = -32014;
pub const INVALID_APPROVER: i32 = -32015;
pub const INVALID_SPENDER: i32 = -32016;
pub const INVALID_OWNER: i32 = -32017;
pub const SUPPLY_OVERFLOW: i32 = -32018;
pub const INVALID_CONFIG: i32 = -32019;
pub const SELF_RECOVERY: i32 = -32020;
pub const ALREADY_DEPLOYED: i32 = -32021;

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    fn invalid_params(message: impl std::fmt::Display) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {}", message))
    }

    fn internal(message: impl std::fmt::Display) -> Self {
        Self::new(INTERNAL_ERROR, format!("Internal error: {}", message))
    }

    /// Rejections of well-formed requests by the host or a ledger.
    fn is_rejection(&self) -> bool {
        self.code == UNKNOWN_LEDGER || (ALREADY_DEPLOYED..=INSUFFICIENT_BALANCE).contains(&self.code)
    }
}

impl From<&LedgerError> for JsonRpcError {
    fn from(e: &LedgerError) -> Self {
        let (code, name) = match e {
            LedgerError::InsufficientBalance { .. } => (INSUFFICIENT_BALANCE, "InsufficientBalance"),
            LedgerError::InsufficientAllowance { .. } => {
                (INSUFFICIENT_ALLOWANCE, "InsufficientAllowance")
            }
            LedgerError::Unauthorized { .. } => (UNAUTHORIZED, "Unauthorized"),
            LedgerError::InvalidRecipient(_) => (INVALID_RECIPIENT, "InvalidRecipient"),
            LedgerError::InvalidSender(_) => (INVALID_SENDER, "InvalidSender"),
            LedgerError::InvalidApprover(_) => (INVALID_APPROVER, "InvalidApprover"),
            LedgerError::InvalidSpender(_) => (INVALID_SPENDER, "InvalidSpender"),
            LedgerError::InvalidOwner(_) => (INVALID_OWNER, "InvalidOwner"),
            LedgerError::SupplyOverflow { .. } => (SUPPLY_OVERFLOW, "SupplyOverflow"),
            LedgerError::InvalidConfig(_) => (INVALID_CONFIG, "InvalidConfig"),
        };
        Self {
            code,
            message: e.to_string(),
            data: Some(serde_json::json!({ "name": name })),
        }
    }
}

impl From<HostError> for JsonRpcError {
    fn from(e: HostError) -> Self {
        match &e {
            HostError::UnknownLedger(_) => Self::new(UNKNOWN_LEDGER, e.to_string()),
            HostError::SelfRecovery(_) => Self::new(SELF_RECOVERY, e.to_string()),
            HostError::AlreadyDeployed(_) => Self::new(ALREADY_DEPLOYED, e.to_string()),
            HostError::Ledger(inner) => Self::from(inner),
        }
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LedgerParams {
    ledger: Address,
}

#[derive(Debug, Deserialize)]
struct BalanceParams {
    ledger: Address,
    account: Address,
}

#[derive(Debug, Deserialize)]
struct AllowanceParams {
    ledger: Address,
    owner: Address,
    spender: Address,
}

#[derive(Debug, Deserialize)]
struct EventsParams {
    ledger: Address,
    #[serde(default)]
    from: u64,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployParams {
    deployer: Address,
    holder: Option<Address>,
    owner: Option<Address>,
    #[serde(default)]
    config: LedgerConfig,
}

#[derive(Debug, Deserialize)]
struct TransferParams {
    ledger: Address,
    caller: Address,
    to: Address,
    #[serde(with = "ce_protocol::amount::decimal")]
    amount: Amount,
}

#[derive(Debug, Deserialize)]
struct ApproveParams {
    ledger: Address,
    caller: Address,
    spender: Address,
    #[serde(with = "ce_protocol::amount::decimal")]
    amount: Amount,
}

#[derive(Debug, Deserialize)]
struct TransferFromParams {
    ledger: Address,
    caller: Address,
    from: Address,
    to: Address,
    #[serde(with = "ce_protocol::amount::decimal")]
    amount: Amount,
}

#[derive(Debug, Deserialize)]
struct BurnParams {
    ledger: Address,
    caller: Address,
    #[serde(with = "ce_protocol::amount::decimal")]
    amount: Amount,
}

#[derive(Debug, Deserialize)]
struct BurnFromParams {
    ledger: Address,
    caller: Address,
    from: Address,
    #[serde(with = "ce_protocol::amount::decimal")]
    amount: Amount,
}

#[derive(Debug, Deserialize)]
struct CallerParams {
    ledger: Address,
    caller: Address,
}

#[derive(Debug, Deserialize)]
struct ForeignParams {
    ledger: Address,
    caller: Address,
    foreign: Address,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnershipParams {
    ledger: Address,
    caller: Address,
    new_owner: Address,
}

/// Decodes named parameters. A one-element positional array holding the
/// object is accepted too.
fn parse_params<T: DeserializeOwned>(params: Option<serde_json::Value>) -> Result<T, JsonRpcError> {
    let value = match params {
        Some(serde_json::Value::Array(mut items)) if items.len() == 1 => items.remove(0),
        Some(v) => v,
        None => return Err(JsonRpcError::invalid_params("missing params")),
    };
    serde_json::from_value(value).map_err(JsonRpcError::invalid_params)
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, JsonRpcError> {
    serde_json::to_value(value).map_err(JsonRpcError::internal)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Number of hosted ledgers.
    pub ledgers: usize,
    /// Number of events in the journal.
    pub journal_height: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Summary of one ledger.
#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerInfo {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(with = "ce_protocol::amount::decimal")]
    pub total_supply: Amount,
    /// `None` once ownership has been renounced.
    pub owner: Option<Address>,
    /// Accounts with a non-zero balance.
    pub holders: usize,
    /// Events emitted over the ledger's lifetime.
    pub event_count: u64,
}

impl From<&Ledger> for LedgerInfo {
    fn from(l: &Ledger) -> Self {
        Self {
            address: l.address(),
            name: l.name().to_string(),
            symbol: l.symbol().to_string(),
            decimals: l.decimals(),
            total_supply: l.total_supply(),
            owner: l.owner(),
            holders: l.holder_count(),
            event_count: l.event_count(),
        }
    }
}

/// Response payload for `balanceOf`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub ledger: Address,
    pub account: Address,
    #[serde(with = "ce_protocol::amount::decimal")]
    pub balance: Amount,
}

/// Response payload for `allowance`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AllowanceResponse {
    pub ledger: Address,
    pub owner: Address,
    pub spender: Address,
    #[serde(with = "ce_protocol::amount::decimal")]
    pub allowance: Amount,
}

/// Result of a successful mutating call.
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationReceipt {
    /// The ledger the call addressed (the new one, for a deployment).
    pub ledger: Address,
    /// Amount moved, for the recovery operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    /// Events the call emitted, on any ledger.
    pub events: Vec<EventRecord>,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// REST failure, rendered as an [`ErrorResponse`].
#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<HostError> for ApiError {
    fn from(e: HostError) -> Self {
        match e {
            HostError::UnknownLedger(_) => ApiError::NotFound(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid address {:?}: {}", raw, e)))
}

// ---------------------------------------------------------------------------
// REST Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: 200 while the process is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: version, ledger count and journal height.
async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let ledgers = state.host.read().await.len();
    let journal_height = state
        .store
        .journal_height()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(StatusResponse {
        version: state.version.clone(),
        ledgers,
        journal_height,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /ledgers`
async fn ledgers_handler(State(state): State<AppState>) -> Json<Vec<LedgerInfo>> {
    let host = state.host.read().await;
    Json(host.ledgers().map(LedgerInfo::from).collect())
}

/// `GET /ledgers/:address`
async fn ledger_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<LedgerInfo>, ApiError> {
    let address = parse_address(&address)?;
    let host = state.host.read().await;
    Ok(Json(LedgerInfo::from(host.ledger(&address)?)))
}

/// `GET /ledgers/:address/balances/:account`
async fn balance_handler(
    Path((address, account)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let ledger = parse_address(&address)?;
    let account = parse_address(&account)?;
    let host = state.host.read().await;
    let balance = host.ledger(&ledger)?.balance_of(&account);
    Ok(Json(BalanceResponse {
        ledger,
        account,
        balance,
    }))
}

/// `GET /ledgers/:address/allowances/:owner/:spender`
async fn allowance_handler(
    Path((address, owner, spender)): Path<(String, String, String)>,
    State(state): State<AppState>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    let ledger = parse_address(&address)?;
    let owner = parse_address(&owner)?;
    let spender = parse_address(&spender)?;
    let host = state.host.read().await;
    let allowance = host.ledger(&ledger)?.allowance(&owner, &spender);
    Ok(Json(AllowanceResponse {
        ledger,
        owner,
        spender,
        allowance,
    }))
}

/// Query string of `GET /ledgers/:address/events`.
#[derive(Debug, Deserialize)]
struct EventsQuery {
    #[serde(default)]
    from: u64,
    limit: Option<usize>,
}

/// `GET /ledgers/:address/events?from=&limit=`: the persisted journal.
async fn events_handler(
    Path(address): Path<String>,
    Query(q): Query<EventsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<EventRecord>>, ApiError> {
    let ledger = parse_address(&address)?;
    state.host.read().await.ledger(&ledger)?;
    let limit = q.limit.unwrap_or(DEFAULT_EVENT_LIMIT).min(MAX_EVENT_LIMIT);
    let events = state
        .store
        .events_for(&ledger, q.from, limit)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(events))
}

// ---------------------------------------------------------------------------
// JSON-RPC
// ---------------------------------------------------------------------------

/// `POST /rpc`: JSON-RPC 2.0 gateway.
///
/// Every ledger operation and query is a `ledger_*` method with named
/// parameters. Amounts are decimal strings of base units.
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError::new(
                INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            )),
            id: req.id,
        });
    }

    let outcome = dispatch(&state, &req.method, req.params).await;

    let (result, error) = match outcome {
        Ok(value) => {
            state.metrics.record(&req.method, "ok");
            (Some(value), None)
        }
        Err(e) => {
            let label = match e.code {
                METHOD_NOT_FOUND => "unknown",
                _ => req.method.as_str(),
            };
            let kind = if e.is_rejection() { "rejected" } else { "error" };
            state.metrics.record(label, kind);
            tracing::debug!(method = %req.method, code = e.code, "rpc call failed: {}", e.message);
            (None, Some(e))
        }
    };

    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

/// Routes a method to its query or mutation.
async fn dispatch(
    state: &AppState,
    method: &str,
    params: Option<serde_json::Value>,
) -> Result<serde_json::Value, JsonRpcError> {
    match method {
        // -- Queries ---------------------------------------------------------
        "ledger_list" => {
            let host = state.host.read().await;
            let infos: Vec<LedgerInfo> = host.ledgers().map(LedgerInfo::from).collect();
            to_json(&infos)
        }
        "ledger_info" => {
            let p: LedgerParams = parse_params(params)?;
            query(state, |h| Ok(LedgerInfo::from(h.ledger(&p.ledger)?))).await
        }
        "ledger_name" => {
            let p: LedgerParams = parse_params(params)?;
            query(state, |h| Ok(h.ledger(&p.ledger)?.name().to_string())).await
        }
        "ledger_symbol" => {
            let p: LedgerParams = parse_params(params)?;
            query(state, |h| Ok(h.ledger(&p.ledger)?.symbol().to_string())).await
        }
        "ledger_decimals" => {
            let p: LedgerParams = parse_params(params)?;
            query(state, |h| Ok(h.ledger(&p.ledger)?.decimals())).await
        }
        "ledger_totalSupply" => {
            let p: LedgerParams = parse_params(params)?;
            query(state, |h| Ok(h.ledger(&p.ledger)?.total_supply().to_string())).await
        }
        "ledger_owner" => {
            let p: LedgerParams = parse_params(params)?;
            query(state, |h| Ok(h.ledger(&p.ledger)?.owner())).await
        }
        "ledger_balanceOf" => {
            let p: BalanceParams = parse_params(params)?;
            query(state, |h| {
                Ok(BalanceResponse {
                    ledger: p.ledger,
                    account: p.account,
                    balance: h.ledger(&p.ledger)?.balance_of(&p.account),
                })
            })
            .await
        }
        "ledger_allowance" => {
            let p: AllowanceParams = parse_params(params)?;
            query(state, |h| {
                Ok(AllowanceResponse {
                    ledger: p.ledger,
                    owner: p.owner,
                    spender: p.spender,
                    allowance: h.ledger(&p.ledger)?.allowance(&p.owner, &p.spender),
                })
            })
            .await
        }
        "ledger_events" => {
            let p: EventsParams = parse_params(params)?;
            state.host.read().await.ledger(&p.ledger)?;
            let limit = p.limit.unwrap_or(DEFAULT_EVENT_LIMIT).min(MAX_EVENT_LIMIT);
            let events = state
                .store
                .events_for(&p.ledger, p.from, limit)
                .map_err(JsonRpcError::internal)?;
            to_json(&events)
        }

        // -- Mutations -------------------------------------------------------
        "ledger_deploy" => {
            let p: DeployParams = parse_params(params)?;
            deploy(state, p).await
        }
        "ledger_transfer" => {
            let p: TransferParams = parse_params(params)?;
            mutate(state, p.ledger, &[], move |h| {
                h.ledger_mut(&p.ledger)?.transfer(p.caller, p.to, p.amount)?;
                Ok(None)
            })
            .await
        }
        "ledger_approve" => {
            let p: ApproveParams = parse_params(params)?;
            mutate(state, p.ledger, &[], move |h| {
                h.ledger_mut(&p.ledger)?.approve(p.caller, p.spender, p.amount)?;
                Ok(None)
            })
            .await
        }
        "ledger_transferFrom" => {
            let p: TransferFromParams = parse_params(params)?;
            mutate(state, p.ledger, &[], move |h| {
                h.ledger_mut(&p.ledger)?
                    .transfer_from(p.caller, p.from, p.to, p.amount)?;
                Ok(None)
            })
            .await
        }
        "ledger_mint" => {
            let p: TransferParams = parse_params(params)?;
            mutate(state, p.ledger, &[], move |h| {
                h.ledger_mut(&p.ledger)?.mint(p.caller, p.to, p.amount)?;
                Ok(None)
            })
            .await
        }
        "ledger_burn" => {
            let p: BurnParams = parse_params(params)?;
            mutate(state, p.ledger, &[], move |h| {
                h.ledger_mut(&p.ledger)?.burn(p.caller, p.amount)?;
                Ok(None)
            })
            .await
        }
        "ledger_burnFrom" => {
            let p: BurnFromParams = parse_params(params)?;
            mutate(state, p.ledger, &[], move |h| {
                h.ledger_mut(&p.ledger)?.burn_from(p.caller, p.from, p.amount)?;
                Ok(None)
            })
            .await
        }
        "ledger_withdrawStuckSelf" => {
            let p: CallerParams = parse_params(params)?;
            mutate(state, p.ledger, &[], move |h| {
                h.ledger_mut(&p.ledger)?.withdraw_stuck_self(p.caller).map(Some).map_err(HostError::from)
            })
            .await
        }
        "ledger_withdrawStuckForeign" => {
            let p: ForeignParams = parse_params(params)?;
            mutate(state, p.ledger, &[p.foreign], move |h| {
                h.withdraw_stuck_foreign(&p.ledger, p.caller, &p.foreign).map(Some)
            })
            .await
        }
        "ledger_transferOwnership" => {
            let p: OwnershipParams = parse_params(params)?;
            mutate(state, p.ledger, &[], move |h| {
                h.ledger_mut(&p.ledger)?.transfer_ownership(p.caller, p.new_owner)?;
                Ok(None)
            })
            .await
        }
        "ledger_renounceOwnership" => {
            let p: CallerParams = parse_params(params)?;
            mutate(state, p.ledger, &[], move |h| {
                h.ledger_mut(&p.ledger)?.renounce_ownership(p.caller)?;
                Ok(None)
            })
            .await
        }

        _ => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )),
    }
}

/// Runs a read-only query under the read lock.
async fn query<T, F>(state: &AppState, f: F) -> Result<serde_json::Value, JsonRpcError>
where
    T: Serialize,
    F: FnOnce(&LedgerHost) -> HostResult<T>,
{
    let host = state.host.read().await;
    let value = f(&*host)?;
    to_json(&value)
}

/// Applies one mutating operation addressed to `ledger`, which may also
/// touch the ledgers in `also`, then commits and broadcasts its events.
async fn mutate<F>(
    state: &AppState,
    ledger: Address,
    also: &[Address],
    f: F,
) -> Result<serde_json::Value, JsonRpcError>
where
    F: FnOnce(&mut LedgerHost) -> HostResult<Option<Amount>>,
{
    let timer = state.metrics.operation_latency_seconds.start_timer();
    let mut host = state.host.write().await;

    let mut touched = vec![ledger];
    touched.extend(also.iter().filter(|a| **a != ledger).copied());
    let snapshot: Vec<Ledger> = touched
        .iter()
        .filter_map(|a| host.ledger(a).ok().cloned())
        .collect();

    let amount = f(&mut *host)?;
    let events = host.drain_events();

    let committed = {
        let rows: Vec<&Ledger> = touched.iter().filter_map(|a| host.ledger(a).ok()).collect();
        state.store.commit(&host, &rows, &events)
    };
    if let Err(e) = committed {
        tracing::error!(%ledger, error = %e, "commit failed, rolling back");
        for saved in snapshot {
            if let Ok(slot) = host.ledger_mut(&saved.address()) {
                *slot = saved;
            }
        }
        return Err(JsonRpcError::internal(e));
    }
    // Broadcast under the lock so subscribers see commit order.
    publish(state, &events);
    drop(host);
    timer.observe_duration();
    to_json(&OperationReceipt {
        ledger,
        amount: amount.map(|a| a.to_string()),
        events,
    })
}

/// Deploys a new ledger. The whole host is restored if the commit fails.
async fn deploy(state: &AppState, p: DeployParams) -> Result<serde_json::Value, JsonRpcError> {
    let timer = state.metrics.operation_latency_seconds.start_timer();
    let mut host = state.host.write().await;
    let snapshot = host.clone();

    let owner = p.owner.unwrap_or(p.deployer);
    let holder = p.holder.unwrap_or(owner);
    let address = host.deploy(p.deployer, p.config, holder, owner)?;
    let events = host.drain_events();

    let committed = match host.ledger(&address) {
        Ok(l) => state.store.commit(&host, &[l], &events),
        Err(e) => return Err(e.into()),
    };
    if let Err(e) = committed {
        tracing::error!(%address, error = %e, "commit failed, rolling back deployment");
        *host = snapshot;
        return Err(JsonRpcError::internal(e));
    }
    state.metrics.ledgers_hosted.set(host.len() as i64);
    // Broadcast under the lock so subscribers see commit order.
    publish(state, &events);
    drop(host);
    timer.observe_duration();
    to_json(&OperationReceipt {
        ledger: address,
        amount: None,
        events,
    })
}

/// Sends committed events to subscribers.
fn publish(state: &AppState, events: &[EventRecord]) {
    state.metrics.events_emitted_total.inc_by(events.len() as u64);
    for record in events {
        // No subscribers is not an error.
        let _ = state.event_tx.send(record.clone());
    }
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// `GET /ws`: WebSocket upgrade for live event streaming.
///
/// Clients receive one JSON-encoded [`EventRecord`] per message, in commit
/// order. Client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(record) => {
                        let payload = match serde_json::to_string(&record) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
