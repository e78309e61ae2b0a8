use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use notary_core::{
    parse_hash, Block, Chain, ChainStore, Coordinator, EthereumVerifier, PayloadCodec, Submission,
    SubmitConfig, SubmitError, Violation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

pub struct AppState<S: ChainStore> {
    coordinator: Coordinator<S, EthereumVerifier>,
}

impl<S: ChainStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<S: ChainStore> AppState<S> {
    pub fn new(chain: Chain<S>, config: SubmitConfig) -> Self {
        Self {
            coordinator: Coordinator::with_config(chain, Arc::new(EthereumVerifier), config),
        }
    }

    fn chain(&self) -> &Chain<S> {
        self.coordinator.chain()
    }
}

#[derive(Serialize, Deserialize)]
pub struct Health {
    pub status: String,
}

#[derive(Serialize, Deserialize)]
pub struct Head {
    pub height: u64,
    pub hash: String,
}

#[derive(Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub height: u64,
    pub violations: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct ChallengeIn {
    pub address: String,
}

#[derive(Serialize, Deserialize)]
pub struct ChallengeOut {
    pub address: String,
    pub message: String,
    pub issued_at: u64,
    pub window_secs: u64,
}

#[derive(Serialize, Deserialize)]
pub struct SubmitIn {
    pub address: String,
    pub message: String,
    pub signature: String,
    pub star: serde_json::Value,
}

/// A block as served over HTTP: hashes in hex, body decoded where possible.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockView {
    pub height: u64,
    pub timestamp: u64,
    pub hash: String,
    pub previous_hash: Option<String>,
    pub owner: Option<String>,
    pub star: Option<serde_json::Value>,
    pub body: String,
}

impl BlockView {
    fn new(block: &Block, codec: &dyn PayloadCodec) -> Self {
        let decoded = codec.decode(&block.body).ok();
        Self {
            height: block.height,
            timestamp: block.timestamp,
            hash: block.hash_hex(),
            previous_hash: block.previous_hash.map(hex::encode),
            owner: decoded.as_ref().and_then(|d| d.owner.clone()),
            star: decoded.and_then(|d| serde_json::from_slice(&d.raw).ok()),
            body: hex::encode(&block.body),
        }
    }
}

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Submit(SubmitError),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        ApiError::Submit(e)
    }
}

fn violation_strings(violations: &[Violation]) -> Vec<String> {
    violations.iter().map(ToString::to_string).collect()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg })),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg })),
            ApiError::Submit(e) => {
                let status = match &e {
                    SubmitError::MalformedChallenge(_) => StatusCode::BAD_REQUEST,
                    SubmitError::ChallengeExpired { .. } => StatusCode::GONE,
                    SubmitError::SignatureInvalid => StatusCode::UNAUTHORIZED,
                    SubmitError::PostAppendValidationFailed { .. } | SubmitError::Storage(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                let violations = match &e {
                    SubmitError::PostAppendValidationFailed { violations, .. } => {
                        violation_strings(violations)
                    }
                    _ => Vec::new(),
                };
                (
                    status,
                    serde_json::json!({ "error": e.to_string(), "violations": violations }),
                )
            }
            ApiError::Internal(e) => {
                error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": e.to_string() }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

pub fn router<S: ChainStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chain/head", get(head::<S>))
        .route("/chain/validate", get(validate_chain::<S>))
        .route("/challenge", post(request_challenge::<S>))
        .route("/submit", post(submit::<S>))
        .route("/block/{height}", get(block_by_height::<S>))
        .route("/block/hash/{hash}", get(block_by_hash::<S>))
        .route("/blocks/owner/{address}", get(blocks_by_owner::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
    })
}

async fn head<S: ChainStore>(State(state): State<AppState<S>>) -> Result<Json<Head>, ApiError> {
    let (height, hash) = state.chain().tip()?;
    Ok(Json(Head {
        height,
        hash: hex::encode(hash),
    }))
}

async fn validate_chain<S: ChainStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<ValidationReport>, ApiError> {
    let chain = state.chain().clone();
    let (height, result) = blocking(move || Ok((chain.height()?, chain.validate()?))).await?;
    let violations = match result {
        Ok(()) => Vec::new(),
        Err(violations) => violation_strings(&violations),
    };
    Ok(Json(ValidationReport {
        valid: violations.is_empty(),
        height,
        violations,
    }))
}

async fn request_challenge<S: ChainStore>(
    State(state): State<AppState<S>>,
    Json(req): Json<ChallengeIn>,
) -> Result<Json<ChallengeOut>, ApiError> {
    let challenge = state.coordinator.issuer().issue(req.address.trim())?;
    Ok(Json(ChallengeOut {
        address: challenge.address.clone(),
        message: challenge.to_string(),
        issued_at: challenge.issued_at,
        window_secs: state.coordinator.config().validation_window_secs,
    }))
}

async fn submit<S: ChainStore + 'static>(
    State(state): State<AppState<S>>,
    Json(req): Json<SubmitIn>,
) -> Result<(StatusCode, Json<BlockView>), ApiError> {
    let data = serde_json::to_vec(&req.star).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let payload = state
        .coordinator
        .authorize(Submission {
            address: req.address,
            message: req.message,
            signature: req.signature,
            data,
        })
        .await?;
    let coordinator = state.coordinator.clone();
    let block = blocking(move || Ok(coordinator.commit(payload)))
        .await?
        .map_err(ApiError::Submit)?;
    let view = BlockView::new(&block, state.chain().codec().as_ref());
    Ok((StatusCode::CREATED, Json(view)))
}

/// Run store-bound work off the async workers; the append lock and sled
/// flushes block.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f)
        .await
        .map_err(anyhow::Error::from)??)
}

async fn block_by_height<S: ChainStore>(
    State(state): State<AppState<S>>,
    Path(height): Path<u64>,
) -> Result<Json<BlockView>, ApiError> {
    let block = state
        .chain()
        .get_by_height(height)?
        .ok_or_else(|| ApiError::NotFound(format!("no block at height {height}")))?;
    Ok(Json(BlockView::new(&block, state.chain().codec().as_ref())))
}

async fn block_by_hash<S: ChainStore>(
    State(state): State<AppState<S>>,
    Path(hash): Path<String>,
) -> Result<Json<BlockView>, ApiError> {
    let parsed = parse_hash(&hash)
        .ok_or_else(|| ApiError::BadRequest(format!("{hash:?} is not a 32 byte hex hash")))?;
    let block = state
        .chain()
        .get_by_hash(&parsed)?
        .ok_or_else(|| ApiError::NotFound(format!("no block with hash {hash}")))?;
    Ok(Json(BlockView::new(&block, state.chain().codec().as_ref())))
}

async fn blocks_by_owner<S: ChainStore>(
    State(state): State<AppState<S>>,
    Path(address): Path<String>,
) -> Result<Json<Vec<BlockView>>, ApiError> {
    let codec = state.chain().codec().clone();
    let views = state
        .chain()
        .all_blocks_by_address(&address)?
        .iter()
        .map(|b| BlockView::new(b, codec.as_ref()))
        .collect();
    Ok(Json(views))
}
