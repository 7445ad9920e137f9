// Commander Tier List - Web Server
// REST API over the tier store

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use commander_tierlist::{
    AggregationEngine, Config, ConsensusEntry, DeviceInfo, IdentityId, IdentityResolver,
    KnownFingerprint, RankableUnit, SessionContext, SqliteStore, SummaryStats, Tier,
    TierAssignment, TierStore, UpsertOutcome,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SqliteStore>>,
}

impl AppState {
    fn store(&self) -> Result<MutexGuard<'_, SqliteStore>, ApiError> {
        self.store
            .lock()
            .map_err(|_| ApiError::internal("store lock poisoned"))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            error: None,
        })
    }
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = %e, "store error");
        ApiError::internal(e.to_string())
    }
}

impl From<commander_tierlist::TierListError> for ApiError {
    fn from(e: commander_tierlist::TierListError) -> Self {
        error!(error = %e, "engine error");
        ApiError::internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse {
            success: false,
            data: (),
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Deserialize)]
struct IdentityRequest {
    fingerprint: Option<String>,
    #[serde(default)]
    user_agent: String,
    #[serde(default)]
    device_info: DeviceInfo,
}

#[derive(Serialize)]
struct IdentityResponse {
    identity_id: IdentityId,
    created: bool,
}

#[derive(Deserialize)]
struct AssignmentRequest {
    tier: String,
}

#[derive(Serialize)]
struct AssignmentResponse {
    unit: RankableUnit,
    tier: Tier,
    outcome: UpsertOutcome,
}

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    stats: SummaryStats,
    top_commander: Option<String>,
    bottom_commander: Option<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// GET /api/catalog - Commanders with nested prestiges
async fn get_catalog(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    let store = state.store()?;
    let catalog = store.fetch_catalog()?;
    let value = serde_json::to_value(&catalog).map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(ApiResponse::ok(value))
}

/// GET /api/tierlist - Community consensus
async fn get_tierlist(State(state): State<AppState>) -> ApiResult<Vec<ConsensusEntry>> {
    let store = state.store()?;
    let catalog = store.fetch_catalog()?;
    let result = AggregationEngine::compute(&*store, &catalog)?;
    Ok(ApiResponse::ok(result.entries(&catalog)))
}

/// GET /api/stats - Submission count, highest and lowest rated
async fn get_stats(State(state): State<AppState>) -> ApiResult<StatsResponse> {
    let store = state.store()?;
    let catalog = store.fetch_catalog()?;
    let result = AggregationEngine::compute(&*store, &catalog)?;
    let stats = SummaryStats::from_result(&result, store.count_identities()?);

    Ok(ApiResponse::ok(StatsResponse {
        top_commander: stats.top_unit.map(|u| catalog.describe(&u)),
        bottom_commander: stats.bottom_unit.map(|u| catalog.describe(&u)),
        stats,
    }))
}

/// GET /api/submissions/:identity - One visitor's stored rows
async fn get_submission(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> ApiResult<Vec<TierAssignment>> {
    let store = state.store()?;
    match store.fetch_submission(&IdentityId(identity))? {
        Some(rows) => Ok(ApiResponse::ok(rows)),
        None => Err(ApiError::new(StatusCode::NOT_FOUND, "No submission found")),
    }
}

/// POST /api/identities - Find by fingerprint or create
async fn post_identity(
    State(state): State<AppState>,
    Json(request): Json<IdentityRequest>,
) -> ApiResult<IdentityResponse> {
    let store = state.store()?;
    let resolver = IdentityResolver::new(
        KnownFingerprint(request.fingerprint),
        &request.user_agent,
        request.device_info,
    );
    let mut session = SessionContext::ephemeral();

    if let Some(id) = resolver.resolve(&mut session, &*store)?.identity_id() {
        return Ok(ApiResponse::ok(IdentityResponse {
            identity_id: id.clone(),
            created: false,
        }));
    }

    let identity_id = resolver.create_identity(&mut session, &*store)?;
    Ok(ApiResponse::ok(IdentityResponse {
        identity_id,
        created: true,
    }))
}

/// PUT /api/submissions/:identity/:unit - Single-change upsert
async fn put_assignment(
    State(state): State<AppState>,
    Path((identity, unit)): Path<(String, String)>,
    Json(request): Json<AssignmentRequest>,
) -> ApiResult<AssignmentResponse> {
    let unit: RankableUnit = unit
        .parse()
        .map_err(|e: commander_tierlist::MalformedUnitKey| {
            ApiError::new(StatusCode::BAD_REQUEST, e.to_string())
        })?;
    let tier: Tier = request
        .tier
        .parse()
        .map_err(|e: commander_tierlist::UnknownTier| {
            ApiError::new(StatusCode::BAD_REQUEST, e.to_string())
        })?;

    let store = state.store()?;
    let identity = IdentityId(identity);

    if !store.fetch_catalog()?.contains(&unit) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("{} is not a rankable unit", unit),
        ));
    }
    if store.get_identity(&identity)?.is_none() {
        warn!(identity = %identity, "upsert for unknown identity");
        return Err(ApiError::new(StatusCode::NOT_FOUND, "Unknown identity"));
    }

    let outcome = store.upsert_single_assignment(&identity, &unit, tier)?;
    info!(identity = %identity, unit = %unit, tier = tier.code(), ?outcome, "assignment stored");

    Ok(ApiResponse::ok(AssignmentResponse {
        unit,
        tier,
        outcome,
    }))
}

// ============================================================================
// Main
// ============================================================================

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/catalog", get(get_catalog))
        .route("/tierlist", get(get_tierlist))
        .route("/stats", get(get_stats))
        .route("/identities", post(post_identity))
        .route("/submissions/:identity", get(get_submission))
        .route("/submissions/:identity/:unit", put(put_assignment))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("🌐 Commander Tier List - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::load()?;
    let store = SqliteStore::open(&config.db_path)?;
    println!("✓ Database opened: {:?}", config.db_path);

    let state = AppState {
        store: Arc::new(Mutex::new(store)),
    };
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("\n🚀 Server running on http://localhost:{}", config.port);
    println!("   API: http://localhost:{}/api/tierlist", config.port);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shut down");
    Ok(())
}
