use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tractive_gateway::{
    Credential, GatewayConfig, GatewayError, GatewayReport, HardwareReport, LocationReport,
    Lookup, TrackerId, TrackerService,
};

const STALE_HEADER: &str = "x-gateway-stale";

/// Server configuration
struct ServerConfig {
    port: u16,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3002),
        }
    }
}

/// Application state shared across all requests
#[derive(Clone)]
struct AppState {
    service: TrackerService,
    metrics: Arc<Metrics>,
}

/// Server metrics
struct Metrics {
    total_requests: AtomicU64,
    requests_in_flight: AtomicU64,
    stale_responses: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    /// Count a request and return a guard that ends it on drop.
    fn begin(&self) -> RequestGuard<'_> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.requests_in_flight.fetch_add(1, Ordering::Relaxed);
        RequestGuard(&self.requests_in_flight)
    }
}

/// RAII guard for tracking in-flight requests
struct RequestGuard<'a>(&'a AtomicU64);

impl<'a> Drop for RequestGuard<'a> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server=info,tractive_gateway=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    let gateway_config = GatewayConfig::from_env().context("Invalid gateway configuration")?;
    if gateway_config.account.is_none() {
        tracing::warn!("TRACTIVE_EMAIL/TRACTIVE_PASSWORD not set, /auth will fail");
    }
    tracing::info!(
        "Upstream {} (timeout {:?}, fallback {:?})",
        gateway_config.api_url,
        gateway_config.timeout,
        gateway_config.fallback
    );

    let service = TrackerService::from_config(&gateway_config)
        .context("Failed to initialize Tractive client")?;

    let app = build_app(service);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Build the Axum application with routes and middleware
fn build_app(service: TrackerService) -> Router {
    let metrics = Arc::new(Metrics {
        total_requests: AtomicU64::new(0),
        requests_in_flight: AtomicU64::new(0),
        stale_responses: AtomicU64::new(0),
        start_time: Instant::now(),
    });

    let state = AppState { service, metrics };

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/auth", get(authenticate))
        .route("/location/:tracker_id", get(location))
        .route("/hardware/:tracker_id", get(hardware))
        .route("/hardware/battery/:tracker_id", get(battery))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Response envelope shared by every API route
#[derive(Serialize)]
struct ApiResponse<T> {
    status: u16,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            status: StatusCode::OK.as_u16(),
            data: Some(data),
            message: None,
        })
    }
}

/// A single tracker id yields one item, a comma-separated list yields a list.
#[derive(Serialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

enum Requested {
    One(TrackerId),
    Many(Vec<TrackerId>),
}

impl Requested {
    fn parse(raw: &str) -> Result<Self, GatewayError> {
        if raw.contains(',') {
            TrackerId::parse_list(raw).map(Self::Many)
        } else {
            TrackerId::parse(raw).map(Self::One)
        }
    }
}

/// Authenticate against Tractive with the configured account
async fn authenticate(State(state): State<AppState>) -> Result<Json<ApiResponse<Credential>>, ApiError> {
    let _guard = state.metrics.begin();

    let credential = state.service.auth.authenticate().await.map_err(|e| {
        tracing::error!("Error while authenticating: {}", e);
        ApiError(e)
    })?;
    Ok(ApiResponse::ok(credential))
}

async fn location(
    State(state): State<AppState>,
    Path(tracker_id): Path<String>,
) -> Result<Response, ApiError> {
    lookup_reports::<LocationReport>(&state, &tracker_id).await
}

async fn hardware(
    State(state): State<AppState>,
    Path(tracker_id): Path<String>,
) -> Result<Response, ApiError> {
    lookup_reports::<HardwareReport>(&state, &tracker_id).await
}

async fn battery(
    State(state): State<AppState>,
    Path(tracker_id): Path<String>,
) -> Result<Response, ApiError> {
    let _guard = state.metrics.begin();
    let reports = &state.service.reports;

    let result = match Requested::parse(&tracker_id)? {
        Requested::One(id) => reports.lookup_battery_level(&id).await.map(single),
        Requested::Many(ids) => reports.lookup_battery_levels(&ids).await.map(many),
    };

    let (data, stale) = result.map_err(|e| {
        tracing::error!("Error while getting tracker battery level: {}", e);
        ApiError(e)
    })?;
    Ok(respond(&state, data, stale))
}

async fn lookup_reports<R: GatewayReport>(
    state: &AppState,
    tracker_id: &str,
) -> Result<Response, ApiError> {
    let _guard = state.metrics.begin();
    let reports = &state.service.reports;

    let result = match Requested::parse(tracker_id)? {
        Requested::One(id) => reports.lookup_one::<R>(&id).await.map(single),
        Requested::Many(ids) => reports.lookup_many::<R>(&ids).await.map(many),
    };

    let (data, stale) = result.map_err(|e| {
        tracing::error!("Error while getting tracker {}: {}", R::KIND, e);
        ApiError(e)
    })?;
    Ok(respond(state, data, stale))
}

fn single<T>(lookup: Lookup<T>) -> (OneOrMany<T>, bool) {
    let stale = lookup.is_stale();
    (OneOrMany::One(lookup.report), stale)
}

fn many<T>(lookups: Vec<Lookup<T>>) -> (OneOrMany<T>, bool) {
    let stale = lookups.iter().any(Lookup::is_stale);
    (
        OneOrMany::Many(lookups.into_iter().map(|l| l.report).collect()),
        stale,
    )
}

fn respond<T: Serialize>(state: &AppState, data: OneOrMany<T>, stale: bool) -> Response {
    let mut response = ApiResponse::ok(data).into_response();
    if stale {
        state.metrics.stale_responses.fetch_add(1, Ordering::Relaxed);
        response
            .headers_mut()
            .insert(STALE_HEADER, HeaderValue::from_static("true"));
    }
    response
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        total_requests: state.metrics.total_requests.load(Ordering::Relaxed),
        requests_in_flight: state.metrics.requests_in_flight.load(Ordering::Relaxed),
        stale_responses: state.metrics.stale_responses.load(Ordering::Relaxed),
        authenticated: state.service.auth.is_authenticated().await,
        uptime_seconds: state.metrics.start_time.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct MetricsResponse {
    total_requests: u64,
    requests_in_flight: u64,
    stale_responses: u64,
    authenticated: bool,
    uptime_seconds: u64,
}

/// Gateway failure rendered as an HTTP response
struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// Real HTTP status for the failure, mirrored in the envelope's `status`.
    /// Older deployments always answered HTTP 200 and carried the code only in the body.
    fn status(&self) -> StatusCode {
        match &self.0 {
            GatewayError::InvalidTrackerId(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::TrackerNotFound => StatusCode::NOT_FOUND,
            GatewayError::Upstream {
                status: Some(code), ..
            } => StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY),
            GatewayError::Upstream { status: None, .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ApiResponse::<()> {
            status: status.as_u16(),
            data: None,
            message: Some(self.0.to_string()),
        });

        (status, body).into_response()
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}
