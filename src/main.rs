//! Demo gateway wiring the guard middleware around a small API.
//!
//! The binary exists to exercise the library end to end: a protected
//! `/api` surface behind the full pipeline, an unguarded health probe,
//! and an operator endpoint for clearing rate windows.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Deserialize;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use request_guard::config::load_config;
use request_guard::observability::{logging, metrics};
use request_guard::pipeline::{guard_middleware, issue_csrf_token, GuardState, RequestContext};
use request_guard::{GuardConfig, Shutdown};

#[derive(Parser)]
#[command(name = "request-guard", version, about = "Request-security gateway demo")]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability.log_level);
    tracing::info!(
        bind_address = %config.listener.bind_address,
        csrf_enabled = config.csrf.enabled,
        policies = config.rate_limit.policies.len(),
        "configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "failed to parse metrics address"
            ),
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let state = GuardState::new(config);

    let shutdown = Shutdown::new();
    let sweeper = shutdown.spawn_sweeper(state.risk());

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    shutdown.trigger();
    let _ = sweeper.await;
    tracing::info!("shutdown complete");
    Ok(())
}

fn router(state: GuardState) -> Router {
    let api = Router::new()
        .route("/api/csrf/token", get(issue_csrf_token))
        .route("/api/auth/login", post(login))
        .route("/api/data", get(read_data).post(write_data))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            guard_middleware,
        ));

    // Operator plane: outside the guard pipeline on purpose.
    let admin = Router::new()
        .route("/admin/limits/reset", post(reset_limit))
        .route("/healthz", get(|| async { "ok" }));

    api.merge(admin)
        .layer(
            // Body limit sits outside the timeout: Timeout requires the
            // inner response body to implement Default, which the
            // limited body does not.
            tower::ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

/// Stand-in login handler. Real deployments terminate auth upstream;
/// this one exists so failed attempts feed brute-force tracking.
async fn login(Json(body): Json<LoginRequest>) -> Response {
    if body.username == "demo" && body.password == "demo-password" {
        Json(serde_json::json!({ "status": "ok" })).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "invalid credentials" })),
        )
            .into_response()
    }
}

async fn read_data(State(state): State<GuardState>, req: Request) -> Response {
    let client = client_of(&state, &req);
    state
        .risk()
        .record_data_access(&client, "demo/records", true, false);
    Json(serde_json::json!({ "records": [] })).into_response()
}

async fn write_data(State(state): State<GuardState>, req: Request) -> Response {
    let client = client_of(&state, &req);
    state
        .risk()
        .record_data_modification(&client, "demo/records", true, false);
    (StatusCode::CREATED, Json(serde_json::json!({ "status": "created" }))).into_response()
}

fn client_of(state: &GuardState, req: &Request) -> request_guard::audit::ClientContext {
    let config = state.config();
    RequestContext::from_request(
        req,
        &config.csrf.header_name,
        &config.csrf.cookie_name,
        &config.csrf.session_cookie,
    )
    .client()
}

#[derive(Deserialize)]
struct ResetRequest {
    key: String,
}

async fn reset_limit(
    State(state): State<GuardState>,
    Json(body): Json<ResetRequest>,
) -> Response {
    match state.reset_limit(&body.key).await {
        Ok(()) => Json(serde_json::json!({ "status": "reset" })).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
