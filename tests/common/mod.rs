//! Shared harness: spins up the demo gateway on an ephemeral port with
//! an in-memory audit sink the tests can assert against.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;

use request_guard::audit::MemorySink;
use request_guard::pipeline::{guard_middleware, issue_csrf_token, GuardState};
use request_guard::GuardConfig;

pub struct TestGateway {
    pub addr: SocketAddr,
    pub sink: Arc<MemorySink>,
    /// Requests that actually reached the login handler.
    pub login_hits: Arc<AtomicU32>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }
}

pub async fn spawn_gateway(config: GuardConfig) -> TestGateway {
    let sink = Arc::new(MemorySink::new());
    let state = GuardState::builder(config).sink(sink.clone()).build();

    let login_hits = Arc::new(AtomicU32::new(0));
    let hits = login_hits.clone();

    let app = Router::new()
        .route("/api/csrf/token", get(issue_csrf_token))
        .route(
            "/api/auth/login",
            post(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::UNAUTHORIZED
                }
            }),
        )
        .route("/api/data", get(|| async { "ok" }).post(|| async { "ok" }))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            guard_middleware,
        ))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("serve test gateway");
    });

    TestGateway {
        addr,
        sink,
        login_hits,
    }
}
