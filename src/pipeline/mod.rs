//! Pipeline orchestrator.
//!
//! # Responsibilities
//! - Run the guard stages in a fixed order on every request:
//!   IP-block gate, risk classification, CSRF verification, rate
//!   limiting. The first failing stage short-circuits with its own
//!   status; later stages never run.
//! - Run the completion hook after the handler: conditional budget
//!   refunds, failed-login tracking, rate headers on the response.
//!
//! # Design Decisions
//! - One `axum::middleware::from_fn_with_state` layer instead of a
//!   tower layer per stage. The stages share extracted context and
//!   their ordering is a correctness property, so one function keeps
//!   it auditable.
//! - Rejections are `GuardError` values converted through
//!   `IntoResponse`, so every refusal carries the same JSON shape.

pub mod context;

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub use context::{AuthUser, RequestContext};

use crate::audit::{AuditSink, SecurityEvent, SecurityEventKind, Severity, TracingSink};
use crate::config::schema::{GuardConfig, RoutePolicy};
use crate::csrf::{validate_origin, CsrfGuard, PresentedTokens};
use crate::error::GuardError;
use crate::limiter::{limit_key, KeyContext, PolicyTable, RateDecision, RateLimiter};
use crate::observability::metrics;
use crate::risk::{MemoryRiskStore, RiskEngine, RiskStore};
use crate::store::{Clock, MemoryStore, SecretStore, StoreError, SystemClock, WindowStore};

/// Shared state for the guard middleware and its admin handlers.
#[derive(Clone)]
pub struct GuardState {
    config: Arc<ArcSwap<GuardConfig>>,
    csrf: Arc<CsrfGuard>,
    limiter: Arc<RateLimiter>,
    risk: Arc<RiskEngine>,
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl GuardState {
    /// Build with in-memory stores, the system clock, and the tracing
    /// audit sink.
    pub fn new(config: GuardConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: GuardConfig) -> GuardStateBuilder {
        GuardStateBuilder {
            config,
            clock: None,
            sink: None,
            window_store: None,
            secret_store: None,
            risk_store: None,
        }
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<GuardConfig> {
        self.config.load_full()
    }

    /// Swap the live configuration. Rate policies, origin allow-list
    /// and CSRF exemptions apply to the next request; store and risk
    /// engine settings are fixed at construction.
    pub fn swap_config(&self, config: GuardConfig) {
        self.config.store(Arc::new(config));
    }

    pub fn risk(&self) -> Arc<RiskEngine> {
        self.risk.clone()
    }

    pub fn sink(&self) -> Arc<dyn AuditSink> {
        self.sink.clone()
    }

    /// Administrative override: clear one rate window immediately.
    pub async fn reset_limit(&self, key: &str) -> Result<(), StoreError> {
        self.limiter.reset(key).await
    }

    fn emit(&self, kind: SecurityEventKind, severity: Severity, ctx: &RequestContext) {
        self.sink.emit(SecurityEvent::new(
            kind,
            severity,
            self.clock.now_ms(),
            ctx.client(),
        ));
    }
}

pub struct GuardStateBuilder {
    config: GuardConfig,
    clock: Option<Arc<dyn Clock>>,
    sink: Option<Arc<dyn AuditSink>>,
    window_store: Option<Arc<dyn WindowStore>>,
    secret_store: Option<Arc<dyn SecretStore>>,
    risk_store: Option<Arc<dyn RiskStore>>,
}

impl GuardStateBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn window_store(mut self, store: Arc<dyn WindowStore>) -> Self {
        self.window_store = Some(store);
        self
    }

    pub fn secret_store(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.secret_store = Some(store);
        self
    }

    pub fn risk_store(mut self, store: Arc<dyn RiskStore>) -> Self {
        self.risk_store = Some(store);
        self
    }

    pub fn build(self) -> GuardState {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));

        let memory = Arc::new(MemoryStore::new(clock.clone()));
        let window_store = self.window_store.unwrap_or_else(|| memory.clone());
        let secret_store = self
            .secret_store
            .unwrap_or_else(|| memory as Arc<dyn SecretStore>);
        let risk_store = self.risk_store.unwrap_or_else(|| {
            Arc::new(MemoryRiskStore::new(
                self.config.risk.suspicious_hourly_threshold,
                self.config.risk.block_weight_threshold,
                self.config.risk.max_tracked_ips,
            ))
        });

        let op_timeout = self.config.store.op_timeout_ms;
        GuardState {
            csrf: Arc::new(CsrfGuard::new(
                self.config.csrf.clone(),
                secret_store,
                op_timeout,
            )),
            limiter: Arc::new(RateLimiter::new(window_store, clock.clone(), op_timeout)),
            risk: Arc::new(RiskEngine::new(
                risk_store,
                self.config.risk.clone(),
                sink.clone(),
                clock.clone(),
            )),
            config: Arc::new(ArcSwap::from_pointee(self.config)),
            sink,
            clock,
        }
    }
}

/// The guard middleware. Mount with
/// `axum::middleware::from_fn_with_state(state, guard_middleware)`.
pub async fn guard_middleware(
    State(state): State<GuardState>,
    req: Request,
    next: Next,
) -> Response {
    let config = state.config.load_full();
    let ctx = RequestContext::from_request(
        &req,
        &config.csrf.header_name,
        &config.csrf.cookie_name,
        &config.csrf.session_cookie,
    );

    state.emit(SecurityEventKind::RequestReceived, Severity::Low, &ctx);

    // Stage 1: blocked IPs are refused before any other work.
    if state.risk.is_blocked(ctx.ip) {
        state.emit(SecurityEventKind::IpBlocked, Severity::High, &ctx);
        metrics::record_rejection(GuardError::IpBlocked.code());
        return GuardError::IpBlocked.into_response();
    }

    // Stage 2: track and classify. Classification never rejects on its
    // own; escalation happens through the block list.
    state.risk.observe_request(&ctx.client());

    // Stage 3: CSRF, for unsafe methods on non-exempt paths.
    if config.csrf.enabled
        && !state.csrf.is_safe_method(&ctx.method)
        && !state.csrf.is_exempt_path(&ctx.path)
    {
        if let Err(err) = validate_origin(
            ctx.origin.as_deref(),
            ctx.referer.as_deref(),
            &config.csrf.allowed_origins,
            ctx.host.as_deref(),
        ) {
            state.emit(SecurityEventKind::OriginViolation, Severity::High, &ctx);
            metrics::record_rejection(err.code());
            return err.into_response();
        }

        let presented = PresentedTokens {
            header: ctx.csrf_header.as_deref(),
            cookie: ctx.csrf_cookie.as_deref(),
            session_id: ctx.session_id.as_deref(),
        };
        if let Err(err) = state.csrf.verify(&presented).await {
            let (kind, severity) = match &err {
                GuardError::StoreUnavailable(_) => {
                    (SecurityEventKind::StoreDegraded, Severity::High)
                }
                _ => (SecurityEventKind::CsrfViolation, Severity::High),
            };
            state.emit(kind, severity, &ctx);
            metrics::record_rejection(err.code());
            return err.into_response();
        }
    }

    // Stage 4: rate limiting under the longest matching policy.
    let mut reservation: Option<(String, &RoutePolicy, RateDecision)> = None;
    if config.rate_limit.enabled {
        let table = PolicyTable::new(&config.rate_limit.policies);
        if let Some(policy) = table.match_route(&ctx.path, &ctx.method) {
            let identity = policy.identity_header.as_deref().and_then(|name| {
                req.headers().get(name).and_then(|v| v.to_str().ok())
            });
            let key = limit_key(
                policy,
                &KeyContext {
                    ip: ctx.ip,
                    user_id: ctx.user_id.as_deref(),
                    path: &ctx.path,
                    identity,
                },
            );

            let decision = state.limiter.admit(&key, policy).await;
            if decision.degraded {
                state.emit(SecurityEventKind::StoreDegraded, Severity::Medium, &ctx);
            }

            if !decision.allowed {
                emit_rate_limited(&state, &ctx, policy, &decision);
                metrics::record_rejection("RATE_LIMIT_EXCEEDED");
                let mut response = GuardError::RateLimitExceeded {
                    retry_after_secs: decision.retry_after_secs,
                }
                .into_response();
                decision.apply_headers(response.headers_mut());
                return response;
            }

            metrics::record_allowed(&policy.name);
            reservation = Some((key, policy, decision));
        }
    }

    let mut response = next.run(req).await;

    // Completion hook: refunds, failed-login tracking, rate headers.
    if let Some((key, policy, decision)) = reservation {
        let status = response.status();
        let succeeded = status.is_success() || status.is_redirection();
        let failed = status.is_client_error() || status.is_server_error();

        if (policy.skip_successful && succeeded) || (policy.skip_failed && failed) {
            state.limiter.decrement(&key).await;
        }

        if policy.track_failures
            && (status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN)
        {
            state.risk.note_failed_login(&ctx.client());
        }

        decision.apply_headers(response.headers_mut());
    }

    state.emit(SecurityEventKind::RequestCompleted, Severity::Low, &ctx);
    response
}

fn emit_rate_limited(
    state: &GuardState,
    ctx: &RequestContext,
    policy: &RoutePolicy,
    decision: &RateDecision,
) {
    state.sink.emit(
        SecurityEvent::new(
            SecurityEventKind::RateLimitExceeded,
            Severity::Medium,
            state.clock.now_ms(),
            ctx.client(),
        )
        .with_details(serde_json::json!({
            "policy": policy.name,
            "limit": decision.limit,
            "total_hits": decision.total_hits,
            "retry_after_secs": decision.retry_after_secs,
        })),
    );
}

/// Handler for `GET /api/csrf/token`: issue a token bound to the
/// caller's session cookie.
pub async fn issue_csrf_token(
    State(state): State<GuardState>,
    req: Request,
) -> Response {
    let config = state.config.load_full();
    let ctx = RequestContext::from_request(
        &req,
        &config.csrf.header_name,
        &config.csrf.cookie_name,
        &config.csrf.session_cookie,
    );

    let Some(session_id) = ctx.session_id.as_deref() else {
        return GuardError::SessionRequired.into_response();
    };

    match state.csrf.issue(session_id).await {
        Ok(token) => Json(serde_json::json!({
            "token": token,
            "header_name": config.csrf.header_name,
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}
