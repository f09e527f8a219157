//! CSRF token engine.
//!
//! # Data Flow
//! ```text
//! Unsafe request:
//!     → origin.rs (Origin/Referer vs allow-list + host)
//!     → token.rs (HMAC session token, or double-submit equality)
//!     → pass to rate limiting
//! ```
//!
//! # Design Decisions
//! - One verifier with two strategies (hmac-session, double-submit-cookie)
//!   selected by configuration, not two parallel modules.
//! - Fail closed: missing secret, malformed token, store outage all reject.
//! - Constant-time MAC comparison; rejection responses never carry
//!   expected token material.

pub mod origin;
pub mod token;

use std::sync::Arc;

pub use origin::validate_origin;
pub use token::{double_submit_verify, TokenEngine};

use crate::config::schema::{CsrfConfig, CsrfStrategy};
use crate::error::{GuardError, GuardResult};
use crate::store::SecretStore;

/// Tokens presented by a request, as extracted by the pipeline.
#[derive(Debug, Default)]
pub struct PresentedTokens<'a> {
    /// Token from the configured request header.
    pub header: Option<&'a str>,
    /// Token from the configured cookie.
    pub cookie: Option<&'a str>,
    /// Session identifier, when a session context exists.
    pub session_id: Option<&'a str>,
}

/// CSRF verification front-end used by the pipeline.
pub struct CsrfGuard {
    config: CsrfConfig,
    engine: TokenEngine,
}

impl CsrfGuard {
    pub fn new(config: CsrfConfig, secrets: Arc<dyn SecretStore>, op_timeout_ms: u64) -> Self {
        Self {
            config,
            engine: TokenEngine::new(secrets, op_timeout_ms),
        }
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    /// Safe methods are exempt from verification by policy.
    pub fn is_safe_method(&self, method: &str) -> bool {
        self.config
            .safe_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    pub fn is_exempt_path(&self, path: &str) -> bool {
        self.config
            .exempt_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Issue a session-bound token. Only meaningful for the hmac-session
    /// strategy; double-submit deployments mint tokens client-side.
    pub async fn issue(&self, session_id: &str) -> GuardResult<String> {
        self.engine.issue(session_id).await
    }

    /// Verify the presented tokens under the configured strategy.
    pub async fn verify(&self, presented: &PresentedTokens<'_>) -> GuardResult<()> {
        match self.config.strategy {
            CsrfStrategy::HmacSession => {
                let token = presented.header.ok_or(GuardError::CsrfTokenMissing)?;
                let session_id = presented
                    .session_id
                    .ok_or(GuardError::SessionRequired)?;
                self.engine.verify(token, session_id).await
            }
            CsrfStrategy::DoubleSubmitCookie => {
                let header = presented.header.ok_or(GuardError::CsrfTokenMissing)?;
                let cookie = presented.cookie.ok_or(GuardError::CsrfTokenMissing)?;
                double_submit_verify(header, cookie)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ManualClock, MemoryStore};

    fn guard(strategy: CsrfStrategy) -> CsrfGuard {
        let store = Arc::new(MemoryStore::new(Arc::new(ManualClock::new(0))));
        let config = CsrfConfig {
            strategy,
            ..CsrfConfig::default()
        };
        CsrfGuard::new(config, store, 250)
    }

    #[tokio::test]
    async fn test_hmac_session_round_trip() {
        let guard = guard(CsrfStrategy::HmacSession);
        let token = guard.issue("sess-1").await.unwrap();

        let presented = PresentedTokens {
            header: Some(&token),
            cookie: None,
            session_id: Some("sess-1"),
        };
        assert!(guard.verify(&presented).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_header_rejected() {
        let guard = guard(CsrfStrategy::HmacSession);
        let presented = PresentedTokens {
            header: None,
            cookie: None,
            session_id: Some("sess-1"),
        };
        assert!(matches!(
            guard.verify(&presented).await,
            Err(GuardError::CsrfTokenMissing)
        ));
    }

    #[tokio::test]
    async fn test_no_session_rejected() {
        let guard = guard(CsrfStrategy::HmacSession);
        let presented = PresentedTokens {
            header: Some("a.b"),
            cookie: None,
            session_id: None,
        };
        assert!(matches!(
            guard.verify(&presented).await,
            Err(GuardError::SessionRequired)
        ));
    }

    #[tokio::test]
    async fn test_double_submit_strategy() {
        let guard = guard(CsrfStrategy::DoubleSubmitCookie);

        let ok = PresentedTokens {
            header: Some("tok-123"),
            cookie: Some("tok-123"),
            session_id: None,
        };
        assert!(guard.verify(&ok).await.is_ok());

        let mismatch = PresentedTokens {
            header: Some("tok-123"),
            cookie: Some("tok-456"),
            session_id: None,
        };
        assert!(matches!(
            guard.verify(&mismatch).await,
            Err(GuardError::CsrfTokenInvalid)
        ));

        let missing_cookie = PresentedTokens {
            header: Some("tok-123"),
            cookie: None,
            session_id: None,
        };
        assert!(matches!(
            guard.verify(&missing_cookie).await,
            Err(GuardError::CsrfTokenMissing)
        ));
    }

    #[test]
    fn test_safe_method_policy() {
        let guard = guard(CsrfStrategy::HmacSession);
        assert!(guard.is_safe_method("GET"));
        assert!(guard.is_safe_method("head"));
        assert!(!guard.is_safe_method("POST"));
        assert!(guard.is_exempt_path("/api/auth/login"));
        assert!(!guard.is_exempt_path("/api/data"));
    }
}
