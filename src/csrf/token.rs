//! Session-bound HMAC tokens.
//!
//! Token format: `salt.hex(HMAC_SHA256(secret, salt))`. The secret is a
//! per-session 32-byte random value held server-side; verification is
//! stateless given the secret. Multiple valid tokens per session may
//! coexist so multi-tab clients keep working.

use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{GuardError, GuardResult};
use crate::store::SecretStore;

type HmacSha256 = Hmac<Sha256>;

const SALT_LEN: usize = 16;

/// Issues and verifies session-bound HMAC tokens.
pub struct TokenEngine {
    secrets: Arc<dyn SecretStore>,
    op_timeout: Duration,
}

impl TokenEngine {
    pub fn new(secrets: Arc<dyn SecretStore>, op_timeout_ms: u64) -> Self {
        Self {
            secrets,
            op_timeout: Duration::from_millis(op_timeout_ms),
        }
    }

    /// Issue a fresh token for a session, lazily creating its secret.
    pub async fn issue(&self, session_id: &str) -> GuardResult<String> {
        if session_id.is_empty() {
            return Err(GuardError::SessionRequired);
        }

        let secret = tokio::time::timeout(self.op_timeout, self.secrets.get_or_create(session_id))
            .await
            .map_err(|_| GuardError::StoreUnavailable("secret store timeout".to_string()))??;

        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt_hex = hex::encode(salt);

        let mac = sign(&secret, salt_hex.as_bytes())?;
        Ok(format!("{}.{}", salt_hex, hex::encode(mac)))
    }

    /// Verify a presented token against the session's secret.
    ///
    /// Fails closed on every ambiguity: no secret, malformed token, MAC
    /// mismatch, or store outage.
    pub async fn verify(&self, token: &str, session_id: &str) -> GuardResult<()> {
        if session_id.is_empty() {
            return Err(GuardError::SessionRequired);
        }

        let secret = tokio::time::timeout(self.op_timeout, self.secrets.get(session_id))
            .await
            .map_err(|_| GuardError::StoreUnavailable("secret store timeout".to_string()))??
            .ok_or(GuardError::CsrfTokenInvalid)?;

        let (salt, mac_hex) = token.split_once('.').ok_or(GuardError::CsrfTokenInvalid)?;
        let presented = hex::decode(mac_hex).map_err(|_| GuardError::CsrfTokenInvalid)?;
        let expected = sign(&secret, salt.as_bytes())?;

        // subtle yields false for unequal lengths without early exit.
        if expected.ct_eq(presented.as_slice()).into() {
            Ok(())
        } else {
            Err(GuardError::CsrfTokenInvalid)
        }
    }
}

/// Double-submit verification: header and cookie token must match under
/// constant-time comparison. Degraded mode for stateless deployments.
pub fn double_submit_verify(header_token: &str, cookie_token: &str) -> GuardResult<()> {
    if header_token.is_empty() || cookie_token.is_empty() {
        return Err(GuardError::CsrfTokenMissing);
    }
    if header_token
        .as_bytes()
        .ct_eq(cookie_token.as_bytes())
        .into()
    {
        Ok(())
    } else {
        Err(GuardError::CsrfTokenInvalid)
    }
}

fn sign(secret: &[u8], payload: &[u8]) -> GuardResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| GuardError::StoreUnavailable(format!("HMAC key error: {}", e)))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ManualClock, MemoryStore, StoreError};
    use async_trait::async_trait;

    fn engine() -> TokenEngine {
        let store = Arc::new(MemoryStore::new(Arc::new(ManualClock::new(0))));
        TokenEngine::new(store, 250)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let engine = engine();
        let token = engine.issue("sess-1").await.unwrap();
        assert!(engine.verify(&token, "sess-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_multiple_tokens_coexist() {
        let engine = engine();
        let first = engine.issue("sess-1").await.unwrap();
        let second = engine.issue("sess-1").await.unwrap();
        assert_ne!(first, second, "fresh salt per issuance");
        assert!(engine.verify(&first, "sess-1").await.is_ok());
        assert!(engine.verify(&second, "sess-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_tampered_token_rejected() {
        let engine = engine();
        let token = engine.issue("sess-1").await.unwrap();

        // Flip one bit in every hex character position.
        for i in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            if bytes[i] == b'.' {
                continue;
            }
            bytes[i] ^= 0x01;
            let tampered = String::from_utf8(bytes).unwrap();
            assert!(
                engine.verify(&tampered, "sess-1").await.is_err(),
                "mutation at {} accepted",
                i
            );
        }
    }

    #[tokio::test]
    async fn test_wrong_session_rejected() {
        let engine = engine();
        let token = engine.issue("sess-1").await.unwrap();
        // sess-2 has no secret: fail closed.
        assert!(matches!(
            engine.verify(&token, "sess-2").await,
            Err(GuardError::CsrfTokenInvalid)
        ));

        // sess-2 with its own secret still rejects sess-1's token.
        engine.issue("sess-2").await.unwrap();
        assert!(engine.verify(&token, "sess-2").await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_tokens_rejected() {
        let engine = engine();
        engine.issue("sess-1").await.unwrap();
        for bad in ["", "nodot", "salt.nothex!", "a.b.c"] {
            assert!(engine.verify(bad, "sess-1").await.is_err(), "{:?}", bad);
        }
    }

    #[tokio::test]
    async fn test_empty_session_requires_session() {
        let engine = engine();
        assert!(matches!(
            engine.issue("").await,
            Err(GuardError::SessionRequired)
        ));
        assert!(matches!(
            engine.verify("a.b", "").await,
            Err(GuardError::SessionRequired)
        ));
    }

    struct DownStore;

    #[async_trait]
    impl crate::store::SecretStore for DownStore {
        async fn get(&self, _: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn get_or_create(&self, _: &str) -> Result<Vec<u8>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_outage_fails_closed() {
        let engine = TokenEngine::new(Arc::new(DownStore), 250);
        assert!(matches!(
            engine.verify("salt.00", "sess-1").await,
            Err(GuardError::StoreUnavailable(_))
        ));
    }

    #[test]
    fn test_double_submit() {
        assert!(double_submit_verify("abc", "abc").is_ok());
        assert!(matches!(
            double_submit_verify("abc", "abd"),
            Err(GuardError::CsrfTokenInvalid)
        ));
        assert!(matches!(
            double_submit_verify("", "abc"),
            Err(GuardError::CsrfTokenMissing)
        ));
        // Length mismatch must not panic or leak.
        assert!(double_submit_verify("abc", "abcd").is_err());
    }
}
