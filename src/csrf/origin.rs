//! Origin validation for unsafe methods.
//!
//! Requires an `Origin` header (falling back to `Referer`) that matches
//! either the explicit allow-list or the request's own host. Absence of
//! both headers is a hard failure: ambiguity is treated as attack, not
//! misconfiguration.

use url::Url;

use crate::error::{GuardError, GuardResult};

/// Validate the request's origin against the allow-list and host.
///
/// `host` is the request's `Host` header value ("example.com" or
/// "example.com:8443"). Allow-list entries are full origins like
/// "https://app.example.com".
pub fn validate_origin(
    origin: Option<&str>,
    referer: Option<&str>,
    allowed_origins: &[String],
    host: Option<&str>,
) -> GuardResult<()> {
    let candidate = match origin {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => match referer.and_then(origin_of) {
            Some(derived) => derived,
            None => {
                return Err(GuardError::InvalidOrigin(
                    "missing Origin and Referer headers".to_string(),
                ))
            }
        },
    };

    // "Origin: null" (sandboxed frames, some redirects) never matches.
    let parsed = Url::parse(&candidate)
        .map_err(|_| GuardError::InvalidOrigin(format!("unparseable origin '{}'", candidate)))?;

    let candidate_origin = url_origin(&parsed)
        .ok_or_else(|| GuardError::InvalidOrigin(format!("opaque origin '{}'", candidate)))?;

    for allowed in allowed_origins {
        if let Ok(url) = Url::parse(allowed) {
            if url_origin(&url).as_deref() == Some(candidate_origin.as_str()) {
                return Ok(());
            }
        }
    }

    // Same-host requests are always acceptable, whatever the scheme the
    // terminating proxy used.
    if let Some(host) = host {
        if authority_of(&parsed).as_deref() == Some(host) {
            return Ok(());
        }
    }

    Err(GuardError::InvalidOrigin(format!(
        "origin '{}' not allowed",
        candidate_origin
    )))
}

/// Reduce a Referer URL to its origin, e.g.
/// "https://a.example.com/page?x=1" → "https://a.example.com".
fn origin_of(referer: &str) -> Option<String> {
    let url = Url::parse(referer).ok()?;
    url_origin(&url)
}

fn url_origin(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{}://{}:{}", url.scheme(), host, port)),
        None => Some(format!("{}://{}", url.scheme(), host)),
    }
}

/// "host" or "host:port" as browsers put it in the Host header.
fn authority_of(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec!["https://app.example.com".to_string()]
    }

    #[test]
    fn test_allowed_origin_accepted() {
        assert!(validate_origin(
            Some("https://app.example.com"),
            None,
            &allowed(),
            Some("api.example.com"),
        )
        .is_ok());
    }

    #[test]
    fn test_evil_origin_rejected() {
        let err = validate_origin(
            Some("https://evil.com"),
            None,
            &allowed(),
            Some("api.example.com"),
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_ORIGIN");
    }

    #[test]
    fn test_missing_both_headers_is_hard_failure() {
        let err = validate_origin(None, None, &allowed(), Some("api.example.com")).unwrap_err();
        assert_eq!(err.code(), "INVALID_ORIGIN");
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_referer_fallback() {
        assert!(validate_origin(
            None,
            Some("https://app.example.com/settings?tab=2"),
            &allowed(),
            None,
        )
        .is_ok());

        assert!(validate_origin(
            None,
            Some("https://evil.com/page"),
            &allowed(),
            None,
        )
        .is_err());
    }

    #[test]
    fn test_same_host_accepted() {
        assert!(validate_origin(
            Some("http://localhost:8080"),
            None,
            &[],
            Some("localhost:8080"),
        )
        .is_ok());

        assert!(validate_origin(
            Some("http://localhost:9999"),
            None,
            &[],
            Some("localhost:8080"),
        )
        .is_err());
    }

    #[test]
    fn test_null_origin_rejected() {
        assert!(validate_origin(Some("null"), None, &allowed(), None).is_err());
    }

    #[test]
    fn test_port_sensitivity() {
        let allowed = vec!["https://app.example.com:8443".to_string()];
        assert!(validate_origin(Some("https://app.example.com:8443"), None, &allowed, None).is_ok());
        assert!(validate_origin(Some("https://app.example.com"), None, &allowed, None).is_err());
    }
}
