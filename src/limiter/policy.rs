//! Route policy matching and key derivation.

use std::net::IpAddr;

use crate::config::schema::{KeyStrategy, RoutePolicy};

/// Identity facts a policy may key on, extracted by the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct KeyContext<'a> {
    pub ip: IpAddr,
    pub user_id: Option<&'a str>,
    pub path: &'a str,
    /// Value of the policy's identity header, when present.
    pub identity: Option<&'a str>,
}

/// Ordered view over the configured route policies.
pub struct PolicyTable<'a> {
    policies: &'a [RoutePolicy],
}

impl<'a> PolicyTable<'a> {
    pub fn new(policies: &'a [RoutePolicy]) -> Self {
        Self { policies }
    }

    /// Longest matching path prefix wins; method filter applies first.
    pub fn match_route(&self, path: &str, method: &str) -> Option<&'a RoutePolicy> {
        self.policies
            .iter()
            .filter(|p| {
                p.methods.is_empty()
                    || p.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
            })
            .filter(|p| path.starts_with(p.path_prefix.as_str()))
            .max_by_key(|p| p.path_prefix.len())
    }
}

/// Build the store key for a policy and client.
///
/// Keys are namespaced by policy name so two policies never share a
/// window even when they key on the same identity.
pub fn limit_key(policy: &RoutePolicy, ctx: &KeyContext<'_>) -> String {
    let identity = match policy.key_by {
        KeyStrategy::Ip => ctx.ip.to_string(),
        KeyStrategy::User => ctx
            .user_id
            .map(|u| format!("user:{}", u))
            .unwrap_or_else(|| ctx.ip.to_string()),
        KeyStrategy::IpAndPath => format!("{}:{}", ctx.ip, ctx.path),
        KeyStrategy::IdentityHeader => ctx
            .identity
            .map(|v| format!("id:{}", v.to_ascii_lowercase()))
            .unwrap_or_else(|| ctx.ip.to_string()),
    };
    format!("rl:{}:{}", policy.name, identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::GuardConfig;

    fn ctx(path: &str) -> KeyContext<'_> {
        KeyContext {
            ip: "10.0.0.1".parse().unwrap(),
            user_id: None,
            path,
            identity: None,
        }
    }

    #[test]
    fn test_longest_prefix_wins() {
        let config = GuardConfig::default();
        let table = PolicyTable::new(&config.rate_limit.policies);

        let policy = table.match_route("/api/auth/login", "POST").unwrap();
        assert_eq!(policy.name, "auth");

        let policy = table
            .match_route("/api/auth/password-reset", "POST")
            .unwrap();
        assert_eq!(policy.name, "password-reset");

        let policy = table.match_route("/api/things", "GET").unwrap();
        assert_eq!(policy.name, "general-api");
    }

    #[test]
    fn test_method_filter() {
        let config = GuardConfig::default();
        let table = PolicyTable::new(&config.rate_limit.policies);

        // auth policy is POST-only; GET falls through to general-api.
        let policy = table.match_route("/api/auth/login", "GET").unwrap();
        assert_eq!(policy.name, "general-api");
    }

    #[test]
    fn test_no_match_outside_prefixes() {
        let config = GuardConfig::default();
        let table = PolicyTable::new(&config.rate_limit.policies);
        assert!(table.match_route("/healthz", "GET").is_none());
    }

    #[test]
    fn test_key_namespacing() {
        let config = GuardConfig::default();
        let auth = &config.rate_limit.policies[1];
        let key = limit_key(auth, &ctx("/api/auth/login"));
        assert_eq!(key, "rl:auth:10.0.0.1");
    }

    #[test]
    fn test_identity_header_key_falls_back_to_ip() {
        let config = GuardConfig::default();
        let reset = config
            .rate_limit
            .policies
            .iter()
            .find(|p| p.name == "password-reset")
            .unwrap();

        let mut c = ctx("/api/auth/password-reset");
        c.identity = Some("User@Example.com");
        assert_eq!(
            limit_key(reset, &c),
            "rl:password-reset:id:user@example.com"
        );

        c.identity = None;
        assert_eq!(limit_key(reset, &c), "rl:password-reset:10.0.0.1");
    }

    #[test]
    fn test_user_key_falls_back_to_ip() {
        let config = GuardConfig::default();
        let mut policy = config.rate_limit.policies[0].clone();
        policy.key_by = KeyStrategy::User;

        let mut c = ctx("/api/things");
        assert_eq!(limit_key(&policy, &c), "rl:general-api:10.0.0.1");
        c.user_id = Some("u-77");
        assert_eq!(limit_key(&policy, &c), "rl:general-api:user:u-77");
    }
}
