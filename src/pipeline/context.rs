//! Request context extraction.
//!
//! Pulls the security-relevant facts out of the raw request once, up
//! front, so the rest of the pipeline works on plain data.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::header;
use axum::http::Request;

use crate::audit::ClientContext;

/// Authenticated principal, inserted by an upstream auth layer via
/// request extensions. The core never authenticates anyone itself.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Security-relevant facts extracted from one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub ip: IpAddr,
    pub method: String,
    pub path: String,
    pub host: Option<String>,
    pub origin: Option<String>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub csrf_header: Option<String>,
    pub csrf_cookie: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Extract from a request. `csrf_header_name`, `csrf_cookie_name`
    /// and `session_cookie_name` come from configuration.
    pub fn from_request<B>(
        req: &Request<B>,
        csrf_header_name: &str,
        csrf_cookie_name: &str,
        session_cookie_name: &str,
    ) -> Self {
        let headers = req.headers();
        let cookies = headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        Self {
            ip: client_ip(req),
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            host: header_str(req, header::HOST.as_str()),
            origin: header_str(req, header::ORIGIN.as_str()),
            referer: header_str(req, header::REFERER.as_str()),
            user_agent: header_str(req, header::USER_AGENT.as_str()),
            session_id: cookie_value(cookies, session_cookie_name),
            user_id: req
                .extensions()
                .get::<AuthUser>()
                .map(|u| u.user_id.clone()),
            csrf_header: header_str(req, csrf_header_name),
            csrf_cookie: cookie_value(cookies, csrf_cookie_name),
            request_id: header_str(req, "x-request-id"),
        }
    }

    /// The slice of context that travels on audit events.
    pub fn client(&self) -> ClientContext {
        ClientContext {
            ip: self.ip,
            method: self.method.clone(),
            path: self.path.clone(),
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            user_agent: self.user_agent.clone(),
            request_id: self.request_id.clone(),
        }
    }
}

fn header_str<B>(req: &Request<B>, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Resolve the client IP: X-Forwarded-For chain head, then X-Real-IP,
/// then the socket peer address.
fn client_ip<B>(req: &Request<B>) -> IpAddr {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return ip;
            }
        }
    }

    if let Some(real_ip) = req
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
    {
        if let Ok(ip) = real_ip.trim().parse() {
            return ip;
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Pull one cookie's value out of a Cookie header.
fn cookie_value(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        if key == name && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}
