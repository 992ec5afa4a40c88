//! Request routing dispatch module
//!
//! Entry point for HTTP request processing, responsible for method validation,
//! client address resolution, route matching, and access logging.

use chrono::Local;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, REFERER, USER_AGENT};
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use super::pages::{self, DevicesResponse};
use crate::config::AppState;
use crate::device;
use crate::http;
use crate::logger::{self, AccessLogEntry};

pub const DEVICE_PATH: &str = "/";
pub const ALL_DEVICES_PATH: &str = "/all-devices";
pub const HEALTH_PATH: &str = "/healthz";

/// Request context encapsulating information needed for request processing
pub struct RequestContext<'a> {
    pub path: &'a str,
    pub is_head: bool,
    pub client_ip: IpAddr,
    pub user_agent: Option<String>,
}

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let method = req.method();
    let uri = req.uri();
    let headers = req.headers();

    let ctx = RequestContext {
        path: uri.path(),
        is_head: *method == Method::HEAD,
        client_ip: client_ip(headers, peer_addr, state.config.server.trust_forwarded_for),
        user_agent: header_string(headers, USER_AGENT.as_str()),
    };

    let response = if *method == Method::GET || *method == Method::HEAD {
        route_request(&ctx, &state).await
    } else {
        logger::log_warning(&format!("Method not allowed: {method} {}", ctx.path));
        http::build_405_response()
    };

    if state.cached_access_log.load(Ordering::Relaxed) {
        let mut entry = AccessLogEntry::new(
            ctx.client_ip.to_string(),
            method.to_string(),
            ctx.path.to_string(),
        );
        entry.query = uri.query().map(ToString::to_string);
        entry.http_version = http_version(req.version()).to_string();
        entry.status = response.status().as_u16();
        entry.body_bytes = content_length(&response);
        entry.referer = header_string(headers, REFERER.as_str());
        entry.user_agent.clone_from(&ctx.user_agent);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Route request based on path
async fn route_request(ctx: &RequestContext<'_>, state: &Arc<AppState>) -> Response<Full<Bytes>> {
    match ctx.path {
        DEVICE_PATH => serve_device_page(ctx, state).await,
        ALL_DEVICES_PATH => {
            http::build_json_response(&DevicesResponse::from_registry(&state.registry), ctx.is_head)
        }
        HEALTH_PATH => http::build_text_response("ok", ctx.is_head),
        _ => http::build_404_response(),
    }
}

/// Resolve the visitor's MAC, record the visit and render their page
async fn serve_device_page(
    ctx: &RequestContext<'_>,
    state: &Arc<AppState>,
) -> Response<Full<Bytes>> {
    let mac = device::resolve_or_fallback(&state.config.arp, ctx.client_ip).await;

    let is_new = state.registry.get(&ctx.client_ip).is_none();
    let record = state
        .registry
        .record_visit(ctx.client_ip, mac, ctx.user_agent.clone(), Local::now());
    if is_new {
        logger::log_new_device(&record.ip, &record.mac);
    }

    http::build_html_response(pages::render_device_page(&record), ctx.is_head)
}

/// Determine the client address for a request.
///
/// The TCP peer is authoritative unless `trust_forwarded_for` is set, in which case
/// the left-most parseable `X-Forwarded-For` entry wins.
pub fn client_ip(headers: &HeaderMap, peer_addr: SocketAddr, trust_forwarded_for: bool) -> IpAddr {
    let forwarded = trust_forwarded_for
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());

    forwarded.unwrap_or_else(|| peer_addr.ip()).to_canonical()
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn content_length(response: &Response<Full<Bytes>>) -> usize {
    response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn http_version(version: hyper::Version) -> &'static str {
    if version == hyper::Version::HTTP_10 {
        "1.0"
    } else if version == hyper::Version::HTTP_2 {
        "2"
    } else {
        "1.1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::BodyExt;

    fn test_state() -> Arc<AppState> {
        let mut cfg = Config::load_from("does-not-exist/devscope").unwrap();
        cfg.logging.access_log = false;
        Arc::new(AppState::new(&cfg))
    }

    fn request(method: Method, path: &str) -> Request<()> {
        Request::builder()
            .method(method)
            .uri(path)
            .header("user-agent", "devscope-test/1.0")
            .body(())
            .unwrap()
    }

    fn run(
        req: Request<()>,
        peer: &str,
        state: &Arc<AppState>,
    ) -> (u16, String) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let resp = handle_request(req, peer.parse().unwrap(), Arc::clone(state))
                .await
                .unwrap();
            let status = resp.status().as_u16();
            let body = resp.into_body().collect().await.unwrap().to_bytes();
            (status, String::from_utf8(body.to_vec()).unwrap())
        })
    }

    #[test]
    fn test_device_page_records_visit() {
        let state = test_state();
        let (status, body) = run(request(Method::GET, "/"), "127.0.0.1:50000", &state);

        assert_eq!(status, 200);
        assert!(body.contains("<strong>IP address:</strong> 127.0.0.1"));
        assert!(body.contains("<strong>MAC address:</strong> Unknown"));
        assert!(body.contains("devscope-test/1.0"));

        let record = state.registry.get(&"127.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(record.mac, "Unknown");
        assert_eq!(record.user_agent.as_deref(), Some("devscope-test/1.0"));
    }

    #[test]
    fn test_repeat_visit_overwrites_record() {
        let state = test_state();
        run(request(Method::GET, "/"), "127.0.0.1:50000", &state);

        let req = Request::builder()
            .uri("/")
            .header("user-agent", "other-agent/2.0")
            .body(())
            .unwrap();
        run(req, "127.0.0.1:50001", &state);

        assert_eq!(state.registry.len(), 1);
        let record = state.registry.get(&"127.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(record.user_agent.as_deref(), Some("other-agent/2.0"));
        assert_eq!(record.visits, 2);
    }

    #[test]
    fn test_all_devices_route() {
        let state = test_state();
        let (status, body) = run(request(Method::GET, "/all-devices"), "127.0.0.1:50000", &state);
        assert_eq!(status, 200);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value, serde_json::json!({"devices": []}));

        run(request(Method::GET, "/"), "127.0.0.1:50000", &state);
        let (_, body) = run(request(Method::GET, "/all-devices"), "127.0.0.1:50000", &state);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["devices"][0]["ip"], "127.0.0.1");
        assert_eq!(value["devices"][0]["mac"], "Unknown");
    }

    #[test]
    fn test_all_devices_does_not_record() {
        let state = test_state();
        run(request(Method::GET, "/all-devices"), "127.0.0.1:50000", &state);
        assert!(state.registry.is_empty());
    }

    #[test]
    fn test_head_request_has_empty_body() {
        let state = test_state();
        let (status, body) = run(request(Method::HEAD, "/"), "127.0.0.1:50000", &state);
        assert_eq!(status, 200);
        assert!(body.is_empty());
    }

    #[test]
    fn test_health_and_unknown_paths() {
        let state = test_state();
        assert_eq!(
            run(request(Method::GET, "/healthz"), "127.0.0.1:50000", &state),
            (200, "ok".to_string())
        );
        assert_eq!(
            run(request(Method::GET, "/set-address"), "127.0.0.1:50000", &state).0,
            404
        );
    }

    #[test]
    fn test_post_is_rejected() {
        let state = test_state();
        let (status, _) = run(request(Method::POST, "/"), "127.0.0.1:50000", &state);
        assert_eq!(status, 405);
        assert!(state.registry.is_empty());
    }

    #[test]
    fn test_client_ip_prefers_peer_by_default() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        let peer: SocketAddr = "192.168.1.10:40000".parse().unwrap();

        assert_eq!(
            client_ip(&headers, peer, false),
            "192.168.1.10".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_client_ip_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "192.168.1.44, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        assert_eq!(
            client_ip(&headers, peer, true),
            "192.168.1.44".parse::<IpAddr>().unwrap()
        );

        headers.insert("x-forwarded-for", "garbage".parse().unwrap());
        assert_eq!(
            client_ip(&headers, peer, true),
            "127.0.0.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_client_ip_unmaps_ipv4() {
        let peer: SocketAddr = "[::ffff:192.168.1.10]:40000".parse().unwrap();
        assert_eq!(
            client_ip(&HeaderMap::new(), peer, false),
            "192.168.1.10".parse::<IpAddr>().unwrap()
        );
    }
}
