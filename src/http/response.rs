//! HTTP response building module
//!
//! Provides builders for the status codes the server emits, decoupled from page content.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use serde::Serialize;

/// Build 404 Not Found response
pub fn build_404_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(404)
        .header("Content-Type", "text/plain")
        .body(Full::new(Bytes::from("404 Not Found")))
        .unwrap_or_else(|e| {
            log_build_error("404", &e);
            Response::new(Full::new(Bytes::from("404 Not Found")))
        })
}

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(405)
        .header("Content-Type", "text/plain")
        .header("Allow", "GET, HEAD")
        .body(Full::new(Bytes::from("405 Method Not Allowed")))
        .unwrap_or_else(|e| {
            log_build_error("405", &e);
            Response::new(Full::new(Bytes::from("405 Method Not Allowed")))
        })
}

/// Build plain-text 200 response (health checks)
pub fn build_text_response(body: &'static str, is_head: bool) -> Response<Full<Bytes>> {
    build_ok_response(
        Bytes::from_static(body.as_bytes()),
        "text/plain; charset=utf-8",
        is_head,
    )
}

/// Build generic HTML response
pub fn build_html_response(content: String, is_head: bool) -> Response<Full<Bytes>> {
    build_ok_response(Bytes::from(content), "text/html; charset=utf-8", is_head)
}

/// Build JSON response, falling back to 500 if serialization fails
pub fn build_json_response<T: Serialize>(body: &T, is_head: bool) -> Response<Full<Bytes>> {
    match serde_json::to_vec_pretty(body) {
        Ok(json) => build_ok_response(Bytes::from(json), "application/json", is_head),
        Err(e) => {
            crate::logger::log_error(&format!("Failed to serialize response: {e}"));
            Response::builder()
                .status(500)
                .header("Content-Type", "application/json")
                .body(Full::new(Bytes::from(r#"{"error":"Internal server error"}"#)))
                .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("Error"))))
        }
    }
}

fn build_ok_response(data: Bytes, content_type: &str, is_head: bool) -> Response<Full<Bytes>> {
    let content_length = data.len();
    let body = if is_head { Bytes::new() } else { data };

    Response::builder()
        .status(200)
        .header("Content-Type", content_type)
        .header("Content-Length", content_length)
        .header("Cache-Control", "no-store")
        .body(Full::new(body))
        .unwrap_or_else(|e| {
            log_build_error("200", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
