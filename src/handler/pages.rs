//! Page rendering for the device routes

use serde::Serialize;

use crate::device::{DeviceRecord, DeviceRegistry};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Body of `GET /all-devices`
#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceRecord>,
}

impl DevicesResponse {
    pub fn from_registry(registry: &DeviceRegistry) -> Self {
        Self {
            devices: registry.snapshot(),
        }
    }
}

/// Render the device information page for the visitor's own record
pub fn render_device_page(record: &DeviceRecord) -> String {
    let user_agent = record.user_agent.as_deref().unwrap_or("-");
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Device Info</title>
</head>
<body>
    <h1>Device information</h1>
    <p><strong>IP address:</strong> {ip}</p>
    <p><strong>MAC address:</strong> {mac}</p>
    <p><strong>Request time:</strong> {time}</p>
    <p><strong>User agent:</strong> {user_agent}</p>
    <p><strong>Visits:</strong> {visits}</p>
</body>
</html>
"#,
        ip = record.ip,
        mac = escape_html(&record.mac),
        time = record.last_seen.format(TIME_FORMAT),
        user_agent = escape_html(user_agent),
        visits = record.visits,
    )
}

/// Escape text for interpolation into HTML element content or attributes
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
