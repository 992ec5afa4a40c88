//! MAC address resolution via the system ARP table
//!
//! The `arp` tool prints a different layout on every platform:
//! - Linux:   `192.168.1.10  ether  aa:bb:cc:dd:ee:ff  C  eth0`
//! - BSD/mac: `? (192.168.1.10) at a:b:c:d:e:f on en0 ifscope [ethernet]`
//! - Windows: `  192.168.1.10   aa-bb-cc-dd-ee-ff   dynamic`
//!
//! Rather than relying on column positions, the line naming the peer is
//! located first and the MAC is pulled out of it with a regex.

use regex::Regex;
use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;

use super::error::LookupError;
use crate::config::ArpConfig;
use crate::logger;

static MAC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[0-9A-Fa-f]{1,2}[:-]){5}[0-9A-Fa-f]{1,2}\b").expect("MAC regex is valid")
});

/// Extract the MAC address for `ip` from raw ARP tool output.
///
/// Returns the address as lowercase, colon-separated, zero-padded octets.
/// Lines that do not name `ip` as a whole token are ignored, so
/// `192.168.1.1` never matches an entry for `192.168.1.10`.
pub fn extract_mac(output: &str, ip: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| mentions_ip(line, ip))
        .find_map(|line| MAC_PATTERN.find(line).and_then(|m| normalize_mac(m.as_str())))
}

fn mentions_ip(line: &str, ip: &str) -> bool {
    line.split_whitespace()
        .any(|token| token.trim_matches(|c| c == '(' || c == ')') == ip)
}

/// Normalize `a:b:c:d:e:f` / `AA-BB-CC-DD-EE-FF` into `0a:0b:0c:0d:0e:0f` form.
///
/// The all-zero address is what Linux reports for unresolved neighbours.
fn normalize_mac(raw: &str) -> Option<String> {
    let octets = raw
        .split([':', '-'])
        .map(|part| u8::from_str_radix(part, 16))
        .collect::<Result<Vec<u8>, _>>()
        .ok()?;

    if octets.len() != 6 || octets.iter().all(|&b| b == 0) {
        return None;
    }

    Some(
        octets
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":"),
    )
}

/// Look up the MAC address of `ip` by running the configured ARP program.
pub async fn lookup_mac(settings: &ArpConfig, ip: IpAddr) -> Result<String, LookupError> {
    let ip = ip.to_canonical();
    if !ip.is_ipv4() || ip.is_loopback() || ip.is_unspecified() {
        return Err(LookupError::Unsupported(ip));
    }

    let ip_str = ip.to_string();
    let flag = if cfg!(windows) { "-a" } else { "-n" };
    let timeout = Duration::from_millis(settings.timeout_ms);

    let mut cmd = Command::new(&settings.program);
    cmd.arg(flag).arg(&ip_str).kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(LookupError::Spawn {
                program: settings.program.clone(),
                source,
            })
        }
        Err(_) => {
            return Err(LookupError::Timeout {
                program: settings.program.clone(),
                timeout,
            })
        }
    };

    // `arp -n <ip>` exits non-zero when the entry is missing on some platforms,
    // but still prints usable output on others; only bail when there is nothing to parse.
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() && stdout.trim().is_empty() {
        return Err(LookupError::ExitStatus {
            program: settings.program.clone(),
            status: output.status,
        });
    }

    extract_mac(&stdout, &ip_str).ok_or(LookupError::NotFound(ip))
}

/// Resolve the MAC for `ip`, degrading to the configured fallback on any failure.
pub async fn resolve_or_fallback(settings: &ArpConfig, ip: IpAddr) -> String {
    match lookup_mac(settings, ip).await {
        Ok(mac) => mac,
        Err(e @ (LookupError::Unsupported(_) | LookupError::NotFound(_))) => {
            logger::log_debug(&format!("[ARP] {e}"));
            settings.fallback.clone()
        }
        Err(e) => {
            logger::log_warning(&format!("[ARP] {e}"));
            settings.fallback.clone()
        }
    }
}
