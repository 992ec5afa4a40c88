//! Device lookup error types

use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Reasons a MAC address could not be resolved for a peer
#[derive(Debug, Error)]
pub enum LookupError {
    /// ARP only covers IPv4 neighbours on the local segment
    #[error("ARP lookup is not supported for {0}")]
    Unsupported(IpAddr),

    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}")]
    ExitStatus {
        program: String,
        status: std::process::ExitStatus,
    },

    #[error("`{program}` did not finish within {}ms", .timeout.as_millis())]
    Timeout { program: String, timeout: Duration },

    /// The ARP table has no usable entry for the address
    #[error("no ARP entry for {0}")]
    NotFound(IpAddr),
}
