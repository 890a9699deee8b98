use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use serde::{Deserialize, Serialize};

/// Raised if the upstream address cannot be resolved.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Raised if the DNS lookup for an upstream host failed.
    #[error("dns lookup failed")]
    LookupFailed(#[source] io::Error),
    /// Raised if the DNS lookup succeeded but an empty result was returned.
    #[error("dns lookup returned no results")]
    EmptyLookupResult,
}

/// The collector that receives flushed payloads.
///
/// Payloads are sent with a plain HTTP `POST` to `http://<host>:<port><path>`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamDescriptor {
    /// Host name or IP address of the collector.
    pub host: String,
    /// Port of the collector.
    pub port: u16,
    /// Request path of the ingest endpoint.
    pub path: String,
}

impl UpstreamDescriptor {
    /// Returns the URL payloads are posted to.
    pub fn url(&self) -> String {
        self.to_string()
    }

    /// Returns the socket address of the upstream.
    ///
    /// This performs a DNS lookup and can fail.
    pub fn socket_addr(&self) -> Result<SocketAddr, UpstreamError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(UpstreamError::LookupFailed)?
            .next()
            .ok_or(UpstreamError::EmptyLookupResult)
    }
}

impl Default for UpstreamDescriptor {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 8001,
            path: "/v1/data".to_owned(),
        }
    }
}

impl fmt::Display for UpstreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}:{}", self.host, self.port)?;
        if !self.path.starts_with('/') {
            f.write_str("/")?;
        }
        f.write_str(&self.path)
    }
}
