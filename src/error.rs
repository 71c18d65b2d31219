use std::fmt;

/// One host's failure reason, recorded in trial order while the retry loop
/// walked the host list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostFailure {
    /// Host that was attempted.
    pub host: String,
    /// Human-readable description of what went wrong on that host.
    pub reason: String,
}

impl fmt::Display for HostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.host, self.reason)
    }
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum BeaconError {
    /// Missing or empty host list, or otherwise invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// A payload rejected client-side before anything was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// 4xx response from the API. Terminal for the logical request; never
    /// retried on another host.
    #[error("api error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// `message` field of the error body, or `HTTP Code: N` when the
        /// body was not parseable.
        message: String,
    },
    /// Every host in the traffic class's list failed transiently. Carries
    /// one entry per attempted host, in the order they were tried.
    #[error("unreachable hosts: {}", format_failures(.0))]
    UnreachableHosts(Vec<HostFailure>),
    /// Response shape error: a field the client must read was absent.
    #[error("decode error: {0}")]
    Decode(String),
    /// Connection-pool construction failure at client build time.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// The blocking facade could not construct its runtime.
    #[error("runtime error: {0}")]
    Runtime(std::io::Error),
}

fn format_failures(failures: &[HostFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
