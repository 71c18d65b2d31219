//! `beacon-search` is an async HTTP client for the Beacon hosted search API.
//!
//! Every call goes through one retrying transport: hosts from the matching
//! traffic-class list (search or write) are tried in order, read and connect
//! timeouts escalate from the third attempt on, and a transiently failing
//! host is rotated to the back of its list for five minutes before the
//! original preference order is tried again.
//!
//! Entry points:
//! - [`BeaconClient`] — application-level operations and index handles
//! - [`BeaconIndex`] — per-index search, object, settings and synonym calls
//! - [`blocking`] — synchronous counterparts over an owned runtime

pub mod blocking;
mod browse;
mod client;
mod error;
mod hosts;
mod index;
mod options;
mod params;
mod transport;

pub use browse::BrowseIter;
pub use client::BeaconClient;
pub use error::{BeaconError, HostFailure};
pub use index::BeaconIndex;
pub use options::ClientOptions;

pub type Result<T> = std::result::Result<T, BeaconError>;
