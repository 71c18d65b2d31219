use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::{Map, Value};

use crate::{
    hosts::{HostRotation, TrafficClass},
    params, BeaconError, ClientOptions, HostFailure, Result,
};

/// Read-timeout growth per attempt once the first two hosts have failed.
const READ_TIMEOUT_STEP: Duration = Duration::from_secs(10);
/// Connect-timeout raise applied to attempts at index 2 and beyond.
const CONNECT_TIMEOUT_RAISE: Duration = Duration::from_secs(2);

/// Outcome of a single attempt against one host.
enum AttemptError {
    /// 4xx from the API. Terminal; the retry loop stops here.
    Client { status: u16, message: String },
    /// Anything else: timeout, connect error, 5xx, malformed body.
    /// Retried on the next host.
    Transient(String),
}

/// Issues requests against the configured host lists with cross-host retry.
///
/// Two connection pools are held per transport: the base pool, and one with
/// the connect timeout raised by 2 seconds for attempts at index 2 and
/// beyond. Selecting a pool per attempt keeps the escalation invisible to
/// concurrent logical requests; nothing shared is mutated or restored.
pub(crate) struct Transport {
    base_pool: reqwest::Client,
    escalated_pool: reqwest::Client,
    options: ClientOptions,
    rotation: Mutex<HostRotation>,
}

impl Transport {
    pub(crate) fn new(
        headers: HeaderMap,
        options: ClientOptions,
        read_hosts: Vec<String>,
        write_hosts: Vec<String>,
    ) -> Result<Self> {
        let base_pool = build_pool(headers.clone(), options.connect_timeout)?;
        let escalated_pool = build_pool(headers, options.connect_timeout + CONNECT_TIMEOUT_RAISE)?;

        let mut rotation = HostRotation::new();
        rotation.set_hosts(TrafficClass::Search, read_hosts)?;
        rotation.set_hosts(TrafficClass::Write, write_hosts)?;

        Ok(Self {
            base_pool,
            escalated_pool,
            options,
            rotation: Mutex::new(rotation),
        })
    }

    pub(crate) fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Runs one logical request: walks the class's host list in order,
    /// escalating timeouts from the third attempt on, rotating the list on
    /// every transient failure, and stopping at the first success or 4xx.
    pub(crate) async fn request(
        &self,
        class: TrafficClass,
        method: Method,
        path: &str,
        query_params: Option<&Map<String, Value>>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let query = query_params
            .map(params::encode_query)
            .filter(|encoded| !encoded.is_empty());

        let hosts = self.current_hosts(class);
        if hosts.is_empty() {
            return Err(BeaconError::Config(format!(
                "no hosts configured for {} traffic",
                class.as_str()
            )));
        }

        let base_timeout = match class {
            TrafficClass::Search => self.options.search_timeout,
            TrafficClass::Write => self.options.write_timeout,
        };

        let mut failures = Vec::new();
        for (attempt, host) in hosts.iter().enumerate() {
            let pool = if attempt > 1 {
                &self.escalated_pool
            } else {
                &self.base_pool
            };
            let read_timeout = read_timeout_for(base_timeout, attempt);

            let outcome = self
                .perform(
                    pool,
                    host,
                    method.clone(),
                    path,
                    query.as_deref(),
                    body,
                    read_timeout,
                )
                .await;

            match outcome {
                Ok(parsed) => return Ok(parsed),
                Err(AttemptError::Client { status, message }) => {
                    return Err(BeaconError::Api { status, message });
                }
                Err(AttemptError::Transient(reason)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(host = %host, reason = %reason, "host attempt failed, rotating list");

                    failures.push(HostFailure {
                        host: host.clone(),
                        reason,
                    });
                    self.record_failure(class);
                }
            }
        }

        Err(BeaconError::UnreachableHosts(failures))
    }

    /// One HTTPS call against one host. Does not touch rotation state.
    async fn perform(
        &self,
        pool: &reqwest::Client,
        host: &str,
        method: Method,
        path: &str,
        query: Option<&str>,
        body: Option<&Value>,
        read_timeout: Duration,
    ) -> std::result::Result<Value, AttemptError> {
        let url = build_url(host, path, query);

        let mut request = pool.request(method, url).timeout(read_timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| AttemptError::Transient(describe_error(&err)))?;
        let status = response.status();

        if status.is_success() {
            response.json::<Value>().await.map_err(|err| {
                AttemptError::Transient(format!("invalid JSON response body: {err}"))
            })
        } else if status.is_client_error() {
            let fallback = format!("HTTP Code: {}", status.as_u16());
            let message = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| {
                    body.get("message")
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                })
                .unwrap_or(fallback);
            Err(AttemptError::Client {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(AttemptError::Transient(format!(
                "HTTP Code: {}",
                status.as_u16()
            )))
        }
    }

    fn current_hosts(&self, class: TrafficClass) -> Vec<String> {
        self.rotation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current_hosts(class)
    }

    fn record_failure(&self, class: TrafficClass) {
        self.rotation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_failure(class);
    }
}

fn build_pool(headers: HeaderMap, connect_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(connect_timeout)
        .build()
        .map_err(BeaconError::Transport)
}

/// Base timeout for the first two attempts, then +10 s per attempt.
fn read_timeout_for(base: Duration, attempt: usize) -> Duration {
    if attempt > 1 {
        base + READ_TIMEOUT_STEP * (attempt as u32 - 1)
    } else {
        base
    }
}

/// Hosts default to HTTPS; an explicit scheme prefix is used verbatim so
/// local proxies and test servers can be targeted.
fn build_url(host: &str, path: &str, query: Option<&str>) -> String {
    let mut url = if host.starts_with("http://") || host.starts_with("https://") {
        format!("{host}{path}")
    } else {
        format!("https://{host}{path}")
    };
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    url
}

fn describe_error(err: &reqwest::Error) -> String {
    let mut reason = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    reason
}
