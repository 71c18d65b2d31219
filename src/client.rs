use std::fmt;
use std::sync::Arc;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::{json, Map, Value};

use crate::{
    hosts::TrafficClass, params::encode_path_segment, params::encode_query, transport::Transport,
    BeaconError, BeaconIndex, ClientOptions, Result,
};

const APPLICATION_ID_HEADER: &str = "x-beacon-application-id";
const API_KEY_HEADER: &str = "x-beacon-api-key";
const USER_AGENT: &str = concat!("Beacon for Rust (", env!("CARGO_PKG_VERSION"), ")");

/// Derives the default host lists from an application id.
///
/// Reads prefer the DSN endpoint and writes the primary endpoint; both fall
/// back to the same three shared-cluster hosts, in a fixed order so failover
/// behavior stays deterministic.
fn default_hosts(app_id: &str) -> (Vec<String>, Vec<String>) {
    let fallbacks: Vec<String> = (1..=3)
        .map(|i| format!("{app_id}-{i}.beaconnet.com"))
        .collect();

    let mut read = vec![format!("{app_id}-dsn.beacon.net")];
    read.extend(fallbacks.iter().cloned());

    let mut write = vec![format!("{app_id}.beacon.net")];
    write.extend(fallbacks);

    (read, write)
}

/// Async client for the Beacon search API.
///
/// All operations go through one shared transport that retries across the
/// configured hosts; see the crate docs for the failover behavior. The
/// client is cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct BeaconClient {
    transport: Arc<Transport>,
    app_id: String,
    api_key: String,
    headers: HeaderMap,
    options: ClientOptions,
    read_hosts: Vec<String>,
    write_hosts: Vec<String>,
}

impl fmt::Debug for BeaconClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeaconClient")
            .field("app_id", &self.app_id)
            .field("api_key", &"<redacted>")
            .field("read_hosts", &self.read_hosts)
            .field("write_hosts", &self.write_hosts)
            .field("options", &self.options)
            .finish()
    }
}

impl BeaconClient {
    /// Creates a client with the default host lists derived from the
    /// application id.
    pub fn new(app_id: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let app_id = app_id.into();
        let (read_hosts, write_hosts) = default_hosts(&app_id);
        Self::build(app_id, api_key.into(), read_hosts, write_hosts)
    }

    /// Creates a client using the same explicit host list for search and
    /// write traffic.
    pub fn with_hosts(
        app_id: impl Into<String>,
        api_key: impl Into<String>,
        hosts: Vec<String>,
    ) -> Result<Self> {
        Self::build(app_id.into(), api_key.into(), hosts.clone(), hosts)
    }

    /// Creates a client with separate search and write host lists.
    pub fn with_read_write_hosts(
        app_id: impl Into<String>,
        api_key: impl Into<String>,
        read_hosts: Vec<String>,
        write_hosts: Vec<String>,
    ) -> Result<Self> {
        Self::build(app_id.into(), api_key.into(), read_hosts, write_hosts)
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `BEACON_APPLICATION_ID` — the application id
    /// - `BEACON_API_KEY` — the API key
    ///
    /// Returns an error if either variable is missing or empty.
    pub fn from_env() -> Result<Self> {
        let app_id = std::env::var("BEACON_APPLICATION_ID").map_err(|_| {
            BeaconError::Config("missing BEACON_APPLICATION_ID environment variable".to_owned())
        })?;
        let api_key = std::env::var("BEACON_API_KEY").map_err(|_| {
            BeaconError::Config("missing BEACON_API_KEY environment variable".to_owned())
        })?;
        if app_id.trim().is_empty() {
            return Err(BeaconError::Config(
                "BEACON_APPLICATION_ID is set but empty".to_owned(),
            ));
        }
        if api_key.trim().is_empty() {
            return Err(BeaconError::Config(
                "BEACON_API_KEY is set but empty".to_owned(),
            ));
        }
        Self::new(app_id, api_key)
    }

    fn build(
        app_id: String,
        api_key: String,
        read_hosts: Vec<String>,
        write_hosts: Vec<String>,
    ) -> Result<Self> {
        if app_id.trim().is_empty() {
            return Err(BeaconError::Config(
                "application id must not be empty".to_owned(),
            ));
        }

        let headers = default_headers(&app_id, &api_key)?;
        let options = ClientOptions::default();
        let transport = Transport::new(
            headers.clone(),
            options.clone(),
            read_hosts.clone(),
            write_hosts.clone(),
        )?;

        Ok(Self {
            transport: Arc::new(transport),
            app_id,
            api_key,
            headers,
            options,
            read_hosts,
            write_hosts,
        })
    }

    /// Applies custom timeouts and polling options.
    ///
    /// Connection pools carry their connect timeout, so this rebuilds the
    /// transport; host rotation state starts fresh.
    pub fn with_options(mut self, options: ClientOptions) -> Result<Self> {
        self.options = options;
        self.rebuild_transport()?;
        Ok(self)
    }

    /// Adds headers sent with every request, on top of the defaults.
    pub fn with_extra_headers<I, K, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in pairs {
            let name = HeaderName::from_bytes(name.as_ref().as_bytes())
                .map_err(|err| BeaconError::Config(format!("invalid header name: {err}")))?;
            let value = HeaderValue::from_str(value.as_ref())
                .map_err(|err| BeaconError::Config(format!("invalid header value: {err}")))?;
            self.headers.insert(name, value);
        }
        self.rebuild_transport()?;
        Ok(self)
    }

    fn rebuild_transport(&mut self) -> Result<()> {
        self.transport = Arc::new(Transport::new(
            self.headers.clone(),
            self.options.clone(),
            self.read_hosts.clone(),
            self.write_hosts.clone(),
        )?);
        Ok(())
    }

    /// Application id this client was built for.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Returns a handle to one index, sharing this client's transport.
    pub fn init_index(&self, name: impl Into<String>) -> BeaconIndex {
        BeaconIndex::new(Arc::clone(&self.transport), name)
    }

    /// Lists every index of the application.
    pub async fn list_indexes(&self) -> Result<Value> {
        self.transport
            .request(TrafficClass::Search, Method::GET, "/1/indexes", None, None)
            .await
    }

    /// Deletes an index and all of its records.
    pub async fn delete_index(&self, name: &str) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Write,
                Method::DELETE,
                &format!("/1/indexes/{}", encode_path_segment(name)),
                None,
                None,
            )
            .await
    }

    /// Copies an index (records, settings, synonyms) to a new name.
    pub async fn copy_index(&self, source: &str, destination: &str) -> Result<Value> {
        self.index_operation("copy", source, destination).await
    }

    /// Renames an index.
    pub async fn move_index(&self, source: &str, destination: &str) -> Result<Value> {
        self.index_operation("move", source, destination).await
    }

    async fn index_operation(&self, operation: &str, source: &str, destination: &str) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Write,
                Method::POST,
                &format!("/1/indexes/{}/operation", encode_path_segment(source)),
                None,
                Some(&json!({ "operation": operation, "destination": destination })),
            )
            .await
    }

    /// Runs several queries in one call.
    ///
    /// Each query is an object carrying an `indexName` plus its search
    /// parameters, e.g. `{"indexName": "products", "query": "phone"}`.
    pub async fn multiple_queries(
        &self,
        queries: &[Value],
        strategy: Option<&str>,
    ) -> Result<Value> {
        let requests = queries
            .iter()
            .map(|query| {
                let fields = query.as_object().ok_or_else(|| {
                    BeaconError::InvalidRequest("query must be an object".to_owned())
                })?;
                let index_name = fields
                    .get("indexName")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        BeaconError::InvalidRequest("query missing indexName".to_owned())
                    })?
                    .to_owned();
                let mut params: Map<String, Value> = fields.clone();
                params.remove("indexName");
                Ok(json!({ "indexName": index_name, "params": encode_query(&params) }))
            })
            .collect::<Result<Vec<Value>>>()?;

        let mut body = json!({ "requests": requests });
        if let Some(strategy) = strategy {
            body["strategy"] = json!(strategy);
        }
        self.transport
            .request(
                TrafficClass::Search,
                Method::POST,
                "/1/indexes/*/queries",
                None,
                Some(&body),
            )
            .await
    }

    /// Sends a batch of actions spanning several indexes.
    ///
    /// Each request carries its own `indexName` next to `action` and `body`.
    pub async fn batch(&self, requests: Vec<Value>) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Write,
                Method::POST,
                "/1/indexes/*/batch",
                None,
                Some(&json!({ "requests": requests })),
            )
            .await
    }

    /// Fetches a slice of the application's activity log.
    pub async fn get_logs(
        &self,
        offset: u64,
        length: u64,
        log_type: Option<&str>,
    ) -> Result<Value> {
        let mut params = Map::new();
        params.insert("offset".to_owned(), json!(offset));
        params.insert("length".to_owned(), json!(length));
        if let Some(log_type) = log_type {
            params.insert("type".to_owned(), json!(log_type));
        }
        self.transport
            .request(
                TrafficClass::Write,
                Method::GET,
                "/1/logs",
                Some(&params),
                None,
            )
            .await
    }

    /// Lists every API key of the application.
    pub async fn list_api_keys(&self) -> Result<Value> {
        self.transport
            .request(TrafficClass::Search, Method::GET, "/1/keys", None, None)
            .await
    }

    /// Fetches one API key.
    pub async fn get_api_key(&self, key: &str) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Search,
                Method::GET,
                &format!("/1/keys/{}", encode_path_segment(key)),
                None,
                None,
            )
            .await
    }

    /// Creates an API key.
    pub async fn add_api_key(&self, params: &Value) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Write,
                Method::POST,
                "/1/keys",
                None,
                Some(params),
            )
            .await
    }

    /// Updates an API key.
    pub async fn update_api_key(&self, key: &str, params: &Value) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Write,
                Method::PUT,
                &format!("/1/keys/{}", encode_path_segment(key)),
                None,
                Some(params),
            )
            .await
    }

    /// Deletes an API key.
    pub async fn delete_api_key(&self, key: &str) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Write,
                Method::DELETE,
                &format!("/1/keys/{}", encode_path_segment(key)),
                None,
                None,
            )
            .await
    }
}

fn default_headers(app_id: &str, api_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(APPLICATION_ID_HEADER),
        HeaderValue::from_str(app_id)
            .map_err(|err| BeaconError::Config(format!("invalid application id: {err}")))?,
    );
    headers.insert(
        HeaderName::from_static(API_KEY_HEADER),
        HeaderValue::from_str(api_key)
            .map_err(|err| BeaconError::Config(format!("invalid api key: {err}")))?,
    );
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(headers)
}
