//! Blocking counterparts of the async client.
//!
//! Every operation is enumerated explicitly and delegates to the async
//! implementation over a client-owned current-thread runtime. The blocking
//! types must not be used from inside an async context; doing so panics
//! when the runtime is entered, like `reqwest::blocking`.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::runtime::Runtime;

use crate::{BeaconError, ClientOptions, Result};

fn build_runtime() -> Result<Arc<Runtime>> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map(Arc::new)
        .map_err(BeaconError::Runtime)
}

/// Blocking client for the Beacon search API.
#[derive(Clone, Debug)]
pub struct Client {
    inner: crate::BeaconClient,
    runtime: Arc<Runtime>,
}

impl Client {
    /// See [`BeaconClient::new`](crate::BeaconClient::new).
    pub fn new(app_id: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            inner: crate::BeaconClient::new(app_id, api_key)?,
            runtime: build_runtime()?,
        })
    }

    /// See [`BeaconClient::with_hosts`](crate::BeaconClient::with_hosts).
    pub fn with_hosts(
        app_id: impl Into<String>,
        api_key: impl Into<String>,
        hosts: Vec<String>,
    ) -> Result<Self> {
        Ok(Self {
            inner: crate::BeaconClient::with_hosts(app_id, api_key, hosts)?,
            runtime: build_runtime()?,
        })
    }

    /// See [`BeaconClient::with_read_write_hosts`](crate::BeaconClient::with_read_write_hosts).
    pub fn with_read_write_hosts(
        app_id: impl Into<String>,
        api_key: impl Into<String>,
        read_hosts: Vec<String>,
        write_hosts: Vec<String>,
    ) -> Result<Self> {
        Ok(Self {
            inner: crate::BeaconClient::with_read_write_hosts(
                app_id, api_key, read_hosts, write_hosts,
            )?,
            runtime: build_runtime()?,
        })
    }

    /// See [`BeaconClient::from_env`](crate::BeaconClient::from_env).
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            inner: crate::BeaconClient::from_env()?,
            runtime: build_runtime()?,
        })
    }

    /// See [`BeaconClient::with_options`](crate::BeaconClient::with_options).
    pub fn with_options(mut self, options: ClientOptions) -> Result<Self> {
        self.inner = self.inner.with_options(options)?;
        Ok(self)
    }

    /// See [`BeaconClient::with_extra_headers`](crate::BeaconClient::with_extra_headers).
    pub fn with_extra_headers<I, K, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.inner = self.inner.with_extra_headers(pairs)?;
        Ok(self)
    }

    /// Returns a blocking handle to one index.
    pub fn init_index(&self, name: impl Into<String>) -> Index {
        Index {
            inner: self.inner.init_index(name),
            runtime: Arc::clone(&self.runtime),
        }
    }

    pub fn list_indexes(&self) -> Result<Value> {
        self.runtime.block_on(self.inner.list_indexes())
    }

    pub fn delete_index(&self, name: &str) -> Result<Value> {
        self.runtime.block_on(self.inner.delete_index(name))
    }

    pub fn copy_index(&self, source: &str, destination: &str) -> Result<Value> {
        self.runtime
            .block_on(self.inner.copy_index(source, destination))
    }

    pub fn move_index(&self, source: &str, destination: &str) -> Result<Value> {
        self.runtime
            .block_on(self.inner.move_index(source, destination))
    }

    pub fn multiple_queries(&self, queries: &[Value], strategy: Option<&str>) -> Result<Value> {
        self.runtime
            .block_on(self.inner.multiple_queries(queries, strategy))
    }

    pub fn batch(&self, requests: Vec<Value>) -> Result<Value> {
        self.runtime.block_on(self.inner.batch(requests))
    }

    pub fn get_logs(&self, offset: u64, length: u64, log_type: Option<&str>) -> Result<Value> {
        self.runtime
            .block_on(self.inner.get_logs(offset, length, log_type))
    }

    pub fn list_api_keys(&self) -> Result<Value> {
        self.runtime.block_on(self.inner.list_api_keys())
    }

    pub fn get_api_key(&self, key: &str) -> Result<Value> {
        self.runtime.block_on(self.inner.get_api_key(key))
    }

    pub fn add_api_key(&self, params: &Value) -> Result<Value> {
        self.runtime.block_on(self.inner.add_api_key(params))
    }

    pub fn update_api_key(&self, key: &str, params: &Value) -> Result<Value> {
        self.runtime.block_on(self.inner.update_api_key(key, params))
    }

    pub fn delete_api_key(&self, key: &str) -> Result<Value> {
        self.runtime.block_on(self.inner.delete_api_key(key))
    }
}

/// Blocking handle to one index.
#[derive(Clone)]
pub struct Index {
    inner: crate::BeaconIndex,
    runtime: Arc<Runtime>,
}

impl Index {
    /// Name of the index this handle targets.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn search(&self, query: &str, params: Option<&Map<String, Value>>) -> Result<Value> {
        self.runtime.block_on(self.inner.search(query, params))
    }

    pub fn search_for_facet_values(
        &self,
        facet: &str,
        text: &str,
        params: Option<&Map<String, Value>>,
    ) -> Result<Value> {
        self.runtime
            .block_on(self.inner.search_for_facet_values(facet, text, params))
    }

    pub fn add_object(&self, object: &Value, object_id: Option<&str>) -> Result<Value> {
        self.runtime
            .block_on(self.inner.add_object(object, object_id))
    }

    pub fn add_objects(&self, objects: &[Value]) -> Result<Value> {
        self.runtime.block_on(self.inner.add_objects(objects))
    }

    pub fn get_object(&self, object_id: &str, attributes: Option<&[&str]>) -> Result<Value> {
        self.runtime
            .block_on(self.inner.get_object(object_id, attributes))
    }

    pub fn get_objects(&self, object_ids: &[&str]) -> Result<Value> {
        self.runtime.block_on(self.inner.get_objects(object_ids))
    }

    pub fn save_object(&self, object: &Value) -> Result<Value> {
        self.runtime.block_on(self.inner.save_object(object))
    }

    pub fn save_objects(&self, objects: &[Value]) -> Result<Value> {
        self.runtime.block_on(self.inner.save_objects(objects))
    }

    pub fn partial_update_object(&self, object: &Value, no_create: bool) -> Result<Value> {
        self.runtime
            .block_on(self.inner.partial_update_object(object, no_create))
    }

    pub fn partial_update_objects(&self, objects: &[Value], no_create: bool) -> Result<Value> {
        self.runtime
            .block_on(self.inner.partial_update_objects(objects, no_create))
    }

    pub fn delete_object(&self, object_id: &str) -> Result<Value> {
        self.runtime.block_on(self.inner.delete_object(object_id))
    }

    pub fn delete_objects(&self, object_ids: &[&str]) -> Result<Value> {
        self.runtime.block_on(self.inner.delete_objects(object_ids))
    }

    pub fn delete_by_query(&self, query: &str, params: Option<&Map<String, Value>>) -> Result<Value> {
        self.runtime
            .block_on(self.inner.delete_by_query(query, params))
    }

    pub fn batch(&self, requests: Vec<Value>) -> Result<Value> {
        self.runtime.block_on(self.inner.batch(requests))
    }

    pub fn clear_index(&self) -> Result<Value> {
        self.runtime.block_on(self.inner.clear_index())
    }

    pub fn get_settings(&self) -> Result<Value> {
        self.runtime.block_on(self.inner.get_settings())
    }

    pub fn set_settings(&self, settings: &Value) -> Result<Value> {
        self.runtime.block_on(self.inner.set_settings(settings))
    }

    pub fn browse_from(
        &self,
        params: Option<&Map<String, Value>>,
        cursor: Option<&str>,
    ) -> Result<Value> {
        self.runtime
            .block_on(self.inner.browse_from(params, cursor))
    }

    /// Walks every hit matching `params` as a blocking iterator.
    pub fn browse_all(&self, params: Option<&Map<String, Value>>) -> Browse {
        Browse {
            inner: self.inner.browse_all(params),
            runtime: Arc::clone(&self.runtime),
        }
    }

    /// Polls the task status until it is `published`. Unbounded, like the
    /// async counterpart.
    pub fn wait_task(&self, task_id: u64) -> Result<Value> {
        self.runtime.block_on(self.inner.wait_task(task_id))
    }

    pub fn save_synonym(
        &self,
        object_id: &str,
        content: &Value,
        forward_to_replicas: bool,
    ) -> Result<Value> {
        self.runtime
            .block_on(self.inner.save_synonym(object_id, content, forward_to_replicas))
    }

    pub fn get_synonym(&self, object_id: &str) -> Result<Value> {
        self.runtime.block_on(self.inner.get_synonym(object_id))
    }

    pub fn delete_synonym(&self, object_id: &str, forward_to_replicas: bool) -> Result<Value> {
        self.runtime
            .block_on(self.inner.delete_synonym(object_id, forward_to_replicas))
    }

    pub fn clear_synonyms(&self, forward_to_replicas: bool) -> Result<Value> {
        self.runtime
            .block_on(self.inner.clear_synonyms(forward_to_replicas))
    }

    pub fn batch_synonyms(
        &self,
        synonyms: &[Value],
        forward_to_replicas: bool,
        replace_existing: bool,
    ) -> Result<Value> {
        self.runtime.block_on(self.inner.batch_synonyms(
            synonyms,
            forward_to_replicas,
            replace_existing,
        ))
    }

    pub fn search_synonyms(
        &self,
        query: &str,
        types: &[&str],
        page: u64,
        hits_per_page: u64,
    ) -> Result<Value> {
        self.runtime
            .block_on(self.inner.search_synonyms(query, types, page, hits_per_page))
    }

    pub fn list_api_keys(&self) -> Result<Value> {
        self.runtime.block_on(self.inner.list_api_keys())
    }

    pub fn get_api_key(&self, key: &str) -> Result<Value> {
        self.runtime.block_on(self.inner.get_api_key(key))
    }

    pub fn add_api_key(&self, params: &Value) -> Result<Value> {
        self.runtime.block_on(self.inner.add_api_key(params))
    }

    pub fn update_api_key(&self, key: &str, params: &Value) -> Result<Value> {
        self.runtime.block_on(self.inner.update_api_key(key, params))
    }

    pub fn delete_api_key(&self, key: &str) -> Result<Value> {
        self.runtime.block_on(self.inner.delete_api_key(key))
    }
}

/// Blocking adapter over [`BrowseIter`](crate::BrowseIter).
pub struct Browse {
    inner: crate::BrowseIter,
    runtime: Arc<Runtime>,
}

impl Iterator for Browse {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.inner.next())
    }
}
