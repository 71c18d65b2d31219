use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Map, Value};
use tokio::time::sleep;

use crate::{
    hosts::TrafficClass,
    params::{encode_path_segment, encode_query},
    transport::Transport,
    BeaconError, BrowseIter, Result,
};

/// Handle to one index, sharing the owning client's transport.
///
/// Obtained from [`BeaconClient::init_index`]. Every method is a thin
/// wrapper that assembles a path, query and body and hands them to the
/// retry loop; responses are surfaced as decoded JSON values.
///
/// [`BeaconClient::init_index`]: crate::BeaconClient::init_index
#[derive(Clone)]
pub struct BeaconIndex {
    transport: Arc<Transport>,
    name: String,
    base_path: String,
}

impl BeaconIndex {
    pub(crate) fn new(transport: Arc<Transport>, name: impl Into<String>) -> Self {
        let name = name.into();
        let base_path = format!("/1/indexes/{}", encode_path_segment(&name));
        Self {
            transport,
            name,
            base_path,
        }
    }

    /// Name of the index this handle targets.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs a search query.
    pub async fn search(&self, query: &str, params: Option<&Map<String, Value>>) -> Result<Value> {
        let mut all = params.cloned().unwrap_or_default();
        all.insert("query".to_owned(), json!(query));
        let body = json!({ "params": encode_query(&all) });
        self.transport
            .request(
                TrafficClass::Search,
                Method::POST,
                &format!("{}/query", self.base_path),
                None,
                Some(&body),
            )
            .await
    }

    /// Searches the values of a facet.
    pub async fn search_for_facet_values(
        &self,
        facet: &str,
        text: &str,
        params: Option<&Map<String, Value>>,
    ) -> Result<Value> {
        let mut all = params.cloned().unwrap_or_default();
        all.insert("facetQuery".to_owned(), json!(text));
        let body = json!({ "params": encode_query(&all) });
        self.transport
            .request(
                TrafficClass::Search,
                Method::POST,
                &format!(
                    "{}/facets/{}/query",
                    self.base_path,
                    encode_path_segment(facet)
                ),
                None,
                Some(&body),
            )
            .await
    }

    /// Adds one object. With an explicit id the object is created or
    /// replaced at that id; without one the service assigns an id.
    pub async fn add_object(&self, object: &Value, object_id: Option<&str>) -> Result<Value> {
        match object_id {
            Some(id) => {
                self.transport
                    .request(
                        TrafficClass::Write,
                        Method::PUT,
                        &self.object_path(id),
                        None,
                        Some(object),
                    )
                    .await
            }
            None => {
                self.transport
                    .request(
                        TrafficClass::Write,
                        Method::POST,
                        &self.base_path,
                        None,
                        Some(object),
                    )
                    .await
            }
        }
    }

    /// Adds several objects in one batch.
    pub async fn add_objects(&self, objects: &[Value]) -> Result<Value> {
        let requests = build_actions("addObject", objects, false)?;
        self.batch(requests).await
    }

    /// Fetches one object, optionally restricted to the given attributes.
    pub async fn get_object(&self, object_id: &str, attributes: Option<&[&str]>) -> Result<Value> {
        let params = attributes.map(|attrs| {
            let mut params = Map::new();
            params.insert("attributes".to_owned(), json!(attrs.join(",")));
            params
        });
        self.transport
            .request(
                TrafficClass::Search,
                Method::GET,
                &self.object_path(object_id),
                params.as_ref(),
                None,
            )
            .await
    }

    /// Fetches several objects by id in one call.
    pub async fn get_objects(&self, object_ids: &[&str]) -> Result<Value> {
        let requests: Vec<Value> = object_ids
            .iter()
            .map(|id| json!({ "indexName": self.name, "objectID": id }))
            .collect();
        self.transport
            .request(
                TrafficClass::Search,
                Method::POST,
                "/1/indexes/*/objects",
                None,
                Some(&json!({ "requests": requests })),
            )
            .await
    }

    /// Replaces an existing object. The object must carry an `objectID`.
    pub async fn save_object(&self, object: &Value) -> Result<Value> {
        let id = required_object_id(object)?;
        self.transport
            .request(
                TrafficClass::Write,
                Method::PUT,
                &self.object_path(&id),
                None,
                Some(object),
            )
            .await
    }

    /// Replaces several objects in one batch. Each must carry an `objectID`.
    pub async fn save_objects(&self, objects: &[Value]) -> Result<Value> {
        let requests = build_actions("updateObject", objects, true)?;
        self.batch(requests).await
    }

    /// Applies a partial update to one object. With `no_create`, the update
    /// is dropped when the object does not exist instead of creating it.
    pub async fn partial_update_object(&self, object: &Value, no_create: bool) -> Result<Value> {
        let id = required_object_id(object)?;
        let params = no_create.then(|| {
            let mut params = Map::new();
            params.insert("createIfNotExists".to_owned(), json!(false));
            params
        });
        self.transport
            .request(
                TrafficClass::Write,
                Method::POST,
                &format!("{}/partial", self.object_path(&id)),
                params.as_ref(),
                Some(object),
            )
            .await
    }

    /// Applies partial updates to several objects in one batch.
    pub async fn partial_update_objects(&self, objects: &[Value], no_create: bool) -> Result<Value> {
        let action = if no_create {
            "partialUpdateObjectNoCreate"
        } else {
            "partialUpdateObject"
        };
        let requests = build_actions(action, objects, true)?;
        self.batch(requests).await
    }

    /// Deletes one object by id.
    pub async fn delete_object(&self, object_id: &str) -> Result<Value> {
        if object_id.is_empty() {
            return Err(BeaconError::InvalidRequest(
                "object id must not be empty".to_owned(),
            ));
        }
        self.transport
            .request(
                TrafficClass::Write,
                Method::DELETE,
                &self.object_path(object_id),
                None,
                None,
            )
            .await
    }

    /// Deletes several objects by id in one batch.
    pub async fn delete_objects(&self, object_ids: &[&str]) -> Result<Value> {
        let requests: Vec<Value> = object_ids
            .iter()
            .map(|id| json!({ "action": "deleteObject", "body": { "objectID": id } }))
            .collect();
        self.batch(requests).await
    }

    /// Deletes every object matching a query: browses the matching ids,
    /// then issues one batch delete.
    pub async fn delete_by_query(
        &self,
        query: &str,
        params: Option<&Map<String, Value>>,
    ) -> Result<Value> {
        let mut params = params.cloned().unwrap_or_default();
        params.insert("query".to_owned(), json!(query));
        params.insert("hitsPerPage".to_owned(), json!(1000));
        params.insert("attributesToRetrieve".to_owned(), json!(["objectID"]));
        params.insert("attributesToSnippet".to_owned(), json!([]));
        params.insert("attributesToHighlight".to_owned(), json!([]));
        params.insert("distinct".to_owned(), json!(false));

        let mut ids = Vec::new();
        let mut iter = self.browse_all(Some(&params));
        while let Some(hit) = iter.next().await {
            let hit = hit?;
            let id = hit
                .get("objectID")
                .and_then(Value::as_str)
                .ok_or_else(|| BeaconError::Decode("browse hit missing objectID".to_owned()))?;
            ids.push(id.to_owned());
        }

        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        self.delete_objects(&ids).await
    }

    /// Sends a raw batch of actions.
    pub async fn batch(&self, requests: Vec<Value>) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Write,
                Method::POST,
                &format!("{}/batch", self.base_path),
                None,
                Some(&json!({ "requests": requests })),
            )
            .await
    }

    /// Removes every object from the index without touching its settings.
    pub async fn clear_index(&self) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Write,
                Method::POST,
                &format!("{}/clear", self.base_path),
                None,
                None,
            )
            .await
    }

    /// Fetches the index settings.
    pub async fn get_settings(&self) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Search,
                Method::GET,
                &format!("{}/settings", self.base_path),
                None,
                None,
            )
            .await
    }

    /// Replaces the index settings.
    pub async fn set_settings(&self, settings: &Value) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Write,
                Method::PUT,
                &format!("{}/settings", self.base_path),
                None,
                Some(settings),
            )
            .await
    }

    /// Fetches one browse page, optionally continuing from a cursor.
    pub async fn browse_from(
        &self,
        params: Option<&Map<String, Value>>,
        cursor: Option<&str>,
    ) -> Result<Value> {
        let mut all = params.cloned().unwrap_or_default();
        if let Some(cursor) = cursor {
            all.insert("cursor".to_owned(), json!(cursor));
        }
        self.transport
            .request(
                TrafficClass::Search,
                Method::GET,
                &format!("{}/browse", self.base_path),
                Some(&all),
                None,
            )
            .await
    }

    /// Walks every hit matching `params`, fetching pages lazily.
    pub fn browse_all(&self, params: Option<&Map<String, Value>>) -> BrowseIter {
        BrowseIter::new(self.clone(), params.cloned().unwrap_or_default())
    }

    /// Polls the task status at a fixed interval until it is `published`,
    /// then returns the final status body.
    ///
    /// The poll is unbounded, matching the service contract: a task that
    /// never publishes keeps this future pending. Wrap the call in
    /// `tokio::time::timeout` to bound the wait.
    pub async fn wait_task(&self, task_id: u64) -> Result<Value> {
        let path = format!("{}/task/{}", self.base_path, task_id);
        loop {
            let res = self
                .transport
                .request(TrafficClass::Search, Method::GET, &path, None, None)
                .await?;
            let status = res
                .get("status")
                .and_then(Value::as_str)
                .ok_or_else(|| BeaconError::Decode("task status missing status field".to_owned()))?;
            if status == "published" {
                return Ok(res);
            }
            sleep(self.transport.options().task_poll_interval).await;
        }
    }

    /// Creates or replaces one synonym record.
    pub async fn save_synonym(
        &self,
        object_id: &str,
        content: &Value,
        forward_to_replicas: bool,
    ) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Write,
                Method::PUT,
                &self.synonym_path(object_id),
                Some(&forward_params(forward_to_replicas)),
                Some(content),
            )
            .await
    }

    /// Fetches one synonym record.
    pub async fn get_synonym(&self, object_id: &str) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Search,
                Method::GET,
                &self.synonym_path(object_id),
                None,
                None,
            )
            .await
    }

    /// Deletes one synonym record.
    pub async fn delete_synonym(
        &self,
        object_id: &str,
        forward_to_replicas: bool,
    ) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Write,
                Method::DELETE,
                &self.synonym_path(object_id),
                Some(&forward_params(forward_to_replicas)),
                None,
            )
            .await
    }

    /// Removes every synonym from the index.
    pub async fn clear_synonyms(&self, forward_to_replicas: bool) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Write,
                Method::POST,
                &format!("{}/synonyms/clear", self.base_path),
                Some(&forward_params(forward_to_replicas)),
                None,
            )
            .await
    }

    /// Uploads a batch of synonym records, optionally replacing everything
    /// already configured.
    pub async fn batch_synonyms(
        &self,
        synonyms: &[Value],
        forward_to_replicas: bool,
        replace_existing: bool,
    ) -> Result<Value> {
        let mut params = forward_params(forward_to_replicas);
        params.insert("replaceExistingSynonyms".to_owned(), json!(replace_existing));
        self.transport
            .request(
                TrafficClass::Write,
                Method::POST,
                &format!("{}/synonyms/batch", self.base_path),
                Some(&params),
                Some(&json!(synonyms)),
            )
            .await
    }

    /// Searches the synonym records of the index.
    pub async fn search_synonyms(
        &self,
        query: &str,
        types: &[&str],
        page: u64,
        hits_per_page: u64,
    ) -> Result<Value> {
        let body = json!({
            "query": query,
            "type": types.join(","),
            "page": page,
            "hitsPerPage": hits_per_page,
        });
        self.transport
            .request(
                TrafficClass::Search,
                Method::POST,
                &format!("{}/synonyms/search", self.base_path),
                None,
                Some(&body),
            )
            .await
    }

    /// Lists the API keys scoped to this index.
    pub async fn list_api_keys(&self) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Search,
                Method::GET,
                &format!("{}/keys", self.base_path),
                None,
                None,
            )
            .await
    }

    /// Fetches one index-scoped API key.
    pub async fn get_api_key(&self, key: &str) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Search,
                Method::GET,
                &format!("{}/keys/{}", self.base_path, encode_path_segment(key)),
                None,
                None,
            )
            .await
    }

    /// Creates an index-scoped API key.
    pub async fn add_api_key(&self, params: &Value) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Write,
                Method::POST,
                &format!("{}/keys", self.base_path),
                None,
                Some(params),
            )
            .await
    }

    /// Updates an index-scoped API key.
    pub async fn update_api_key(&self, key: &str, params: &Value) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Write,
                Method::PUT,
                &format!("{}/keys/{}", self.base_path, encode_path_segment(key)),
                None,
                Some(params),
            )
            .await
    }

    /// Deletes an index-scoped API key.
    pub async fn delete_api_key(&self, key: &str) -> Result<Value> {
        self.transport
            .request(
                TrafficClass::Write,
                Method::DELETE,
                &format!("{}/keys/{}", self.base_path, encode_path_segment(key)),
                None,
                None,
            )
            .await
    }

    fn object_path(&self, object_id: &str) -> String {
        format!("{}/{}", self.base_path, encode_path_segment(object_id))
    }

    fn synonym_path(&self, object_id: &str) -> String {
        format!(
            "{}/synonyms/{}",
            self.base_path,
            encode_path_segment(object_id)
        )
    }
}

fn required_object_id(object: &Value) -> Result<String> {
    object
        .get("objectID")
        .and_then(|id| match id {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .ok_or_else(|| BeaconError::InvalidRequest("object missing objectID".to_owned()))
}

fn build_actions(action: &str, objects: &[Value], require_id: bool) -> Result<Vec<Value>> {
    objects
        .iter()
        .map(|object| {
            if require_id {
                required_object_id(object)?;
            }
            Ok(json!({ "action": action, "body": object }))
        })
        .collect()
}

fn forward_params(forward_to_replicas: bool) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("forwardToReplicas".to_owned(), json!(forward_to_replicas));
    params
}
