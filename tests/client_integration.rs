use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Router,
};
use beacon_search::{BeaconClient, BeaconError, ClientOptions};
use serde_json::{json, Map, Value as JsonValue};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: String,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::from_millis(0),
        }
    }

    fn text(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            body: body.to_owned(),
            delay: Duration::from_millis(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone)]
struct RecordedRequest {
    method: String,
    uri: String,
    headers: HeaderMap,
    body: String,
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

async fn mock_handler(State(state): State<MockState>, request: Request) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let method = request.method().to_string();
    let uri = request.uri().to_string();
    let headers = request.headers().clone();
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .expect("request body must be readable");
    state
        .requests
        .lock()
        .expect("request log mutex must not be poisoned")
        .push(RecordedRequest {
            method,
            uri,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "no mock response available"}),
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    (response.status, response.body)
}

struct TestServer {
    host: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .expect("request log mutex must not be poisoned")
            .clone()
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        hits: Arc::new(AtomicUsize::new(0)),
        requests: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new().fallback(mock_handler).with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        host: format!("http://{address}"),
        hits: state.hits,
        requests: state.requests,
        task,
    }
}

/// A loopback address whose port was bound once and released, so connecting
/// to it is refused immediately.
fn refused_host() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("must bind probe listener");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);
    format!("http://{address}")
}

fn client_for(hosts: Vec<String>) -> BeaconClient {
    BeaconClient::with_hosts("app", "key", hosts).expect("client must build")
}

fn params(value: JsonValue) -> Map<String, JsonValue> {
    value.as_object().expect("fixture must be an object").clone()
}

#[tokio::test]
async fn success_on_the_first_host_skips_the_rest() {
    let first = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!({"items": []}),
    )])
    .await;
    let second = spawn_server(vec![]).await;
    let client = client_for(vec![first.host.clone(), second.host.clone()]);

    let result = client.list_indexes().await.expect("call must succeed");

    assert_eq!(result, json!({"items": []}));
    assert_eq!(first.hits.load(Ordering::SeqCst), 1);
    assert_eq!(second.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn transient_failure_fails_over_and_rotates_the_list() {
    let first = spawn_server(vec![
        MockResponse::json(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"})),
        MockResponse::json(StatusCode::OK, json!({"from": "first"})),
    ])
    .await;
    let second = spawn_server(vec![
        MockResponse::json(StatusCode::OK, json!({"from": "second"})),
        MockResponse::json(StatusCode::OK, json!({"from": "second again"})),
    ])
    .await;
    let client = client_for(vec![first.host.clone(), second.host.clone()]);

    let result = client.list_indexes().await.expect("failover must succeed");
    assert_eq!(result, json!({"from": "second"}));

    // The failing host was rotated to the back, so the next call starts at
    // the second host.
    let result = client.list_indexes().await.expect("call must succeed");
    assert_eq!(result, json!({"from": "second again"}));
    assert_eq!(first.hits.load(Ordering::SeqCst), 1);
    assert_eq!(second.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exhausted_hosts_report_one_reason_per_host_in_order() {
    let first = spawn_server(vec![]).await;
    let second = spawn_server(vec![]).await;
    let client = client_for(vec![first.host.clone(), second.host.clone()]);

    let err = client
        .list_indexes()
        .await
        .expect_err("all hosts must fail");

    match err {
        BeaconError::UnreachableHosts(failures) => {
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0].host, first.host);
            assert_eq!(failures[1].host, second.host);
        }
        other => panic!("expected UnreachableHosts, got {other:?}"),
    }
}

#[tokio::test]
async fn client_error_aborts_immediately_without_rotation() {
    let first = spawn_server(vec![
        MockResponse::json(StatusCode::NOT_FOUND, json!({"message": "not found"})),
        MockResponse::json(StatusCode::OK, json!({"items": []})),
    ])
    .await;
    let second = spawn_server(vec![]).await;
    let client = client_for(vec![first.host.clone(), second.host.clone()]);

    let err = client.list_indexes().await.expect_err("404 must surface");
    match err {
        BeaconError::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "not found");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert_eq!(second.hits.load(Ordering::SeqCst), 0);

    // No rotation was recorded, so the next call starts at the first host
    // again.
    client.list_indexes().await.expect("call must succeed");
    assert_eq!(first.hits.load(Ordering::SeqCst), 2);
    assert_eq!(second.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn client_error_message_falls_back_to_the_http_code() {
    let server = spawn_server(vec![MockResponse::text(StatusCode::BAD_REQUEST, "oops")]).await;
    let client = client_for(vec![server.host.clone()]);

    let err = client.list_indexes().await.expect_err("400 must surface");
    match err {
        BeaconError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "HTTP Code: 400");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn write_call_survives_two_dead_hosts_and_keeps_the_rotation() {
    let alive = spawn_server(vec![
        MockResponse::json(StatusCode::OK, json!({"objectID": "42"})),
        MockResponse::json(StatusCode::OK, json!({"deletedAt": "now"})),
    ])
    .await;
    let hosts = vec![refused_host(), refused_host(), alive.host.clone()];
    let client = client_for(hosts);
    let index = client.init_index("products");

    let created = index
        .add_object(&json!({"name": "phone"}), None)
        .await
        .expect("third host must answer");
    assert_eq!(created, json!({"objectID": "42"}));
    assert_eq!(alive.hits.load(Ordering::SeqCst), 1);

    // Two rotations happened, so the live host now leads the write list.
    index
        .delete_object("42")
        .await
        .expect("rotated list must start at the live host");
    assert_eq!(alive.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn browse_iterator_follows_the_cursor_and_terminates() {
    let server = spawn_server(vec![
        MockResponse::json(
            StatusCode::OK,
            json!({"hits": [{"objectID": "1"}, {"objectID": "2"}], "cursor": "c1"}),
        ),
        MockResponse::json(StatusCode::OK, json!({"hits": [{"objectID": "3"}], "cursor": null})),
    ])
    .await;
    let client = client_for(vec![server.host.clone()]);
    let index = client.init_index("products");

    let mut hits = Vec::new();
    let mut iter = index.browse_all(None);
    while let Some(hit) = iter.next().await {
        hits.push(hit.expect("hit must decode"));
    }

    assert_eq!(
        hits,
        vec![
            json!({"objectID": "1"}),
            json!({"objectID": "2"}),
            json!({"objectID": "3"}),
        ]
    );
    assert!(iter.next().await.is_none());

    let recorded = server.recorded();
    assert_eq!(recorded.len(), 2);
    assert!(!recorded[0].uri.contains("cursor="));
    assert!(recorded[1].uri.contains("cursor=c1"));
}

#[tokio::test]
async fn wait_task_polls_until_the_task_is_published() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::OK, json!({"status": "notPublished"})),
        MockResponse::json(StatusCode::OK, json!({"status": "notPublished"})),
        MockResponse::json(StatusCode::OK, json!({"status": "published"})),
    ])
    .await;
    let client = client_for(vec![server.host.clone()])
        .with_options(ClientOptions {
            task_poll_interval: Duration::from_millis(5),
            ..ClientOptions::default()
        })
        .expect("options must apply");
    let index = client.init_index("products");

    let status = index.wait_task(7).await.expect("task must publish");

    assert_eq!(status, json!({"status": "published"}));
    assert_eq!(server.hits.load(Ordering::SeqCst), 3);
    assert!(server.recorded()[0].uri.starts_with("/1/indexes/products/task/7"));
}

#[tokio::test]
async fn traffic_classes_use_their_own_host_lists() {
    let read = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({"hits": []}))]).await;
    let write = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({"taskID": 1}))]).await;
    let client = BeaconClient::with_read_write_hosts(
        "app",
        "key",
        vec![read.host.clone()],
        vec![write.host.clone()],
    )
    .expect("client must build");
    let index = client.init_index("products");

    index.search("phone", None).await.expect("search must succeed");
    index
        .add_object(&json!({"name": "phone"}), None)
        .await
        .expect("write must succeed");

    assert_eq!(read.hits.load(Ordering::SeqCst), 1);
    assert_eq!(write.hits.load(Ordering::SeqCst), 1);
    assert!(read.recorded()[0].uri.ends_with("/query"));
    assert_eq!(write.recorded()[0].method, "POST");
    assert_eq!(write.recorded()[0].uri, "/1/indexes/products");
}

#[tokio::test]
async fn read_timeout_breach_is_a_transient_failure() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({"items": []}))
        .with_delay(Duration::from_millis(600))])
    .await;
    let client = client_for(vec![server.host.clone()])
        .with_options(ClientOptions {
            search_timeout: Duration::from_millis(100),
            ..ClientOptions::default()
        })
        .expect("options must apply");

    let err = client.list_indexes().await.expect_err("call must time out");
    match err {
        BeaconError::UnreachableHosts(failures) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].host, server.host);
        }
        other => panic!("expected UnreachableHosts, got {other:?}"),
    }
}

#[tokio::test]
async fn default_and_extra_headers_travel_with_every_request() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({"items": []}))]).await;
    let client = client_for(vec![server.host.clone()])
        .with_extra_headers([("x-forwarded-for", "10.0.0.1")])
        .expect("headers must apply");

    client.list_indexes().await.expect("call must succeed");

    let recorded = server.recorded();
    let headers = &recorded[0].headers;
    assert_eq!(headers["x-beacon-application-id"], "app");
    assert_eq!(headers["x-beacon-api-key"], "key");
    assert_eq!(headers["x-forwarded-for"], "10.0.0.1");
    let user_agent = headers["user-agent"].to_str().expect("ascii user agent");
    assert!(user_agent.starts_with("Beacon for Rust ("));
}

#[tokio::test]
async fn index_names_object_ids_and_queries_are_encoded() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!({"objectID": "a/b"}),
    )])
    .await;
    let client = client_for(vec![server.host.clone()]);
    let index = client.init_index("my index");

    index
        .get_object("a/b", Some(&["name", "age"]))
        .await
        .expect("call must succeed");

    let recorded = server.recorded();
    assert_eq!(
        recorded[0].uri,
        "/1/indexes/my%20index/a%2Fb?attributes=name%2Cage"
    );
}

#[tokio::test]
async fn search_posts_deterministically_encoded_params() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({"hits": []}))]).await;
    let client = client_for(vec![server.host.clone()]);
    let index = client.init_index("products");

    index
        .search("red phone", Some(&params(json!({"hitsPerPage": 5}))))
        .await
        .expect("search must succeed");

    let recorded = server.recorded();
    assert_eq!(recorded[0].method, "POST");
    assert_eq!(recorded[0].uri, "/1/indexes/products/query");
    let body: JsonValue = serde_json::from_str(&recorded[0].body).expect("body must be JSON");
    assert_eq!(body, json!({"params": "hitsPerPage=5&query=red+phone"}));
}

#[tokio::test]
async fn multiple_queries_encode_params_per_request() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!({"results": []}),
    )])
    .await;
    let client = client_for(vec![server.host.clone()]);

    client
        .multiple_queries(
            &[
                json!({"indexName": "products", "query": "phone"}),
                json!({"indexName": "brands", "query": "acme", "hitsPerPage": 3}),
            ],
            Some("stopIfEnoughMatches"),
        )
        .await
        .expect("call must succeed");

    let recorded = server.recorded();
    assert_eq!(recorded[0].uri, "/1/indexes/*/queries");
    let body: JsonValue = serde_json::from_str(&recorded[0].body).expect("body must be JSON");
    assert_eq!(
        body,
        json!({
            "requests": [
                {"indexName": "products", "params": "query=phone"},
                {"indexName": "brands", "params": "hitsPerPage=3&query=acme"},
            ],
            "strategy": "stopIfEnoughMatches",
        })
    );
}

#[tokio::test]
async fn save_objects_batches_with_update_actions() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!({"taskID": 3}),
    )])
    .await;
    let client = client_for(vec![server.host.clone()]);
    let index = client.init_index("products");

    index
        .save_objects(&[json!({"objectID": "1", "name": "phone"})])
        .await
        .expect("batch must succeed");

    let recorded = server.recorded();
    assert_eq!(recorded[0].uri, "/1/indexes/products/batch");
    let body: JsonValue = serde_json::from_str(&recorded[0].body).expect("body must be JSON");
    assert_eq!(
        body,
        json!({
            "requests": [
                {"action": "updateObject", "body": {"objectID": "1", "name": "phone"}},
            ],
        })
    );
}

#[test]
fn blocking_facade_round_trips_through_the_mock_server() {
    let server_runtime = tokio::runtime::Runtime::new().expect("server runtime must build");
    let server = server_runtime.block_on(spawn_server(vec![
        MockResponse::json(StatusCode::OK, json!({"items": []})),
        MockResponse::json(StatusCode::OK, json!({"hits": [{"objectID": "1"}]})),
    ]));

    let client = beacon_search::blocking::Client::with_hosts("app", "key", vec![server.host.clone()])
        .expect("client must build");

    let indexes = client.list_indexes().expect("call must succeed");
    assert_eq!(indexes, json!({"items": []}));

    let index = client.init_index("products");
    let result = index.search("phone", None).expect("search must succeed");
    assert_eq!(result, json!({"hits": [{"objectID": "1"}]}));
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}
