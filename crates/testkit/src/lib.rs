use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use zipflux_core::error::{Result, ZipfluxError};
use zipflux_core::model::simple::{Kind, SimpleSpan};
use zipflux_core::model::span::{Annotation, Endpoint};
use zipflux_store::{Precision, QueryResponse, Transport};

pub const SPAN_COLUMNS: [&str; 8] = [
    "time",
    "annotation",
    "annotation_key",
    "duration_ns",
    "endpoint_host",
    "name",
    "parent_id",
    "service_name",
];

/// One series of a `GROUP BY "trace_id", "id"` query. Rows follow
/// [`SPAN_COLUMNS`].
pub fn span_series(trace_id: &str, id: &str, rows: Vec<Value>) -> Value {
    json!({
        "name": "zipkin",
        "tags": {"trace_id": trace_id, "id": id},
        "columns": SPAN_COLUMNS,
        "values": rows,
    })
}

pub fn series_response(series: Vec<Value>) -> Value {
    json!({"results": [{"statement_id": 0, "series": series}]})
}

pub fn tag_values_response(key: &str, values: &[&str]) -> Value {
    let rows: Vec<Value> = values.iter().map(|v| json!([key, v])).collect();
    json!({"results": [{"statement_id": 0, "series": [{
        "name": "zipkin",
        "columns": ["key", "value"],
        "values": rows,
    }]}]})
}

pub fn empty_response() -> Value {
    json!({"results": [{"statement_id": 0}]})
}

pub fn error_response(message: &str) -> Value {
    json!({"results": [{"statement_id": 0, "error": message}]})
}

/// Two traces in which `web` calls `db`; the second call failed.
/// Span ids are decimal as stored: 1 is the root, 2 its child.
pub fn sample_traces_response() -> Value {
    series_response(vec![
        span_series(
            "5af7183fb1d4cf5f",
            "1",
            vec![
                json!([1_000_200, "sr", null, 150_000_000, "10.0.0.1", "get /", "1", "web"]),
                json!([1_000_000, null, null, null, "10.0.0.1", "get /", "1", "web"]),
            ],
        ),
        span_series(
            "5af7183fb1d4cf5f",
            "2",
            vec![
                json!([1_000_300, "SELECT", "sql.query", 90_000_000, "10.0.0.2", "query", "1", "db"]),
                json!([1_000_100, null, null, null, "10.0.0.2", "query", "1", "db"]),
            ],
        ),
        span_series(
            "7b3bf470",
            "1",
            vec![json!([2_000_000, null, null, 50_000_000, "10.0.0.1", "get /", "1", "web"])],
        ),
        span_series(
            "7b3bf470",
            "2",
            vec![
                json!([2_000_100, "timeout", "error", null, "10.0.0.2", "query", "1", "db"]),
                json!([2_000_050, null, null, 10_000_000, "10.0.0.2", "query", "1", "db"]),
            ],
        ),
    ])
}

pub fn sample_simple_spans() -> Vec<SimpleSpan> {
    vec![
        SimpleSpan {
            trace_id: "86154a4ba6e91385".into(),
            id: "4d1e00c0db9010db".into(),
            kind: Some(Kind::Client),
            name: Some("get".into()),
            start_timestamp: Some(1_472_470_996_199_000),
            finish_timestamp: Some(1_472_470_996_406_000),
            local_endpoint: Some(Endpoint::new("frontend", "192.168.99.1")),
            remote_endpoint: Some(Endpoint::new("backend", "172.19.0.3")),
            tags: [("http.path".to_string(), "/api".to_string())].into(),
            ..SimpleSpan::default()
        },
        SimpleSpan {
            trace_id: "86154a4ba6e91385".into(),
            parent_id: Some("4d1e00c0db9010db".into()),
            id: "5e2f11d1eca1a1ec".into(),
            name: Some("compute".into()),
            start_timestamp: Some(1_472_470_996_250_000),
            finish_timestamp: Some(1_472_470_996_300_000),
            local_endpoint: Some(Endpoint::service("backend")),
            annotations: vec![Annotation::new(1_472_470_996_260_000, "cache miss")],
            ..SimpleSpan::default()
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedQuery {
    pub statement: String,
    pub precision: Option<Precision>,
}

/// In-memory transport that records every statement and replays canned
/// bodies in order, answering with an empty result once they run out.
#[derive(Default)]
pub struct RecordingTransport {
    responses: Mutex<VecDeque<Value>>,
    queries: Mutex<Vec<RecordedQuery>>,
    closes: Mutex<usize>,
}

impl RecordingTransport {
    pub fn new(responses: Vec<Value>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    pub fn statements(&self) -> Vec<String> {
        self.queries().into_iter().map(|q| q.statement).collect()
    }

    pub fn close_count(&self) -> usize {
        self.closes.lock().map(|c| *c).unwrap_or_default()
    }

    fn next_response(&self, statement: &str, precision: Option<Precision>) -> Result<Value> {
        self.queries.lock().map_err(poisoned)?.push(RecordedQuery {
            statement: statement.to_string(),
            precision,
        });
        let next = self.responses.lock().map_err(poisoned)?.pop_front();
        Ok(next.unwrap_or_else(empty_response))
    }
}

impl Transport for RecordingTransport {
    async fn query(&self, statement: &str, precision: Option<Precision>) -> Result<QueryResponse> {
        let body = self.next_response(statement, precision)?;
        let resp: QueryResponse = serde_json::from_value(body)
            .map_err(|e| ZipfluxError::Transport(format!("invalid canned response: {e}")))?;
        resp.check_error()?;
        Ok(resp)
    }

    async fn close(&self) -> Result<()> {
        let mut closes = self.closes.lock().map_err(poisoned)?;
        *closes += 1;
        Ok(())
    }
}

fn poisoned<T>(_: T) -> ZipfluxError {
    ZipfluxError::Internal("recording transport poisoned".to_string())
}

/// Version reported by [`MockInflux`] on `/ping`.
pub const MOCK_VERSION: &str = "1.8.10";

/// A request as seen by [`MockInflux`].
#[derive(Debug, Clone, Default)]
pub struct MockRequest {
    pub params: HashMap<String, String>,
    pub authorized: bool,
}

impl MockRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

type Responder = dyn Fn(&str) -> Value + Send + Sync;

#[derive(Clone)]
struct MockState {
    responder: Arc<Responder>,
    requests: Arc<Mutex<Vec<MockRequest>>>,
}

/// A stand-in for the InfluxDB `/query` endpoint, answering each statement
/// through the supplied responder.
pub struct MockInflux {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<MockRequest>>>,
    handle: JoinHandle<()>,
}

impl MockInflux {
    pub async fn spawn(
        responder: impl Fn(&str) -> Value + Send + Sync + 'static,
    ) -> anyhow::Result<Self> {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            responder: Arc::new(responder),
            requests: Arc::clone(&requests),
        };
        let app = Router::new()
            .route("/query", get(handle_query))
            .route("/ping", get(handle_ping))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self {
            addr,
            requests,
            handle,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Drop for MockInflux {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_query(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let statement = params.get("q").cloned().unwrap_or_default();
    if let Ok(mut requests) = state.requests.lock() {
        requests.push(MockRequest {
            params,
            authorized: headers.contains_key("authorization"),
        });
    }
    Json((state.responder)(&statement))
}

async fn handle_ping() -> (StatusCode, [(&'static str, &'static str); 1]) {
    (StatusCode::NO_CONTENT, [("X-Influxdb-Version", MOCK_VERSION)])
}
