use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;
use zipflux_core::error::ZipfluxError;
use zipflux_core::model::dependency::DependencyLink;
use zipflux_core::model::span::Span;
use zipflux_core::query::QueryRequest;
use zipflux_store::{SpanStore, Transport};

const DEFAULT_LOOKBACK_MS: i64 = 86_400_000;

pub struct ApiError(ZipfluxError);

impl From<ZipfluxError> for ApiError {
    fn from(err: ZipfluxError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &ZipfluxError) -> StatusCode {
    match err {
        ZipfluxError::InvalidArgument(_)
        | ZipfluxError::MalformedIdentifier(_)
        | ZipfluxError::Parse(_) => StatusCode::BAD_REQUEST,
        ZipfluxError::UnsupportedOperation(_) => StatusCode::NOT_IMPLEMENTED,
        ZipfluxError::QueryExecution(_) | ZipfluxError::Transport(_) => StatusCode::BAD_GATEWAY,
        ZipfluxError::Config(_) | ZipfluxError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "api request failed");
        }
        (status, self.0.to_string()).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracesParams {
    service_name: Option<String>,
    span_name: Option<String>,
    annotation_query: Option<String>,
    min_duration: Option<i64>,
    max_duration: Option<i64>,
    end_ts: Option<i64>,
    lookback: Option<i64>,
    limit: Option<usize>,
}

impl TracesParams {
    fn into_request(self) -> Result<QueryRequest, ZipfluxError> {
        let annotation_query = match self.annotation_query.as_deref() {
            Some(raw) => QueryRequest::parse_annotation_query(raw)?,
            None => Default::default(),
        };
        let defaults = QueryRequest::default();
        Ok(QueryRequest {
            service_name: self.service_name.unwrap_or_default(),
            span_name: self.span_name.filter(|s| !s.is_empty() && s != "all"),
            end_ts: self.end_ts.unwrap_or_else(now_millis),
            lookback: self.lookback.unwrap_or(defaults.lookback),
            min_duration: self.min_duration,
            max_duration: self.max_duration,
            annotation_query,
            limit: self.limit.unwrap_or(defaults.limit),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpansParams {
    service_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependenciesParams {
    end_ts: Option<i64>,
    lookback: Option<i64>,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn router<T: Transport + 'static>(store: Arc<SpanStore<T>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);
    Router::new()
        .route("/api/v2/services", get(services::<T>))
        .route("/api/v2/spans", get(spans::<T>))
        .route("/api/v2/traces", get(traces::<T>))
        .route("/api/v2/trace/{trace_id}", get(trace::<T>))
        .route("/api/v2/dependencies", get(dependencies::<T>))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(store)
}

async fn services<T: Transport>(State(store): State<Arc<SpanStore<T>>>) -> ApiResult<Vec<String>> {
    Ok(Json(store.get_service_names().await?))
}

async fn spans<T: Transport>(
    State(store): State<Arc<SpanStore<T>>>,
    Query(params): Query<SpansParams>,
) -> ApiResult<Vec<String>> {
    let service = params.service_name.unwrap_or_default();
    Ok(Json(store.get_span_names(&service).await?))
}

async fn traces<T: Transport>(
    State(store): State<Arc<SpanStore<T>>>,
    Query(params): Query<TracesParams>,
) -> ApiResult<Vec<Vec<Span>>> {
    let req = params.into_request()?;
    Ok(Json(store.get_traces(&req).await?))
}

async fn trace<T: Transport>(
    State(store): State<Arc<SpanStore<T>>>,
    Path(trace_id): Path<String>,
) -> Result<Json<Vec<Span>>, Response> {
    let spans = store
        .get_trace(&trace_id)
        .await
        .map_err(|e| ApiError(e).into_response())?;
    if spans.is_empty() {
        return Err((StatusCode::NOT_FOUND, format!("trace {trace_id} not found")).into_response());
    }
    Ok(Json(spans))
}

async fn dependencies<T: Transport>(
    State(store): State<Arc<SpanStore<T>>>,
    Query(params): Query<DependenciesParams>,
) -> ApiResult<Vec<DependencyLink>> {
    let end_ts = params.end_ts.unwrap_or_else(now_millis);
    let lookback = params.lookback.unwrap_or(DEFAULT_LOOKBACK_MS);
    Ok(Json(store.get_dependencies(end_ts, lookback).await?))
}

pub async fn run_api_server<T: Transport + 'static>(
    store: Arc<SpanStore<T>>,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind api listener")?;
    tracing::info!(addr = %listener.local_addr()?, "api server listening");
    axum::serve(listener, router(Arc::clone(&store)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received ctrl-c, shutting down");
        })
        .await
        .context("serve api")?;
    store.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use testkit::{RecordingTransport, error_response, sample_traces_response, tag_values_response};
    use tower::ServiceExt;

    use super::*;

    fn app(responses: Vec<serde_json::Value>) -> Router {
        let store = SpanStore::new(RecordingTransport::new(responses), "zipkin", true);
        router(Arc::new(store))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn error_statuses() {
        let cases = [
            (ZipfluxError::InvalidArgument("x".into()), 400),
            (ZipfluxError::MalformedIdentifier("x".into()), 400),
            (ZipfluxError::UnsupportedOperation("x".into()), 501),
            (ZipfluxError::QueryExecution("x".into()), 502),
            (ZipfluxError::Transport("x".into()), 502),
            (ZipfluxError::Internal("x".into()), 500),
        ];
        for (err, code) in cases {
            assert_eq!(status_for(&err).as_u16(), code, "{err}");
        }
    }

    #[test]
    fn traces_params_map_to_request() {
        let req = TracesParams {
            service_name: Some("web".into()),
            span_name: Some("all".into()),
            annotation_query: Some("error and http.method=GET".into()),
            end_ts: Some(1_000_000),
            ..TracesParams::default()
        }
        .into_request()
        .unwrap();
        assert_eq!(req.span_name, None);
        assert_eq!(req.end_ts, 1_000_000);
        assert_eq!(req.lookback, 86_400_000);
        assert_eq!(req.limit, 10);
        assert_eq!(req.annotation_query["http.method"], "GET");
    }

    #[tokio::test]
    async fn services_endpoint() {
        let (status, body) = get(
            app(vec![tag_values_response("service_name", &["web", "db"])]),
            "/api/v2/services",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"["db","web"]"#);
    }

    #[tokio::test]
    async fn traces_endpoint_returns_v2_json() {
        let (status, body) = get(
            app(vec![sample_traces_response()]),
            "/api/v2/traces?serviceName=web&endTs=1000000&lookback=600000",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let traces: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(traces.as_array().map(Vec::len), Some(2));
        assert_eq!(traces[0][0]["traceId"], "5af7183fb1d4cf5f");
        assert_eq!(traces[0][0]["localEndpoint"]["serviceName"], "web");
    }

    #[tokio::test]
    async fn traces_endpoint_requires_service() {
        let (status, _) = get(app(vec![]), "/api/v2/traces").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_trace_is_not_found() {
        let (status, _) = get(app(vec![]), "/api/v2/trace/48485a3953bb6124").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get(app(vec![]), "/api/v2/trace/zzz").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn store_failure_is_bad_gateway() {
        let (status, body) = get(
            app(vec![error_response("database not found: zipkin")]),
            "/api/v2/dependencies?endTs=1000000&lookback=600000",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("database not found"));
    }
}
