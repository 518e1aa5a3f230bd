use tracing::debug;
use zipflux_core::config::Config;
use zipflux_core::dependency::link;
use zipflux_core::error::{Result, ZipfluxError};
use zipflux_core::ids::lookup_trace_id;
use zipflux_core::model::dependency::{DependencyBucket, DependencyLink};
use zipflux_core::model::span::Span;
use zipflux_core::query::QueryRequest;

use crate::merge::{collect_spans, dependency_buckets, group_traces, tag_values};
use crate::query::{
    dependencies_query, dependency_spans_query, service_names_query, span_names_query,
    trace_by_id_query, trace_filter_query,
};
use crate::response::QueryResponse;
use crate::transport::{HttpTransport, Precision, Transport};

/// Read side of the span measurement: compiles each call into one statement,
/// runs it through the transport and reassembles the rows.
pub struct SpanStore<T> {
    transport: T,
    measurement: String,
    strict_trace_id: bool,
}

impl SpanStore<HttpTransport> {
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            HttpTransport::from_config(cfg),
            cfg.measurement.clone(),
            cfg.strict_trace_id,
        )
    }

    /// Asks the store whether it is up, returning its reported version.
    pub async fn check(&self) -> Result<String> {
        self.transport.ping().await
    }
}

impl<T: Transport> SpanStore<T> {
    pub fn new(transport: T, measurement: impl Into<String>, strict_trace_id: bool) -> Self {
        Self {
            transport,
            measurement: measurement.into(),
            strict_trace_id,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn execute(&self, statement: &str, precision: Option<Precision>) -> Result<QueryResponse> {
        debug!(%statement, "executing influxql");
        self.transport.query(statement, precision).await
    }

    pub async fn get_traces(&self, req: &QueryRequest) -> Result<Vec<Vec<Span>>> {
        req.validate()?;
        let q = trace_filter_query(&self.measurement, req);
        let resp = self.execute(&q, Some(Precision::Microseconds)).await?;
        group_traces(&resp)
    }

    /// Spans of one trace; empty when the trace is unknown.
    pub async fn get_trace(&self, trace_id: &str) -> Result<Vec<Span>> {
        let trace_id = lookup_trace_id(trace_id, self.strict_trace_id)?;
        let q = trace_by_id_query(&self.measurement, &trace_id);
        let resp = self.execute(&q, Some(Precision::Microseconds)).await?;
        collect_spans(&resp)
    }

    pub async fn get_service_names(&self) -> Result<Vec<String>> {
        let q = service_names_query(&self.measurement);
        let resp = self.execute(&q, None).await?;
        tag_values(&resp)
    }

    pub async fn get_span_names(&self, service_name: &str) -> Result<Vec<String>> {
        let Some(q) = span_names_query(&self.measurement, service_name) else {
            return Ok(Vec::new());
        };
        let resp = self.execute(&q, None).await?;
        tag_values(&resp)
    }

    /// Service call graph for the window ending at `end_ts`, linked from the
    /// spans stored in it.
    pub async fn get_dependencies(&self, end_ts: i64, lookback: i64) -> Result<Vec<DependencyLink>> {
        check_window(end_ts, lookback)?;
        let q = dependency_spans_query(&self.measurement, end_ts, lookback);
        let resp = self.execute(&q, Some(Precision::Microseconds)).await?;
        let traces = group_traces(&resp)?;
        let links = link(&traces);
        debug!(traces = traces.len(), links = links.len(), "linked dependencies");
        Ok(links)
    }

    /// Raw per-day span counts keyed by (id, parent id).
    pub async fn dependency_counts(
        &self,
        end_ts: i64,
        lookback: i64,
    ) -> Result<Vec<DependencyBucket>> {
        check_window(end_ts, lookback)?;
        let q = dependencies_query(&self.measurement, end_ts, lookback);
        let resp = self.execute(&q, Some(Precision::Microseconds)).await?;
        dependency_buckets(&resp)
    }

    pub async fn accept(&self, spans: &[Span]) -> Result<()> {
        Err(ZipfluxError::UnsupportedOperation(format!(
            "span store is read-only, refusing {} spans",
            spans.len()
        )))
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}

fn check_window(end_ts: i64, lookback: i64) -> Result<()> {
    if end_ts <= 0 {
        return Err(ZipfluxError::InvalidArgument(format!(
            "endTs must be positive, got {end_ts}"
        )));
    }
    if lookback <= 0 {
        return Err(ZipfluxError::InvalidArgument(format!(
            "lookback must be positive, got {lookback}"
        )));
    }
    Ok(())
}
