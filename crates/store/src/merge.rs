//! Reassembles spans from rows. Each series of a `GROUP BY "trace_id", "id"`
//! query holds every recorded event of one span, newest first; folding the
//! rows in order lets later rows overwrite earlier ones.

use std::collections::HashMap;

use chrono::DateTime;
use serde_json::Value;
use tracing::warn;
use zipflux_core::error::{Result, ZipfluxError};
use zipflux_core::ids::{decode, normalize_parent};
use zipflux_core::model::dependency::DependencyBucket;
use zipflux_core::model::span::{Endpoint, Span, SpanBuilder};

use crate::response::{QueryResponse, Series};
use crate::schema;

/// What a column contributes to the span, resolved once per series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    ParentId,
    Name,
    ServiceName,
    Annotation,
    AnnotationKey,
    EndpointHost,
    DurationNs,
    Time,
    Ignored,
}

impl Column {
    fn resolve(name: &str) -> Self {
        match name {
            schema::PARENT_ID => Self::ParentId,
            schema::NAME => Self::Name,
            schema::SERVICE_NAME => Self::ServiceName,
            schema::ANNOTATION => Self::Annotation,
            schema::ANNOTATION_KEY => Self::AnnotationKey,
            schema::ENDPOINT_HOST => Self::EndpointHost,
            schema::DURATION_NS => Self::DurationNs,
            schema::TIME => Self::Time,
            _ => Self::Ignored,
        }
    }
}

/// Per-row scratch values that only mean something in combination.
#[derive(Debug, Default)]
struct RowStash<'a> {
    service_name: Option<&'a str>,
    annotation: Option<&'a str>,
    annotation_key: Option<&'a str>,
    endpoint_host: Option<&'a str>,
    time: Option<i64>,
}

pub fn merge_series_into_span(series: &Series) -> Result<Option<Span>> {
    if series.values.is_empty() {
        return Ok(None);
    }

    let raw_id = series.tags.get(schema::ID).ok_or_else(|| {
        ZipfluxError::MalformedIdentifier(format!("series {} has no id tag", series.name))
    })?;
    let trace_id = series.tags.get(schema::TRACE_ID).ok_or_else(|| {
        ZipfluxError::MalformedIdentifier(format!("series {} has no trace_id tag", series.name))
    })?;
    let id = decode(raw_id)?;

    let columns: Vec<Column> = series.columns.iter().map(|c| Column::resolve(c)).collect();
    let tagged_service = series
        .tags
        .get(schema::SERVICE_NAME)
        .map(String::as_str)
        .filter(|s| !s.is_empty());

    let mut builder = Span::builder();
    builder.trace_id(trace_id.as_str()).id(id.as_str());

    for row in &series.values {
        let mut stash = RowStash {
            service_name: tagged_service,
            ..RowStash::default()
        };

        for (column, value) in columns.iter().zip(row.iter()) {
            if value.is_null() {
                continue;
            }
            match column {
                Column::ParentId => {
                    let parent = decode(&scalar_text(value)?)?;
                    if let Some(parent) = normalize_parent(&parent, &id) {
                        builder.parent_id(Some(parent));
                    }
                }
                Column::Name => {
                    if let Some(name) = value.as_str() {
                        builder.name(name);
                    }
                }
                Column::ServiceName => stash.service_name = non_empty(value),
                Column::Annotation => stash.annotation = non_empty(value),
                Column::AnnotationKey => stash.annotation_key = non_empty(value),
                Column::EndpointHost => stash.endpoint_host = non_empty(value),
                Column::DurationNs => {
                    builder.duration(Some(integer(value)? / 1000));
                }
                Column::Time => stash.time = Some(timestamp_micros(value)?),
                Column::Ignored => {}
            }
        }

        apply_row(&mut builder, &stash, &id);
    }

    builder.build().map(Some)
}

fn apply_row(builder: &mut SpanBuilder, stash: &RowStash<'_>, id: &str) {
    if let (Some(host), Some(service)) = (stash.endpoint_host, stash.service_name) {
        builder.local_endpoint(Endpoint::new(service, host));
    }

    match (stash.annotation_key, stash.annotation, stash.time) {
        (Some(key), Some(value), _) => {
            builder.put_tag(key, value);
        }
        (None, Some(value), Some(time)) => {
            builder.add_annotation(time, value);
        }
        (None, Some(value), None) => {
            warn!(span = id, annotation = value, "annotation row without time, skipping");
        }
        (_, None, time) => {
            if time.is_some() {
                builder.timestamp(time);
            }
        }
    }
}

fn non_empty(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

fn scalar_text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ZipfluxError::MalformedIdentifier(format!(
            "expected identifier, got {other}"
        ))),
    }
}

fn integer(value: &Value) -> Result<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .ok_or_else(|| ZipfluxError::Parse(format!("expected number, got {value}")))
}

/// Row time in microseconds. Numbers come back when the query asked for
/// `epoch=u`, RFC 3339 strings when it did not.
fn timestamp_micros(value: &Value) -> Result<i64> {
    if let Some(text) = value.as_str() {
        return DateTime::parse_from_rfc3339(text)
            .map(|ts| ts.timestamp_micros())
            .map_err(|e| ZipfluxError::Parse(format!("bad time {text}: {e}")));
    }
    integer(value)
}

/// Spans grouped by trace id, in the order traces first appear.
pub fn group_traces(response: &QueryResponse) -> Result<Vec<Vec<Span>>> {
    response.check_error()?;

    let mut traces: Vec<Vec<Span>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for series in response.series() {
        let Some(span) = merge_series_into_span(series)? else {
            continue;
        };
        match index.get(&span.trace_id) {
            Some(&i) => traces[i].push(span),
            None => {
                index.insert(span.trace_id.clone(), traces.len());
                traces.push(vec![span]);
            }
        }
    }
    Ok(traces)
}

pub fn collect_spans(response: &QueryResponse) -> Result<Vec<Span>> {
    response.check_error()?;

    let mut spans = Vec::new();
    for series in response.series() {
        if let Some(span) = merge_series_into_span(series)? {
            spans.push(span);
        }
    }
    Ok(spans)
}

/// Values of a `SHOW TAG VALUES` response, sorted and deduplicated.
pub fn tag_values(response: &QueryResponse) -> Result<Vec<String>> {
    response.check_error()?;

    let mut out = Vec::new();
    for series in response.series() {
        let Some(idx) = series.column_index(schema::TAG_VALUE) else {
            continue;
        };
        for row in &series.values {
            if let Some(v) = row.get(idx).and_then(Value::as_str) {
                out.push(v.to_string());
            }
        }
    }
    out.sort();
    out.dedup();
    Ok(out)
}

/// Rows of the per-day COUNT aggregation, skipping empty buckets.
pub fn dependency_buckets(response: &QueryResponse) -> Result<Vec<DependencyBucket>> {
    response.check_error()?;

    let mut out = Vec::new();
    for series in response.series() {
        let Some(raw_id) = series.tags.get(schema::ID) else {
            continue;
        };
        let id = decode(raw_id)?;
        let parent_id = match series.tags.get(schema::PARENT_ID) {
            Some(raw) if !raw.is_empty() => normalize_parent(&decode(raw)?, &id),
            _ => None,
        };
        let time_idx = series.column_index(schema::TIME);
        let count_idx = series.column_index(schema::COUNT);

        for row in &series.values {
            let count = match count_idx.and_then(|i| row.get(i)) {
                Some(v) if !v.is_null() => integer(v)?,
                _ => 0,
            };
            if count <= 0 {
                continue;
            }
            let bucket = match time_idx.and_then(|i| row.get(i)) {
                Some(v) if !v.is_null() => timestamp_micros(v)?,
                _ => 0,
            };
            out.push(DependencyBucket {
                id: id.clone(),
                parent_id: parent_id.clone(),
                bucket,
                count: count as u64,
            });
        }
    }
    Ok(out)
}
