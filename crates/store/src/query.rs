//! InfluxQL statements for the span measurement.
//!
//! Every builder is pure: string literals are single-quoted with backslash
//! escaping, identifiers are double-quoted, and time bounds are written in
//! epoch milliseconds (`time < 1000ms`).

use std::fmt::Write as _;

use zipflux_core::query::QueryRequest;

use crate::schema::{
    ANNOTATION_KEY, ANNOTATION_VALUE, DURATION_NS, ID, NAME, PARENT_ID, SERVICE_NAME, TRACE_ID,
};

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('\\', "\\\\").replace('"', "\\\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn eq(column: &str, value: &str) -> String {
    format!("{} = {}", quote_ident(column), quote_literal(value))
}

fn time_window(end_ts: i64, lookback: i64) -> String {
    format!("time < {end_ts}ms AND time > {}ms", end_ts - lookback)
}

fn annotation_predicate(key: &str, value: &str) -> String {
    if value.is_empty() {
        eq(ANNOTATION_KEY, key)
    } else {
        format!("({} AND {})", eq(ANNOTATION_KEY, key), eq(ANNOTATION_VALUE, value))
    }
}

fn span_grouping() -> String {
    format!(
        " GROUP BY {}, {} ORDER BY time DESC",
        quote_ident(TRACE_ID),
        quote_ident(ID)
    )
}

/// Rows of the spans matching `req`, one series per span.
///
/// `SLIMIT` caps the number of series rather than rows, which approximates
/// "the most recent N traces".
pub fn trace_filter_query(measurement: &str, req: &QueryRequest) -> String {
    let mut q = format!(
        "SELECT * FROM {} WHERE {}",
        quote_ident(measurement),
        eq(SERVICE_NAME, &req.service_name)
    );
    if let Some(name) = req.span_name.as_deref()
        && !name.is_empty()
    {
        let _ = write!(q, " AND {}", eq(NAME, name));
    }
    let _ = write!(q, " AND {}", time_window(req.end_ts, req.lookback));

    if !req.annotation_query.is_empty() {
        let preds: Vec<String> = req
            .annotation_query
            .iter()
            .map(|(k, v)| annotation_predicate(k, v))
            .collect();
        let _ = write!(q, " AND ({})", preds.join(" and "));
    }
    if let Some(min) = req.min_duration {
        let _ = write!(q, " AND {} >= {}", quote_ident(DURATION_NS), min.saturating_mul(1000));
    }
    if let Some(max) = req.max_duration {
        let _ = write!(q, " AND {} <= {}", quote_ident(DURATION_NS), max.saturating_mul(1000));
    }

    q.push_str(&span_grouping());
    let _ = write!(q, " SLIMIT {}", req.limit);
    q
}

pub fn trace_by_id_query(measurement: &str, trace_id: &str) -> String {
    format!(
        "SELECT * FROM {} WHERE {}{}",
        quote_ident(measurement),
        eq(TRACE_ID, trace_id),
        span_grouping()
    )
}

pub fn service_names_query(measurement: &str) -> String {
    format!(
        "SHOW TAG VALUES FROM {} WITH KEY = {}",
        quote_ident(measurement),
        quote_ident(SERVICE_NAME)
    )
}

/// `None` for an empty service name: there is nothing to ask the store.
pub fn span_names_query(measurement: &str, service_name: &str) -> Option<String> {
    if service_name.is_empty() {
        return None;
    }
    Some(format!(
        "SHOW TAG VALUES FROM {} WITH KEY = {} WHERE {}",
        quote_ident(measurement),
        quote_ident(NAME),
        eq(SERVICE_NAME, service_name)
    ))
}

/// Per-day call counts for each (span, parent) pair in the window.
pub fn dependencies_query(measurement: &str, end_ts: i64, lookback: i64) -> String {
    format!(
        "SELECT COUNT({}) FROM {} WHERE {} GROUP BY {}, {}, time(1d)",
        quote_ident(DURATION_NS),
        quote_ident(measurement),
        time_window(end_ts, lookback),
        quote_ident(ID),
        quote_ident(PARENT_ID)
    )
}

/// Every span row in the window, for linking parents to children.
pub fn dependency_spans_query(measurement: &str, end_ts: i64, lookback: i64) -> String {
    format!(
        "SELECT * FROM {} WHERE {}{}",
        quote_ident(measurement),
        time_window(end_ts, lookback),
        span_grouping()
    )
}
