//! Conversion of instrumentation-side [`SimpleSpan`]s into the
//! annotation-based [`V1Span`] model.
//!
//! A simple span only declares its kind and start/finish timestamps. The v1
//! model expresses the same facts through RPC boundary annotations
//! (`cs`, `sr`, `ss`, `cr`), so conversion has to infer which of them are
//! already present, synthesize the missing ones, and then decide whether
//! the span may report its own timing at all.

use crate::constants::{
    CLIENT_ADDR, CLIENT_RECV, CLIENT_SEND, LOCAL_COMPONENT, SERVER_ADDR, SERVER_RECV, SERVER_SEND,
};
use crate::error::{Result, ZipfluxError};
use crate::model::simple::{Kind, SimpleSpan};
use crate::model::span::Endpoint;
use crate::model::v1::{BinaryAnnotation, V1Annotation, V1Span};

/// Facts about a span that drive annotation synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    ClientSend,
    ServerRecv,
    ServerSend,
    ClientRecv,
    /// Some annotation or tag already carries the local endpoint.
    LocalEndpoint,
}

impl Boundary {
    pub fn from_annotation(value: &str) -> Option<Self> {
        match value {
            CLIENT_SEND => Some(Self::ClientSend),
            SERVER_RECV => Some(Self::ServerRecv),
            SERVER_SEND => Some(Self::ServerSend),
            CLIENT_RECV => Some(Self::ClientRecv),
            _ => None,
        }
    }

    pub fn implied_kind(self) -> Option<Kind> {
        match self {
            Self::ClientSend | Self::ClientRecv => Some(Kind::Client),
            Self::ServerRecv | Self::ServerSend => Some(Kind::Server),
            Self::LocalEndpoint => None,
        }
    }

    fn annotation_value(self) -> Option<&'static str> {
        match self {
            Self::ClientSend => Some(CLIENT_SEND),
            Self::ServerRecv => Some(SERVER_RECV),
            Self::ServerSend => Some(SERVER_SEND),
            Self::ClientRecv => Some(CLIENT_RECV),
            Self::LocalEndpoint => None,
        }
    }

    fn mask(self) -> u8 {
        1 << (self as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Boundaries(u8);

impl Boundaries {
    pub fn insert(&mut self, boundary: Boundary) {
        self.0 |= boundary.mask();
    }

    pub fn contains(self, boundary: Boundary) -> bool {
        self.0 & boundary.mask() != 0
    }
}

/// Start and finish annotations expected for each kind, plus the binary
/// annotation key naming the remote side.
struct KindShape {
    start: Boundary,
    finish: Boundary,
    remote_key: &'static str,
}

fn shape(kind: Kind) -> KindShape {
    match kind {
        Kind::Client => KindShape {
            start: Boundary::ClientSend,
            finish: Boundary::ClientRecv,
            remote_key: SERVER_ADDR,
        },
        Kind::Server => KindShape {
            start: Boundary::ServerRecv,
            finish: Boundary::ServerSend,
            remote_key: CLIENT_ADDR,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timing {
    pub timestamp: Option<i64>,
    pub duration: Option<i64>,
}

impl Timing {
    pub fn from_bounds(start: Option<i64>, finish: Option<i64>) -> Self {
        let Some(start) = start else {
            return Self::default();
        };
        Self {
            timestamp: Some(start),
            duration: finish.map(|finish| (finish - start).max(1)),
        }
    }

    /// A server sharing its client's span id does not own the span timing,
    /// and a span started as client or server but never finished reports no
    /// timestamp.
    pub fn elide(self, boundaries: Boundaries, shared: bool, finished: bool) -> Self {
        let mut out = self;
        if shared && boundaries.contains(Boundary::ServerRecv) {
            out = Self::default();
        }
        let started = boundaries.contains(Boundary::ClientSend)
            || boundaries.contains(Boundary::ServerRecv);
        if started && !finished {
            out.timestamp = None;
        }
        out
    }
}

pub fn to_v1_span(span: &SimpleSpan) -> V1Span {
    let local = span.local_endpoint.clone();
    let start = span.start_timestamp.filter(|ts| *ts != 0);
    let finish = span.finish_timestamp;

    let mut boundaries = Boundaries::default();
    let mut kind = span.kind;
    let mut annotations = Vec::with_capacity(span.annotations.len() + 2);
    let mut binary_annotations = Vec::with_capacity(span.tags.len() + 1);

    for a in &span.annotations {
        annotations.push(V1Annotation {
            timestamp: a.timestamp,
            value: a.value.clone(),
            endpoint: local.clone(),
        });
        boundaries.insert(Boundary::LocalEndpoint);
        if let Some(boundary) = Boundary::from_annotation(&a.value) {
            boundaries.insert(boundary);
            kind = boundary.implied_kind().or(kind);
        }
    }

    for (key, value) in &span.tags {
        binary_annotations.push(BinaryAnnotation::string(key, value, local.clone()));
        boundaries.insert(Boundary::LocalEndpoint);
    }

    if let Some(kind) = kind {
        let shape = shape(kind);
        if let Some(remote) = &span.remote_endpoint {
            binary_annotations.push(BinaryAnnotation::address(shape.remote_key, remote.clone()));
        }
        for (boundary, at) in [(shape.start, start), (shape.finish, finish)] {
            if boundaries.contains(boundary) {
                continue;
            }
            let (Some(at), Some(value)) = (at, boundary.annotation_value()) else {
                continue;
            };
            boundaries.insert(boundary);
            annotations.push(V1Annotation {
                timestamp: at,
                value: value.to_string(),
                endpoint: local.clone(),
            });
        }
        boundaries.insert(Boundary::LocalEndpoint);
    }

    annotations.sort_by(|a, b| (a.timestamp, &a.value).cmp(&(b.timestamp, &b.value)));

    let timing = Timing::from_bounds(start, finish).elide(boundaries, span.shared, finish.is_some());

    if !boundaries.contains(Boundary::LocalEndpoint) {
        binary_annotations.push(local_component(local));
    }

    V1Span {
        trace_id: span.trace_id.clone(),
        parent_id: span.parent_id.clone(),
        id: span.id.clone(),
        name: span.name.clone().unwrap_or_default(),
        timestamp: timing.timestamp,
        duration: timing.duration,
        annotations,
        binary_annotations,
        debug: span.debug,
    }
}

pub fn to_v1_spans(spans: &[SimpleSpan]) -> Vec<V1Span> {
    spans.iter().map(to_v1_span).collect()
}

/// The reverse mapping was never defined for this storage backend.
pub fn to_simple_spans(_spans: &[V1Span]) -> Result<Vec<SimpleSpan>> {
    Err(ZipfluxError::UnsupportedOperation(
        "conversion from v1 spans to simple spans".to_string(),
    ))
}

fn local_component(endpoint: Option<Endpoint>) -> BinaryAnnotation {
    BinaryAnnotation::string(LOCAL_COMPONENT, "", endpoint)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::span::Annotation;
    use crate::model::v1::BinaryValue;

    fn base(kind: Option<Kind>) -> SimpleSpan {
        SimpleSpan {
            trace_id: "86154a4ba6e91385".into(),
            id: "4d1e00c0db9010db".into(),
            kind,
            name: Some("get".into()),
            local_endpoint: Some(Endpoint::new("frontend", "192.168.99.1")),
            ..SimpleSpan::default()
        }
    }

    fn values(span: &V1Span) -> Vec<(&str, i64)> {
        span.annotations
            .iter()
            .map(|a| (a.value.as_str(), a.timestamp))
            .collect()
    }

    #[test]
    fn client_span_gets_both_boundaries() {
        let span = SimpleSpan {
            start_timestamp: Some(100),
            finish_timestamp: Some(200),
            ..base(Some(Kind::Client))
        };
        let out = to_v1_span(&span);
        assert_eq!(values(&out), vec![("cs", 100), ("cr", 200)]);
        assert_eq!(out.timestamp, Some(100));
        assert_eq!(out.duration, Some(100));
        assert!(out.binary_annotation(LOCAL_COMPONENT).is_none());
        assert_eq!(
            out.annotation("cs").unwrap().endpoint,
            span.local_endpoint
        );
    }

    #[test]
    fn annotations_are_ordered_by_time() {
        let span = SimpleSpan {
            start_timestamp: Some(100),
            finish_timestamp: Some(400),
            annotations: vec![Annotation::new(300, "retry")],
            ..base(Some(Kind::Client))
        };
        let out = to_v1_span(&span);
        assert_eq!(values(&out), vec![("cs", 100), ("retry", 300), ("cr", 400)]);
    }

    #[test]
    fn server_span_records_client_address() {
        let span = SimpleSpan {
            start_timestamp: Some(100),
            finish_timestamp: Some(150),
            remote_endpoint: Some(Endpoint::new("frontend", "10.0.0.2")),
            ..base(Some(Kind::Server))
        };
        let out = to_v1_span(&span);
        assert_eq!(values(&out), vec![("sr", 100), ("ss", 150)]);
        let ca = out.binary_annotation(CLIENT_ADDR).unwrap();
        assert_eq!(ca.value, BinaryValue::Address(true));
        assert_eq!(ca.endpoint, span.remote_endpoint);
    }

    #[test]
    fn kind_is_inferred_from_annotations() {
        let span = SimpleSpan {
            start_timestamp: Some(100),
            finish_timestamp: Some(300),
            annotations: vec![Annotation::new(110, "sr")],
            ..base(None)
        };
        let out = to_v1_span(&span);
        assert_eq!(values(&out), vec![("sr", 110), ("ss", 300)]);
        assert_eq!(out.timestamp, Some(100));
        assert_eq!(out.duration, Some(200));
    }

    #[test]
    fn shared_server_span_drops_timing() {
        let span = SimpleSpan {
            start_timestamp: Some(100),
            finish_timestamp: Some(200),
            shared: true,
            ..base(Some(Kind::Server))
        };
        let out = to_v1_span(&span);
        assert!(out.annotation("sr").is_some());
        assert_eq!(out.timestamp, None);
        assert_eq!(out.duration, None);
    }

    #[test]
    fn shared_client_span_keeps_timing() {
        let span = SimpleSpan {
            start_timestamp: Some(100),
            finish_timestamp: Some(200),
            shared: true,
            ..base(Some(Kind::Client))
        };
        let out = to_v1_span(&span);
        assert_eq!(out.timestamp, Some(100));
        assert_eq!(out.duration, Some(100));
    }

    #[test]
    fn unfinished_rpc_span_reports_no_timestamp() {
        let span = SimpleSpan {
            start_timestamp: Some(100),
            ..base(Some(Kind::Client))
        };
        let out = to_v1_span(&span);
        assert_eq!(values(&out), vec![("cs", 100)]);
        assert_eq!(out.timestamp, None);
        assert_eq!(out.duration, None);
    }

    #[test]
    fn unfinished_local_span_keeps_timestamp() {
        let span = SimpleSpan {
            start_timestamp: Some(100),
            tags: BTreeMap::from([("lc".to_string(), "worker".to_string())]),
            ..base(None)
        };
        let out = to_v1_span(&span);
        assert_eq!(out.timestamp, Some(100));
        assert_eq!(out.duration, None);
    }

    #[test]
    fn duration_is_at_least_one() {
        let span = SimpleSpan {
            start_timestamp: Some(100),
            finish_timestamp: Some(100),
            ..base(None)
        };
        assert_eq!(to_v1_span(&span).duration, Some(1));

        let backwards = SimpleSpan {
            start_timestamp: Some(100),
            finish_timestamp: Some(40),
            ..base(None)
        };
        assert_eq!(to_v1_span(&backwards).duration, Some(1));
    }

    #[test]
    fn empty_span_gets_local_component_placeholder() {
        let span = SimpleSpan {
            local_endpoint: None,
            ..base(None)
        };
        let out = to_v1_span(&span);
        assert!(out.annotations.is_empty());
        assert_eq!(
            out.binary_annotations,
            vec![BinaryAnnotation::string(LOCAL_COMPONENT, "", None)]
        );
    }

    #[test]
    fn tags_become_binary_annotations() {
        let span = SimpleSpan {
            tags: BTreeMap::from([("http.path".to_string(), "/api".to_string())]),
            debug: true,
            ..base(None)
        };
        let out = to_v1_span(&span);
        assert_eq!(out.binary_annotations.len(), 1);
        let tag = out.binary_annotation("http.path").unwrap();
        assert_eq!(tag.value, BinaryValue::String("/api".into()));
        assert_eq!(tag.endpoint, span.local_endpoint);
        assert!(out.debug);
    }

    #[test]
    fn zero_start_is_treated_as_absent() {
        let span = SimpleSpan {
            start_timestamp: Some(0),
            finish_timestamp: Some(200),
            ..base(Some(Kind::Client))
        };
        let out = to_v1_span(&span);
        assert_eq!(values(&out), vec![("cr", 200)]);
        assert_eq!(out.timestamp, None);
    }

    #[test]
    fn elision_rules_are_ordered() {
        let mut b = Boundaries::default();
        b.insert(Boundary::ServerRecv);
        let timing = Timing::from_bounds(Some(10), Some(20));
        assert_eq!(timing.elide(b, true, true), Timing::default());
        assert_eq!(
            timing.elide(b, false, false),
            Timing {
                timestamp: None,
                duration: Some(10)
            }
        );
        assert_eq!(timing.elide(Boundaries::default(), true, false), timing);
    }

    #[test]
    fn reverse_conversion_is_unsupported() {
        assert!(matches!(
            to_simple_spans(&[]),
            Err(ZipfluxError::UnsupportedOperation(_))
        ));
    }
}
