use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZipfluxError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Endpoint {
    /// Builds an endpoint from a stored host. IPv6 literals land in `ipv6`,
    /// anything else is kept verbatim in `ipv4`.
    pub fn new(service_name: impl Into<String>, host: &str) -> Self {
        let (ipv4, ipv6) = match host.parse::<IpAddr>() {
            Ok(IpAddr::V6(addr)) => (None, Some(addr.to_string())),
            _ if host.is_empty() => (None, None),
            _ => (Some(host.to_string()), None),
        };
        Self {
            service_name: service_name.into(),
            ipv4,
            ipv6,
            port: None,
        }
    }

    pub fn service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Annotation {
    pub timestamp: i64,
    pub value: String,
}

impl Annotation {
    pub fn new(timestamp: i64, value: impl Into<String>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }
}

/// A span in the v2 model: one local endpoint, timestamped annotations and a
/// tag map. Timestamps and durations are microseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_endpoint: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl Span {
    pub fn builder() -> SpanBuilder {
        SpanBuilder::default()
    }

    pub fn service_name(&self) -> Option<&str> {
        self.local_endpoint
            .as_ref()
            .map(|e| e.service_name.as_str())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpanBuilder {
    trace_id: String,
    parent_id: Option<String>,
    id: String,
    name: String,
    timestamp: Option<i64>,
    duration: Option<i64>,
    local_endpoint: Option<Endpoint>,
    annotations: Vec<Annotation>,
    tags: BTreeMap<String, String>,
}

impl SpanBuilder {
    pub fn trace_id(&mut self, trace_id: impl Into<String>) -> &mut Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn id(&mut self, id: impl Into<String>) -> &mut Self {
        self.id = id.into();
        self
    }

    pub fn parent_id(&mut self, parent_id: Option<String>) -> &mut Self {
        self.parent_id = parent_id;
        self
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn timestamp(&mut self, timestamp: Option<i64>) -> &mut Self {
        self.timestamp = timestamp;
        self
    }

    pub fn duration(&mut self, duration: Option<i64>) -> &mut Self {
        self.duration = duration;
        self
    }

    pub fn local_endpoint(&mut self, endpoint: Endpoint) -> &mut Self {
        self.local_endpoint = Some(endpoint);
        self
    }

    pub fn add_annotation(&mut self, timestamp: i64, value: impl Into<String>) -> &mut Self {
        self.annotations.push(Annotation::new(timestamp, value));
        self
    }

    pub fn put_tag(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Annotations come out sorted by timestamp regardless of row order.
    pub fn build(mut self) -> Result<Span> {
        if self.id.is_empty() {
            return Err(ZipfluxError::MalformedIdentifier(
                "span id must not be empty".to_string(),
            ));
        }
        if self.trace_id.is_empty() {
            return Err(ZipfluxError::MalformedIdentifier(format!(
                "span {} has no trace id",
                self.id
            )));
        }
        self.annotations.sort();

        Ok(Span {
            trace_id: self.trace_id,
            parent_id: self.parent_id,
            id: self.id,
            name: self.name,
            timestamp: self.timestamp,
            duration: self.duration,
            local_endpoint: self.local_endpoint,
            annotations: self.annotations,
            tags: self.tags,
        })
    }
}
