use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZipfluxError};
use crate::ids::{SpanId, TraceId};
use crate::model::span::{Annotation, Endpoint};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Kind {
    Client,
    Server,
}

/// A span as recorded by instrumentation: a kind plus start and finish
/// timestamps instead of explicit RPC annotations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SimpleSpan {
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Kind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub debug: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub shared: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_endpoint: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_endpoint: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl SimpleSpan {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let span: SimpleSpan = serde_json::from_slice(bytes)
            .map_err(|e| ZipfluxError::Parse(format!("invalid span json: {e}")))?;
        span.check_ids()?;
        Ok(span)
    }

    pub fn from_json_list(bytes: &[u8]) -> Result<Vec<Self>> {
        let spans: Vec<SimpleSpan> = serde_json::from_slice(bytes)
            .map_err(|e| ZipfluxError::Parse(format!("invalid span list json: {e}")))?;
        for span in &spans {
            span.check_ids()?;
        }
        Ok(spans)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| ZipfluxError::Internal(format!("span serialization failed: {e}")))
    }

    pub fn to_json_list(spans: &[SimpleSpan]) -> Result<Vec<u8>> {
        serde_json::to_vec(spans)
            .map_err(|e| ZipfluxError::Internal(format!("span serialization failed: {e}")))
    }

    fn check_ids(&self) -> Result<()> {
        TraceId::parse(&self.trace_id)?;
        SpanId::parse(&self.id)?;
        if let Some(parent) = &self.parent_id {
            SpanId::parse(parent)?;
        }
        Ok(())
    }
}
