use serde::{Deserialize, Serialize};

use crate::model::span::Endpoint;

/// The annotation-based span model: every event and tag carries the endpoint
/// that recorded it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct V1Span {
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default)]
    pub annotations: Vec<V1Annotation>,
    #[serde(default)]
    pub binary_annotations: Vec<BinaryAnnotation>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub debug: bool,
}

impl V1Span {
    pub fn annotation(&self, value: &str) -> Option<&V1Annotation> {
        self.annotations.iter().find(|a| a.value == value)
    }

    pub fn binary_annotation(&self, key: &str) -> Option<&BinaryAnnotation> {
        self.binary_annotations.iter().find(|a| a.key == key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct V1Annotation {
    pub timestamp: i64,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BinaryValue {
    String(String),
    /// Address annotations ("sa", "ca") hold `true` and identify the peer
    /// through their endpoint.
    Address(bool),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BinaryAnnotation {
    pub key: String,
    pub value: BinaryValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
}

impl BinaryAnnotation {
    pub fn string(
        key: impl Into<String>,
        value: impl Into<String>,
        endpoint: Option<Endpoint>,
    ) -> Self {
        Self {
            key: key.into(),
            value: BinaryValue::String(value.into()),
            endpoint,
        }
    }

    pub fn address(key: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            key: key.into(),
            value: BinaryValue::Address(true),
            endpoint: Some(endpoint),
        }
    }
}
