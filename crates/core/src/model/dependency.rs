use serde::{Deserialize, Serialize};

/// A caller to callee edge between two services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DependencyLink {
    pub parent: String,
    pub child: String,
    pub call_count: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub error_count: u64,
}

/// One row of the raw dependency aggregation: how many rows a
/// (span, parent) pair wrote inside a one-day bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DependencyBucket {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub bucket: i64,
    pub count: u64,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}
