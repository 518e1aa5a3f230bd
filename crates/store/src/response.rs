use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zipflux_core::error::{Result, ZipfluxError};

/// Body of an InfluxDB `/query` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<QueryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    #[serde(default)]
    pub statement_id: u32,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

impl QueryResponse {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| ZipfluxError::Transport(format!("invalid query response: {e}")))
    }

    /// Fails with the first error the store reported, top-level first.
    pub fn check_error(&self) -> Result<()> {
        if let Some(err) = &self.error {
            return Err(ZipfluxError::QueryExecution(err.clone()));
        }
        if let Some(err) = self.results.iter().find_map(|r| r.error.as_ref()) {
            return Err(ZipfluxError::QueryExecution(err.clone()));
        }
        Ok(())
    }

    pub fn series(&self) -> impl Iterator<Item = &Series> {
        self.results.iter().flat_map(|r| r.series.iter())
    }
}

impl Series {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}
