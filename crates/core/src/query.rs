use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZipfluxError};

/// Criteria for a trace search. `end_ts` and `lookback` are milliseconds,
/// durations are microseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub service_name: String,
    pub span_name: Option<String>,
    pub end_ts: i64,
    pub lookback: i64,
    pub min_duration: Option<i64>,
    pub max_duration: Option<i64>,
    /// Tag key to value. An empty value matches any span carrying the key.
    pub annotation_query: BTreeMap<String, String>,
    pub limit: usize,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            span_name: None,
            end_ts: 0,
            lookback: 86_400_000,
            min_duration: None,
            max_duration: None,
            annotation_query: BTreeMap::new(),
            limit: 10,
        }
    }
}

impl QueryRequest {
    pub fn start_ts(&self) -> i64 {
        self.end_ts - self.lookback
    }

    pub fn validate(&self) -> Result<()> {
        if self.service_name.is_empty() {
            return Err(ZipfluxError::InvalidArgument(
                "serviceName is required".to_string(),
            ));
        }
        if self.end_ts <= 0 {
            return Err(ZipfluxError::InvalidArgument(format!(
                "endTs must be positive, got {}",
                self.end_ts
            )));
        }
        if self.lookback <= 0 {
            return Err(ZipfluxError::InvalidArgument(format!(
                "lookback must be positive, got {}",
                self.lookback
            )));
        }
        if self.limit == 0 {
            return Err(ZipfluxError::InvalidArgument(
                "limit must be greater than zero".to_string(),
            ));
        }
        for (name, bound) in [
            ("minDuration", self.min_duration),
            ("maxDuration", self.max_duration),
        ] {
            if let Some(us) = bound
                && (us < 0 || us.checked_mul(1000).is_none())
            {
                return Err(ZipfluxError::InvalidArgument(format!(
                    "{name} must be between 0 and {} microseconds, got {us}",
                    i64::MAX / 1000
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.min_duration, self.max_duration)
            && min > max
        {
            return Err(ZipfluxError::InvalidArgument(format!(
                "minDuration {min} is greater than maxDuration {max}"
            )));
        }
        Ok(())
    }

    /// Parses the textual form `error and http.method=GET`.
    pub fn parse_annotation_query(input: &str) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for term in input.split(" and ") {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            let (key, value) = term.split_once('=').unwrap_or((term, ""));
            let key = key.trim();
            if key.is_empty() {
                return Err(ZipfluxError::Parse(format!(
                    "invalid annotation query term: {term}"
                )));
            }
            out.insert(key.to_string(), value.trim().to_string());
        }
        Ok(out)
    }
}
