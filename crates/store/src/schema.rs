//! Column layout of the span measurement. Every stored row is one event of
//! one span; the span's identity lives in the tag set.

// tags
pub const TRACE_ID: &str = "trace_id";
pub const ID: &str = "id";
pub const PARENT_ID: &str = "parent_id";
pub const SERVICE_NAME: &str = "service_name";

// fields
pub const NAME: &str = "name";
pub const ANNOTATION: &str = "annotation";
pub const ANNOTATION_KEY: &str = "annotation_key";
pub const ANNOTATION_VALUE: &str = "annotation_value";
pub const ENDPOINT_HOST: &str = "endpoint_host";
pub const DURATION_NS: &str = "duration_ns";
pub const TIME: &str = "time";

/// Column carrying the results of `SHOW TAG VALUES`.
pub const TAG_VALUE: &str = "value";
/// Column name InfluxDB gives a `COUNT(...)` aggregate.
pub const COUNT: &str = "count";
