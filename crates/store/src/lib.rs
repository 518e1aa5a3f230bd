pub mod merge;
pub mod query;
pub mod response;
pub mod schema;
pub mod span_store;
pub mod transport;

pub use response::{QueryResponse, QueryResult, Series};
pub use span_store::SpanStore;
pub use transport::{HttpSettings, HttpTransport, Precision, Transport};
