//! Well-known annotation values and binary annotation keys.

/// The client sent ("cs") a request to a server.
pub const CLIENT_SEND: &str = "cs";

/// The client received ("cr") a response from a server.
pub const CLIENT_RECV: &str = "cr";

/// The server sent ("ss") a response to a client.
pub const SERVER_SEND: &str = "ss";

/// The server received ("sr") a request from a client.
pub const SERVER_RECV: &str = "sr";

/// Address of the server a client span called.
pub const SERVER_ADDR: &str = "sa";

/// Address of the client that called a server span.
pub const CLIENT_ADDR: &str = "ca";

/// Placeholder key for spans that carry no other endpoint-bearing data.
pub const LOCAL_COMPONENT: &str = "lc";

/// Tag marking a failed span.
pub const ERROR: &str = "error";
