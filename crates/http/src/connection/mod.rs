//! Per-connection request processing.
//!
//! [`HttpConnection`] owns one client socket. It keeps the connection alive
//! across requests (HTTP/1.1 by default, HTTP/1.0 on request), answers
//! `Expect: 100-continue`, and closes the socket when a handler aborts a
//! response half way.

mod http_connection;

pub use http_connection::HttpConnection;
