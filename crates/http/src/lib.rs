//! The HTTP/1.1 transport behind `micro-app`.
//!
//! This crate parses requests off a tokio socket, hands each one to a
//! synchronous [`handler::Handler`] running on the blocking pool, and streams
//! the response the handler writes back to the client.
//!
//! # Features
//!
//! - HTTP/1.1 with keep-alive, HTTP/1.0 with opt-in keep-alive
//! - `Content-Length` and chunked request bodies, streamed to the handler with
//!   backpressure
//! - `Content-Length`, chunked and close-delimited response bodies
//! - `Expect: 100-continue`
//! - `HEAD` responses keep their framing headers but send no body
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use micro_http::connection::HttpConnection;
//! use micro_http::handler::{make_handler, Request, ResponseWriter};
//! use micro_http::protocol::{PayloadSize, ResponseHead};
//! use tokio::net::TcpListener;
//! use tracing::{error, warn};
//!
//! fn hello(_request: Request, writer: &mut dyn ResponseWriter) {
//!     let body = Bytes::from_static(b"Hello World!\r\n");
//!     let head = ResponseHead::new("200 OK", vec![("Content-Type".into(), "text/plain".into())]);
//!     if writer.write_head(head, PayloadSize::new_length(body.len() as u64)).is_ok()
//!         && writer.write_chunk(body).is_ok()
//!     {
//!         let _ = writer.finish();
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let tcp_listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let handler = Arc::new(make_handler(hello));
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = Arc::clone(&handler);
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             if let Err(e) = HttpConnection::new(reader, writer).process(handler).await {
//!                 error!(cause = %e, "connection closed with error");
//!             }
//!         });
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`connection`]: the per-connection request loop
//! - [`codec`]: wire decoding and encoding
//! - [`protocol`]: request/response types, the request body, errors
//! - [`handler`]: the `Handler` / `ResponseWriter` seam
//!
//! # Limitations
//!
//! - HTTP/1.x only, no TLS
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
