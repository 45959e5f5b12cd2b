//! The seam between the transport and whatever answers requests.
//!
//! A [`Handler`] is synchronous: the connection runs it on tokio's blocking
//! pool, hands it the parsed [`Request`] and a [`ResponseWriter`], and streams
//! whatever the handler writes to the client while it is still running.

use std::net::SocketAddr;

use bytes::Bytes;
use http::StatusCode;
use http::header::CONTENT_TYPE;

use crate::protocol::body::ReqBody;
use crate::protocol::{PayloadSize, RequestHeader, ResponseHead, SendError};

/// Answers one request at a time.
///
/// `handle` may block: it runs on a blocking thread, reads the body through
/// [`Request::body_mut`] and writes the response through `writer`. Returning
/// without calling [`ResponseWriter::write_head`] makes the connection answer
/// `500 Internal Server Error`; returning after the head but before
/// [`ResponseWriter::finish`] closes the connection.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Request, writer: &mut dyn ResponseWriter);

    /// The response the connection sends when it has to answer on its own,
    /// e.g. for a malformed request.
    fn error_response(&self, status: StatusCode) -> (ResponseHead, Bytes) {
        let reason = status.canonical_reason().unwrap_or("Error");
        let mut head = ResponseHead::from_status(status);
        head.push_header(CONTENT_TYPE.as_str(), "text/plain; charset=utf-8");
        (head, Bytes::from(reason))
    }
}

/// Writes one response; implemented by the connection.
pub trait ResponseWriter {
    /// Sends the status line and headers. `payload_size` decides the framing.
    fn write_head(&mut self, head: ResponseHead, payload_size: PayloadSize) -> Result<(), SendError>;

    fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SendError>;

    /// Marks the body complete.
    fn finish(&mut self) -> Result<(), SendError>;

    /// Gives up on a response that can no longer be completed; the connection
    /// is closed without finishing the body.
    fn abort(&mut self);
}

/// Addresses of the connection a request arrived on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub local_addr: Option<SocketAddr>,
    pub remote_addr: Option<SocketAddr>,
}

/// A parsed request head plus its streaming body.
#[derive(Debug)]
pub struct Request {
    header: RequestHeader,
    body: ReqBody,
    connection_info: ConnectionInfo,
}

impl Request {
    pub fn new(header: RequestHeader, body: ReqBody) -> Self {
        Self { header, body, connection_info: ConnectionInfo::default() }
    }

    pub fn with_connection_info(mut self, connection_info: ConnectionInfo) -> Self {
        self.connection_info = connection_info;
        self
    }

    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn body_mut(&mut self) -> &mut ReqBody {
        &mut self.body
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        self.connection_info
    }

    pub fn into_parts(self) -> (RequestHeader, ReqBody, ConnectionInfo) {
        (self.header, self.body, self.connection_info)
    }
}

/// A [`Handler`] made from a closure.
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(Request, &mut dyn ResponseWriter) + Send + Sync + 'static,
{
    fn handle(&self, request: Request, writer: &mut dyn ResponseWriter) {
        (self.f)(request, writer)
    }
}

pub fn make_handler<F>(f: F) -> HandlerFn<F>
where
    F: Fn(Request, &mut dyn ResponseWriter) + Send + Sync + 'static,
{
    HandlerFn { f }
}
