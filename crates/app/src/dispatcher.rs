//! Runs one request through routing, the application and its body.
//!
//! The [`Dispatcher`] is the transport's [`Handler`]: for every request it
//! routes, builds the [`Environ`](crate::environ::Environ), invokes the
//! application and streams the body it returns. Framing is decided when the
//! head is committed, after up to two body chunks have been pulled:
//!
//! - an application `Content-Length` wins; the body is cut to it and a body
//!   that falls short aborts the connection
//! - a body whose length is known by then is sent with `Content-Length`
//! - anything else is sent chunked
//!
//! Failures before the head is committed produce a complete error response.
//! After that the status is out, so the connection is aborted instead.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use micro_http::handler::{Handler, Request, ResponseWriter};
use micro_http::protocol::{PayloadSize, ResponseHead, SendError};
use tracing::{debug, debug_span, error, trace, warn};

use crate::application::Application;
use crate::body::{Body, ChunkSource, Pull};
use crate::environ::{Environ, EnvironBuilder};
use crate::error::{AppError, DispatchError, ProtocolViolation};
use crate::header::{HeaderPolicy, declared_length};
use crate::router::{PathParams, RouteNotFound, Router};
use crate::start_response::StartResponse;

/// Chunks pulled before the head is committed.
const PRIMED_CHUNKS: usize = 2;

#[derive(Debug)]
pub struct Dispatcher {
    router: Arc<Router>,
    environ_builder: EnvironBuilder,
    header_policy: HeaderPolicy,
}

impl Dispatcher {
    pub fn new(router: Arc<Router>, environ_builder: EnvironBuilder) -> Self {
        Self { router, environ_builder, header_policy: HeaderPolicy::new() }
    }

    fn dispatch(&self, request: Request, exchange: &mut Exchange<'_>) -> Result<(), DispatchError> {
        let method = request.header().method().clone();
        let mut environ = self.environ_builder.build(request, PathParams::empty()).map_err(DispatchError::bad_request)?;

        let route = self
            .router
            .lookup(&method, environ.path())
            .map_err(|RouteNotFound { method, path }| DispatchError::RouteNotFound { method, path })?;
        let app = route.app();
        environ.set_route_params(route.into_params());

        let mut start_response = StartResponse::new();
        let body = invoke(app, &mut environ, &mut start_response)?;
        let mut source = ChunkSource::adapt(body)?;

        self.stream(&mut source, &mut start_response, exchange)
    }

    fn stream(
        &self,
        source: &mut ChunkSource,
        start_response: &mut StartResponse,
        exchange: &mut Exchange<'_>,
    ) -> Result<(), DispatchError> {
        let mut primed = Vec::with_capacity(PRIMED_CHUNKS);
        let mut exhausted = false;
        for _ in 0..PRIMED_CHUNKS {
            let pulled = pull(source, start_response)?;
            if !start_response.is_started() {
                return Err(ProtocolViolation::NoStartResponse.into());
            }
            match pulled {
                Pull::Chunk(chunk) => primed.push(chunk),
                Pull::Exhausted => {
                    exhausted = true;
                    break;
                }
            }
        }

        let (status, headers) = start_response.commit().ok_or(ProtocolViolation::NoStartResponse)?;
        let head = self.header_policy.finalize(status, headers)?;

        let mut pending = start_response.take_written();
        pending.append(&mut primed);

        let payload_size = match declared_length(&head) {
            Some(length) => PayloadSize::new_length(length),
            None => {
                let rest = if exhausted { Some(0) } else { source.remaining_len() };
                let pending_len: u64 = pending.iter().map(|chunk| chunk.len() as u64).sum();
                rest.map_or(PayloadSize::Chunked, |rest| PayloadSize::new_length(pending_len + rest))
            }
        };
        trace!(status = head.status(), ?payload_size, "committing response head");
        exchange.write_head(head, payload_size)?;

        for chunk in pending {
            exchange.write_chunk(chunk)?;
        }

        while !exhausted && !exchange.is_full() {
            let pulled = pull(source, start_response)?;
            for written in start_response.take_written() {
                exchange.write_chunk(written)?;
            }
            match pulled {
                Pull::Chunk(chunk) => exchange.write_chunk(chunk)?,
                Pull::Exhausted => exhausted = true,
            }
        }

        source.close();

        if let Some(missing) = exchange.remaining.filter(|missing| *missing > 0) {
            return Err(DispatchError::streaming(format!("response body is {missing} bytes short of its length").into()));
        }
        exchange.finish()?;
        Ok(())
    }
}

impl Handler for Dispatcher {
    fn handle(&self, request: Request, writer: &mut dyn ResponseWriter) {
        let span = debug_span!("request", method = %request.header().method(), path = %request.header().uri().path());
        let _enter = span.enter();

        let mut exchange = Exchange::new(writer);
        match self.dispatch(request, &mut exchange) {
            Ok(()) => trace!("response complete"),
            Err(e) => {
                match &e {
                    DispatchError::RouteNotFound { .. } => debug!(cause = %e, "no route"),
                    DispatchError::BadRequest { .. } | DispatchError::Disconnected { .. } => warn!(cause = %e, "request failed"),
                    DispatchError::Protocol { .. } | DispatchError::Application { .. } | DispatchError::Streaming { .. } => {
                        error!(cause = %e, committed = exchange.committed, "request failed")
                    }
                }
                exchange.fail(&self.header_policy, &e);
            }
        }
    }

    fn error_response(&self, status: StatusCode) -> (ResponseHead, Bytes) {
        (self.header_policy.error_head(status), Bytes::from_static(reason(status).as_bytes()))
    }
}

/// Writes one response and remembers how far it got.
struct Exchange<'w> {
    writer: &'w mut dyn ResponseWriter,
    committed: bool,
    /// Body bytes still owed when the framing has an exact length.
    remaining: Option<u64>,
}

impl<'w> Exchange<'w> {
    fn new(writer: &'w mut dyn ResponseWriter) -> Self {
        Self { writer, committed: false, remaining: None }
    }

    fn write_head(&mut self, head: ResponseHead, payload_size: PayloadSize) -> Result<(), SendError> {
        self.writer.write_head(head, payload_size)?;
        self.committed = true;
        self.remaining = payload_size.exact();
        Ok(())
    }

    /// Writes `chunk`, cut to what the framing still allows.
    fn write_chunk(&mut self, mut chunk: Bytes) -> Result<(), SendError> {
        if let Some(remaining) = self.remaining {
            let len = chunk.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
            chunk.truncate(len);
            self.remaining = Some(remaining - len as u64);
        }
        if chunk.is_empty() {
            return Ok(());
        }
        self.writer.write_chunk(chunk)
    }

    fn is_full(&self) -> bool {
        self.remaining == Some(0)
    }

    fn finish(&mut self) -> Result<(), SendError> {
        self.writer.finish()
    }

    fn fail(&mut self, header_policy: &HeaderPolicy, error: &DispatchError) {
        if self.committed || matches!(error, DispatchError::Disconnected { .. }) {
            self.writer.abort();
            return;
        }

        let status = error.status();
        let body = Bytes::from_static(reason(status).as_bytes());
        let sent = self
            .writer
            .write_head(header_policy.error_head(status), PayloadSize::new_length(body.len() as u64))
            .and_then(|()| self.writer.write_chunk(body))
            .and_then(|()| self.writer.finish());

        if let Err(e) = sent {
            warn!(cause = %e, "failed to send error response");
            self.writer.abort();
        }
    }
}

fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Error")
}

fn invoke(app: &dyn Application, environ: &mut Environ, start_response: &mut StartResponse) -> Result<Body, DispatchError> {
    match panic::catch_unwind(AssertUnwindSafe(|| app.call(environ, start_response))) {
        Ok(result) => result.map_err(DispatchError::application),
        Err(payload) => Err(DispatchError::application(panic_error(payload))),
    }
}

fn pull(source: &mut ChunkSource, start_response: &mut StartResponse) -> Result<Pull, DispatchError> {
    match panic::catch_unwind(AssertUnwindSafe(|| source.pull(start_response))) {
        Ok(result) => result.map_err(DispatchError::streaming),
        Err(payload) => Err(DispatchError::streaming(panic_error(payload))),
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> AppError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("application panicked: {message}").into()
}
