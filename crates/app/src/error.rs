//! Error types of the application server.
//!
//! [`AppError`] is whatever an application returns; [`ProtocolViolation`]
//! covers applications that break the start-response contract;
//! [`DispatchError`] is the outcome of a failed request, and knows which
//! status the client should see.

use std::error::Error;

use http::{Method, StatusCode};
use micro_http::protocol::SendError;
use thiserror::Error;

/// An error raised by an application or its body producer.
pub type AppError = Box<dyn Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ProtocolViolation {
    #[error("application produced a body without calling start_response")]
    NoStartResponse,

    #[error("start_response called twice without error information")]
    StartResponseTwice,

    #[error("write called before start_response")]
    WriteBeforeStart,

    #[error("invalid response body: {reason}")]
    InvalidBody { reason: String },

    #[error("invalid status line {status:?}")]
    InvalidStatus { status: String },

    #[error("invalid response header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid content-length {value:?}")]
    InvalidContentLength { value: String },
}

impl ProtocolViolation {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_status<S: ToString>(str: S) -> Self {
        Self::InvalidStatus { status: str.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { value: str.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no route for {method} {path}")]
    RouteNotFound { method: Method, path: String },

    #[error("bad request: {reason}")]
    BadRequest { reason: String },

    #[error("protocol violation: {source}")]
    Protocol {
        #[from]
        source: ProtocolViolation,
    },

    #[error("application error: {source}")]
    Application { source: AppError },

    #[error("response body failed: {source}")]
    Streaming { source: AppError },

    #[error("client disconnected: {source}")]
    Disconnected {
        #[from]
        source: SendError,
    },
}

impl DispatchError {
    pub fn bad_request<S: ToString>(str: S) -> Self {
        Self::BadRequest { reason: str.to_string() }
    }

    pub fn application(source: AppError) -> Self {
        Self::Application { source }
    }

    pub fn streaming(source: AppError) -> Self {
        Self::Streaming { source }
    }

    /// The status of the error response sent for this failure, if one can
    /// still be sent.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            DispatchError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            DispatchError::Protocol { .. }
            | DispatchError::Application { .. }
            | DispatchError::Streaming { .. }
            | DispatchError::Disconnected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
