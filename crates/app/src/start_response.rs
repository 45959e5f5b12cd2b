//! The response initiator handed to applications.
//!
//! An application calls [`StartResponse::begin`] once with a status line and
//! header list before its body produces any bytes. Nothing is sent at that
//! point: the dispatcher commits the recorded head when the first body chunk
//! (or the end of the body) is known, which is why an application may still
//! replace its head through [`StartResponse::begin_after_error`] until then.

use std::mem;

use bytes::Bytes;

use crate::error::{AppError, ProtocolViolation};

/// Where a response is in its lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResponseState {
    #[default]
    NotStarted,
    Started {
        status: String,
        headers: Vec<(String, String)>,
    },
    /// The head has been handed to the transport; it can't change anymore.
    Committed,
}

#[derive(Debug, Default)]
pub struct StartResponse {
    state: ResponseState,
    written: Vec<Bytes>,
}

impl StartResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the status line (e.g. `"200 OK"`) and headers of the response.
    ///
    /// Fails with [`ProtocolViolation::StartResponseTwice`] if a head was
    /// already recorded; use [`begin_after_error`](Self::begin_after_error)
    /// to replace one.
    pub fn begin(&mut self, status: impl Into<String>, headers: Vec<(String, String)>) -> Result<(), ProtocolViolation> {
        match self.state {
            ResponseState::NotStarted => {
                let status = validate_status(status.into())?;
                self.state = ResponseState::Started { status, headers };
                Ok(())
            }
            ResponseState::Started { .. } | ResponseState::Committed => Err(ProtocolViolation::StartResponseTwice),
        }
    }

    /// Replaces the recorded head because the application hit `error`.
    ///
    /// Before the head is committed this succeeds and the new status and
    /// headers are used. Once committed the head can't change, so `error` is
    /// handed back for the application to propagate.
    pub fn begin_after_error(
        &mut self,
        status: impl Into<String>,
        headers: Vec<(String, String)>,
        error: AppError,
    ) -> Result<(), AppError> {
        if self.is_committed() {
            return Err(error);
        }
        let status = validate_status(status.into())?;
        self.state = ResponseState::Started { status, headers };
        Ok(())
    }

    /// Queues bytes to be sent ahead of the body's own chunks.
    pub fn write(&mut self, bytes: impl Into<Bytes>) -> Result<(), ProtocolViolation> {
        if self.state == ResponseState::NotStarted {
            return Err(ProtocolViolation::WriteBeforeStart);
        }
        let bytes = bytes.into();
        if !bytes.is_empty() {
            self.written.push(bytes);
        }
        Ok(())
    }

    pub fn state(&self) -> &ResponseState {
        &self.state
    }

    /// `true` once `begin` has been called, committed or not.
    pub fn is_started(&self) -> bool {
        self.state != ResponseState::NotStarted
    }

    pub fn is_committed(&self) -> bool {
        self.state == ResponseState::Committed
    }

    /// Moves `Started` to `Committed`, returning the recorded head.
    pub(crate) fn commit(&mut self) -> Option<(String, Vec<(String, String)>)> {
        match mem::replace(&mut self.state, ResponseState::Committed) {
            ResponseState::Started { status, headers } => Some((status, headers)),
            previous => {
                self.state = previous;
                None
            }
        }
    }

    pub(crate) fn take_written(&mut self) -> Vec<Bytes> {
        mem::take(&mut self.written)
    }
}

/// A status line is three digits, a space, and a reason phrase on one line.
fn validate_status(status: String) -> Result<String, ProtocolViolation> {
    let bytes = status.as_bytes();
    let well_formed = bytes.len() >= 4
        && bytes[..3].iter().all(u8::is_ascii_digit)
        && bytes[0] != b'0'
        && bytes[3] == b' '
        && !bytes.iter().any(|b| *b == b'\r' || *b == b'\n');

    if well_formed { Ok(status) } else { Err(ProtocolViolation::invalid_status(status)) }
}
