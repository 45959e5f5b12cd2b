//! Turns the head an application recorded into the head that is sent.

use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, DATE, SERVER, TRANSFER_ENCODING};
use http::{HeaderName, HeaderValue, StatusCode};
use micro_http::protocol::ResponseHead;
use tracing::debug;

use crate::date::DateService;
use crate::error::ProtocolViolation;

/// The `Server` header sent unless the application sets its own.
pub const SERVER_NAME: &str = concat!("micro-app/", env!("CARGO_PKG_VERSION"));

/// Validates application headers and adds the ones every response carries.
#[derive(Debug, Clone, Copy)]
pub struct HeaderPolicy {
    date_service: &'static DateService,
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderPolicy {
    pub fn new() -> Self {
        Self { date_service: DateService::get_global_instance() }
    }

    /// Builds the outgoing head.
    ///
    /// Header names and values must be valid HTTP; order, duplicates and
    /// name casing are kept. `Server` and `Date` are added in front unless
    /// the application supplied them. `Connection` and `Transfer-Encoding`
    /// are dropped, the transport decides framing on its own. A
    /// `Content-Length` must be a number and, if repeated, the same number.
    pub fn finalize(&self, status: String, headers: Vec<(String, String)>) -> Result<ResponseHead, ProtocolViolation> {
        let mut finalized = Vec::with_capacity(headers.len() + 2);
        let mut content_length = None;

        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ProtocolViolation::invalid_header(format!("invalid name {name:?}")))?;
            HeaderValue::from_str(&value)
                .map_err(|_| ProtocolViolation::invalid_header(format!("invalid value for {name}")))?;

            if header_name == CONNECTION || header_name == TRANSFER_ENCODING {
                debug!(header = %name, "dropping hop-by-hop header set by application");
                continue;
            }

            if header_name == CONTENT_LENGTH {
                let length = parse_content_length(&value)?;
                if content_length.is_some_and(|previous| previous != length) {
                    return Err(ProtocolViolation::invalid_content_length(value));
                }
                content_length = Some(length);
            }

            finalized.push((name, value));
        }

        let mut head = ResponseHead::new(status, Vec::with_capacity(finalized.len() + 2));
        if !finalized.iter().any(|(name, _)| name.eq_ignore_ascii_case(SERVER.as_str())) {
            head.push_header(SERVER.as_str(), SERVER_NAME);
        }
        if !finalized.iter().any(|(name, _)| name.eq_ignore_ascii_case(DATE.as_str())) {
            head.push_header(DATE.as_str(), self.date_service.http_date());
        }
        for (name, value) in finalized {
            head.push_header(name, value);
        }

        Ok(head)
    }

    /// The complete head of a response the server answers on its own.
    pub fn error_head(&self, status: StatusCode) -> ResponseHead {
        let mut head = ResponseHead::from_status(status);
        head.push_header(SERVER.as_str(), SERVER_NAME);
        head.push_header(DATE.as_str(), self.date_service.http_date());
        head.push_header(CONTENT_TYPE.as_str(), mime::TEXT_PLAIN_UTF_8.as_ref());
        head
    }
}

/// The `Content-Length` of a head produced by [`HeaderPolicy::finalize`].
pub fn declared_length(head: &ResponseHead) -> Option<u64> {
    head.header(CONTENT_LENGTH.as_str()).and_then(|value| value.trim().parse().ok())
}

fn parse_content_length(value: &str) -> Result<u64, ProtocolViolation> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolViolation::invalid_content_length(value));
    }
    trimmed.parse().map_err(|_| ProtocolViolation::invalid_content_length(value))
}
