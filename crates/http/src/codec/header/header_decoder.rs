//! Request head decoding.
//!
//! The head is parsed with `httparse` into a fixed array of headers, then
//! copied into an `http::Request<()>`. The decoder also decides how the body is
//! framed (RFC 9112 section 6).
//!
//! # Limits
//!
//! - at most 64 header fields
//! - at most 8 KiB for the request line plus headers
//! - HTTP/1.0 and HTTP/1.1 only

use bytes::{Buf, BytesMut};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderName, HeaderValue, Request, Version};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;

use crate::protocol::{ParseError, PayloadSize, RequestHeader};

/// Maximum number of headers allowed in a request
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decodes a [`RequestHeader`] and the [`PayloadSize`] of the body that follows.
#[derive(Debug, Default)]
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let status = req.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            Error::Version => ParseError::InvalidVersion(None),
            e => ParseError::invalid_header(e.to_string()),
        })?;

        let body_offset = match status {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };

        trace!(head_size = body_offset, "parsed request head");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

        let version = match req.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            v => return Err(ParseError::InvalidVersion(v)),
        };

        let method = req.method.ok_or(ParseError::InvalidMethod)?;
        let path = req.path.ok_or(ParseError::InvalidUri)?;

        let mut builder = Request::builder().method(method).uri(path).version(version);
        if let Some(header_map) = builder.headers_mut() {
            header_map.reserve(req.headers.len());
            for header in req.headers.iter() {
                let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_header)?;
                let value = HeaderValue::from_bytes(header.value).map_err(ParseError::invalid_header)?;
                header_map.append(name, value);
            }
        }

        // builder errors here are an unparsable method or target
        let request = builder.body(()).map_err(|_| ParseError::InvalidUri)?;
        let header = RequestHeader::from(request);
        let payload_size = parse_payload(&header)?;

        src.advance(body_offset);
        Ok(Some((header, payload_size)))
    }
}

/// Works out the request body framing from `Transfer-Encoding` and `Content-Length`.
fn parse_payload(header: &RequestHeader) -> Result<PayloadSize, ParseError> {
    let te_header = header.headers().get(TRANSFER_ENCODING);
    let mut cl_headers = header.headers().get_all(CONTENT_LENGTH).iter();

    match (te_header, cl_headers.next()) {
        (None, None) => Ok(PayloadSize::new_empty()),

        (Some(te_value), None) => {
            ensure!(is_chunked(te_value), ParseError::invalid_header("transfer-encoding must end with chunked"));
            Ok(PayloadSize::new_chunked())
        }

        (None, Some(cl_value)) => {
            let length = parse_content_length(cl_value)?;
            // repeated content-length headers must agree
            for other in cl_headers {
                ensure!(
                    parse_content_length(other)? == length,
                    ParseError::invalid_content_length("conflicting content-length values")
                );
            }
            Ok(PayloadSize::new_length(length))
        }

        (Some(_), Some(_)) => {
            Err(ParseError::invalid_content_length("transfer-encoding and content-length both present in headers"))
        }
    }
}

fn parse_content_length(value: &HeaderValue) -> Result<u64, ParseError> {
    let value = value.to_str().map_err(|_| ParseError::invalid_content_length("value is not visible ascii"))?;
    value.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {value} is not u64")))
}

/// Chunked must be the final transfer coding.
fn is_chunked(value: &HeaderValue) -> bool {
    value
        .as_bytes()
        .rsplit(|b| *b == b',')
        .next()
        .is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}
