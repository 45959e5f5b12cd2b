//! HTTP response head.
//!
//! Unlike `http::Response`, the head keeps the status line exactly as the
//! application wrote it (`"200 OK"`, `"404 Nope"`) and keeps the header list in
//! application order, including repeated names and the original name casing.

use http::StatusCode;

/// Status line and ordered header list of an outgoing response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    status: String,
    headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// `status` is the part of the status line after the version, e.g. `"200 OK"`.
    pub fn new(status: impl Into<String>, headers: Vec<(String, String)>) -> Self {
        Self { status: status.into(), headers }
    }

    /// A head for a canonical status code with no headers.
    pub fn from_status(status: StatusCode) -> Self {
        let line = format!("{} {}", status.as_str(), status.canonical_reason().unwrap_or(""));
        Self { status: line.trim_end().to_string(), headers: Vec::new() }
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Parses the three digit code at the front of the status line.
    pub fn status_code(&self) -> Option<StatusCode> {
        self.status.get(..3).and_then(|code| StatusCode::from_bytes(code.as_bytes()).ok())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn contains_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Removes every header called `name`, returning how many were removed.
    pub fn remove_header(&mut self, name: &str) -> usize {
        let before = self.headers.len();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before - self.headers.len()
    }

    pub fn into_parts(self) -> (String, Vec<(String, String)>) {
        (self.status, self.headers)
    }
}
