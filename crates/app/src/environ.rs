//! The per-request environment handed to applications.
//!
//! An [`Environ`] is a string map following the CGI naming scheme:
//! `REQUEST_METHOD`, `PATH_INFO`, `QUERY_STRING`, `SERVER_*`, `REMOTE_*` and
//! one `HTTP_<NAME>` entry per request header. `Content-Length`,
//! `Content-Type`, `Host`, `User-Agent` and `Accept-Encoding` are stored
//! without the `HTTP_` prefix. Header names containing `_` are dropped, since
//! they would be indistinguishable from their `-` spelling.

use std::borrow::Cow;
use std::collections::BTreeMap;

use micro_http::handler::{ConnectionInfo, Request};
use micro_http::protocol::RequestHeader;
use micro_http::protocol::body::ReqBody;
use http::Version;
use thiserror::Error;
use tracing::debug;

use crate::input::Input;
use crate::router::PathParams;

pub const REQUEST_METHOD: &str = "REQUEST_METHOD";
pub const SCRIPT_NAME: &str = "SCRIPT_NAME";
pub const PATH_INFO: &str = "PATH_INFO";
pub const QUERY_STRING: &str = "QUERY_STRING";
pub const SERVER_PROTOCOL: &str = "SERVER_PROTOCOL";
pub const SERVER_NAME: &str = "SERVER_NAME";
pub const SERVER_PORT: &str = "SERVER_PORT";
pub const REMOTE_ADDR: &str = "REMOTE_ADDR";
pub const REMOTE_PORT: &str = "REMOTE_PORT";
pub const CONTENT_LENGTH: &str = "CONTENT_LENGTH";
pub const CONTENT_TYPE: &str = "CONTENT_TYPE";
pub const URL_SCHEME: &str = "wsgi.url_scheme";

const HEADER_PREFIX: &str = "HTTP_";

/// Headers stored under their bare name.
const UNPREFIXED_HEADERS: [&str; 5] = [CONTENT_LENGTH, CONTENT_TYPE, "HOST", "USER_AGENT", "ACCEPT_ENCODING"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironError {
    #[error("invalid percent-encoding in path {path:?}")]
    InvalidPercentEncoding { path: String },

    #[error("path {path:?} does not decode to utf-8")]
    InvalidUtf8 { path: String },
}

/// Creates environs; holds what is the same for every request of a server.
#[derive(Debug, Clone)]
pub struct EnvironBuilder {
    server_name: String,
    server_port: String,
}

impl EnvironBuilder {
    pub fn new(server_name: impl Into<String>, server_port: u16) -> Self {
        Self { server_name: server_name.into(), server_port: server_port.to_string() }
    }

    pub fn build(&self, request: Request, params: PathParams) -> Result<Environ, EnvironError> {
        let (header, body, connection_info) = request.into_parts();
        self.build_from_parts(header, body, connection_info, params)
    }

    pub fn build_from_parts(
        &self,
        header: RequestHeader,
        body: ReqBody,
        connection_info: ConnectionInfo,
        params: PathParams,
    ) -> Result<Environ, EnvironError> {
        let mut vars = BTreeMap::new();

        let uri = header.uri();
        vars.insert(REQUEST_METHOD.to_string(), header.method().as_str().to_string());
        vars.insert(SCRIPT_NAME.to_string(), String::new());
        vars.insert(PATH_INFO.to_string(), decode_path(uri.path())?.into_owned());
        vars.insert(QUERY_STRING.to_string(), uri.query().unwrap_or_default().to_string());
        vars.insert(SERVER_PROTOCOL.to_string(), server_protocol(header.version()).to_string());
        vars.insert(SERVER_NAME.to_string(), self.server_name.clone());
        vars.insert(SERVER_PORT.to_string(), self.server_port.clone());
        vars.insert(URL_SCHEME.to_string(), "http".to_string());

        if let Some(remote_addr) = connection_info.remote_addr {
            vars.insert(REMOTE_ADDR.to_string(), remote_addr.ip().to_string());
            vars.insert(REMOTE_PORT.to_string(), remote_addr.port().to_string());
        }

        for (name, value) in header.headers() {
            let name = name.as_str();
            if name.contains('_') {
                debug!(header = name, "dropping header with underscore in its name");
                continue;
            }

            let value = String::from_utf8_lossy(value.as_bytes());
            // RFC 6265 separates cookie pairs with "; "
            let separator = if name == "cookie" { "; " } else { "," };
            vars.entry(header_key(name))
                .and_modify(|joined: &mut String| {
                    joined.push_str(separator);
                    joined.push_str(&value);
                })
                .or_insert_with(|| value.into_owned());
        }

        Ok(Environ { vars, params, input: Input::new(body) })
    }
}

/// The environment of one request.
#[derive(Debug)]
pub struct Environ {
    vars: BTreeMap<String, String>,
    params: PathParams,
    input: Input,
}

impl Environ {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn method(&self) -> &str {
        self.get(REQUEST_METHOD).unwrap_or_default()
    }

    /// The percent-decoded request path.
    pub fn path(&self) -> &str {
        self.get(PATH_INFO).unwrap_or_default()
    }

    pub fn query_string(&self) -> &str {
        self.get(QUERY_STRING).unwrap_or_default()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.get(CONTENT_LENGTH).and_then(|value| value.trim().parse().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get(CONTENT_TYPE)
    }

    /// Looks a request header up by its HTTP name, e.g. `"User-Agent"`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.get(&header_key(name))
    }

    /// The `HTTP_*` entries, in key order.
    pub fn http_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(key, _)| key.starts_with(HEADER_PREFIX))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn route_param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn route_params(&self) -> &PathParams {
        &self.params
    }

    /// The request body.
    pub fn input(&mut self) -> &mut Input {
        &mut self.input
    }

    pub(crate) fn set_route_params(&mut self, params: PathParams) {
        self.params = params;
    }
}

fn header_key(name: &str) -> String {
    let key = name.to_ascii_uppercase().replace('-', "_");
    if UNPREFIXED_HEADERS.contains(&key.as_str()) { key } else { format!("{HEADER_PREFIX}{key}") }
}

fn server_protocol(version: Version) -> &'static str {
    match version {
        Version::HTTP_10 => "HTTP/1.0",
        _ => "HTTP/1.1",
    }
}

/// Decodes `%XX` escapes. Unlike query strings, `+` stays as is; a malformed
/// escape or a result that is not utf-8 is an error rather than passed
/// through.
fn decode_path(path: &str) -> Result<Cow<'_, str>, EnvironError> {
    if !path.contains('%') {
        return Ok(Cow::Borrowed(path));
    }

    let bytes = path.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            decoded.push(bytes[i]);
            i += 1;
            continue;
        }

        let escaped = bytes.get(i + 1..i + 3).and_then(|pair| Some((hex_digit(pair[0])?, hex_digit(pair[1])?)));
        let Some((high, low)) = escaped else {
            return Err(EnvironError::InvalidPercentEncoding { path: path.to_string() });
        };
        decoded.push(high << 4 | low);
        i += 3;
    }

    String::from_utf8(decoded).map(Cow::Owned).map_err(|_| EnvironError::InvalidUtf8 { path: path.to_string() })
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) fn test_environ(path: &str) -> Environ {
    let header: RequestHeader = http::Request::get(path).body(()).unwrap().into();
    EnvironBuilder::new("localhost", 8000)
        .build_from_parts(header, ReqBody::empty(), ConnectionInfo::default(), PathParams::empty())
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use std::net::SocketAddr;

    fn environ(request: http::Request<()>, body: ReqBody) -> Result<Environ, EnvironError> {
        let remote_addr: SocketAddr = "10.0.0.7:51234".parse().unwrap();
        let connection_info = ConnectionInfo { local_addr: None, remote_addr: Some(remote_addr) };
        EnvironBuilder::new("example.test", 8080).build_from_parts(request.into(), body, connection_info, PathParams::empty())
    }

    #[test]
    fn base_keys() {
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/echo/a%20b?x=1&y=2")
            .version(Version::HTTP_10)
            .body(())
            .unwrap();
        let environ = environ(request, ReqBody::empty()).unwrap();

        assert_eq!(environ.method(), "POST");
        assert_eq!(environ.path(), "/echo/a b");
        assert_eq!(environ.query_string(), "x=1&y=2");
        assert_eq!(environ.get(SERVER_PROTOCOL), Some("HTTP/1.0"));
        assert_eq!(environ.get(SERVER_NAME), Some("example.test"));
        assert_eq!(environ.get(SERVER_PORT), Some("8080"));
        assert_eq!(environ.get(REMOTE_ADDR), Some("10.0.0.7"));
        assert_eq!(environ.get(REMOTE_PORT), Some("51234"));
        assert_eq!(environ.get(SCRIPT_NAME), Some(""));
        assert_eq!(environ.get(URL_SCHEME), Some("http"));
    }

    #[test]
    fn header_keys() {
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/")
            .header("Host", "example.test")
            .header("User-Agent", "curl/8.0")
            .header("Content-Type", "text/plain")
            .header("Content-Length", "11")
            .header("Hello", "World")
            .header("X-Forwarded-For", "1.1.1.1")
            .header("Accept", "text/html")
            .header("Accept", "text/plain")
            .header("X_Smuggled", "yes")
            .body(())
            .unwrap();
        let environ = environ(request, ReqBody::from_chunks(["Hello World"])).unwrap();

        assert_eq!(environ.get("HOST"), Some("example.test"));
        assert_eq!(environ.get("USER_AGENT"), Some("curl/8.0"));
        assert_eq!(environ.content_type(), Some("text/plain"));
        assert_eq!(environ.content_length(), Some(11));
        assert_eq!(environ.get("HTTP_HELLO"), Some("World"));
        assert_eq!(environ.get("HTTP_ACCEPT"), Some("text/html,text/plain"));
        assert_eq!(environ.header("x-forwarded-for"), Some("1.1.1.1"));
        assert_eq!(environ.header("User-Agent"), Some("curl/8.0"));
        assert_eq!(environ.get("HTTP_HOST"), None);
        assert!(environ.iter().all(|(key, _)| !key.contains("SMUGGLED")));

        let http_headers: Vec<_> = environ.http_headers().collect();
        assert_eq!(
            http_headers,
            vec![("HTTP_ACCEPT", "text/html,text/plain"), ("HTTP_HELLO", "World"), ("HTTP_X_FORWARDED_FOR", "1.1.1.1")]
        );
    }

    #[test]
    fn repeated_cookies_join_with_semicolon() {
        let request = http::Request::builder()
            .uri("/")
            .header("Cookie", "a=1")
            .header("Cookie", "b=2; c=3")
            .body(())
            .unwrap();
        let environ = environ(request, ReqBody::empty()).unwrap();

        assert_eq!(environ.get("HTTP_COOKIE"), Some("a=1; b=2; c=3"));
    }

    #[test]
    fn body_is_readable() {
        let request = http::Request::post("/").body(()).unwrap();
        let mut environ = environ(request, ReqBody::from_chunks(["Hello", " World"])).unwrap();
        assert_eq!(environ.input().read(None).unwrap(), "Hello World");
        assert_eq!(environ.input().read(None).unwrap(), "");
    }

    #[test]
    fn route_params() {
        let mut environ = test_environ("/users/42");
        assert_eq!(environ.route_param("id"), None);

        let router = crate::router::Router::builder()
            .route("/users/{id}", crate::router::get(crate::application::app_fn(|_, _| Ok(crate::body::Body::empty()))))
            .unwrap()
            .build();
        let params = router.lookup(&Method::GET, environ.path()).unwrap().into_params();
        environ.set_route_params(params);
        assert_eq!(environ.route_param("id"), Some("42"));
    }

    #[test]
    fn strict_percent_decoding() {
        assert_eq!(decode_path("/plain").unwrap(), "/plain");
        assert_eq!(decode_path("/a%2Fb+c").unwrap(), "/a/b+c");
        assert_eq!(decode_path("/caf%C3%A9").unwrap(), "/café");

        for path in ["/%", "/%2", "/%zz", "/a%2"] {
            assert!(matches!(decode_path(path), Err(EnvironError::InvalidPercentEncoding { .. })), "{path}");
        }
        assert!(matches!(decode_path("/%ff"), Err(EnvironError::InvalidUtf8 { .. })));
    }

    #[test]
    fn bad_path_is_an_error() {
        let request = http::Request::get("/bad%zz").body(()).unwrap();
        assert!(environ(request, ReqBody::empty()).is_err());
    }
}
