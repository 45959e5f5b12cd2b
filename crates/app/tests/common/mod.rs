//! A tiny HTTP client for the end-to-end tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::net::SocketAddr;
use std::time::Duration;

use micro_app::{Router, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug)]
pub struct TestResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap()
    }
}

/// Binds `router` on an ephemeral port and serves it in the background.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let server = Server::builder().router(router).address("127.0.0.1:0").build().unwrap();
    let bound = server.bind().await.unwrap();
    let local_addr = bound.local_addr();
    tokio::spawn(bound.serve());
    local_addr
}

/// Writes `raw` and reads until the server closes the connection.
pub async fn exchange(addr: SocketAddr, raw: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut received))
        .await
        .expect("server did not close the connection")
        .unwrap();
    received
}

pub fn get(path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n")
}

pub fn get_and_close(path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
}

/// Sends one request on its own connection.
pub async fn fetch(addr: SocketAddr, path: &str) -> TestResponse {
    let received = exchange(addr, &get_and_close(path)).await;
    let (response, consumed) = parse_response(&received);
    assert_eq!(consumed, received.len(), "trailing bytes after response");
    response
}

/// Parses every response in `received`, in order.
pub fn parse_responses(mut received: &[u8]) -> Vec<TestResponse> {
    let mut responses = Vec::new();
    while !received.is_empty() {
        let (response, consumed) = parse_response(received);
        responses.push(response);
        received = &received[consumed..];
    }
    responses
}

/// Parses one response, returning it and the number of bytes it took.
pub fn parse_response(buf: &[u8]) -> (TestResponse, usize) {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut response = httparse::Response::new(&mut headers);
    let head_len = match response.parse(buf).unwrap() {
        httparse::Status::Complete(head_len) => head_len,
        httparse::Status::Partial => panic!("incomplete response head: {:?}", String::from_utf8_lossy(buf)),
    };

    let status = response.code.unwrap();
    let reason = response.reason.unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = response
        .headers
        .iter()
        .map(|header| (header.name.to_string(), String::from_utf8(header.value.to_vec()).unwrap()))
        .collect();

    let mut parsed = TestResponse { status, reason, headers, body: Vec::new() };
    let rest = &buf[head_len..];

    if status == 100 {
        return (parsed, head_len);
    }

    if let Some(length) = parsed.header("content-length") {
        let length: usize = length.parse().unwrap();
        parsed.body = rest[..length].to_vec();
        return (parsed, head_len + length);
    }

    if parsed.header("transfer-encoding").is_some_and(|value| value.eq_ignore_ascii_case("chunked")) {
        let (body, consumed) = decode_chunked(rest);
        parsed.body = body;
        return (parsed, head_len + consumed);
    }

    parsed.body = rest.to_vec();
    (parsed, buf.len())
}

fn decode_chunked(mut rest: &[u8]) -> (Vec<u8>, usize) {
    let total = rest.len();
    let mut body = Vec::new();
    loop {
        let line_end = rest.windows(2).position(|window| window == b"\r\n").unwrap();
        let size_line = std::str::from_utf8(&rest[..line_end]).unwrap();
        let size = usize::from_str_radix(size_line.split(';').next().unwrap().trim(), 16).unwrap();
        rest = &rest[line_end + 2..];

        if size == 0 {
            assert!(rest.starts_with(b"\r\n"), "trailers are not expected");
            rest = &rest[2..];
            return (body, total - rest.len());
        }

        body.extend_from_slice(&rest[..size]);
        assert_eq!(&rest[size..size + 2], b"\r\n");
        rest = &rest[size + 2..];
    }
}
