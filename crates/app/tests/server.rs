mod common;

#[path = "../examples/routes.rs"]
#[allow(dead_code, reason = "the example's main is not used here")]
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use common::{TestResponse, exchange, fetch, get, get_and_close, parse_response, parse_responses, spawn_server};
use micro_app::{Router, SERVER_NAME};

async fn routes_server() -> SocketAddr {
    spawn_server(routes::router(Arc::new(AtomicUsize::new(0))).unwrap()).await
}

fn assert_server_headers(response: &TestResponse) {
    assert_eq!(response.header("server"), Some(SERVER_NAME));
    assert!(response.header("date").is_some_and(|date| !date.is_empty()));
}

#[tokio::test]
async fn every_body_shape_says_hello_world() {
    let addr = routes_server().await;

    for path in ["/list", "/tuple", "/iterator", "/generator"] {
        let response = fetch(addr, path).await;
        assert_eq!(response.status, 200, "{path}");
        assert_eq!(response.body_str(), "Hello World", "{path}");
        assert_server_headers(&response);
    }
}

#[tokio::test]
async fn close_is_called_once_per_request() {
    let addr = routes_server().await;

    for _ in 0..10 {
        let response = fetch(addr, "/call_close").await;
        assert_eq!(response.body_str(), "Hello World");
    }

    let response = fetch(addr, "/called_close").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body_str(), "10");
}

#[tokio::test]
async fn hello_on_one_keep_alive_connection() {
    let addr = routes_server().await;

    let mut raw = get("/hello").repeat(9);
    raw.push_str(&get_and_close("/hello"));
    let responses = parse_responses(&exchange(addr, &raw).await);

    assert_eq!(responses.len(), 10);
    for response in responses {
        assert_eq!(response.status, 200);
        assert_eq!(response.reason, "OK");
        assert_eq!(response.header("content-length"), Some("11"));
        assert_eq!(response.body_str(), "Hello World");
        assert_server_headers(&response);
    }
}

#[tokio::test]
async fn echo_route() {
    let addr = routes_server().await;

    let raw = concat!(
        "POST /echo HTTP/1.1\r\n",
        "Host: localhost\r\n",
        "Hello: World\r\n",
        "Content-Length: 11\r\n",
        "Connection: close\r\n",
        "\r\n",
        "Hello World",
    );
    let (response, _) = parse_response(&exchange(addr, raw).await);

    assert_eq!(response.status, 200);
    assert_eq!(response.header("HELLO"), Some("World"));
    assert_eq!(response.header("HOST"), None);
    assert_eq!(response.body_str(), "Hello World");
    assert_server_headers(&response);
}

#[tokio::test]
async fn echo_with_chunked_request_body() {
    let addr = routes_server().await;

    let raw = concat!(
        "POST /echo HTTP/1.1\r\n",
        "Host: localhost\r\n",
        "Transfer-Encoding: chunked\r\n",
        "Connection: close\r\n",
        "\r\n",
        "5\r\nHello\r\n",
        "6\r\n World\r\n",
        "0\r\n\r\n",
    );
    let (response, _) = parse_response(&exchange(addr, raw).await);

    assert_eq!(response.status, 200);
    assert_eq!(response.body_str(), "Hello World");
}

#[tokio::test]
async fn echo_after_continue() {
    let addr = routes_server().await;

    let raw = concat!(
        "POST /echo HTTP/1.1\r\n",
        "Host: localhost\r\n",
        "Expect: 100-continue\r\n",
        "Content-Length: 5\r\n",
        "Connection: close\r\n",
        "\r\n",
        "Hello",
    );
    let responses = parse_responses(&exchange(addr, raw).await);

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].status, 100);
    assert_eq!(responses[1].status, 200);
    assert_eq!(responses[1].body_str(), "Hello");
}

#[tokio::test]
async fn failures_do_not_poison_the_connection() {
    let addr = routes_server().await;

    let mut raw = String::new();
    for path in ["/no_start_response", "/invalid_body", "/raise_exception_before_sr", "/raise_exception_after_sr"] {
        raw.push_str(&get(path));
    }
    raw.push_str(&get_and_close("/"));
    let responses = parse_responses(&exchange(addr, &raw).await);

    assert_eq!(responses.len(), 5);
    for response in &responses[..4] {
        assert_eq!(response.status, 500);
        assert_eq!(response.body_str(), "Internal Server Error");
        assert_server_headers(response);
    }

    let root = &responses[4];
    assert_eq!(root.status, 200);
    assert_eq!(root.header("content-length"), Some("0"));
    assert!(root.body.is_empty());
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let addr = routes_server().await;

    let response = fetch(addr, "/nope").await;
    assert_eq!(response.status, 404);
    assert_eq!(response.body_str(), "Not Found");
    assert_server_headers(&response);
}

#[tokio::test]
async fn head_has_length_but_no_body() {
    let addr = routes_server().await;

    let received = exchange(addr, "HEAD /hello HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
    let mut headers = [httparse::EMPTY_HEADER; 16];
    let mut response = httparse::Response::new(&mut headers);
    let head_len = match response.parse(&received).unwrap() {
        httparse::Status::Complete(head_len) => head_len,
        httparse::Status::Partial => panic!("incomplete head"),
    };

    assert_eq!(response.code, Some(200));
    let content_length = response.headers.iter().find(|header| header.name.eq_ignore_ascii_case("content-length"));
    assert_eq!(content_length.map(|header| header.value), Some(&b"11"[..]));
    assert_eq!(head_len, received.len());
}

#[tokio::test]
async fn http10_streams_until_close() {
    let addr = routes_server().await;

    let received = exchange(addr, "GET /generator HTTP/1.0\r\n\r\n").await;
    let (response, consumed) = parse_response(&received);

    assert_eq!(response.status, 200);
    assert_eq!(response.header("transfer-encoding"), None);
    assert_eq!(response.body_str(), "Hello World");
    assert_eq!(consumed, received.len());
}

#[tokio::test]
async fn malformed_request_gets_bad_request() {
    let addr = spawn_server(Router::builder().build()).await;

    let (response, _) = parse_response(&exchange(addr, "GET / HTTP/1.1\r\nBad Header\r\n\r\n").await);
    assert_eq!(response.status, 400);
    assert_server_headers(&response);
}
