//! Tests for the NDJSON streaming decoder and the completion client's
//! inline-error contract, against raw mock TCP servers.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use sirocco::client::OllamaClient;
use sirocco::error::SiroccoError;

/// Helper: bind a TCP listener on localhost and return (listener, port).
async fn mock_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Helper: one NDJSON generation line.
fn ndjson_line(text: &str, done: bool) -> String {
    format!("{{\"response\":\"{text}\",\"done\":{done}}}\n")
}

const NDJSON_HEADERS: &[u8] = b"HTTP/1.1 200 OK\r\n\
    Content-Type: application/x-ndjson\r\n\
    Connection: close\r\n\r\n";

fn client_for(port: u16) -> OllamaClient {
    OllamaClient::with_timeouts(
        format!("http://127.0.0.1:{port}"),
        "test-model".to_string(),
        Duration::from_secs(5),
        Duration::from_secs(2),
    )
}

/// Helper: accept one connection, drain the request, send the given body
/// after the NDJSON headers.
async fn serve_body(listener: TcpListener, body: String) {
    let (mut socket, _) = listener.accept().await.unwrap();
    let mut buf = vec![0u8; 8192];
    let _ = socket.read(&mut buf).await;

    socket.write_all(NDJSON_HEADERS).await.unwrap();
    socket.write_all(body.as_bytes()).await.unwrap();
}

// ---------------------------------------------------------------------------
// Well-formed streams
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fragments_arrive_in_wire_order() {
    let (listener, port) = mock_listener().await;
    let body = format!(
        "{}{}{}",
        ndjson_line("He", false),
        ndjson_line("l", false),
        ndjson_line("lo", true),
    );
    let server = tokio::spawn(serve_body(listener, body));

    let client = client_for(port);
    let fragments: Vec<String> = client
        .generate_streaming("hi", 0.7, None)
        .collect()
        .await;

    assert_eq!(fragments, vec!["He", "l", "lo"]);
    server.await.unwrap();
}

#[tokio::test]
async fn non_streaming_generate_concatenates() {
    let (listener, port) = mock_listener().await;
    let body = format!("{}{}", ndjson_line("He", false), ndjson_line("llo", true));
    let server = tokio::spawn(serve_body(listener, body));

    let client = client_for(port);
    let result = client.generate("hi", 0.7, None).await;

    assert_eq!(result, "Hello");
    server.await.unwrap();
}

#[tokio::test]
async fn malformed_line_is_skipped() {
    let (listener, port) = mock_listener().await;
    let body = format!(
        "{}{}{}",
        ndjson_line("a", false),
        "{this is not json\n",
        ndjson_line("b", true),
    );
    let server = tokio::spawn(serve_body(listener, body));

    let client = client_for(port);
    let fragments: Vec<String> = client
        .generate_streaming("hi", 0.7, None)
        .collect()
        .await;

    assert_eq!(fragments, vec!["a", "b"]);
    server.await.unwrap();
}

#[tokio::test]
async fn blank_keepalive_lines_are_skipped() {
    let (listener, port) = mock_listener().await;
    let body = format!("\n{}\n\n{}", ndjson_line("x", false), ndjson_line("y", true));
    let server = tokio::spawn(serve_body(listener, body));

    let client = client_for(port);
    let fragments: Vec<String> = client
        .generate_streaming("hi", 0.7, None)
        .collect()
        .await;

    assert_eq!(fragments, vec!["x", "y"]);
    server.await.unwrap();
}

#[tokio::test]
async fn lines_after_done_are_never_decoded() {
    let (listener, port) = mock_listener().await;
    // Both lines may land in a single read; the decoder must still stop
    // at the done marker.
    let body = format!("{}{}", ndjson_line("end", true), ndjson_line("XX", false));
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let _ = socket.read(&mut buf).await;
        socket.write_all(NDJSON_HEADERS).await.unwrap();
        // Client may hang up after the done line; later writes can fail.
        let _ = socket.write_all(body.as_bytes()).await;
    });

    let client = client_for(port);
    let fragments: Vec<String> = client
        .generate_streaming("hi", 0.7, None)
        .collect()
        .await;

    assert_eq!(fragments, vec!["end"]);
    server.await.unwrap();
}

#[tokio::test]
async fn line_split_across_tcp_writes_is_reassembled() {
    let (listener, port) = mock_listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let _ = socket.read(&mut buf).await;

        socket.write_all(NDJSON_HEADERS).await.unwrap();
        socket.write_all(b"{\"response\":\"spl").await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        socket.write_all(b"it\",\"done\":true}\n").await.unwrap();
    });

    let client = client_for(port);
    let fragments: Vec<String> = client
        .generate_streaming("hi", 0.7, None)
        .collect()
        .await;

    assert_eq!(fragments, vec!["split"]);
    server.await.unwrap();
}

#[tokio::test]
async fn natural_end_of_body_without_done_ends_cleanly() {
    let (listener, port) = mock_listener().await;
    // No done marker, no trailing newline on the last line: the server
    // just closes. The buffered tail must still be decoded.
    let body = format!("{}{{\"response\":\"tail\"}}", ndjson_line("head", false));
    let server = tokio::spawn(serve_body(listener, body));

    let client = client_for(port);
    let fragments: Vec<String> = client
        .generate_streaming("hi", 0.7, None)
        .collect()
        .await;

    assert_eq!(fragments, vec!["head", "tail"]);
    server.await.unwrap();
}

// ---------------------------------------------------------------------------
// Failure → inline terminal fragment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_200_status_yields_single_inline_error() {
    let (listener, port) = mock_listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let _ = socket.read(&mut buf).await;
        socket
            .write_all(b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
    });

    let client = client_for(port);
    let fragments: Vec<String> = client
        .generate_streaming("hi", 0.7, None)
        .collect()
        .await;

    assert_eq!(fragments, vec!["\nError: API returned status code 500\n"]);
    server.await.unwrap();
}

#[tokio::test]
async fn timeout_before_first_line_yields_inline_error() {
    let (listener, port) = mock_listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let _ = socket.read(&mut buf).await;
        // Never respond; hold the socket past the client timeout.
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let client = OllamaClient::with_timeouts(
        format!("http://127.0.0.1:{port}"),
        "test-model".to_string(),
        Duration::from_millis(300),
        Duration::from_millis(300),
    );
    let fragments: Vec<String> = client
        .generate_streaming("hi", 0.7, None)
        .collect()
        .await;

    assert_eq!(fragments, vec!["\nError: Request timed out\n"]);
    server.abort();
}

#[tokio::test]
async fn connection_refused_yields_single_inline_error() {
    // Bind then drop to get a port nothing is listening on.
    let (listener, port) = mock_listener().await;
    drop(listener);

    let client = client_for(port);
    let fragments: Vec<String> = client
        .generate_streaming("hi", 0.7, None)
        .collect()
        .await;

    assert_eq!(fragments.len(), 1);
    assert!(
        fragments[0].starts_with("\nError: Request failed:"),
        "unexpected fragment: {:?}",
        fragments[0]
    );
    assert!(fragments[0].ends_with('\n'));
}

#[tokio::test]
async fn mid_stream_abort_keeps_emitted_fragments_and_appends_error() {
    let (listener, port) = mock_listener().await;
    // Chunked framing makes a premature close a transport error rather
    // than a normal end-of-body.
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let _ = socket.read(&mut buf).await;

        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\n\
                  Content-Type: application/x-ndjson\r\n\
                  Transfer-Encoding: chunked\r\n\r\n",
            )
            .await
            .unwrap();

        let line = ndjson_line("partial", false);
        let framed = format!("{:x}\r\n{line}\r\n", line.len());
        socket.write_all(framed.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Drop without the terminating zero-length chunk.
    });

    let client = client_for(port);
    let fragments: Vec<String> = client
        .generate_streaming("hi", 0.7, None)
        .collect()
        .await;

    assert_eq!(fragments.len(), 2);
    assert_eq!(fragments[0], "partial");
    assert!(fragments[1].starts_with("\nError: "));
    server.await.unwrap();
}

// ---------------------------------------------------------------------------
// Structured-error mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generate_chunks_reports_protocol_error() {
    let (listener, port) = mock_listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let _ = socket.read(&mut buf).await;
        socket
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
    });

    let client = client_for(port);
    let err = client.generate_chunks("hi", 0.7, None).await.unwrap_err();
    assert!(matches!(err, SiroccoError::Protocol { status: 404 }));
    server.await.unwrap();
}

#[tokio::test]
async fn generate_chunks_yields_typed_chunks() {
    let (listener, port) = mock_listener().await;
    let body = format!("{}{}", ndjson_line("a", false), ndjson_line("b", true));
    let server = tokio::spawn(serve_body(listener, body));

    let client = client_for(port);
    let chunks = client.generate_chunks("hi", 0.7, None).await.unwrap();
    let items: Vec<_> = chunks.collect().await;

    assert_eq!(items.len(), 2);
    let first = items[0].as_ref().unwrap();
    assert_eq!(first.text, "a");
    assert!(!first.done);
    let last = items[1].as_ref().unwrap();
    assert_eq!(last.text, "b");
    assert!(last.done);
    server.await.unwrap();
}

// ---------------------------------------------------------------------------
// Liveness probe and model listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn check_connection_true_on_200() {
    let (listener, port) = mock_listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let _ = socket.read(&mut buf).await;
        let body = r#"{"models":[]}"#;
        let resp = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(resp.as_bytes()).await.unwrap();
    });

    let client = client_for(port);
    assert!(client.check_connection().await);
    server.await.unwrap();
}

#[tokio::test]
async fn check_connection_false_on_error_status() {
    let (listener, port) = mock_listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let _ = socket.read(&mut buf).await;
        socket
            .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
    });

    let client = client_for(port);
    assert!(!client.check_connection().await);
    server.await.unwrap();
}

#[tokio::test]
async fn check_connection_false_on_refused() {
    let (listener, port) = mock_listener().await;
    drop(listener);

    let client = client_for(port);
    assert!(!client.check_connection().await);
}

#[tokio::test]
async fn list_models_parses_tags_body() {
    let (listener, port) = mock_listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let _ = socket.read(&mut buf).await;
        let body = r#"{"models":[{"name":"deepseek-r1:1.5b","size":1}, {"name":"phi3:mini"}]}"#;
        let resp = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(resp.as_bytes()).await.unwrap();
    });

    let client = client_for(port);
    let models = client.list_models().await.unwrap();
    let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["deepseek-r1:1.5b", "phi3:mini"]);
    server.await.unwrap();
}

#[tokio::test]
async fn list_models_none_on_refused() {
    let (listener, port) = mock_listener().await;
    drop(listener);

    let client = client_for(port);
    assert!(client.list_models().await.is_none());
}
