//! Integration Tests: HTTP politeness classifier against a loopback service.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use belfry_core::PolitenessClassifier;
use belfry_core::types::PolitenessLabel;
use belfry_game::politeness::HttpPolitenessClassifier;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Read one request fully and return its lowercased head.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return String::from_utf8_lossy(&buf).to_lowercase();
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
        let length: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        while buf.len() < pos + 4 + length {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        return head;
    }
}

/// Answer each connection with the next `(status, body)`; count requests.
async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let head = read_request(&mut socket).await;
            if head.starts_with("post /classify") {
                counter.fetch_add(1, Ordering::SeqCst);
            }

            let response = format!(
                "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.ok();
            socket.shutdown().await.ok();
        }
    });

    (format!("http://{addr}"), hits)
}

#[tokio::test]
async fn reads_service_verdict() {
    let (url, hits) = serve(vec![(200, r#"{"label":"polite","confidence":0.87}"#)]).await;
    let classifier = HttpPolitenessClassifier::new(&url, 2_000, 10).expect("client");

    let result = classifier.classify("could you help me, please?").await;
    assert_eq!(result.label, PolitenessLabel::Polite);
    assert!((result.confidence - 0.87).abs() < 1e-6);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retries_once_after_server_error() {
    let (url, hits) = serve(vec![
        (500, r#"{"detail":"model loading"}"#),
        (200, r#"{"label":"impolite"}"#),
    ])
    .await;
    let classifier = HttpPolitenessClassifier::new(&url, 2_000, 10).expect("client");

    let result = classifier.classify("now!").await;
    assert_eq!(result.label, PolitenessLabel::Impolite);
    assert!((result.confidence - 0.5).abs() < f32::EPSILON);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unreachable_service_falls_back_to_neutral() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let classifier =
        HttpPolitenessClassifier::new(&format!("http://{addr}"), 500, 10).expect("client");
    let result = classifier.classify("hello").await;
    assert_eq!(result.label, PolitenessLabel::Neutral);
    assert!((result.confidence - 0.34).abs() < 1e-6);
}
