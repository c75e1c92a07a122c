//! Client disconnect handling: cancelling the stream must release the upstream.

use bytes::Bytes;
use futures::channel::mpsc;
use futures::stream::{Stream, StreamExt};
use glossa_gateway::api::disconnect::DisconnectStream;
use glossa_gateway::api::streaming::{ndjson_response, normalize, StreamIncrement, UpstreamFrames};
use glossa_gateway::core::{get_metrics, StreamCancelHandle};
use glossa_gateway::transformer::WireFormat;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// Upstream body that records when the connection is dropped.
struct TrackedUpstream {
    inner: mpsc::UnboundedReceiver<std::io::Result<Bytes>>,
    dropped: Arc<AtomicBool>,
}

impl Stream for TrackedUpstream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for TrackedUpstream {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

fn tracked_upstream() -> (
    mpsc::UnboundedSender<std::io::Result<Bytes>>,
    UpstreamFrames,
    Arc<AtomicBool>,
) {
    let (tx, rx) = mpsc::unbounded();
    let dropped = Arc::new(AtomicBool::new(false));
    let upstream = TrackedUpstream {
        inner: rx,
        dropped: dropped.clone(),
    };
    (tx, Box::pin(upstream), dropped)
}

fn ndjson_line(text: &str) -> std::io::Result<Bytes> {
    Ok(Bytes::from(format!("{{\"response\":\"{}\",\"done\":false}}\n", text)))
}

#[tokio::test]
async fn test_cancel_stops_emission_and_drops_upstream() {
    let (tx, upstream, dropped) = tracked_upstream();
    let handle = StreamCancelHandle::new();
    let mut stream = Box::pin(normalize(
        upstream,
        WireFormat::GenerateNdjson.decoder(),
        handle.clone(),
        "local-model",
    ));

    tx.unbounded_send(ndjson_line("Καλὴ")).unwrap();
    assert_eq!(
        stream.next().await,
        Some(StreamIncrement::Content("Καλὴ".into()))
    );

    // The normalizer is now waiting on an upstream that has nothing to say
    let canceller = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let next = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("cancellation should end the stream promptly");
    assert_eq!(next, None);
    assert!(dropped.load(Ordering::SeqCst));

    // The receiver is gone, so nothing sent afterwards can be emitted
    assert!(tx.unbounded_send(ndjson_line("ἡμέρα")).is_err());
}

#[tokio::test]
async fn test_dropping_response_body_cancels() {
    let (tx, upstream, dropped) = tracked_upstream();
    let handle = StreamCancelHandle::new();
    let increments = normalize(
        upstream,
        WireFormat::GenerateNdjson.decoder(),
        handle.clone(),
        "disconnect-test",
    );
    let response = ndjson_response(increments, handle.clone(), "disconnect-test");

    let before = get_metrics()
        .client_disconnects
        .with_label_values(&["disconnect-test"])
        .get();

    tx.unbounded_send(ndjson_line("Χαῖρε")).unwrap();
    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    assert_eq!(&first[..], "{\"response\":\"Χαῖρε\"}\n".as_bytes());

    drop(body);

    assert!(handle.is_cancelled());
    assert!(!handle.is_completed());
    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(
        get_metrics()
            .client_disconnects
            .with_label_values(&["disconnect-test"])
            .get(),
        before + 1
    );
}

#[tokio::test]
async fn test_completed_stream_drop_is_not_a_disconnect() {
    let (tx, upstream, _dropped) = tracked_upstream();
    let handle = StreamCancelHandle::new();
    let increments = normalize(
        upstream,
        WireFormat::GenerateNdjson.decoder(),
        handle.clone(),
        "complete-test",
    );
    let response = ndjson_response(increments, handle.clone(), "complete-test");

    tx.unbounded_send(ndjson_line("ok")).unwrap();
    drop(tx);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"{\"response\":\"ok\"}\n{\"done\":true}\n");
    assert!(handle.is_completed());
    assert!(!handle.is_cancelled());
}

#[tokio::test]
async fn test_disconnect_stream_cancels_on_drop() {
    let handle = StreamCancelHandle::new();
    let rx = handle.subscribe();

    {
        let _stream = DisconnectStream {
            stream: futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from("x"))]),
            cancel_handle: handle.clone(),
            provider: "test".to_string(),
        };
        assert!(!handle.is_cancelled());
    }

    assert!(handle.is_cancelled());
    assert!(*rx.borrow());
}
