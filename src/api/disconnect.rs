use crate::core::metrics::get_metrics;
use crate::core::StreamCancelHandle;
use axum::body::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A stream wrapper that triggers a cancellation handle when dropped.
/// This allows detecting when the client disconnects (stops consuming the stream).
pub struct DisconnectStream<S> {
    pub stream: S,
    pub cancel_handle: StreamCancelHandle,
    pub provider: String,
}

impl<S, E> Stream for DisconnectStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl<S> Drop for DisconnectStream<S> {
    fn drop(&mut self) {
        // A completed stream is dropped too; cancel() is a no-op then
        if self.cancel_handle.cancel() {
            tracing::info!(provider = %self.provider, "Client disconnected before the stream finished");
            get_metrics()
                .client_disconnects
                .with_label_values(&[&self.provider])
                .inc();
        }
    }
}
