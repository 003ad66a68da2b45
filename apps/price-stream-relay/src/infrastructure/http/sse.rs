//! Adapts a dispatcher's event channel to an SSE response body.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::DropGuard;

use super::AppState;
use crate::application::services::{
    Cadence, FrameStyle, StreamDispatcher, StreamEvent, StreamFrame, SymbolSource,
};
use crate::infrastructure::metrics::PrometheusObserver;

/// SSE body backed by one dispatcher.
///
/// Dropping the body (client gone) cancels the dispatcher.
pub struct DispatchStream {
    events: ReceiverStream<StreamEvent>,
    style: FrameStyle,
    _cancel: DropGuard,
}

impl Stream for DispatchStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.events).poll_next(cx) {
                Poll::Ready(Some(event)) => match event.to_frame(self.style) {
                    Ok(frame) => return Poll::Ready(Some(Ok(to_sse_event(frame)))),
                    Err(e) => tracing::warn!(error = %e, "Failed to encode stream frame"),
                },
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

fn to_sse_event(frame: StreamFrame) -> Event {
    let event = match frame.event {
        Some(name) => Event::default().event(name),
        None => Event::default(),
    };
    event.data(frame.data)
}

/// Start a dispatcher and wrap its output as an SSE response.
pub fn open(
    state: &AppState,
    source: SymbolSource,
    cadence: Cadence,
    style: FrameStyle,
) -> Sse<KeepAliveStream<DispatchStream>> {
    let cancel = state.shutdown.child_token();
    let (tx, rx) = mpsc::channel(state.streams.buffer.max(1));
    let dispatcher = StreamDispatcher::new(
        Arc::clone(&state.market),
        source,
        cadence,
        tx,
        cancel.clone(),
    )
    .with_observer(Arc::new(PrometheusObserver));
    tokio::spawn(dispatcher.run());

    Sse::new(DispatchStream {
        events: ReceiverStream::new(rx),
        style,
        _cancel: cancel.drop_guard(),
    })
    .keep_alive(KeepAlive::default())
}
