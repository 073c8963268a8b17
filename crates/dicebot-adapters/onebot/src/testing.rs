//! In-memory connections and a recording callback for tests.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};

use dicebot_core::{
    AdapterCallback, AdapterError, AdapterEvent, MessageSendCallbackInfo, TransportError,
};
use dicebot_transport::{FrameSink, FrameStream};

/// Peer side of an in-memory connection.
pub(crate) struct FakePeer {
    /// Frames the adapter wrote.
    pub outbound: mpsc::UnboundedReceiver<String>,
    /// Frames to deliver to the adapter.
    pub inbound: mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>,
}

impl FakePeer {
    pub(crate) fn push(&self, frame: &str) {
        let _ = self.inbound.unbounded_send(Ok(frame.as_bytes().to_vec()));
    }

    pub(crate) async fn next_json(&mut self) -> Value {
        let text = self.outbound.next().await.expect("adapter wrote nothing");
        serde_json::from_str(&text).expect("adapter wrote invalid JSON")
    }

    /// Answers `request` with a successful response carrying `data`.
    pub(crate) fn respond_ok(&self, request: &Value, data: Value) {
        let response = json!({"status": "ok", "retcode": 0, "data": data, "echo": request["echo"]});
        self.push(&response.to_string());
    }

    /// Ends the adapter's read loop as a dropped socket would.
    pub(crate) fn hang_up(&self) {
        let _ = self
            .inbound
            .unbounded_send(Err(TransportError::closed("peer hung up")));
    }
}

pub(crate) fn fake_sink() -> (FrameSink, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded::<String>();
    let sink: FrameSink =
        Box::pin(tx.sink_map_err(|e| TransportError::SendFailed(e.to_string())));
    (sink, rx)
}

/// A sink whose peer never reads: every write stays pending.
pub(crate) fn stalled_sink() -> FrameSink {
    struct Stalled;

    impl Sink<String> for Stalled {
        type Error = TransportError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: String) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }
    }

    Box::pin(Stalled)
}

pub(crate) fn fake_connection() -> (FrameSink, FrameStream, FakePeer) {
    let (sink, outbound) = fake_sink();
    let (inbound, rx) = mpsc::unbounded();
    let stream: FrameStream = Box::pin(rx);
    (sink, stream, FakePeer { outbound, inbound })
}

pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut frames = Vec::new();
    while let Ok(Some(frame)) = rx.try_next() {
        frames.push(frame);
    }
    frames
}

/// Records every callback invocation.
#[derive(Default)]
pub(crate) struct Recorder {
    pub errors: Mutex<Vec<String>>,
    pub messages: Mutex<Vec<MessageSendCallbackInfo>>,
    pub events: Mutex<Vec<AdapterEvent>>,
}

impl AdapterCallback for Recorder {
    fn on_error(&self, err: &AdapterError) {
        self.errors.lock().push(err.to_string());
    }

    fn on_message_received(&self, info: MessageSendCallbackInfo) {
        self.messages.lock().push(info);
    }

    fn on_event(&self, event: AdapterEvent) {
        self.events.lock().push(event);
    }
}
