// SPDX-License-Identifier: GPL-3.0-only

use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{EventError, EventFrame, EventMap, Transport};

/// Write half of one client connection
#[async_trait]
pub trait EventSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), EventError>;
}

/// [`EventSink`] over any `futures` text sink (a socket writer, a channel)
#[derive(Debug)]
pub struct SinkAdapter<S> {
    inner: S,
}

impl<S> SinkAdapter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S> EventSink for SinkAdapter<S>
where
    S: Sink<String> + Unpin + Send,
    S::Error: Display,
{
    async fn send_text(&mut self, text: String) -> Result<(), EventError> {
        self.inner.send(text).await.map_err(|e| EventError::Sink {
            message: e.to_string(),
        })
    }
}

/// Serializes and frames payloads for one connection.
///
/// Safe to share between producers: writes are serialized by a mutex owned
/// by this connection alone.
pub struct MessageSender {
    sink: Mutex<Box<dyn EventSink>>,
    transport: Transport,
    events: Arc<EventMap>,
}

impl MessageSender {
    pub fn new(sink: Box<dyn EventSink>, transport: Transport, events: Arc<EventMap>) -> Self {
        Self {
            sink: Mutex::new(sink),
            transport,
            events,
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Look up, serialize and write `payload`; an unregistered type fails
    /// without writing anything
    pub async fn send<T: Serialize + 'static>(&self, id: u64, payload: &T) -> Result<(), EventError> {
        let event = self.events.event_for::<T>()?;
        let frame = EventFrame::encode(id, event, payload)?;
        self.send_frame(&frame).await
    }

    pub async fn send_frame(&self, frame: &EventFrame) -> Result<(), EventError> {
        let text = self.transport.render(frame);
        self.sink.lock().await.send_text(text).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use nas_types::{HealthPing, SharedResource};

    #[tokio::test]
    async fn sink_adapter_forwards_text() {
        let mut adapter = SinkAdapter::new(Vec::<String>::new());
        adapter.send_text("hello".into()).await.expect("send");
        assert_eq!(adapter.into_inner(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn unknown_payload_writes_nothing() {
        let sink = RecordingSink::default();
        let sender = MessageSender::new(
            Box::new(sink.clone()),
            Transport::Sse,
            Arc::new(EventMap::standard()),
        );
        let err = sender.send(1, &SharedResource::new("solo")).await.unwrap_err();
        assert!(matches!(err, EventError::UnknownEventType { .. }));
        assert!(sink.frames().is_empty());

        sender
            .send(2, &vec![SharedResource::new("media")])
            .await
            .expect("send shares");
        let frames = sink.frames();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("id: 2\nevent: shares\n"));
    }

    #[tokio::test]
    async fn concurrent_sends_do_not_interleave() {
        let sink = RecordingSink::default();
        let sender = Arc::new(MessageSender::new(
            Box::new(sink.clone()),
            Transport::WebSocket,
            Arc::new(EventMap::standard()),
        ));
        let ping = HealthPing {
            alive: true,
            read_only: false,
            last_rescan: None,
            connected_clients: 1,
            timestamp: chrono::Utc::now(),
        };

        let tasks: Vec<_> = (0..10)
            .map(|id| {
                let sender = sender.clone();
                let ping = ping.clone();
                tokio::spawn(async move { sender.send(id, &ping).await })
            })
            .collect();
        for task in tasks {
            task.await.expect("join").expect("send");
        }

        let frames = sink.frames();
        assert_eq!(frames.len(), 10);
        assert!(frames.iter().all(|f| f.contains("event: heartbeat\n") && f.ends_with("\n\n")));
    }
}
