// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use nas_types::Welcome;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace, warn};
use uuid::Uuid;

use crate::{EventError, EventFrame, EventMap, EventSink, MessageSender, Transport};

/// Static part of the handshake every new connection receives
#[derive(Debug, Clone)]
pub struct WelcomeInfo {
    pub message: String,
    pub update_channel: String,
    pub read_only: bool,
    pub secure_mode: bool,
    pub protected_mode: bool,
    pub build_version: String,
    pub start_time: DateTime<Utc>,
    pub machine_id: Option<String>,
}

impl Default for WelcomeInfo {
    fn default() -> Self {
        Self {
            message: "Welcome".to_string(),
            update_channel: "none".to_string(),
            read_only: false,
            secure_mode: false,
            protected_mode: false,
            build_version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Utc::now(),
            machine_id: None,
        }
    }
}

/// Decrements the connection counter when a client loop exits
struct ConnectionGuard<'a>(&'a AtomicU64);

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fan-out hub shared by producers and client connections
pub struct Broadcaster {
    sender: broadcast::Sender<Arc<EventFrame>>,
    events: Arc<EventMap>,
    welcome: WelcomeInfo,
    next_id: AtomicU64,
    connected: AtomicU64,
    sent: AtomicU64,
}

impl Broadcaster {
    /// `queue_capacity` is the per-connection backlog; beyond it a slow
    /// client loses its oldest events
    pub fn new(queue_capacity: usize, welcome: WelcomeInfo) -> Self {
        Self::with_event_map(queue_capacity, EventMap::standard(), welcome)
    }

    pub fn with_event_map(queue_capacity: usize, events: EventMap, welcome: WelcomeInfo) -> Self {
        let (sender, _) = broadcast::channel(queue_capacity.max(1));
        Self {
            sender,
            events: Arc::new(events),
            welcome,
            next_id: AtomicU64::new(1),
            connected: AtomicU64::new(0),
            sent: AtomicU64::new(0),
        }
    }

    pub fn event_map(&self) -> &Arc<EventMap> {
        &self.events
    }

    pub fn connected_clients(&self) -> u64 {
        self.connected.load(Ordering::SeqCst)
    }

    /// Frames handed to client queues since startup
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn welcome(&self) -> Welcome {
        Welcome {
            message: self.welcome.message.clone(),
            active_clients: self.connected_clients(),
            supported_events: self.events.supported_events(),
            update_channel: self.welcome.update_channel.clone(),
            read_only: self.welcome.read_only,
            secure_mode: self.welcome.secure_mode,
            protected_mode: self.welcome.protected_mode,
            build_version: self.welcome.build_version.clone(),
            start_time: self.welcome.start_time,
            machine_id: self.welcome.machine_id.clone(),
        }
    }

    /// Queue `payload` for every connected client without waiting on any of
    /// them. Returns the number of clients it was queued for.
    pub fn broadcast<T: Serialize + 'static>(&self, payload: &T) -> Result<u64, EventError> {
        let event = self.events.event_for::<T>()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = Arc::new(EventFrame::encode(id, event, payload)?);

        // no receivers is not an error, the event is simply not seen
        let receivers = self.sender.send(frame).map_or(0, |n| n as u64);
        self.sent.fetch_add(receivers, Ordering::SeqCst);
        trace!(id, %event, receivers, "broadcast event");
        Ok(receivers)
    }

    /// Receiver for consumers that are not client connections
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EventFrame>> {
        self.sender.subscribe()
    }

    /// Serve one client until `cancel` fires or the client goes away.
    ///
    /// The welcome frame (id 0) is written first; domain events follow in
    /// production order. A client that falls behind skips what it missed.
    pub async fn process_channel<S>(
        &self,
        sink: S,
        transport: Transport,
        cancel: CancellationToken,
    ) -> Result<(), EventError>
    where
        S: EventSink + 'static,
    {
        let connection = Uuid::new_v4();
        let span = info_span!("client", %connection, %transport);
        self.serve(Box::new(sink), transport, cancel)
            .instrument(span)
            .await
    }

    async fn serve(
        &self,
        sink: Box<dyn EventSink>,
        transport: Transport,
        cancel: CancellationToken,
    ) -> Result<(), EventError> {
        let mut receiver = self.sender.subscribe();
        self.connected.fetch_add(1, Ordering::SeqCst);
        let _guard = ConnectionGuard(&self.connected);
        info!(clients = self.connected_clients(), "client connected");

        let sender = MessageSender::new(sink, transport, self.events.clone());
        sender.send(0, &self.welcome()).await?;

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                received = receiver.recv() => match received {
                    Ok(frame) => {
                        if let Err(e) = sender.send_frame(&frame).await {
                            debug!(error = %e, "client write failed");
                            break Err(e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "client is too slow, dropped oldest events");
                    }
                    Err(RecvError::Closed) => break Err(EventError::Closed),
                },
            }
        };

        info!("client disconnected");
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::sender::testing::RecordingSink;
    use nas_types::SharedResource;

    /// Sink that writes one frame per permit and blocks without one
    #[derive(Clone)]
    struct GatedSink {
        gate: Arc<Semaphore>,
        frames: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventSink for GatedSink {
        async fn send_text(&mut self, text: String) -> Result<(), EventError> {
            let permit = self.gate.acquire().await.map_err(|_| EventError::Closed)?;
            permit.forget();
            self.frames.lock().unwrap().push(text);
            Ok(())
        }
    }

    fn frame_id(frame: &str) -> u64 {
        frame
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("id: "))
            .and_then(|id| id.parse().ok())
            .expect("frame starts with its id")
    }

    async fn wait_for(sink: &RecordingSink, frames: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.frames().len() < frames {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("frames delivered in time");
    }

    fn spawn_client(
        hub: &Arc<Broadcaster>,
        transport: Transport,
        cancel: &CancellationToken,
    ) -> (RecordingSink, tokio::task::JoinHandle<Result<(), EventError>>) {
        let sink = RecordingSink::default();
        let hub = hub.clone();
        let client = sink.clone();
        let cancel = cancel.clone();
        let handle =
            tokio::spawn(async move { hub.process_channel(client, transport, cancel).await });
        (sink, handle)
    }

    #[tokio::test]
    async fn welcome_comes_first() {
        let hub = Arc::new(Broadcaster::new(8, WelcomeInfo::default()));
        let cancel = CancellationToken::new();
        let (sink, handle) = spawn_client(&hub, Transport::Sse, &cancel);

        wait_for(&sink, 1).await;
        let welcome = &sink.frames()[0];
        assert!(welcome.starts_with("id: 0\nevent: hello\n"));
        assert!(welcome.contains("\"active_clients\":1"));

        cancel.cancel();
        handle.await.expect("join").expect("clean exit");
        assert_eq!(hub.connected_clients(), 0);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_transport() {
        let hub = Arc::new(Broadcaster::new(8, WelcomeInfo::default()));
        let cancel = CancellationToken::new();
        let (sse, sse_task) = spawn_client(&hub, Transport::Sse, &cancel);
        let (ws, ws_task) = spawn_client(&hub, Transport::WebSocket, &cancel);
        wait_for(&sse, 1).await;
        wait_for(&ws, 1).await;
        assert_eq!(hub.connected_clients(), 2);

        let shares = vec![SharedResource::new("media")];
        assert_eq!(hub.broadcast(&shares).expect("broadcast"), 2);
        wait_for(&sse, 2).await;
        wait_for(&ws, 2).await;

        for sink in [&sse, &ws] {
            let frames = sink.frames();
            assert!(frames[1].contains("event: shares\n"));
            assert!(frames[1].contains("\"name\":\"media\""));
        }
        assert!(sse.frames()[1].contains("retry: 3000\n"));
        assert!(!ws.frames()[1].contains("retry:"));

        let err = hub.broadcast(&"not an event".to_string()).unwrap_err();
        assert!(matches!(err, EventError::UnknownEventType { .. }));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sse.frames().len(), 2);
        assert_eq!(ws.frames().len(), 2);
        assert_eq!(hub.sent_count(), 2);

        cancel.cancel();
        sse_task.await.expect("join").expect("sse exit");
        ws_task.await.expect("join").expect("ws exit");
    }

    #[tokio::test]
    async fn broadcast_without_clients_is_not_an_error() {
        let hub = Broadcaster::new(4, WelcomeInfo::default());
        let tracker = nas_types::DataDirtyTracker::default();
        assert_eq!(hub.broadcast(&tracker).expect("broadcast"), 0);
    }

    #[tokio::test]
    async fn failed_write_ends_only_that_client() {
        let hub = Arc::new(Broadcaster::new(8, WelcomeInfo::default()));
        let cancel = CancellationToken::new();
        let broken = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let result = hub
            .process_channel(broken, Transport::WebSocket, cancel.clone())
            .await;
        assert!(matches!(result, Err(EventError::Sink { .. })));
        assert_eq!(hub.connected_clients(), 0);

        let (healthy, task) = spawn_client(&hub, Transport::Sse, &cancel);
        wait_for(&healthy, 1).await;
        cancel.cancel();
        task.await.expect("join").expect("exit");
    }

    #[tokio::test]
    async fn slow_client_keeps_only_the_newest_frames() {
        let hub = Arc::new(Broadcaster::new(2, WelcomeInfo::default()));
        let cancel = CancellationToken::new();
        let (fast, fast_task) = spawn_client(&hub, Transport::Sse, &cancel);

        // one permit lets the welcome through, then the client stalls
        let gate = Arc::new(Semaphore::new(1));
        let slow = GatedSink {
            gate: gate.clone(),
            frames: Arc::default(),
        };
        let slow_frames = slow.frames.clone();
        let slow_task = tokio::spawn({
            let hub = hub.clone();
            let cancel = cancel.clone();
            async move { hub.process_channel(slow, Transport::Sse, cancel).await }
        });
        wait_for(&fast, 1).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while slow_frames.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("welcome delivered in time");

        for n in 1..=5 {
            let shares = vec![SharedResource::new(format!("share{n}"))];
            assert_eq!(hub.broadcast(&shares).expect("broadcast"), 2);
            wait_for(&fast, n + 1).await;
        }

        gate.add_permits(16);
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let last = slow_frames.lock().unwrap().last().map(|f| frame_id(f));
                if last == Some(5) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("slow client caught up");

        let fast_ids: Vec<u64> = fast.frames().iter().map(|f| frame_id(f)).collect();
        assert_eq!(fast_ids, vec![0, 1, 2, 3, 4, 5]);

        let slow_ids: Vec<u64> = slow_frames
            .lock()
            .unwrap()
            .iter()
            .map(|f| frame_id(f))
            .collect();
        assert!(slow_ids.len() < fast_ids.len());
        assert_eq!(slow_ids[0], 0);
        assert!(slow_ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(slow_ids[slow_ids.len() - 2..], fast_ids[4..]);

        cancel.cancel();
        fast_task.await.expect("join").expect("fast exit");
        slow_task.await.expect("join").expect("slow exit");
    }
}
