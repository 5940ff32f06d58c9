//! Bounded fan-out of integration lifecycle events.
//!
//! Built on `tokio::sync::broadcast`: publishing never waits, and a
//! subscriber that falls more than `capacity` events behind loses the oldest
//! ones. Losses are logged and counted per subscriber.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;

use crate::integration::IntegrationEvent;
use crate::observability::metrics;

/// A downstream consumer of integration events.
#[async_trait]
pub trait EventSubscriber: Send + Sync + 'static {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    async fn handle(&self, event: &IntegrationEvent);
}

/// Event bus handle. Cloning is cheap; all clones publish to the same bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IntegrationEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish an event. Returns how many subscribers will see it.
    pub fn publish(&self, event: IntegrationEvent) -> usize {
        tracing::trace!(
            event_type = event.event_type.as_str(),
            integration_id = %event.integration_id,
            "Publishing integration event"
        );
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Open a raw stream of events published from now on.
    pub fn subscribe(&self, name: impl Into<String>) -> EventStream {
        EventStream {
            name: name.into(),
            rx: self.tx.subscribe(),
            dropped: 0,
        }
    }

    /// Run `subscriber` on its own task until shutdown or until the bus closes.
    pub fn spawn_subscriber(
        &self,
        subscriber: Arc<dyn EventSubscriber>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let mut stream = self.subscribe(subscriber.name());
        tokio::spawn(async move {
            tracing::info!(subscriber = subscriber.name(), "Event subscriber started");
            loop {
                tokio::select! {
                    event = stream.recv() => match event {
                        Some(event) => subscriber.handle(&event).await,
                        None => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
            tracing::info!(
                subscriber = subscriber.name(),
                dropped = stream.dropped(),
                "Event subscriber stopped"
            );
        })
    }
}

/// Receiving side of one subscription.
#[derive(Debug)]
pub struct EventStream {
    name: String,
    rx: broadcast::Receiver<IntegrationEvent>,
    dropped: u64,
}

impl EventStream {
    /// Next event; `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<IntegrationEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => self.on_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-published event, without waiting.
    pub fn try_recv(&mut self) -> Option<IntegrationEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => self.on_lag(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain every already-published event.
    pub fn drain(&mut self) -> Vec<IntegrationEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Events this subscription lost to lag.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn on_lag(&mut self, skipped: u64) {
        self.dropped += skipped;
        tracing::warn!(subscriber = %self.name, skipped, "Event subscriber lagging, oldest events dropped");
        metrics::record_event_dropped(&self.name, skipped);
    }
}
