//! Status sinks receiving run lifecycle events.

use std::sync::Arc;

use async_trait::async_trait;
use butler_core::LifecycleEvent;
use tokio::sync::mpsc;
use tracing::trace;

/// Receiver of the lifecycle events of task runs.
///
/// The coordinator never writes task state itself; whatever persists
/// status and results does so from these events. Sinks own their failures:
/// a sink that cannot record an event logs it and carries on.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Called for every lifecycle event, in emission order.
    async fn on_event(&self, event: LifecycleEvent);
}

/// A sink that forwards every event into a channel.
///
/// # Example
///
/// ```rust,no_run
/// use butler_worker::sink::ChannelStatusSink;
///
/// let (sink, mut rx) = ChannelStatusSink::new();
///
/// tokio::spawn(async move {
///     while let Some(event) = rx.recv().await {
///         println!("{:?}", event);
///     }
/// });
/// # drop(sink);
/// ```
pub struct ChannelStatusSink {
    event_tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ChannelStatusSink {
    /// Create a sink and the receiver of its events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { event_tx: tx }, rx)
    }
}

#[async_trait]
impl StatusSink for ChannelStatusSink {
    async fn on_event(&self, event: LifecycleEvent) {
        trace!(task_id = %event.task_id(), "Forwarding lifecycle event");
        // Receiver might be dropped
        self.event_tx.send(event).ok();
    }
}

/// Fans every event out to several sinks, in order.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn StatusSink>>,
}

impl SinkSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add a sink.
    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl StatusSink for SinkSet {
    async fn on_event(&self, event: LifecycleEvent) {
        for sink in &self.sinks {
            sink.on_event(event.clone()).await;
        }
    }
}
