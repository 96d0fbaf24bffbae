//! Device identity registry: records, change events, delegate dispatch.
//!
//! Change notification is decoupled from the mutation path: every event is
//! queued onto a dedicated serial dispatch task, so slow subscribers never
//! block the radio transport's callback context and downstream processing
//! order is preserved.

pub mod database;
pub mod device;

use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, oneshot};

use device::BleDevice;

/// Which device attribute a change event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAttribute {
    /// The record was re-bound to a new transport identifier.
    Identifier,
    Payload,
    Rssi,
    TxPower,
    OperatingSystem,
    PseudoAddress,
    State,
}

/// A discrete registry change, emitted after the change is applied.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Created(Arc<BleDevice>),
    Updated(Arc<BleDevice>, DeviceAttribute),
    Deleted(Arc<BleDevice>),
}

/// Subscriber to registry change events. Dispatch happens on the queue
/// task, in publication order, never on the mutating thread.
pub trait BleDatabaseDelegate: Send + Sync {
    fn on_device_event(&self, event: &DeviceEvent);
}

enum QueueMessage {
    Event(DeviceEvent),
    Flush(oneshot::Sender<()>),
}

/// Serial dispatch queue feeding every registered delegate in order.
pub(crate) struct DelegateQueue {
    tx: mpsc::UnboundedSender<QueueMessage>,
    delegates: Arc<RwLock<Vec<Arc<dyn BleDatabaseDelegate>>>>,
}

impl DelegateQueue {
    /// Spawns the dispatch task; must run inside a tokio runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let delegates: Arc<RwLock<Vec<Arc<dyn BleDatabaseDelegate>>>> =
            Arc::new(RwLock::new(Vec::new()));
        let subscribers = Arc::clone(&delegates);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    QueueMessage::Event(event) => {
                        let current: Vec<_> =
                            subscribers.read().unwrap().iter().cloned().collect();
                        for delegate in current {
                            delegate.on_device_event(&event);
                        }
                    }
                    QueueMessage::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });
        DelegateQueue { tx, delegates }
    }

    pub fn add(&self, delegate: Arc<dyn BleDatabaseDelegate>) {
        self.delegates.write().unwrap().push(delegate);
    }

    /// Queue one event; delivery order matches publication order.
    pub fn publish(&self, event: DeviceEvent) {
        // The task only stops when the queue is dropped; a send failure
        // then has nobody left to notify.
        let _ = self.tx.send(QueueMessage::Event(event));
    }

    /// Wait until every previously published event has been dispatched.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(QueueMessage::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}
