//! Fan-out of job events to subscribers.

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use sizetree_core::ScanEvent;

/// Receiving end of a job's event stream.
///
/// Stays open after `JobCompleted` so later on-demand listings are still
/// reported; ends once the job is cancelled or replaced.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ScanEvent>,
}

impl EventStream {
    /// Receive the next event.
    pub async fn recv(&mut self) -> Option<ScanEvent> {
        self.rx.recv().await
    }

    /// Receive the next event, blocking the current thread.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<ScanEvent> {
        self.rx.blocking_recv()
    }

    /// Receive an event if one is ready.
    pub fn try_recv(&mut self) -> Option<ScanEvent> {
        self.rx.try_recv().ok()
    }

    /// Convert into a `Stream`.
    pub fn into_stream(self) -> UnboundedReceiverStream<ScanEvent> {
        UnboundedReceiverStream::new(self.rx)
    }
}

/// Sender side shared by every worker of one job.
///
/// Once the job's token is cancelled, ordinary events are dropped. The token
/// is checked under the subscriber lock and the hub closes under the write
/// lock, so no ordinary event can follow the closing notice.
#[derive(Debug)]
pub(crate) struct EventHub {
    subscribers: RwLock<Option<Vec<mpsc::UnboundedSender<ScanEvent>>>>,
    token: CancellationToken,
}

impl EventHub {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            subscribers: RwLock::new(Some(Vec::new())),
            token,
        }
    }

    /// Add a subscriber. Returns `None` once the hub is closed.
    pub fn subscribe(&self) -> Option<EventStream> {
        let mut subscribers = self.subscribers.write();
        let list = subscribers.as_mut()?;
        let (tx, rx) = mpsc::unbounded_channel();
        list.retain(|s| !s.is_closed());
        list.push(tx);
        Some(EventStream { rx })
    }

    pub fn emit(&self, event: ScanEvent) {
        let subscribers = self.subscribers.read();
        if self.token.is_cancelled() {
            return;
        }
        if let Some(list) = subscribers.as_ref() {
            for tx in list {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Send `last` to every subscriber and drop the senders.
    ///
    /// Returns `false` if the hub was already closed; `last` is not sent then.
    pub fn close_with(&self, last: ScanEvent) -> bool {
        let Some(list) = self.subscribers.write().take() else {
            return false;
        };
        for tx in &list {
            let _ = tx.send(last.clone());
        }
        true
    }
}
