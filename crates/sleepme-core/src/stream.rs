// ── Snapshot subscriptions ──
//
// Consumers watch the published snapshot either by awaiting `changed()`
// or by turning the subscription into a `Stream`.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::snapshot::DeviceSnapshot;

/// A subscription to one device's snapshot.
///
/// Holds the snapshot seen at creation and yields every later publish.
pub struct SnapshotStream {
    current: Arc<DeviceSnapshot>,
    receiver: watch::Receiver<Arc<DeviceSnapshot>>,
}

impl SnapshotStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<DeviceSnapshot>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Arc<DeviceSnapshot> {
        &self.current
    }

    /// Latest published snapshot.
    pub fn latest(&self) -> Arc<DeviceSnapshot> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next publish.
    /// Returns `None` once the poll coordinator has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<DeviceSnapshot>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream`. The first item is the current snapshot.
    pub fn into_stream(self) -> SnapshotWatchStream {
        SnapshotWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct SnapshotWatchStream {
    inner: WatchStream<Arc<DeviceSnapshot>>,
}

impl Stream for SnapshotWatchStream {
    type Item = Arc<DeviceSnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use futures_util::StreamExt;

    use super::*;

    #[tokio::test]
    async fn changed_tracks_publishes() {
        let (tx, rx) = watch::channel(Arc::new(DeviceSnapshot::empty()));
        let mut sub = SnapshotStream::new(rx);
        assert!(sub.current().is_empty());

        let mut next = DeviceSnapshot::empty();
        next.fetched_at = Utc::now();
        tx.send(Arc::new(next.clone())).unwrap();

        let seen = sub.changed().await.unwrap();
        assert_eq!(*seen, next);
        assert_eq!(sub.current().fetched_at, next.fetched_at);

        drop(tx);
        assert!(sub.changed().await.is_none());
    }

    #[tokio::test]
    async fn stream_yields_current_then_updates() {
        let (tx, rx) = watch::channel(Arc::new(DeviceSnapshot::empty()));
        let mut stream = SnapshotStream::new(rx).into_stream();

        assert!(stream.next().await.unwrap().is_empty());

        let mut next = DeviceSnapshot::empty();
        next.fetched_at = Utc::now();
        tx.send(Arc::new(next)).unwrap();
        assert!(!stream.next().await.unwrap().is_empty());
    }
}
