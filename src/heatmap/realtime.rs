use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, info, warn};

use crate::remote::{DeviceId, RemoteStore};
use crate::utils::threads::join_with_timeout;

use super::Heatmap;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Bounded queue where a full buffer is emptied before the next push, so
/// consumers only ever see recent items.
#[derive(Clone)]
pub struct LatestSlot<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> LatestSlot<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Queues `item`. Returns how many stale items were dropped to make room.
    pub fn push(&self, item: T) -> usize {
        let mut item = item;
        let mut dropped = 0;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return dropped,
                Err(TrySendError::Full(rejected)) => {
                    item = rejected;
                    while self.rx.try_recv().is_ok() {
                        dropped += 1;
                    }
                }
                // Both ends live in `self`, so the channel cannot disconnect.
                Err(TrySendError::Disconnected(_)) => return dropped,
            }
        }
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Removes everything queued and returns the count.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }
}

/// Background thread forwarding heatmaps from a [`LatestSlot`] to
/// [`RemoteStore::broadcast_heatmap`]. Upload failures are logged only.
pub struct HeatmapBroadcaster {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HeatmapBroadcaster {
    pub fn start(
        store: Arc<dyn RemoteStore>,
        device_id: DeviceId,
        slot: LatestSlot<Heatmap>,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("heatmap-broadcast".into())
            .spawn(move || {
                info!("Heatmap broadcaster started for device {device_id}");
                while !thread_stop.load(Ordering::Relaxed) {
                    let Some(heatmap) = slot.pop_timeout(POLL_INTERVAL) else {
                        continue;
                    };
                    let values: Vec<f64> = heatmap.iter().copied().collect();
                    match store.broadcast_heatmap(device_id, &values) {
                        Ok(()) => debug!("Heatmap uploaded for device {device_id}"),
                        Err(err) => warn!("Failed to upload heatmap for device {device_id}: {err:#}"),
                    }
                }
                let pending = slot.clear();
                if pending > 0 {
                    info!("Heatmap broadcaster stopped with {pending} pending upload(s) discarded");
                }
            })
            .context("failed to spawn heatmap broadcaster")?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self, timeout: Duration) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            join_with_timeout(handle, timeout);
        }
    }
}

impl Drop for HeatmapBroadcaster {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_slot_keeps_only_the_newest_item() {
        let slot = LatestSlot::new(3);
        for i in 0..3 {
            assert_eq!(slot.push(i), 0);
        }
        assert_eq!(slot.push(99), 3);
        assert_eq!(slot.len(), 1);
        assert_eq!(slot.pop_timeout(Duration::from_millis(10)), Some(99));
        assert_eq!(slot.pop_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn items_below_capacity_keep_their_order() {
        let slot = LatestSlot::new(10);
        slot.push("a");
        slot.push("b");
        assert_eq!(slot.pop_timeout(Duration::from_millis(10)), Some("a"));
        assert_eq!(slot.pop_timeout(Duration::from_millis(10)), Some("b"));
        assert!(slot.is_empty());
    }

    #[test]
    fn clear_reports_discarded_items() {
        let slot = LatestSlot::new(4);
        slot.push(1);
        slot.push(2);
        assert_eq!(slot.clear(), 2);
        assert!(slot.is_empty());
    }
}
