use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::capability::Capability;

/// One download/setup progress sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub bytes_loaded: u64,
    pub bytes_total: u64,
}

impl ProgressEvent {
    pub fn fraction(&self) -> f64 {
        if self.bytes_total == 0 {
            0.0
        } else {
            self.bytes_loaded as f64 / self.bytes_total as f64
        }
    }
}

/// A progress sample tagged with the capability being provisioned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityProgress {
    pub capability: Capability,
    #[serde(flatten)]
    pub event: ProgressEvent,
}

pub type ProgressSender = mpsc::UnboundedSender<CapabilityProgress>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<CapabilityProgress>;

/// Progress channel for a single provisioning operation.
///
/// Backends report raw samples; the reporter keeps the stream monotonic:
/// `bytes_loaded` never decreases, `bytes_total` never decreases and is never
/// below `bytes_loaded`. Once closed, further reports are dropped. Sends never
/// block, and a dropped receiver is ignored.
pub struct ProgressReporter {
    capability: Capability,
    tx: Option<ProgressSender>,
    last: Option<ProgressEvent>,
    closed: bool,
    emitted: usize,
}

impl ProgressReporter {
    pub fn new(capability: Capability, tx: Option<ProgressSender>) -> Self {
        Self {
            capability,
            tx,
            last: None,
            closed: false,
            emitted: 0,
        }
    }

    /// A reporter nobody listens to.
    pub fn silent(capability: Capability) -> Self {
        Self::new(capability, None)
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn report(&mut self, bytes_loaded: u64, bytes_total: u64) {
        if self.closed {
            return;
        }

        let (floor_loaded, floor_total) = self
            .last
            .map(|e| (e.bytes_loaded, e.bytes_total))
            .unwrap_or((0, 0));
        let loaded = bytes_loaded.max(floor_loaded);
        let total = bytes_total.max(floor_total).max(loaded);
        let event = ProgressEvent {
            bytes_loaded: loaded,
            bytes_total: total,
        };

        if self.last == Some(event) {
            return;
        }
        if loaded != bytes_loaded || total != bytes_total {
            debug!(
                capability = %self.capability,
                raw_loaded = bytes_loaded,
                raw_total = bytes_total,
                loaded,
                total,
                "Clamped non-monotonic progress sample"
            );
        }

        self.last = Some(event);
        self.emitted += 1;
        if let Some(tx) = &self.tx {
            let _ = tx.send(CapabilityProgress {
                capability: self.capability,
                event,
            });
        }
    }

    /// Ends the operation; nothing is sent after this and the sender is released.
    pub fn close(&mut self) {
        self.closed = true;
        self.tx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn last(&self) -> Option<ProgressEvent> {
        self.last
    }

    /// Number of events that passed the monotonic filter.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}
