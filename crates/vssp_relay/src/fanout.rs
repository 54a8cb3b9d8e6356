use bytes::Bytes;
use tracing::debug;
use vssp_core::{envelope, AssembledFrame};

use crate::registry::{Offer, ViewerId, ViewerRegistry, ViewerSink};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    /// Viewers that had to drop an older envelope to take this one.
    pub dropped_oldest: usize,
    /// Viewers removed because delivery failed.
    pub removed: Vec<ViewerId>,
}

/// Wrap `frame` in a relay envelope (built once) and offer it to every viewer.
pub fn broadcast<S: ViewerSink>(
    registry: &mut ViewerRegistry<S>,
    frame: &AssembledFrame,
) -> FanoutReport {
    let envelope = Bytes::from(envelope::encode(frame));
    deliver(registry, &envelope)
}

/// Offer one envelope to every registered viewer. Failures are isolated: the
/// pass always visits every viewer, and failed viewers are removed afterwards.
pub fn deliver<S: ViewerSink>(registry: &mut ViewerRegistry<S>, envelope: &Bytes) -> FanoutReport {
    let mut report = FanoutReport::default();
    for (id, viewer) in registry.iter() {
        match viewer.offer(envelope) {
            Ok(Offer::Queued) => report.delivered += 1,
            Ok(Offer::QueuedDroppedOldest) => {
                report.delivered += 1;
                report.dropped_oldest += 1;
            }
            Err(e) => {
                debug!(viewer = id, error = %e, "Envelope delivery failed");
                report.removed.push(id);
            }
        }
    }
    for id in &report.removed {
        registry.remove(*id);
    }
    report
}
