//! Fan-out of new sightings to live subscribers

use std::sync::Arc;

use tracing::{info, warn};

use crate::models::{AlertData, ServerMessage, SightingRecord};
use crate::registry::{BroadcastReport, SubscriberRegistry};

/// Pushes a proximity alert to every subscriber when a sighting is created
///
/// Alerts go to all connected subscribers regardless of their last known
/// location. Delivery problems are handled by the registry and only logged
/// here; they never reach the code that created the sighting.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    registry: Arc<SubscriberRegistry>,
}

impl NotificationDispatcher {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub async fn on_sighting_created(&self, record: &SightingRecord) -> BroadcastReport {
        let message = ServerMessage::ProximityAlert {
            data: AlertData::from(record),
        };

        let report = self.registry.broadcast(message).await;
        if !report.pruned.is_empty() {
            warn!(
                "Proximity alert for sighting {} not delivered to {} subscribers: {:?}",
                record.id,
                report.pruned.len(),
                report.pruned
            );
        }
        info!(
            "Proximity alert for sighting {} sent to {} subscribers",
            record.id, report.delivered
        );
        report
    }
}
