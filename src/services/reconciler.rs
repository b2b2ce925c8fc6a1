//! The reconciliation loop body: fetch the latest snapshot of each reading
//! kind, suppress anything not strictly newer than the last published
//! timestamp, and publish the rest.

use log::{debug, error, warn};
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::devices::ReadingSource;
use crate::output::{ConnectionState, Publisher};
use crate::readings::{OutboundMessage, ReadingKind};

pub struct ReadingReconciler {
    source: Arc<dyn ReadingSource>,
    publisher: Arc<dyn Publisher>,
    state: Arc<ConnectionState>,
    root_topic: String,
    // Per-kind watermark of the last published device timestamp. The Unix
    // epoch sentinel is below any valid EMU timestamp (device epoch is Y2K).
    watermarks: HashMap<ReadingKind, DateTime<Utc>>,
}

impl ReadingReconciler {
    pub fn new(
        source: Arc<dyn ReadingSource>,
        publisher: Arc<dyn Publisher>,
        state: Arc<ConnectionState>,
        root_topic: impl Into<String>,
    ) -> Self {
        let watermarks = ReadingKind::ALL
            .iter()
            .map(|&kind| (kind, DateTime::UNIX_EPOCH))
            .collect();
        Self {
            source,
            publisher,
            state,
            root_topic: root_topic.into(),
            watermarks,
        }
    }

    /// Run one reconciliation cycle over all three reading kinds.
    ///
    /// Kinds are fully isolated: a missing snapshot, malformed value or
    /// failed publish on one kind never affects the others. A failed
    /// publish leaves the watermark untouched so the same reading is
    /// retried on the next cycle.
    pub async fn reconcile_once(&mut self) {
        if !self.state.is_connected() {
            debug!("Skipping reconcile cycle, MQTT not connected");
            return;
        }
        for kind in ReadingKind::ALL {
            self.reconcile_kind(kind).await;
        }
    }

    async fn reconcile_kind(&mut self, kind: ReadingKind) {
        // Nothing decoded yet for this kind; expected during warm-up.
        let Some(reading) = self.source.latest(kind) else {
            debug!("No {} reading available yet", kind);
            return;
        };

        let timestamp = reading.absolute_timestamp();
        let watermark = self.watermarks[&kind];
        if timestamp <= watermark {
            debug!("{} reading at {} already published", kind, timestamp);
            return;
        }

        let Some(value) = reading.value() else {
            warn!("Unusable {} reading (zero divisor?), skipping", kind);
            return;
        };

        let message = OutboundMessage {
            topic: format!("{}/{}", self.root_topic, kind.topic_suffix()),
            value,
            timestamp,
        };

        match self.publisher.publish(&message).await {
            Ok(()) => {
                self.watermarks.insert(kind, timestamp);
            }
            Err(e) => error!("❌ Failed to publish {} reading: {}", kind, e),
        }
    }
}
