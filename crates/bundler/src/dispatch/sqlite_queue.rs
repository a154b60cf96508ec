//! Durable queue stored in the shared database.
//!
//! Any number of processes may consume the same named queue. A received
//! message is hidden for the visibility timeout; if it is not acknowledged
//! in time it is handed out again.

use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::message::ArchiveMessage;
use super::queue::{Delivery, MessageQueue};
use crate::db::{queue_repo, Database};
use crate::error::QueueError;

pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(15 * 60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct SqliteQueue {
    db: Database,
    name: String,
    visibility_timeout: Duration,
    poll_interval: Duration,
}

impl SqliteQueue {
    pub fn new(db: Database, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Messages still in the queue, including unacknowledged ones.
    pub fn pending(&self) -> Result<u64, QueueError> {
        Ok(queue_repo::count(&self.db, &self.name)?)
    }

    fn try_claim(&self) -> Result<Option<Delivery>, QueueError> {
        let visibility_ms = i64::try_from(self.visibility_timeout.as_millis()).unwrap_or(i64::MAX);
        let Some(row) =
            queue_repo::claim_next(&self.db, &self.name, now_millis(), visibility_ms)?
        else {
            return Ok(None);
        };

        match ArchiveMessage::from_json(&row.payload) {
            Ok(message) => {
                if row.deliveries > 1 {
                    log::warn!(
                        "Redelivering {} on queue '{}' (attempt {})",
                        message,
                        self.name,
                        row.deliveries
                    );
                }
                Ok(Some(Delivery {
                    id: row.id,
                    message,
                    attempt: u32::try_from(row.deliveries).unwrap_or(u32::MAX),
                }))
            }
            Err(e) => {
                // Unparseable payloads would otherwise be redelivered forever.
                queue_repo::delete(&self.db, row.id)?;
                Err(QueueError::Malformed {
                    queue: self.name.clone(),
                    id: row.id,
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl MessageQueue for SqliteQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn publish(&self, message: &ArchiveMessage) -> Result<(), QueueError> {
        let payload = message.to_json()?;
        let id = queue_repo::enqueue(
            &self.db,
            &self.name,
            &payload,
            &Utc::now().to_rfc3339(),
            now_millis(),
        )?;
        log::debug!("Published {} to queue '{}' as #{}", message, self.name, id);
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(delivery) = self.try_claim()? {
                return Ok(Some(delivery));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    fn acknowledge(&self, delivery: &Delivery) -> Result<(), QueueError> {
        if !queue_repo::delete(&self.db, delivery.id)? {
            log::warn!(
                "Message #{} on queue '{}' was already acknowledged",
                delivery.id,
                self.name
            );
        }
        Ok(())
    }

    fn release(&self, delivery: &Delivery, delay: Duration) -> Result<(), QueueError> {
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let visible_at = now_millis().saturating_add(delay_ms);
        if queue_repo::release(&self.db, delivery.id, visible_at)? {
            log::debug!(
                "Released {} on queue '{}' for redelivery in {:?}",
                delivery.message,
                self.name,
                delay
            );
        } else {
            log::warn!(
                "Message #{} on queue '{}' was acknowledged before release",
                delivery.id,
                self.name
            );
        }
        Ok(())
    }
}
