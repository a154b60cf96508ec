//! Work dispatch and completion notification.
//!
//! Job creation publishes one [`ArchiveMessage`] per archive to the work
//! queue. Each archive worker publishes the same message to the tracker queue
//! once it has finished, successfully or not. Both queues deliver at least
//! once and carry no ordering guarantee across archives.

pub mod message;
pub mod queue;
pub mod sqlite_queue;

pub use message::ArchiveMessage;
pub use queue::{ChannelQueue, Delivery, MessageQueue};
pub use sqlite_queue::SqliteQueue;

/// Queue consumed by archive workers.
pub const WORK_QUEUE: &str = "work";
/// Queue consumed by the completion aggregator.
pub const TRACKER_QUEUE: &str = "tracker";
