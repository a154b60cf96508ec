//! Queue abstraction and the in-process channel implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use super::message::ArchiveMessage;
use crate::error::QueueError;

/// A message handed to a consumer. It must be acknowledged once handled;
/// queues with redelivery may hand it out again otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: i64,
    pub message: ArchiveMessage,
    /// 1 on first delivery.
    pub attempt: u32,
}

/// At-least-once FIFO queue of archive messages.
pub trait MessageQueue: Send + Sync {
    fn name(&self) -> &str;

    fn publish(&self, message: &ArchiveMessage) -> Result<(), QueueError>;

    /// Waits up to `timeout` for a message. `Ok(None)` means nothing arrived;
    /// `Err(QueueError::Closed)` means nothing ever will.
    fn receive(&self, timeout: Duration) -> Result<Option<Delivery>, QueueError>;

    fn acknowledge(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Gives a delivery back unhandled so it is offered again no sooner
    /// than `delay` from now.
    fn release(&self, delivery: &Delivery, delay: Duration) -> Result<(), QueueError>;
}

/// In-process queue over a crossbeam channel. Messages are gone once
/// received, so acknowledgement is a no-op.
pub struct ChannelQueue {
    name: String,
    sender: Mutex<Option<Sender<(i64, ArchiveMessage)>>>,
    receiver: Receiver<(i64, ArchiveMessage)>,
    next_id: AtomicU64,
}

impl ChannelQueue {
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            name: name.into(),
            sender: Mutex::new(Some(sender)),
            receiver,
            next_id: AtomicU64::new(1),
        }
    }

    /// Stops accepting messages. Consumers drain what is left and then see
    /// `QueueError::Closed`.
    pub fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    fn closed(&self) -> QueueError {
        QueueError::Closed(self.name.clone())
    }
}

impl MessageQueue for ChannelQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn publish(&self, message: &ArchiveMessage) -> Result<(), QueueError> {
        let guard = self.sender.lock().map_err(|_| self.closed())?;
        let sender = guard.as_ref().ok_or_else(|| self.closed())?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64;
        sender
            .send((id, message.clone()))
            .map_err(|_| self.closed())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        match self.receiver.recv_timeout(timeout) {
            Ok((id, message)) => Ok(Some(Delivery {
                id,
                message,
                attempt: 1,
            })),
            Err(RecvTimeoutError::Timeout) => {
                let open = self.sender.lock().map(|s| s.is_some()).unwrap_or(false);
                if open {
                    Ok(None)
                } else {
                    Err(self.closed())
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(self.closed()),
        }
    }

    fn acknowledge(&self, _delivery: &Delivery) -> Result<(), QueueError> {
        Ok(())
    }

    /// Puts the message back at the tail. The channel has no timers, so
    /// `delay` is not honoured.
    fn release(&self, delivery: &Delivery, _delay: Duration) -> Result<(), QueueError> {
        let guard = self.sender.lock().map_err(|_| self.closed())?;
        let sender = guard.as_ref().ok_or_else(|| self.closed())?;
        sender
            .send((delivery.id, delivery.message.clone()))
            .map_err(|_| self.closed())
    }
}
