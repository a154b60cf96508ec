use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::config::BundlerConfig;
use crate::dispatch::{ArchiveMessage, MessageQueue};
use crate::error::{QueueError, WorkerError};
use crate::worker::archiver::{ArchiveOutcome, ArchiveWorker, OutcomeStatus};

const RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);
/// How long work abandoned on a store outage stays hidden before it is
/// offered again.
pub const REDELIVERY_DELAY: Duration = Duration::from_secs(5);

/// A fixed set of threads consuming the work queue, one archive at a time
/// per thread.
pub struct WorkerPool {
    queue: Arc<dyn MessageQueue>,
    result_receiver: Receiver<ArchiveOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawns `worker_count` threads. Each runs a clone of `worker` named
    /// `<worker name>-<index>`.
    pub fn new(
        worker: ArchiveWorker,
        queue: Arc<dyn MessageQueue>,
        worker_count: usize,
    ) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be > 0".to_string(),
            ));
        }
        let (result_sender, result_receiver) = unbounded::<ArchiveOutcome>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let name = format!("{}-{}", worker.identity().worker_name, worker_id);
            let thread_worker = worker.clone().with_worker_name(name.clone());
            let thread_queue = Arc::clone(&queue);
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);

            let handle = thread::Builder::new()
                .name(name)
                .spawn(move || {
                    run_worker(worker_id, thread_worker, thread_queue, result_tx, shutdown_flag);
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!(
            "Started {} archive workers on queue '{}'",
            worker_count,
            queue.name()
        );

        Ok(Self {
            queue,
            result_receiver,
            workers,
            shutdown,
        })
    }

    /// Spawns the configured number of workers.
    pub fn from_config(
        config: &BundlerConfig,
        worker: ArchiveWorker,
        queue: Arc<dyn MessageQueue>,
    ) -> Result<Self, WorkerError> {
        Self::new(worker, queue, config.worker_count)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Publishes a work message to the queue the pool consumes.
    pub fn submit(&self, message: ArchiveMessage) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ShutDown);
        }
        self.queue.publish(&message)?;
        Ok(())
    }

    pub fn try_recv_result(&self) -> Option<ArchiveOutcome> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<ArchiveOutcome> {
        self.result_receiver.recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<ArchiveOutcome> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    /// Collects up to `count` outcomes, giving up once no outcome arrives
    /// within `timeout`.
    pub fn collect_results(&self, count: usize, timeout: Duration) -> Vec<ArchiveOutcome> {
        let mut outcomes = Vec::with_capacity(count);
        while outcomes.len() < count {
            match self.result_receiver.recv_timeout(timeout) {
                Ok(outcome) => outcomes.push(outcome),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        outcomes
    }

    /// Asks every worker to stop after its current archive.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Stops the pool and joins every worker thread.
    pub fn wait(self) {
        self.shutdown.store(true, Ordering::Relaxed);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    worker: ArchiveWorker,
    queue: Arc<dyn MessageQueue>,
    result_sender: Sender<ArchiveOutcome>,
    shutdown: Arc<AtomicBool>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match queue.receive(RECEIVE_TIMEOUT) {
            Ok(Some(delivery)) => {
                debug!(
                    "Worker {} processing {} (delivery {})",
                    worker_id, delivery.message, delivery.attempt
                );

                let outcome = worker.process(&delivery.message);

                if matches!(outcome.status, OutcomeStatus::Abandoned { .. }) {
                    warn!(
                        "Worker {} returning {} for redelivery",
                        worker_id, delivery.message
                    );
                    if let Err(e) = queue.release(&delivery, REDELIVERY_DELAY) {
                        error!(
                            "Worker {} failed to release {}: {}",
                            worker_id, delivery.message, e
                        );
                    }
                    thread::sleep(RECEIVE_TIMEOUT);
                } else if let Err(e) = queue.acknowledge(&delivery) {
                    error!(
                        "Worker {} failed to acknowledge {}: {}",
                        worker_id, delivery.message, e
                    );
                }

                if result_sender.send(outcome).is_err() {
                    debug!("Worker {} result channel closed", worker_id);
                }
            }
            Ok(None) => continue,
            Err(QueueError::Closed(name)) => {
                debug!("Worker {} queue '{}' closed", worker_id, name);
                break;
            }
            Err(e) => {
                error!("Worker {} failed to receive work: {}", worker_id, e);
                // Avoid spinning on a persistently failing backend.
                thread::sleep(RECEIVE_TIMEOUT);
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
