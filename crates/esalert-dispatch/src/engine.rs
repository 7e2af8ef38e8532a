//! Dispatch engine: fans alerts out to their methods and retries failures.
//!
//! One control loop selects over three sources: the alert intake, a bounded
//! retry-ready queue and the stop token. Each alert becomes one job per
//! method, keyed by a [`DeliveryId`] whose budget lives in the [`Inventory`].
//!
//! ```text
//! intake ──► register + enqueue ──► retry queue (bounded) ──► execute
//!                                        ▲                     │ fail
//!                                        └── timer task ◄──────┘
//! ```
//!
//! Enqueueing blocks when the retry queue is full, including during intake,
//! so a burst of failing deliveries can hold back new alerts.

use esalert_core::{Alert, AlertMethod, DispatchConfig, Record};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::inventory::{DeliveryId, Inventory};

/// Jittered retry delay: uniform in `[unit, 3 * unit)`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    unit: Duration,
}

impl Backoff {
    pub fn new(unit: Duration) -> Self {
        Self { unit }
    }

    pub fn unit(&self) -> Duration {
        self.unit
    }

    /// Sample the next delay.
    pub fn next(&self) -> Duration {
        let unit = u64::try_from(self.unit.as_nanos()).unwrap_or(u64::MAX / 4);
        if unit == 0 {
            return Duration::ZERO;
        }
        let jitter = rand::thread_rng().gen_range(0..unit.saturating_mul(2));
        Duration::from_nanos(unit.saturating_add(jitter))
    }
}

/// One attempt's worth of work; retries resubmit it unchanged.
#[derive(Clone)]
struct DeliveryJob {
    id: DeliveryId,
    rule_name: Arc<str>,
    method: Arc<dyn AlertMethod>,
    records: Arc<[Record]>,
}

/// Builds and spawns the dispatch loop.
pub struct DispatchEngine {
    inventory: Arc<Inventory>,
    backoff: Backoff,
    retry_capacity: usize,
}

impl DispatchEngine {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            inventory: Arc::new(Inventory::new(i64::from(config.max_attempts))),
            backoff: Backoff::new(Duration::from_millis(config.backoff_unit_ms)),
            retry_capacity: config.retry_queue_capacity.max(1),
        }
    }

    pub fn inventory(&self) -> Arc<Inventory> {
        self.inventory.clone()
    }

    /// Start the loop on the runtime.
    ///
    /// The loop stops when `cancel` (or the returned handle) is cancelled.
    /// A closed intake does not stop it; pending retries still run.
    pub fn spawn(self, alerts: mpsc::Receiver<Alert>, cancel: CancellationToken) -> DispatchHandle {
        let stop = cancel.child_token();
        let (retry_tx, retry_rx) = mpsc::channel(self.retry_capacity);
        let (done_tx, done_rx) = oneshot::channel();

        let dispatcher = Dispatcher {
            inventory: self.inventory.clone(),
            backoff: self.backoff,
            retry_tx,
            retry_rx,
            stop: stop.clone(),
        };

        tokio::spawn(async move {
            dispatcher.run(alerts).await;
            let _ = done_tx.send(());
        });

        DispatchHandle {
            stop,
            done: done_rx,
            inventory: self.inventory,
        }
    }
}

/// Owner's side of a running dispatch loop.
pub struct DispatchHandle {
    stop: CancellationToken,
    done: oneshot::Receiver<()>,
    inventory: Arc<Inventory>,
}

impl DispatchHandle {
    /// Ask the loop to stop. In-flight retries are abandoned.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Resolve once the loop has exited.
    pub async fn wait(self) {
        let _ = self.done.await;
    }

    pub fn inventory(&self) -> &Arc<Inventory> {
        &self.inventory
    }
}

struct Dispatcher {
    inventory: Arc<Inventory>,
    backoff: Backoff,
    retry_tx: mpsc::Sender<DeliveryJob>,
    retry_rx: mpsc::Receiver<DeliveryJob>,
    stop: CancellationToken,
}

impl Dispatcher {
    async fn run(mut self, mut alerts: mpsc::Receiver<Alert>) {
        tracing::info!("📮 Dispatch engine started");
        loop {
            let keep_going = tokio::select! {
                _ = self.stop.cancelled() => false,
                Some(alert) = alerts.recv() => self.intake(alert).await,
                Some(job) = self.retry_rx.recv() => self.execute(job).await,
            };
            if !keep_going {
                break;
            }
        }
        tracing::info!("🛑 Dispatch engine stopped");
    }

    /// Register one identity per method and enqueue its first attempt.
    async fn intake(&self, alert: Alert) -> bool {
        tracing::debug!(
            alert_id = %alert.id,
            rule = %alert.rule_name,
            methods = alert.methods.len(),
            "📥 Alert received"
        );
        let rule_name: Arc<str> = Arc::from(alert.rule_name);
        let records: Arc<[Record]> = alert.records.into();

        for (index, method) in alert.methods.into_iter().enumerate() {
            let id = DeliveryId::new(index, alert.id.clone());
            self.inventory.register(&id);
            let job = DeliveryJob {
                id,
                rule_name: rule_name.clone(),
                method,
                records: records.clone(),
            };
            if !self.enqueue(job).await {
                return false;
            }
        }
        true
    }

    async fn enqueue(&self, job: DeliveryJob) -> bool {
        tokio::select! {
            _ = self.stop.cancelled() => false,
            sent = self.retry_tx.send(job) => sent.is_ok(),
        }
    }

    /// Run one attempt. Returns false once the loop should stop.
    async fn execute(&self, job: DeliveryJob) -> bool {
        if self.stop.is_cancelled() {
            return false;
        }

        if self.inventory.remaining(&job.id) < 1 {
            self.inventory.deregister(&job.id);
            tracing::warn!(
                delivery = %job.id,
                rule = %job.rule_name,
                method = job.method.name(),
                "🗑️ Delivery abandoned, no attempts left"
            );
            return true;
        }
        self.inventory.decrement(&job.id);

        let result = tokio::select! {
            _ = self.stop.cancelled() => return false,
            r = job.method.write(&job.rule_name, &job.records) => r,
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    delivery = %job.id,
                    rule = %job.rule_name,
                    method = job.method.name(),
                    "✅ Alert delivered"
                );
            }
            Err(e) => {
                let delay = self.backoff.next();
                tracing::warn!(
                    delivery = %job.id,
                    rule = %job.rule_name,
                    method = job.method.name(),
                    remaining_retries = self.inventory.remaining(&job.id),
                    backoff_ms = delay.as_millis() as u64,
                    "⚠️ Delivery failed: {e}"
                );
                self.schedule_retry(job, delay);
            }
        }
        true
    }

    /// Re-enqueue `job` after `delay` from a detached timer task.
    fn schedule_retry(&self, job: DeliveryJob, delay: Duration) {
        let tx = self.retry_tx.clone();
        let stop = self.stop.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            tokio::select! {
                _ = stop.cancelled() => {}
                _ = tx.send(job) => {}
            }
        });
    }
}
