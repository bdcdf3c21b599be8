//! Fire-and-forget admin notifications
//!
//! [`Notifier::start`] spawns a fixed pool of sender tasks fed by one bounded
//! queue. Request handlers only ever see a [`NotifierHandle`]: submitting
//! never waits, a full queue drops the job, and each job gets exactly one
//! delivery attempt whose result is logged and counted but never reported
//! back to the submitter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use crate::concierge::ConciergeRequest;
use crate::email::EmailProvider;
use crate::leads::SupportLead;
use crate::notifications::{DeliveryChannel, NotificationJob};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_WORKERS: usize = 4;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub channel: DeliveryChannel,
}

impl NotifierConfig {
    pub fn new(channel: DeliveryChannel) -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            channel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    /// Notifier has no provider or no recipients
    Disabled,
    /// Queue full or notifier shutting down
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotifierStats {
    pub enabled: bool,
    pub queued: u64,
    pub in_flight: u64,
    pub submitted: u64,
    pub sent: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Jobs still queued when the drain deadline passed
    pub discarded: usize,
    pub timed_out: bool,
}

struct Shared {
    sender: flume::Sender<NotificationJob>,
    channel: DeliveryChannel,
    closed: AtomicBool,
    submitted: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    in_flight: AtomicU64,
}

/// Cloneable submit side of the notifier
#[derive(Clone)]
pub struct NotifierHandle {
    shared: Option<Arc<Shared>>,
}

impl NotifierHandle {
    /// A handle whose submits are silent no-ops
    pub fn disabled() -> Self {
        Self { shared: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.is_some()
    }

    pub fn channel(&self) -> Option<&DeliveryChannel> {
        self.shared.as_ref().map(|shared| &shared.channel)
    }

    pub fn notify_lead(&self, lead: &SupportLead) -> SubmitOutcome {
        match self.channel() {
            Some(channel) => self.submit(NotificationJob::lead(lead, channel.clone())),
            None => SubmitOutcome::Disabled,
        }
    }

    pub fn notify_concierge(&self, request: &ConciergeRequest) -> SubmitOutcome {
        match self.channel() {
            Some(channel) => self.submit(NotificationJob::concierge(request, channel.clone())),
            None => SubmitOutcome::Disabled,
        }
    }

    /// Enqueue without waiting
    pub fn submit(&self, job: NotificationJob) -> SubmitOutcome {
        let Some(shared) = &self.shared else {
            return SubmitOutcome::Disabled;
        };

        let kind = job.kind_label();
        let record_id = job.record_id();

        if shared.closed.load(Ordering::Acquire) {
            shared.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("notifier.dropped_total", "reason" => "shutdown").increment(1);
            warn!(kind, record_id, "Notifier is shutting down, dropping notification");
            return SubmitOutcome::Dropped;
        }

        match shared.sender.try_send(job) {
            Ok(()) => {
                shared.submitted.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("notifier.submitted_total", "kind" => kind).increment(1);
                metrics::gauge!("notifier.queue_depth").set(shared.sender.len() as f64);
                debug!(kind, record_id, "Queued notification");
                SubmitOutcome::Queued
            }
            Err(flume::TrySendError::Full(_)) => {
                shared.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("notifier.dropped_total", "reason" => "queue_full").increment(1);
                warn!(kind, record_id, "Notification queue full, dropping notification");
                SubmitOutcome::Dropped
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                shared.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("notifier.dropped_total", "reason" => "disconnected")
                    .increment(1);
                warn!(kind, record_id, "Notification queue disconnected, dropping notification");
                SubmitOutcome::Dropped
            }
        }
    }

    pub fn stats(&self) -> NotifierStats {
        match &self.shared {
            Some(shared) => NotifierStats {
                enabled: true,
                queued: shared.sender.len() as u64,
                in_flight: shared.in_flight.load(Ordering::Relaxed),
                submitted: shared.submitted.load(Ordering::Relaxed),
                sent: shared.sent.load(Ordering::Relaxed),
                failed: shared.failed.load(Ordering::Relaxed),
                dropped: shared.dropped.load(Ordering::Relaxed),
            },
            None => NotifierStats::default(),
        }
    }
}

/// Owner side of a running notifier; keep it for shutdown
pub struct NotifierService {
    handle: NotifierHandle,
    receiver: Option<flume::Receiver<NotificationJob>>,
    workers: Vec<JoinHandle<()>>,
    token: CancellationToken,
}

pub struct Notifier;

impl Notifier {
    /// Spawn the sender workers. Without a provider or recipients the
    /// returned service is disabled and spawns nothing.
    pub fn start(
        provider: Option<Arc<dyn EmailProvider>>,
        config: NotifierConfig,
    ) -> NotifierService {
        let token = CancellationToken::new();

        let Some(provider) = provider else {
            warn!("No email provider configured, admin notifications are disabled");
            return NotifierService::disabled(token);
        };
        if config.channel.recipients.is_empty() {
            warn!("No admin recipients configured, admin notifications are disabled");
            return NotifierService::disabled(token);
        }

        let workers = config.workers.max(1);
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = flume::bounded::<NotificationJob>(capacity);

        let shared = Arc::new(Shared {
            sender,
            channel: config.channel,
            closed: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
        });

        let worker_handles = (0..workers)
            .map(|worker_id| {
                tokio::spawn(
                    run_worker(
                        receiver.clone(),
                        provider.clone(),
                        shared.clone(),
                        token.clone(),
                    )
                    .instrument(tracing::info_span!("notifier_worker", worker_id)),
                )
            })
            .collect();

        info!(
            provider = provider.name(),
            workers, capacity, "Started notifier"
        );

        NotifierService {
            handle: NotifierHandle {
                shared: Some(shared),
            },
            receiver: Some(receiver),
            workers: worker_handles,
            token,
        }
    }
}

impl NotifierService {
    fn disabled(token: CancellationToken) -> Self {
        Self {
            handle: NotifierHandle::disabled(),
            receiver: None,
            workers: Vec::new(),
            token,
        }
    }

    pub fn handle(&self) -> NotifierHandle {
        self.handle.clone()
    }

    /// Stop accepting jobs, let the workers drain the queue until it is
    /// empty or `timeout` passes, then discard what is left.
    pub async fn shutdown(self, timeout: Duration) -> ShutdownReport {
        let Some(shared) = self.handle.shared.clone() else {
            return ShutdownReport {
                discarded: 0,
                timed_out: false,
            };
        };
        shared.closed.store(true, Ordering::Release);

        let deadline = Instant::now() + timeout;
        let mut timed_out = false;
        loop {
            // Accepted jobs that have not reached a terminal state yet
            let outstanding = shared.submitted.load(Ordering::Acquire).saturating_sub(
                shared.sent.load(Ordering::Acquire) + shared.failed.load(Ordering::Acquire),
            );
            if outstanding == 0 {
                break;
            }
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }
            debug!(
                outstanding,
                queued = shared.sender.len(),
                "Waiting for notification queue to drain"
            );
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        self.token.cancel();

        let discarded = self
            .receiver
            .as_ref()
            .map(|receiver| receiver.drain().count())
            .unwrap_or(0);
        if discarded > 0 {
            shared
                .dropped
                .fetch_add(discarded as u64, Ordering::Relaxed);
            metrics::counter!("notifier.dropped_total", "reason" => "shutdown")
                .increment(discarded as u64);
            warn!(discarded, "Notifier shutdown discarded queued notifications");
        }
        metrics::gauge!("notifier.queue_depth").set(0.0);

        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Notifier worker ended abnormally");
            }
        }

        info!(discarded, timed_out, "Notifier stopped");
        ShutdownReport {
            discarded,
            timed_out,
        }
    }
}

async fn run_worker(
    receiver: flume::Receiver<NotificationJob>,
    provider: Arc<dyn EmailProvider>,
    shared: Arc<Shared>,
    token: CancellationToken,
) {
    debug!("Notifier worker started");
    loop {
        let job = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            job = receiver.recv_async() => match job {
                Ok(job) => job,
                Err(_) => break,
            },
        };

        metrics::gauge!("notifier.queue_depth").set(receiver.len() as f64);
        shared.in_flight.fetch_add(1, Ordering::Relaxed);
        deliver(job, provider.as_ref(), &shared, &token).await;
        shared.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
    debug!("Notifier worker stopped");
}

async fn deliver(
    job: NotificationJob,
    provider: &dyn EmailProvider,
    shared: &Shared,
    token: &CancellationToken,
) {
    let kind = job.kind_label();
    let record_id = job.record_id();
    let email = job.render();
    let start = Instant::now();

    let result = tokio::select! {
        _ = token.cancelled() => {
            shared.failed.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("notifier.failed_total", "kind" => kind, "reason" => "shutdown")
                .increment(1);
            warn!(kind, record_id, "Abandoned notification delivery at shutdown");
            return;
        }
        result = provider.send(&email) => result,
    };

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    metrics::histogram!("notifier.delivery_duration_ms").record(elapsed_ms);

    match result {
        Ok(receipt) => {
            shared.sent.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("notifier.sent_total", "kind" => kind).increment(1);
            info!(
                kind,
                record_id,
                email_id = ?receipt.id,
                elapsed_ms,
                "Sent admin notification"
            );
        }
        Err(e) => {
            shared.failed.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("notifier.failed_total", "kind" => kind, "reason" => "provider")
                .increment(1);
            warn!(kind, record_id, error = %e, "Failed to send admin notification");
        }
    }
}
