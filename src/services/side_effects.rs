use {
    crate::domain::{
        audit::NewAuditEntry,
        error::EscrowError,
        notification::Notification,
        payout::PayoutInstruction,
        ports::{AuditLogger, NotificationDispatcher, PayoutGateway},
    },
    std::{sync::Arc, time::Duration},
    tokio::{
        sync::{mpsc, watch},
        time::Instant,
    },
};

/// Work that follows a committed state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Notify(Notification),
    Audit(NewAuditEntry),
    Payout(PayoutInstruction),
}

impl Effect {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Notify(_) => "notification",
            Self::Audit(_) => "audit",
            Self::Payout(_) => "payout",
        }
    }
}

#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub audit: Arc<dyn AuditLogger>,
    pub payouts: Arc<dyn PayoutGateway>,
}

impl Collaborators {
    pub async fn deliver(&self, effect: &Effect) -> Result<(), EscrowError> {
        match effect {
            Effect::Notify(n) => self.notifier.dispatch(n).await,
            Effect::Audit(entry) => self.audit.record(entry).await,
            Effect::Payout(instruction) => self.payouts.execute(instruction).await,
        }
    }
}

#[derive(Debug)]
struct Job {
    effect: Effect,
    attempts: u32,
}

#[derive(Clone)]
enum Mode {
    Inline(Collaborators),
    Queued(mpsc::UnboundedSender<Job>),
}

/// Fan-out point for notifications, audit entries and payouts.
/// `emit` never fails and never rolls back the caller's state change.
#[derive(Clone)]
pub struct SideEffects {
    mode: Mode,
}

impl SideEffects {
    /// Deliver immediately on the caller's task; failures are logged, not retried.
    pub fn inline(collaborators: Collaborators) -> Self {
        Self {
            mode: Mode::Inline(collaborators),
        }
    }

    /// Queue for a background worker that retries with exponential backoff.
    pub fn queued(collaborators: Collaborators, max_attempts: u32) -> (Self, EffectWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = EffectWorker {
            rx,
            collaborators,
            max_attempts: max_attempts.max(1),
            base_backoff: Duration::from_secs(1),
            retries: Vec::new(),
        };
        (
            Self {
                mode: Mode::Queued(tx),
            },
            worker,
        )
    }

    pub async fn emit(&self, effect: Effect) {
        match &self.mode {
            Mode::Inline(collaborators) => {
                if let Err(e) = collaborators.deliver(&effect).await {
                    tracing::warn!(effect = effect.label(), error = %e, "side effect failed");
                }
            }
            Mode::Queued(tx) => {
                let label = effect.label();
                if tx.send(Job { effect, attempts: 0 }).is_err() {
                    tracing::error!(effect = label, "effect worker gone, side effect dropped");
                }
            }
        }
    }

    pub async fn emit_all(&self, effects: impl IntoIterator<Item = Effect>) {
        for effect in effects {
            self.emit(effect).await;
        }
    }
}

pub struct EffectWorker {
    rx: mpsc::UnboundedReceiver<Job>,
    collaborators: Collaborators,
    max_attempts: u32,
    base_backoff: Duration,
    /// Failed jobs waiting out their backoff, with the instant they are due.
    retries: Vec<(Instant, Job)>,
}

impl EffectWorker {
    pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    /// Deliver queued effects until shutdown, then make one pass over
    /// everything left, including jobs still waiting for a retry.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("effect worker started");
        let mut open = true;

        loop {
            if !open && self.retries.is_empty() {
                break;
            }
            let next_due = self.retries.iter().map(|(due, _)| *due).min();

            tokio::select! {
                _ = shutdown.changed() => break,
                job = self.rx.recv(), if open => match job {
                    Some(job) => self.attempt(job).await,
                    None => open = false,
                },
                _ = sleep_until(next_due) => self.retry_due().await,
            }
        }

        let mut left: Vec<Job> = self.retries.drain(..).map(|(_, job)| job).collect();
        while let Ok(job) = self.rx.try_recv() {
            left.push(job);
        }
        if !left.is_empty() {
            tracing::info!(pending = left.len(), "draining side effects before shutdown");
        }
        for job in left {
            if let Err(e) = self.collaborators.deliver(&job.effect).await {
                tracing::error!(
                    effect = job.effect.label(),
                    attempts = job.attempts + 1,
                    error = %e,
                    "side effect lost at shutdown"
                );
            }
        }
        tracing::info!("effect worker shutting down");
    }

    async fn retry_due(&mut self) {
        let now = Instant::now();
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retries)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        self.retries = waiting;
        for (_, job) in due {
            self.attempt(job).await;
        }
    }

    async fn attempt(&mut self, mut job: Job) {
        let Err(e) = self.collaborators.deliver(&job.effect).await else {
            return;
        };

        job.attempts += 1;
        if job.attempts >= self.max_attempts {
            tracing::error!(
                effect = job.effect.label(),
                attempts = job.attempts,
                error = %e,
                "side effect failed permanently"
            );
            return;
        }

        let delay = self.base_backoff * 2u32.saturating_pow(job.attempts - 1);
        tracing::warn!(
            effect = job.effect.label(),
            attempts = job.attempts,
            retry_in_ms = delay.as_millis() as u64,
            error = %e,
            "side effect failed, scheduling retry"
        );
        self.retries.push((Instant::now() + delay, job));
    }
}

async fn sleep_until(due: Option<Instant>) {
    match due {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
