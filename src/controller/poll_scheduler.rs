//! Reference counted start/stop of the periodic poll
//!
//! Each opened pad device holds one reference. The first open spawns the
//! poll task, the last close stops it and waits for it to finish, so no
//! report can reach a device after its close has returned.
//!
//! The poll task owns the [`PadOrchestrator`] while it runs and hands it back
//! when it stops. Pins and sinks therefore have exactly one writer at any
//! time without a lock around the tick itself; the mutex here only guards
//! the usage count and the start/stop transition.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::pad_orchestrator::PadOrchestrator;

/// Time between two ticks.
pub const POLL_PERIOD: Duration = Duration::from_millis(10);

/// Ticks between two stats log lines (30 s at the default period).
const STATS_TICKS: u64 = 3000;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The open was cancelled while waiting for the lock; nothing changed
    #[error("Interrupted while waiting for the poller lock")]
    Interrupted,

    /// A previous poll task crashed and took the orchestrator with it
    #[error("Poll task was lost: {0}")]
    Unavailable(String),
}

enum PollerState {
    /// `None` once the orchestrator was lost with a crashed poll task.
    Stopped(Option<PadOrchestrator>),
    Running {
        shutdown_tx: oneshot::Sender<()>,
        task: JoinHandle<PadOrchestrator>,
    },
}

struct PollerInner {
    usage: usize,
    state: PollerState,
}

/// Starts and stops the poll task on behalf of the open pad devices.
#[derive(Clone)]
pub struct PollScheduler {
    inner: Arc<Mutex<PollerInner>>,
    period: Duration,
}

impl PollScheduler {
    pub fn new(orchestrator: PadOrchestrator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PollerInner {
                usage: 0,
                state: PollerState::Stopped(Some(orchestrator)),
            })),
            period: POLL_PERIOD,
        }
    }

    /// Registers a consumer and makes sure the poll task runs.
    pub async fn open(&self, consumer: usize) -> Result<(), PollError> {
        self.open_until(consumer, &CancellationToken::new()).await
    }

    /// Like [`open`](Self::open), but gives up waiting for the lock once
    /// `interrupt` is cancelled. Nothing changes in that case.
    pub async fn open_until(
        &self,
        consumer: usize,
        interrupt: &CancellationToken,
    ) -> Result<(), PollError> {
        let mut inner = tokio::select! {
            biased;
            _ = interrupt.cancelled() => {
                warn!("Open of consumer {} interrupted", consumer);
                return Err(PollError::Interrupted);
            }
            guard = self.inner.lock() => guard,
        };

        inner.usage += 1;
        debug!("Consumer {} opened, usage {}", consumer, inner.usage);

        if let Err(e) = self.arm(&mut inner) {
            inner.usage -= 1;
            return Err(e);
        }
        Ok(())
    }

    /// Drops a consumer. The last one stops the poll task and waits until an
    /// in-flight tick has finished.
    ///
    /// The work runs on its own task, so it completes even if the caller
    /// stops waiting for it.
    pub async fn close(&self, consumer: usize) {
        let inner = self.inner.clone();
        let closing = tokio::spawn(async move {
            let mut inner = inner.lock().await;
            if inner.usage == 0 {
                warn!("Consumer {} closed without a matching open", consumer);
            } else {
                inner.usage -= 1;
            }
            debug!("Consumer {} closed, usage {}", consumer, inner.usage);

            if inner.usage == 0 {
                stop(&mut inner).await;
            }
        });

        if let Err(e) = closing.await {
            error!("Close of consumer {} failed: {}", consumer, e);
        }
    }

    /// Stops the poll task regardless of open consumers and returns the
    /// orchestrator, if it survived.
    pub async fn shutdown(&self) -> Option<PadOrchestrator> {
        let mut inner = self.inner.lock().await;
        if inner.usage > 0 {
            info!("Stopping poller with {} consumers still open", inner.usage);
        }
        inner.usage = 0;
        stop(&mut inner).await;

        match std::mem::replace(&mut inner.state, PollerState::Stopped(None)) {
            PollerState::Stopped(orchestrator) => orchestrator,
            PollerState::Running { .. } => None,
        }
    }

    pub async fn usage(&self) -> usize {
        self.inner.lock().await.usage
    }

    pub async fn is_running(&self) -> bool {
        matches!(self.inner.lock().await.state, PollerState::Running { .. })
    }

    fn arm(&self, inner: &mut MutexGuard<'_, PollerInner>) -> Result<(), PollError> {
        let orchestrator = match std::mem::replace(&mut inner.state, PollerState::Stopped(None)) {
            running @ PollerState::Running { .. } => {
                inner.state = running;
                return Ok(());
            }
            PollerState::Stopped(Some(orchestrator)) => orchestrator,
            PollerState::Stopped(None) => {
                error!("Cannot start polling, the orchestrator was lost");
                return Err(PollError::Unavailable(
                    "orchestrator lost with a crashed poll task".to_string(),
                ));
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_poll_loop(orchestrator, self.period, shutdown_rx));
        info!("Poll task started with {} ms period", self.period.as_millis());

        inner.state = PollerState::Running { shutdown_tx, task };
        Ok(())
    }
}

async fn stop(inner: &mut MutexGuard<'_, PollerInner>) {
    let (shutdown_tx, task) = match std::mem::replace(&mut inner.state, PollerState::Stopped(None)) {
        PollerState::Running { shutdown_tx, task } => (shutdown_tx, task),
        stopped => {
            inner.state = stopped;
            return;
        }
    };

    if shutdown_tx.send(()).is_err() {
        warn!("Poll task already terminated");
    }

    match task.await {
        Ok(orchestrator) => {
            info!("Poll task stopped");
            inner.state = PollerState::Stopped(Some(orchestrator));
        }
        Err(e) => {
            error!("Poll task panicked: {}", e);
        }
    }
}

async fn run_poll_loop(
    mut orchestrator: PadOrchestrator,
    period: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> PadOrchestrator {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ticks: u64 = 0;
    let mut slowest = Duration::ZERO;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {
                // Runs to completion: shutdown is only observed between ticks.
                let started = Instant::now();
                orchestrator.update();
                slowest = slowest.max(started.elapsed());
                ticks += 1;

                if ticks % STATS_TICKS == 0 {
                    info!(
                        "Poll stats: {} ticks, slowest tick {} us, {} active slots",
                        ticks,
                        slowest.as_micros(),
                        orchestrator.active_slots()
                    );
                    slowest = Duration::ZERO;
                }
            }
        }
    }

    debug!("Poll loop exiting after {} ticks", ticks);
    orchestrator
}
