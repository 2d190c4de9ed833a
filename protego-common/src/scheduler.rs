//! Single-flight job scheduler
//!
//! A `Scheduler` owns one periodic [`Job`] and guarantees that at most one
//! run of it is in flight. Timer fires and manual triggers that arrive while
//! a run is in progress are rejected, never queued. The state returns to
//! `Idle` when a run ends, whether it completed, failed or panicked.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::events::{EventBus, PipelineEvent, RunStatus, TriggerSource};
use crate::schedule::Schedule;
use crate::Result;

/// Periodic unit of work driven by a [`Scheduler`]
#[async_trait]
pub trait Job: Send + Sync + 'static {
    type Report: Send + fmt::Debug + 'static;

    fn name(&self) -> &'static str;

    /// Perform one run
    ///
    /// Implementations check `cancel` between units of work and return early
    /// with a partial report once it fires.
    async fn run(&self, cancel: CancellationToken) -> Result<Self::Report>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    AlreadyRunning,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::AlreadyRunning => f.write_str("already running"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Accepted,
    Rejected(RejectReason),
}

/// How a run that was allowed to start ended
#[derive(Debug)]
pub enum RunOutcome<R> {
    Completed(R),
    Failed(String),
}

impl<R> RunOutcome<R> {
    pub fn report(&self) -> Option<&R> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            RunOutcome::Failed(_) => None,
        }
    }
}

struct Shared {
    state: Mutex<SchedulerState>,
    idle: Notify,
}

/// Holds the Running state; dropping it (including during unwind) returns
/// the scheduler to Idle
struct RunGuard {
    shared: Arc<Shared>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        *self.shared.state.lock() = SchedulerState::Idle;
        self.shared.idle.notify_waiters();
    }
}

pub struct Scheduler<J: Job> {
    job: Arc<J>,
    schedule: Schedule,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    events: EventBus,
    run_on_start: bool,
}

impl<J: Job> Scheduler<J> {
    pub fn new(job: Arc<J>, schedule: Schedule, events: EventBus) -> Self {
        Self {
            job,
            schedule,
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState::Idle),
                idle: Notify::new(),
            }),
            shutdown: CancellationToken::new(),
            events,
            run_on_start: false,
        }
    }

    /// Fire once as soon as the timer loop starts
    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state.lock()
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn job(&self) -> &Arc<J> {
        &self.job
    }

    /// Start a run in the background unless one is already in flight
    pub fn trigger_now(&self) -> TriggerOutcome {
        self.fire(TriggerSource::Manual)
    }

    /// Run to completion on the caller's task unless one is already in flight
    pub async fn run_now(&self) -> std::result::Result<RunOutcome<J::Report>, RejectReason> {
        let guard = self.claim(TriggerSource::Manual)?;
        match self.spawn_run(guard, TriggerSource::Manual).await {
            Ok(outcome) => Ok(outcome),
            Err(join_err) => Ok(RunOutcome::Failed(format!("run aborted: {}", join_err))),
        }
    }

    /// Spawn the timer loop
    ///
    /// The loop stops when [`Scheduler::shutdown`] is called.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);

        tokio::spawn(async move {
            let job = scheduler.job.name();
            info!(job, schedule = %scheduler.schedule, "Scheduler started");

            if scheduler.run_on_start && !scheduler.shutdown.is_cancelled() {
                scheduler.fire(TriggerSource::Startup);
            }

            loop {
                let delay = scheduler.schedule.delay_from(Utc::now());
                tokio::select! {
                    _ = scheduler.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {
                        scheduler.fire(TriggerSource::Timer);
                    }
                }
            }

            info!(job, "Scheduler stopped");
        })
    }

    /// Stop the timer loop and ask an in-flight run to stop at the next
    /// record boundary
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait until no run is in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.state() == SchedulerState::Idle {
                return;
            }
            notified.await;
        }
    }

    fn fire(&self, trigger: TriggerSource) -> TriggerOutcome {
        match self.claim(trigger) {
            Ok(guard) => {
                drop(self.spawn_run(guard, trigger));
                TriggerOutcome::Accepted
            }
            Err(reason) => TriggerOutcome::Rejected(reason),
        }
    }

    /// Atomically move Idle -> Running
    fn claim(&self, trigger: TriggerSource) -> std::result::Result<RunGuard, RejectReason> {
        {
            let mut state = self.shared.state.lock();
            if *state == SchedulerState::Idle {
                *state = SchedulerState::Running;
                return Ok(RunGuard {
                    shared: Arc::clone(&self.shared),
                });
            }
        }

        warn!(
            job = self.job.name(),
            ?trigger,
            "Trigger rejected: a run is already in progress"
        );
        self.events.emit_lossy(PipelineEvent::TriggerRejected {
            job: self.job.name().to_string(),
            trigger,
            timestamp: Utc::now(),
        });
        Err(RejectReason::AlreadyRunning)
    }

    fn spawn_run(&self, guard: RunGuard, trigger: TriggerSource) -> JoinHandle<RunOutcome<J::Report>> {
        let job = Arc::clone(&self.job);
        let events = self.events.clone();
        let cancel = self.shutdown.child_token();

        tokio::spawn(async move {
            let _guard = guard;
            let name = job.name();
            let run_id = Uuid::new_v4();
            let started = Instant::now();

            info!(job = name, %run_id, ?trigger, "Run started");
            events.emit_lossy(PipelineEvent::RunStarted {
                job: name.to_string(),
                run_id,
                trigger,
                timestamp: Utc::now(),
            });

            // Run on its own task so a panic surfaces as a JoinError here
            let run = tokio::spawn({
                let job = Arc::clone(&job);
                async move { job.run(cancel).await }
            });

            let (status, outcome) = match run.await {
                Ok(Ok(report)) => {
                    info!(job = name, %run_id, ?report, "Run completed");
                    (RunStatus::Completed, RunOutcome::Completed(report))
                }
                Ok(Err(e)) => {
                    error!(job = name, %run_id, error = %e, "Run failed");
                    (RunStatus::Failed, RunOutcome::Failed(e.to_string()))
                }
                Err(join_err) => {
                    error!(job = name, %run_id, error = %join_err, "Run panicked");
                    (
                        RunStatus::Panicked,
                        RunOutcome::Failed(format!("run panicked: {}", join_err)),
                    )
                }
            };

            events.emit_lossy(PipelineEvent::RunFinished {
                job: name.to_string(),
                run_id,
                status,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });

            outcome
        })
    }
}
