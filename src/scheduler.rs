//! Scheduler front-end: cron jobs submitted to the command pipeline

use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::command::{Command, CommandPipeline};
use crate::config::SchedulerConfig;
use crate::control::Subsystem;
use crate::worker::Worker;
use crate::{Error, Result};

/// Longest sleep between cancellation checks
const MAX_TICK: Duration = Duration::from_millis(100);

const STOP_TIMEOUT: Duration = Duration::from_secs(1);

struct Job {
    id: Uuid,
    command: String,
    cron: String,
    schedule: Schedule,
    next_run: Option<DateTime<Utc>>,
    run_count: u64,
}

impl Job {
    fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            command: self.command.clone(),
            cron: self.cron.clone(),
            next_run: self.next_run,
            run_count: self.run_count,
        }
    }
}

/// A scheduled job as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobInfo {
    pub id: Uuid,
    pub command: String,
    pub cron: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u64,
}

fn parse_cron(expr: &str) -> Result<Schedule> {
    Schedule::from_str(expr.trim())
        .map_err(|e| Error::Scheduler(format!("invalid cron expression '{expr}': {e}")))
}

/// Shared, cloneable access to the job book
#[derive(Clone, Default)]
pub struct SchedulerHandle {
    jobs: Arc<Mutex<Vec<Job>>>,
}

impl SchedulerHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `command` on a 6 or 7 field cron expression
    ///
    /// # Errors
    ///
    /// Returns error if the command is blank or the expression is invalid
    pub fn add(&self, command: &str, cron: &str) -> Result<JobInfo> {
        let command = command.trim();
        if command.is_empty() {
            return Err(Error::Scheduler("command is empty".to_string()));
        }
        let schedule = parse_cron(cron)?;

        let job = Job {
            id: Uuid::new_v4(),
            command: command.to_string(),
            cron: cron.trim().to_string(),
            next_run: schedule.after(&Utc::now()).next(),
            schedule,
            run_count: 0,
        };
        let info = job.info();

        tracing::info!(id = %info.id, cron = %info.cron, command = %info.command, "job scheduled");
        self.lock().push(job);
        Ok(info)
    }

    /// Remove a job; `false` if no job had that id
    pub fn remove(&self, id: Uuid) -> bool {
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|job| job.id != id);
        let removed = jobs.len() != before;
        if removed {
            tracing::info!(%id, "job removed");
        }
        removed
    }

    /// All jobs in the order they were added
    #[must_use]
    pub fn list(&self) -> Vec<JobInfo> {
        self.lock().iter().map(Job::info).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Commands of jobs due at `now`; each due job advances to its next run
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut jobs = self.lock();
        jobs.iter_mut()
            .filter(|job| job.next_run.is_some_and(|next| next <= now))
            .map(|job| {
                job.run_count += 1;
                job.next_run = job.schedule.after(&now).next();
                job.command.clone()
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Timer loop that submits due jobs as scheduled commands
pub struct Scheduler {
    handle: SchedulerHandle,
    pipeline: Arc<dyn CommandPipeline>,
    tick: Duration,
    worker: Mutex<Option<Worker>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(handle: SchedulerHandle, pipeline: Arc<dyn CommandPipeline>, tick: Duration) -> Self {
        Self {
            handle,
            pipeline,
            tick: tick.clamp(Duration::from_millis(1), MAX_TICK),
            worker: Mutex::new(None),
        }
    }

    /// Build the scheduler and load the configured static jobs
    ///
    /// Invalid static jobs are logged and skipped.
    #[must_use]
    pub fn from_config(config: &SchedulerConfig, pipeline: Arc<dyn CommandPipeline>) -> Self {
        let handle = SchedulerHandle::new();
        for job in &config.jobs {
            if let Err(e) = handle.add(&job.command, &job.cron) {
                tracing::warn!(command = %job.command, error = %e, "skipping configured job");
            }
        }
        Self::new(handle, pipeline, Duration::from_millis(config.tick_ms))
    }

    #[must_use]
    pub const fn handle(&self) -> &SchedulerHandle {
        &self.handle
    }
}

fn run(handle: &SchedulerHandle, pipeline: &dyn CommandPipeline, tick: Duration, cancel: &CancellationToken) {
    while !cancel.is_cancelled() {
        for text in handle.take_due(Utc::now()) {
            let command = Command::schedule(text);
            tracing::info!(id = %command.id(), command = %command.text(), "running scheduled command");
            let reply = pipeline.process_command(command);
            tracing::debug!(reply = %reply, "scheduled command finished");
            if cancel.is_cancelled() {
                return;
            }
        }
        std::thread::sleep(tick);
    }
}

impl Subsystem for Scheduler {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|w| !w.is_finished()) {
            return Ok(());
        }

        let handle = self.handle.clone();
        let pipeline = Arc::clone(&self.pipeline);
        let tick = self.tick;
        *worker = Some(Worker::spawn(
            "scheduler",
            CancellationToken::new(),
            move |cancel| run(&handle, pipeline.as_ref(), tick, &cancel),
        )?);

        tracing::info!(jobs = self.handle.len(), "scheduler started");
        Ok(())
    }

    fn stop(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_none_or(|mut w| w.stop(STOP_TIMEOUT))
    }
}
