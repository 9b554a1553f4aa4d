// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::job::{CronJob, JobError};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("duplicate job name: {0}")]
    DuplicateName(String),
    #[error(transparent)]
    Job(#[from] JobError),
}

/// Executes a job's `action` string when its schedule fires. The scheduler
/// itself only tracks timing; dispatching `action` to a tool call, a cron
/// webhook, or an internal command is the runner's job.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job_name: &str, action: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub schedule: String,
    pub enabled: bool,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

struct JobEntry {
    job: CronJob,
    last_run: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Holds every configured [`CronJob`] and ticks them against wall-clock time
/// (spec.md §6 `cron[]`, wired to the gateway's `cron.list`/`cron.status`
/// methods).
pub struct Scheduler {
    jobs: RwLock<HashMap<String, JobEntry>>,
}

impl Scheduler {
    pub fn new(jobs: Vec<CronJob>) -> Result<Self, SchedulerError> {
        let mut map = HashMap::new();
        for job in jobs {
            if map.contains_key(&job.name) {
                return Err(SchedulerError::DuplicateName(job.name));
            }
            map.insert(job.name.clone(), JobEntry { job, last_run: None, last_error: None });
        }
        Ok(Self { jobs: RwLock::new(map) })
    }

    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn status(&self) -> Vec<JobStatus> {
        let jobs = self.jobs.read().await;
        let mut out: Vec<JobStatus> = jobs
            .values()
            .map(|entry| JobStatus {
                name: entry.job.name.clone(),
                schedule: entry.job.schedule_expr().to_string(),
                enabled: entry.job.enabled,
                next_run: if entry.job.enabled { entry.job.next_run_after(Utc::now()) } else { None },
                last_run: entry.last_run,
                last_error: entry.last_error.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Runs every enabled job whose next scheduled fire time falls at or
    /// before `now` and has not already fired since its last recorded run.
    /// Intended to be called from a periodic tick (`tick_loop`); exposed
    /// directly so tests can drive specific instants.
    pub async fn run_due(&self, runner: &dyn JobRunner, now: DateTime<Utc>) {
        let due: Vec<(String, String)> = {
            let jobs = self.jobs.read().await;
            jobs.values()
                .filter(|entry| entry.job.enabled)
                .filter(|entry| {
                    let since = entry.last_run.unwrap_or(DateTime::<Utc>::MIN_UTC);
                    entry.job.next_run_after(since).map(|next| next <= now).unwrap_or(false)
                })
                .map(|entry| (entry.job.name.clone(), entry.job.action.clone()))
                .collect()
        };

        for (name, action) in due {
            let result = runner.run(&name, &action).await;
            let mut jobs = self.jobs.write().await;
            if let Some(entry) = jobs.get_mut(&name) {
                entry.last_run = Some(now);
                match result {
                    Ok(()) => {
                        info!(job = %name, "cron job completed");
                        entry.last_error = None;
                    }
                    Err(e) => {
                        warn!(job = %name, error = %e, "cron job failed");
                        entry.last_error = Some(e.to_string());
                    }
                }
            }
        }
    }

    /// Runs `run_due` on a fixed polling interval until `shutdown` resolves.
    /// Sub-minute cron granularity is not needed here; a coarse poll keeps
    /// the loop cheap.
    pub async fn tick_loop(self: Arc<Self>, runner: Arc<dyn JobRunner>, poll_interval: std::time::Duration) {
        let mut interval = tokio::time::interval(poll_interval);
        loop {
            interval.tick().await;
            self.run_due(runner.as_ref(), Utc::now()).await;
        }
    }
}
