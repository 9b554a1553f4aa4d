// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid cron schedule {schedule:?} for job {name:?}: {source}")]
    InvalidSchedule { name: String, schedule: String, source: cron::error::Error },
}

/// A single scheduled job (spec.md §6 `cron[]`: `{name, schedule, action, enabled}`).
pub struct CronJob {
    pub name: String,
    pub action: String,
    pub enabled: bool,
    schedule_expr: String,
    schedule: Schedule,
}

impl CronJob {
    pub fn new(name: impl Into<String>, schedule: &str, action: impl Into<String>, enabled: bool) -> Result<Self, JobError> {
        let name = name.into();
        let parsed = Schedule::from_str(schedule)
            .map_err(|source| JobError::InvalidSchedule { name: name.clone(), schedule: schedule.to_string(), source })?;
        Ok(Self { name, action: action.into(), enabled, schedule_expr: schedule.to_string(), schedule: parsed })
    }

    pub fn schedule_expr(&self) -> &str {
        &self.schedule_expr
    }

    /// The next fire time strictly after `after`.
    pub fn next_run_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}
