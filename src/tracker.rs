//! In-memory job state: status, progress, result and an append-only log per job.
//!
//! The outer map lock is only held long enough to insert or look up a job
//! handle. Every mutation and every snapshot goes through that job's own mutex,
//! so concurrent jobs never serialize on each other and a poller always sees
//! status, progress and log tail from the same instant.
//!
//! Entries are never evicted; the store lives as long as the process.

use crate::error::{ServiceError, ServiceResult};
use crate::report::JobResult;
use crate::util::now_rfc3339;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Position in the lifecycle `queued < processing < completed | error`.
    fn stage(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Error => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug)]
struct JobRecord {
    status: JobStatus,
    progress: u8,
    result: Option<Arc<JobResult>>,
    error: Option<String>,
    logs: Vec<LogEntry>,
}

impl JobRecord {
    fn new() -> Self {
        Self {
            status: JobStatus::Queued,
            progress: 0,
            result: None,
            error: None,
            logs: Vec::new(),
        }
    }
}

/// Point-in-time view of a job, as returned to pollers.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub logs: Vec<LogEntry>,
    pub total_logs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub result: Option<Arc<JobResult>>,
}

#[derive(Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<String, Arc<Mutex<JobRecord>>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new job in `queued` state. Ids are never reused.
    pub fn create(&self, id: &str) -> ServiceResult<()> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(id) {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "job id already exists: {id}"
            )));
        }
        jobs.insert(id.to_string(), Arc::new(Mutex::new(JobRecord::new())));
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets a job that was never handed out to a caller.
    pub fn remove(&self, id: &str) -> bool {
        self.jobs.write().remove(id).is_some()
    }

    fn handle(&self, id: &str) -> ServiceResult<Arc<Mutex<JobRecord>>> {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    /// Status only moves forward. Terminal states are sticky and a move back
    /// to an earlier stage is ignored.
    pub fn set_status(&self, id: &str, status: JobStatus) -> ServiceResult<()> {
        let handle = self.handle(id)?;
        let mut job = handle.lock();
        if job.status.is_terminal() {
            warn!(job_id = id, "ignoring status {status} on terminal job ({})", job.status);
            return Ok(());
        }
        if status.stage() < job.status.stage() {
            warn!(job_id = id, "ignoring backward status {status} (currently {})", job.status);
            return Ok(());
        }
        job.status = status;
        Ok(())
    }

    /// Progress never moves backwards and is frozen once the job is terminal.
    pub fn set_progress(&self, id: &str, percent: u8) -> ServiceResult<()> {
        let handle = self.handle(id)?;
        let mut job = handle.lock();
        if job.status.is_terminal() {
            return Ok(());
        }
        job.progress = job.progress.max(percent.min(100));
        Ok(())
    }

    pub fn append_log(&self, id: &str, level: LogLevel, message: impl Into<String>) -> ServiceResult<()> {
        let message = message.into();
        match level {
            LogLevel::Info => info!(job_id = id, "{message}"),
            LogLevel::Error => error!(job_id = id, "{message}"),
        }
        let handle = self.handle(id)?;
        let mut job = handle.lock();
        job.logs.push(LogEntry {
            timestamp: now_rfc3339(),
            level,
            message,
        });
        Ok(())
    }

    pub fn attach_result(&self, id: &str, result: JobResult) -> ServiceResult<()> {
        let handle = self.handle(id)?;
        let mut job = handle.lock();
        if job.status.is_terminal() {
            warn!(job_id = id, "ignoring result on terminal job ({})", job.status);
            return Ok(());
        }
        job.result = Some(Arc::new(result));
        Ok(())
    }

    /// Attaches the result, sets progress to 100 and marks the job completed
    /// in one step.
    pub fn complete(&self, id: &str, result: JobResult) -> ServiceResult<()> {
        let handle = self.handle(id)?;
        let mut job = handle.lock();
        if job.status.is_terminal() {
            warn!(job_id = id, "ignoring completion on terminal job ({})", job.status);
            return Ok(());
        }
        job.result = Some(Arc::new(result));
        job.progress = 100;
        job.status = JobStatus::Completed;
        Ok(())
    }

    /// Records the failure message, logs it and marks the job as `error`.
    pub fn fail(&self, id: &str, message: impl Into<String>) -> ServiceResult<()> {
        let message = message.into();
        error!(job_id = id, "job failed: {message}");
        let handle = self.handle(id)?;
        let mut job = handle.lock();
        if job.status.is_terminal() {
            warn!(job_id = id, "ignoring failure on terminal job ({})", job.status);
            return Ok(());
        }
        job.logs.push(LogEntry {
            timestamp: now_rfc3339(),
            level: LogLevel::Error,
            message: format!("Error: {message}"),
        });
        job.error = Some(message);
        job.status = JobStatus::Error;
        Ok(())
    }

    /// Consistent snapshot with the trailing `log_window` log entries.
    pub fn get(&self, id: &str, log_window: usize) -> ServiceResult<JobSnapshot> {
        let handle = self.handle(id)?;
        let job = handle.lock();
        let skip = job.logs.len().saturating_sub(log_window);
        Ok(JobSnapshot {
            id: id.to_string(),
            status: job.status,
            progress: job.progress,
            logs: job.logs[skip..].to_vec(),
            total_logs: job.logs.len(),
            error: job.error.clone(),
            result: job.result.clone(),
        })
    }
}
