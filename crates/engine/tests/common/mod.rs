#![allow(dead_code)]

//! In-memory fakes for the engine's store, ledger, and dispatch seams.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use quantdesk_core::feature::Feature;
use quantdesk_core::status::JobStatus;
use quantdesk_core::types::DbId;
use quantdesk_db::models::credit::LaunchAllowance;
use quantdesk_db::models::job::{AnalysisJob, CreateJob, JobPatch};
use quantdesk_engine::dispatch::{AnalysisDispatcher, DispatchError};
use quantdesk_engine::store::{CreditLedger, JobStore, StoreError};
use quantdesk_executor::DispatchReply;

pub fn job_row(id: DbId, user_id: DbId, feature: Feature, status: JobStatus) -> AnalysisJob {
    AnalysisJob {
        id,
        user_id,
        feature: feature.as_str().to_string(),
        status_id: status.id(),
        request_payload: serde_json::json!({}),
        response_payload: None,
        error_message: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// ScriptedStore: feeds the poller a canned sequence of status reads
// ---------------------------------------------------------------------------

/// One scripted reply to a `get_job` call.
pub enum Probe {
    Running,
    Terminal(JobStatus, Option<serde_json::Value>, Option<String>),
    NotFound,
    Unavailable,
    Malformed,
}

/// Records when each status check happens (in seconds of paused tokio
/// time since construction) and replies from a script. An exhausted
/// script keeps answering `Running`.
pub struct ScriptedStore {
    started: tokio::time::Instant,
    script: Mutex<VecDeque<Probe>>,
    pub probe_times: Mutex<Vec<u64>>,
    pub timed_out_marks: Mutex<Vec<u64>>,
}

impl ScriptedStore {
    pub fn new(script: Vec<Probe>) -> Self {
        Self {
            started: tokio::time::Instant::now(),
            script: Mutex::new(script.into()),
            probe_times: Mutex::new(Vec::new()),
            timed_out_marks: Mutex::new(Vec::new()),
        }
    }

    pub fn always_running() -> Self {
        Self::new(Vec::new())
    }

    fn elapsed_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn probe_count(&self) -> usize {
        self.probe_times.lock().unwrap().len()
    }
}

#[async_trait]
impl JobStore for ScriptedStore {
    async fn create_job(
        &self,
        _user_id: DbId,
        _input: &CreateJob,
    ) -> Result<AnalysisJob, StoreError> {
        unreachable!("ScriptedStore only serves status reads")
    }

    async fn get_job(&self, job_id: DbId) -> Result<AnalysisJob, StoreError> {
        self.probe_times.lock().unwrap().push(self.elapsed_secs());
        let probe = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Probe::Running);
        match probe {
            Probe::Running => Ok(job_row(job_id, 1, Feature::Reports, JobStatus::Running)),
            Probe::Terminal(status, payload, message) => {
                let mut job = job_row(job_id, 1, Feature::Reports, status);
                job.response_payload = payload;
                job.error_message = message;
                Ok(job)
            }
            Probe::NotFound => Err(StoreError::JobNotFound(job_id)),
            Probe::Unavailable => Err(StoreError::Unavailable("connection refused".into())),
            Probe::Malformed => Err(StoreError::Malformed("unexpected column type".into())),
        }
    }

    async fn update_job(&self, _job_id: DbId, _patch: &JobPatch) -> Result<AnalysisJob, StoreError> {
        unreachable!("ScriptedStore only serves status reads")
    }

    async fn mark_done(
        &self,
        _job_id: DbId,
        _response_payload: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn mark_error(&self, _job_id: DbId, _message: &str) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn mark_timed_out(&self, _job_id: DbId) -> Result<bool, StoreError> {
        self.timed_out_marks
            .lock()
            .unwrap()
            .push(self.elapsed_secs());
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore: a real little job table for launch-flow tests
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<DbId, AnalysisJob>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn job(&self, id: DbId) -> Option<AnalysisJob> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, user_id: DbId, input: &CreateJob) -> Result<AnalysisJob, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut job = job_row(id, user_id, input.feature, JobStatus::Queued);
        job.request_payload = input.request_payload.clone();
        self.jobs.lock().unwrap().insert(id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: DbId) -> Result<AnalysisJob, StoreError> {
        self.job(job_id).ok_or(StoreError::JobNotFound(job_id))
    }

    async fn update_job(&self, job_id: DbId, patch: &JobPatch) -> Result<AnalysisJob, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(StoreError::JobNotFound(job_id))?;
        if let Some(status) = patch.status {
            job.status_id = status.id();
        }
        if let Some(ref payload) = patch.response_payload {
            job.response_payload = Some(payload.clone());
        }
        if let Some(ref message) = patch.error_message {
            job.error_message = Some(message.clone());
        }
        Ok(job.clone())
    }

    async fn mark_done(
        &self,
        job_id: DbId,
        response_payload: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&job_id) {
            Some(job) if !job.is_terminal() => {
                job.status_id = JobStatus::Done.id();
                job.response_payload = Some(response_payload.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_error(&self, job_id: DbId, message: &str) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&job_id) {
            Some(job) if !job.is_terminal() => {
                job.status_id = JobStatus::Error.id();
                job.error_message = Some(message.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_timed_out(&self, job_id: DbId) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&job_id) {
            Some(job) if !job.is_terminal() => {
                job.status_id = JobStatus::TimedOut.id();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// StubLedger: configurable credit ledger with call accounting
// ---------------------------------------------------------------------------

pub struct StubLedger {
    pub allowed: bool,
    pub remaining: i32,
    pub engage_ok: bool,
    pub engage_calls: AtomicUsize,
    pub engaged_jobs: Mutex<HashSet<DbId>>,
}

impl StubLedger {
    pub fn with_credits(remaining: i32) -> Self {
        Self {
            allowed: remaining > 0,
            remaining,
            engage_ok: remaining > 0,
            engage_calls: AtomicUsize::new(0),
            engaged_jobs: Mutex::new(HashSet::new()),
        }
    }

    /// Pre-check passes but the engage loses the race for the last unit.
    pub fn engage_loses_race() -> Self {
        Self {
            allowed: true,
            remaining: 1,
            engage_ok: false,
            engage_calls: AtomicUsize::new(0),
            engaged_jobs: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl CreditLedger for StubLedger {
    async fn can_launch(
        &self,
        _user_id: DbId,
        _feature: Feature,
    ) -> Result<LaunchAllowance, StoreError> {
        Ok(LaunchAllowance {
            allowed: self.allowed,
            remaining: self.remaining,
        })
    }

    async fn engage(
        &self,
        _user_id: DbId,
        _feature: Feature,
        job_id: DbId,
    ) -> Result<bool, StoreError> {
        self.engage_calls.fetch_add(1, Ordering::SeqCst);
        if !self.engage_ok {
            return Ok(false);
        }
        // Same contract as the real ledger: a repeated job id never
        // decrements twice.
        Ok(self.engaged_jobs.lock().unwrap().insert(job_id))
    }
}

// ---------------------------------------------------------------------------
// StubDispatcher: canned dispatch replies
// ---------------------------------------------------------------------------

pub enum DispatchMode {
    Ack,
    Completed(quantdesk_core::content::AnalysisContent),
    Transient,
    Rejected(String),
}

pub struct StubDispatcher {
    mode: DispatchMode,
    pub calls: AtomicUsize,
}

impl StubDispatcher {
    pub fn new(mode: DispatchMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AnalysisDispatcher for StubDispatcher {
    async fn dispatch(
        &self,
        _job_id: DbId,
        _feature: Feature,
        _payload: &serde_json::Value,
    ) -> Result<DispatchReply, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            DispatchMode::Ack => Ok(DispatchReply::Ack),
            DispatchMode::Completed(content) => Ok(DispatchReply::Completed(content.clone())),
            DispatchMode::Transient => Err(DispatchError::Transient("timeout".into())),
            DispatchMode::Rejected(message) => Err(DispatchError::Rejected(message.clone())),
        }
    }
}
