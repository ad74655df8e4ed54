//! Long-running-operation polling.
//!
//! [`PollMachine`] is a pure state machine: feed it each observed job state
//! together with the current time and it answers either "sleep this long"
//! or "finish with this outcome". [`poll_until_terminal`] drives it with a
//! [`JobFetcher`] and a [`Clock`], one fetch in flight at a time.
//!
//! Termination is guaranteed two ways: the elapsed-time deadline, and a hard
//! cap of `ceil(timeout / interval) + 1` fetches that holds even if the clock
//! stalls. Running out of time is a normal outcome, flagged `timed_out`.

use crate::error::EngineError;
use crate::providers::Clock;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(300_000);

/// Normalized job status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    /// Unrecognized status string; keeps polling.
    Unknown(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "starting" | "queued" => Self::Pending,
            "running" | "processing" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Unknown(raw.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// One observation of a job: its status plus the full provider payload.
#[derive(Debug, Clone, PartialEq)]
pub struct JobState {
    pub status: JobStatus,
    pub payload: Value,
}

impl JobState {
    /// Reads the status from `payload[status_field]`; a missing or
    /// non-string field is `Unknown`.
    pub fn from_payload(payload: Value, status_field: &str) -> Self {
        let status = match payload.get(status_field).and_then(Value::as_str) {
            Some(raw) => JobStatus::parse(raw),
            None => JobStatus::Unknown(String::new()),
        };
        Self { status, payload }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl PollConfig {
    /// Unset or zero values fall back to the defaults, so the bound is always finite.
    pub fn new(interval: Option<Duration>, timeout: Option<Duration>) -> Self {
        Self {
            interval: interval.filter(|d| !d.is_zero()).unwrap_or(DEFAULT_POLL_INTERVAL),
            timeout: timeout.filter(|d| !d.is_zero()).unwrap_or(DEFAULT_POLL_TIMEOUT),
        }
    }

    /// `ceil(timeout / interval) + 1`.
    pub fn max_fetches(&self) -> u64 {
        let interval = self.interval.as_millis().max(1);
        let timeout = self.timeout.as_millis();
        (timeout.div_ceil(interval) as u64).saturating_add(1)
    }
}

/// Final result of a poll. `timed_out` means the job may still complete remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub state: JobState,
    pub timed_out: bool,
    pub fetches: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    Sleep(Duration),
    Finish(PollOutcome),
}

#[derive(Debug, Clone)]
pub struct PollMachine {
    config: PollConfig,
    started_at: u64,
    fetches: u64,
}

impl PollMachine {
    pub fn start(config: PollConfig, now_millis: u64) -> Self {
        Self {
            config,
            started_at: now_millis,
            fetches: 0,
        }
    }

    pub fn fetches(&self) -> u64 {
        self.fetches
    }

    /// Evaluates a freshly fetched state observed at `now_millis`.
    pub fn observe(&mut self, state: JobState, now_millis: u64) -> PollStep {
        self.fetches += 1;
        if state.status.is_terminal() {
            return PollStep::Finish(PollOutcome {
                state,
                timed_out: false,
                fetches: self.fetches,
            });
        }
        let elapsed = now_millis.saturating_sub(self.started_at);
        if u128::from(elapsed) > self.config.timeout.as_millis() || self.fetches >= self.config.max_fetches() {
            return PollStep::Finish(PollOutcome {
                state,
                timed_out: true,
                fetches: self.fetches,
            });
        }
        PollStep::Sleep(self.config.interval)
    }
}

/// Fetches the current state of one job.
#[async_trait]
pub trait JobFetcher: Send + Sync {
    async fn fetch(&self) -> Result<JobState, EngineError>;
}

/// Polls until a terminal state or the deadline. Fetch errors propagate untouched.
pub async fn poll_until_terminal(
    fetcher: &dyn JobFetcher,
    clock: &dyn Clock,
    config: PollConfig,
) -> Result<PollOutcome, EngineError> {
    let mut machine = PollMachine::start(config, clock.now_millis());
    loop {
        let state = fetcher.fetch().await?;
        debug!("Poll #{} observed {:?}", machine.fetches() + 1, state.status);
        match machine.observe(state, clock.now_millis()) {
            PollStep::Finish(outcome) => {
                info!(
                    "Polling finished after {} fetches (timed_out={})",
                    outcome.fetches, outcome.timed_out
                );
                return Ok(outcome);
            }
            PollStep::Sleep(interval) => clock.sleep(interval).await,
        }
    }
}
