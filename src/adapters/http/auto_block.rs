//! Automatic blocking of an unreachable remote.
//!
//! After a run of consecutive transport failures the remote is blocked for a
//! fixed period. Fetches during that period fail fast without touching the
//! network, which keeps a dead origin from tying up every request until its
//! connect timeout.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

use crate::domain::errors::FetchError;
use crate::domain::models::AutoBlockConfig;

/// Whether requests may currently reach the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum BlockStatus {
    Available,
    Blocked { until: DateTime<Utc> },
}

#[derive(Debug, Default)]
struct BlockState {
    consecutive_failures: u32,
    blocked_until: Option<DateTime<Utc>>,
}

/// Consecutive-failure tracker for one remote.
#[derive(Debug)]
pub struct AutoBlock {
    remote: String,
    config: AutoBlockConfig,
    state: Mutex<BlockState>,
}

impl AutoBlock {
    pub fn new(remote: impl Into<String>, config: AutoBlockConfig) -> Self {
        Self {
            remote: remote.into(),
            config,
            state: Mutex::default(),
        }
    }

    /// A tracker that never blocks.
    pub fn disabled(remote: impl Into<String>) -> Self {
        Self::new(
            remote,
            AutoBlockConfig {
                enabled: false,
                ..Default::default()
            },
        )
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn status(&self, now: DateTime<Utc>) -> BlockStatus {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.blocked_until {
            Some(until) if until > now => BlockStatus::Blocked { until },
            _ => BlockStatus::Available,
        }
    }

    /// Fail fast while the remote is blocked.
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), FetchError> {
        match self.status(now) {
            BlockStatus::Available => Ok(()),
            BlockStatus::Blocked { until } => Err(FetchError::RemoteBlocked {
                remote: self.remote.clone(),
                until,
            }),
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.blocked_until.take().is_some() || state.consecutive_failures > 0 {
            info!(remote = %self.remote, "remote reachable again");
        }
        state.consecutive_failures = 0;
    }

    /// Count a transport failure. Returns the block deadline when this
    /// failure tripped the block.
    pub fn record_failure(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.config.enabled {
            return None;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures < self.config.failure_threshold {
            return None;
        }

        let block = TimeDelta::try_seconds(i64::try_from(self.config.block_secs).unwrap_or(i64::MAX))
            .unwrap_or(TimeDelta::MAX);
        let until = now.checked_add_signed(block).unwrap_or(DateTime::<Utc>::MAX_UTC);
        state.consecutive_failures = 0;
        state.blocked_until = Some(until);
        warn!(
            remote = %self.remote,
            failures = self.config.failure_threshold,
            until = %until,
            "remote auto-blocked"
        );
        Some(until)
    }
}
