//! Access-attempt recording for denied navigations.

use serde::Serialize;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tracing::warn;
use ulid::Ulid;
use utoipa::ToSchema;

use super::{role::Role, session::Identity};

/// Why a gate redirected.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    Unauthenticated,
    InsufficientRole,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccessAttempt {
    /// Time-ordered id of the attempt.
    pub id: Ulid,
    pub destination: String,
    pub identity: Option<Identity>,
    pub role: Option<Role>,
    pub reason: DenyReason,
    pub redirect_to: &'static str,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log lock poisoned")]
    Poisoned,
    #[error("{failed} of {total} audit sinks failed")]
    Partial { failed: usize, total: usize },
}

pub trait AuditSink: Send + Sync {
    fn record(&self, attempt: &AccessAttempt) -> Result<(), AuditError>;
}

/// Writes every attempt to the log at warn level.
#[derive(Clone, Debug)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, attempt: &AccessAttempt) -> Result<(), AuditError> {
        match attempt.reason {
            DenyReason::Unauthenticated => warn!(
                destination = %attempt.destination,
                redirect_to = attempt.redirect_to,
                "Unauthorized access attempt"
            ),
            DenyReason::InsufficientRole => warn!(
                destination = %attempt.destination,
                identity = attempt.identity.as_ref().map_or("unknown", Identity::as_str),
                role = attempt.role.map_or("none", Role::as_str),
                redirect_to = attempt.redirect_to,
                "Access denied, admin role required"
            ),
        }
        Ok(())
    }
}

/// Bounded in-memory history of access attempts, oldest entries evicted first.
#[derive(Debug)]
pub struct AuditLog {
    capacity: usize,
    entries: Mutex<VecDeque<AccessAttempt>>,
}

impl AuditLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Recorded attempts, newest first.
    pub fn recent(&self) -> Result<Vec<AccessAttempt>, AuditError> {
        let entries = self.entries.lock().map_err(|_| AuditError::Poisoned)?;
        Ok(entries.iter().rev().cloned().collect())
    }
}

impl AuditSink for AuditLog {
    fn record(&self, attempt: &AccessAttempt) -> Result<(), AuditError> {
        let mut entries = self.entries.lock().map_err(|_| AuditError::Poisoned)?;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(attempt.clone());
        Ok(())
    }
}

/// Records to every sink even when some of them fail.
pub struct FanOut {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanOut {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for FanOut {
    fn record(&self, attempt: &AccessAttempt) -> Result<(), AuditError> {
        let failed = self
            .sinks
            .iter()
            .filter(|sink| sink.record(attempt).is_err())
            .count();

        if failed == 0 {
            Ok(())
        } else {
            Err(AuditError::Partial {
                failed,
                total: self.sinks.len(),
            })
        }
    }
}
