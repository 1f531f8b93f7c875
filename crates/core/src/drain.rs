//! Drain classification and drain-script result interpretation.
//!
//! The classification strings and the numeric convention are shared with job authors'
//! drain scripts and must not change.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ApplySpec, PackageSpec};

/// Why the orchestrator is asking the job to drain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DrainType {
    Update,
    Status,
    Shutdown,
}

/// First drain-script argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobChange {
    New,
    Changed,
    Unchanged,
    Shutdown,
    CheckStatus,
}

impl JobChange {
    pub fn as_str(self) -> &'static str {
        match self {
            JobChange::New => "job_new",
            JobChange::Changed => "job_changed",
            JobChange::Unchanged => "job_unchanged",
            JobChange::Shutdown => "job_shutdown",
            JobChange::CheckStatus => "job_check_status",
        }
    }
}

impl fmt::Display for JobChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Second drain-script argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashChange {
    Changed,
    Unchanged,
}

impl HashChange {
    pub fn as_str(self) -> &'static str {
        match self {
            HashChange::Changed => "hash_changed",
            HashChange::Unchanged => "hash_unchanged",
        }
    }
}

impl fmt::Display for HashChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters passed to a drain script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainParams {
    pub job_change: JobChange,
    pub hash_change: HashChange,
    /// Names of packages whose spec differs, in name order.
    pub updated_packages: Vec<String>,
}

impl DrainParams {
    /// Classify an update from `current` to `new`.
    ///
    /// A current spec with no job, or a new spec naming a different template, is `job_new`.
    /// A new spec without a job keeps the current template. Otherwise a changed
    /// configuration hash or any updated package is `job_changed`.
    pub fn for_update(current: &ApplySpec, new: &ApplySpec) -> Self {
        let hash_change = if current.config_hash() == new.config_hash() {
            HashChange::Unchanged
        } else {
            HashChange::Changed
        };
        let updated_packages = updated_packages(&current.packages, &new.packages);

        let job_change = match (current.job_template(), new.job_template()) {
            (None, _) => JobChange::New,
            (Some(old), Some(next)) if old != next => JobChange::New,
            _ if hash_change == HashChange::Changed || !updated_packages.is_empty() => {
                JobChange::Changed
            }
            _ => JobChange::Unchanged,
        };

        Self {
            job_change,
            hash_change,
            updated_packages,
        }
    }

    pub fn for_shutdown() -> Self {
        Self {
            job_change: JobChange::Shutdown,
            hash_change: HashChange::Unchanged,
            updated_packages: Vec::new(),
        }
    }

    pub fn for_status() -> Self {
        Self {
            job_change: JobChange::CheckStatus,
            hash_change: HashChange::Unchanged,
            updated_packages: Vec::new(),
        }
    }

    /// Positional arguments for the script: job change, hash change, then package names.
    pub fn script_args(&self) -> Vec<String> {
        let mut args = vec![
            self.job_change.as_str().to_string(),
            self.hash_change.as_str().to_string(),
        ];
        args.extend(self.updated_packages.iter().cloned());
        args
    }
}

/// Packages that are new in `new` or whose spec differs from `current`.
pub fn updated_packages(
    current: &BTreeMap<String, PackageSpec>,
    new: &BTreeMap<String, PackageSpec>,
) -> Vec<String> {
    new.iter()
        .filter(|(name, spec)| current.get(*name) != Some(*spec))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Interpreted drain-script output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainResult {
    /// Draining finished.
    Done,
    /// Poll drain status again after this many seconds.
    RecheckAfter(u64),
}

impl DrainResult {
    /// Interpret a raw script value; negative values violate the script contract.
    pub fn from_script_value(value: i64) -> Result<Self, DrainError> {
        match value {
            0 => Ok(DrainResult::Done),
            n if n > 0 => Ok(DrainResult::RecheckAfter(n as u64)),
            n => Err(DrainError::NegativeResult(n)),
        }
    }

    /// Wire value: `0` when done, otherwise the number of seconds to wait.
    pub fn value(self) -> u64 {
        match self {
            DrainResult::Done => 0,
            DrainResult::RecheckAfter(secs) => secs,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DrainError {
    #[error("Check Status on Drain action requires a valid drain script (template '{0}')")]
    ScriptNotFound(String),
    #[error("Drain script returned a negative value: {0}")]
    NegativeResult(i64),
    #[error("Drain script output is not an integer: '{0}'")]
    InvalidOutput(String),
}

/// Parse a drain script's stdout into its raw numeric value.
pub fn parse_script_value(stdout: &str) -> Result<i64, DrainError> {
    let trimmed = stdout.trim();
    trimmed
        .parse()
        .map_err(|_| DrainError::InvalidOutput(trimmed.to_string()))
}
