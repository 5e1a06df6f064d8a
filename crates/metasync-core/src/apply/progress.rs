//! Operator-visible progress trail.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Pipeline stage a progress entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Read,
    Analyze,
    Apply,
    Reload,
    Copy,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Read => "read",
            Stage::Analyze => "analyze",
            Stage::Apply => "apply",
            Stage::Reload => "reload",
            Stage::Copy => "copy",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEntry {
    pub stage: Stage,
    pub message: String,
    pub warning: bool,
    pub at: DateTime<Utc>,
}

impl fmt::Display for ProgressEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.warning { "warning: " } else { "" };
        write!(f, "[{}] {}{}", self.stage, marker, self.message)
    }
}

/// Ordered progress entries. Every entry is also emitted as a tracing event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressLog {
    entries: Vec<ProgressEntry>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        info!(stage = %stage, "{message}");
        self.push(stage, message, false);
    }

    pub fn warn(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        warn!(stage = %stage, "{message}");
        self.push(stage, message, true);
    }

    fn push(&mut self, stage: Stage, message: String, warning: bool) {
        self.entries.push(ProgressEntry {
            stage,
            message,
            warning,
            at: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[ProgressEntry] {
        &self.entries
    }

    /// Entries flagged as warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &ProgressEntry> {
        self.entries.iter().filter(|e| e.warning)
    }

    /// The trail as display lines.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }
}
