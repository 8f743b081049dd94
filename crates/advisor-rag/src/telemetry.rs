//! Profile snapshot sink — append-only telemetry, not authoritative storage.
//!
//! The orchestrator writes a snapshot every few turns or when a program
//! suggestion is first made; nothing ever reads these back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use uuid::Uuid;

use crate::types::{Program, UserProfile};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub profile: UserProfile,
    pub mentioned_programs: Vec<Program>,
    pub suggested_program: Option<Program>,
    pub handover_requested: bool,
    pub user_turns: u32,
}

pub trait ProfileSink: Send + Sync {
    fn record(&self, snapshot: &ProfileSnapshot) -> anyhow::Result<()>;
}

/// Append-only JSONL file sink.
pub struct JsonlProfileSink {
    path: PathBuf,
}

impl JsonlProfileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ProfileSink for JsonlProfileSink {
    fn record(&self, snapshot: &ProfileSnapshot) -> anyhow::Result<()> {
        let line = serde_json::to_string(snapshot)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// Discards snapshots; used when profile logging is disabled.
pub struct NoopProfileSink;

impl ProfileSink for NoopProfileSink {
    fn record(&self, _snapshot: &ProfileSnapshot) -> anyhow::Result<()> {
        Ok(())
    }
}
