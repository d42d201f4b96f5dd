//! Per-chunk outcomes and the run summary built from them.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::{db::WriteMode, plan::DateRange};

/// Where a chunk is in the pipeline. The three failure states are terminal for the chunk only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Planned,
    Retrieving,
    Retrieved,
    RetrievalFailed,
    Transforming,
    Loaded,
    TransformFailed,
    LoadFailed,
}

impl ChunkState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChunkState::Loaded
                | ChunkState::RetrievalFailed
                | ChunkState::TransformFailed
                | ChunkState::LoadFailed
        )
    }
}

impl fmt::Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChunkState::Planned => "PLANNED",
            ChunkState::Retrieving => "RETRIEVING",
            ChunkState::Retrieved => "RETRIEVED",
            ChunkState::RetrievalFailed => "RETRIEVAL_FAILED",
            ChunkState::Transforming => "TRANSFORMING",
            ChunkState::Loaded => "LOADED",
            ChunkState::TransformFailed => "TRANSFORM_FAILED",
            ChunkState::LoadFailed => "LOAD_FAILED",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub table: String,
    pub mode: WriteMode,
    /// Label of the chunk actually used, which may be a fallback.
    pub chunk: String,
    pub window: DateRange,
    pub state: ChunkState,
    pub records: u64,
    pub success: bool,
    pub error: Option<String>,
}

impl LoadOutcome {
    pub fn loaded(table: &str, mode: WriteMode, chunk: &str, window: DateRange, records: u64) -> Self {
        LoadOutcome {
            table: table.to_string(),
            mode,
            chunk: chunk.to_string(),
            window,
            state: ChunkState::Loaded,
            records,
            success: true,
            error: None,
        }
    }

    pub fn failed(
        table: &str,
        mode: WriteMode,
        chunk: &str,
        window: DateRange,
        state: ChunkState,
        error: impl fmt::Display,
    ) -> Self {
        LoadOutcome {
            table: table.to_string(),
            mode,
            chunk: chunk.to_string(),
            window,
            state,
            records: 0,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Outcomes in planner order.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<LoadOutcome>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn records_written(&self) -> u64 {
        self.outcomes.iter().map(|o| o.records).sum()
    }

    /// Windows that need a manual retry.
    pub fn failed_windows(&self) -> Vec<DateRange> {
        self.outcomes
            .iter()
            .filter(|o| !o.success)
            .map(|o| o.window)
            .collect()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for o in &self.outcomes {
            write!(
                f,
                "{:<24} {:<17} {:>10} rows  {}",
                o.chunk, o.state, o.records, o.window
            )?;
            if let Some(error) = &o.error {
                write!(f, "  {error}")?;
            }
            writeln!(f)?;
        }
        write!(
            f,
            "{} of {} chunks loaded, {} rows written in {}s",
            self.succeeded(),
            self.outcomes.len(),
            self.records_written(),
            (self.finished_at - self.started_at).num_seconds()
        )
    }
}

// -- Tests -------------------------------------------------------------------
