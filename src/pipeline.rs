//! Drives each planned request through retrieval, transform and load.
//!
//! Chunks run one at a time in plan order. A failing chunk is recorded and the
//! run moves on; only planning errors stop a run, and those happen before here.

use chrono::Utc;
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::{
    db::{self, Store, TableName, WriteMode},
    download::{Provider, RawArtifact, Retriever},
    error::RetrievalError,
    outcome::{ChunkState, LoadOutcome, RunSummary},
    plan::{Chunk, Plan, PlannedRequest},
    reading::DatasetReader,
    transform::Transformer,
};

pub struct Pipeline<P, R, S> {
    retriever: Retriever<P>,
    transformer: Transformer<R>,
    store: S,
    table: TableName,
    mode: WriteMode,
    progress: ProgressBar,
}

impl<P: Provider, R: DatasetReader, S: Store> Pipeline<P, R, S> {
    pub fn new(
        retriever: Retriever<P>,
        transformer: Transformer<R>,
        store: S,
        table: TableName,
        mode: WriteMode,
    ) -> Self {
        Pipeline {
            retriever,
            transformer,
            store,
            table,
            mode,
            progress: ProgressBar::hidden(),
        }
    }

    /// Advances `bar` once per planned request.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn run(&self, plan: &Plan) -> RunSummary {
        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(plan.len());
        // Replace applies to the run as a whole: the first load replaces, the rest append.
        let mut mode = self.mode;

        self.progress.set_length(plan.len() as u64);
        info!(chunks = plan.len(), table = %self.table, mode = %self.mode, "Starting run");

        for request in &plan.requests {
            let primary = request.primary();
            debug!(chunk = %primary.label, state = %ChunkState::Planned, candidates = request.candidates.len(), "Next chunk");
            self.progress
                .set_message(format!("Processing {}", primary.label));

            let outcome = self.process(request, mode).await;
            debug_assert!(outcome.state.is_terminal());
            if outcome.success {
                mode = WriteMode::Append;
            }
            debug!(chunk = %outcome.chunk, state = %outcome.state, "Chunk finished");

            outcomes.push(outcome);
            self.progress.inc(1);
        }

        self.progress.finish_and_clear();

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            rows = summary.records_written(),
            "Run finished"
        );

        summary
    }

    async fn process(&self, request: &PlannedRequest, mode: WriteMode) -> LoadOutcome {
        let table = self.table.to_string();

        let (chunk, artifact) = match self.retrieve_first(request).await {
            Ok(found) => found,
            Err(errors) => {
                let primary = request.primary();
                let mut cause = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                if request.has_fallbacks() {
                    cause = format!("no candidate period available: {cause}");
                }
                return LoadOutcome::failed(
                    &table,
                    mode,
                    &primary.label,
                    primary.window,
                    ChunkState::RetrievalFailed,
                    cause,
                );
            }
        };

        debug!(chunk = %chunk.label, state = %ChunkState::Transforming, "Transforming artifact");
        let mut records = match self.transformer.transform(&artifact) {
            Ok(records) => records,
            Err(e) => {
                warn!(chunk = %chunk.label, error = %e, "Transform failed");
                return LoadOutcome::failed(
                    &table,
                    mode,
                    &chunk.label,
                    chunk.window,
                    ChunkState::TransformFailed,
                    e,
                );
            }
        };

        // Gridded selectors are a year x month x day cross product and can reach past a clipped window.
        let fetched = records.len();
        records.retain(|r| chunk.window.contains(r.time.date_naive()));
        if records.len() < fetched {
            debug!(
                chunk = %chunk.label,
                dropped = fetched - records.len(),
                "Dropped records outside the chunk window"
            );
        }

        if records.is_empty() {
            warn!(chunk = %chunk.label, window = %chunk.window, "Artifact produced no records");
            return LoadOutcome::failed(
                &table,
                mode,
                &chunk.label,
                chunk.window,
                ChunkState::TransformFailed,
                format!("artifact produced no records within {}", chunk.window),
            );
        }

        db::load(&self.store, &records, &self.table, mode, chunk).await
    }

    /// Tries each candidate in order and stops at the first artifact obtained.
    async fn retrieve_first<'a>(
        &self,
        request: &'a PlannedRequest,
    ) -> Result<(&'a Chunk, RawArtifact), Vec<RetrievalError>> {
        let mut errors = Vec::new();

        for (attempt, chunk) in request.candidates.iter().enumerate() {
            debug!(chunk = %chunk.label, state = %ChunkState::Retrieving, attempt, "Retrieving");

            match self.retriever.retrieve(chunk).await {
                Ok(artifact) => {
                    debug!(
                        chunk = %chunk.label,
                        state = %ChunkState::Retrieved,
                        reused = artifact.reused,
                        size = artifact.size,
                        "Artifact ready"
                    );
                    if attempt > 0 {
                        info!(
                            requested = %request.primary().label,
                            used = %chunk.label,
                            "Using fallback period"
                        );
                    }
                    return Ok((chunk, artifact));
                }
                Err(e) => {
                    warn!(chunk = %chunk.label, kind = ?e.kind, error = %e.cause, "Retrieval failed");
                    errors.push(e);
                }
            }
        }

        Err(errors)
    }
}

// -- Tests -------------------------------------------------------------------
