//! Client for the Copernicus Climate Data Store retrieve API.
//!
//! A retrieval is a job: submit the request, poll until the job settles, then
//! download the result asset.

use std::{path::Path, time::Duration};

use indicatif::{MultiProgress, ProgressBar};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::{
    cli::create_spinner,
    config::ProviderConfig,
    dataset::build_inputs,
    download::{download_with_progress, Provider},
    error::{ProviderError, RetrievalFailure},
    plan::Chunk,
};

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

#[derive(Debug, Clone, Deserialize)]
struct JobStatus {
    #[serde(rename = "jobID")]
    job_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct JobResults {
    asset: Asset,
}

#[derive(Debug, Deserialize)]
struct Asset {
    value: AssetValue,
}

#[derive(Debug, Deserialize)]
struct AssetValue {
    href: String,
    #[serde(rename = "file:size")]
    size: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiProblem {
    title: Option<String>,
    detail: Option<String>,
    #[serde(default)]
    traceback: Option<String>,
}

impl ApiProblem {
    fn message(&self) -> String {
        [&self.title, &self.detail]
            .into_iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join(": ")
    }
}

pub struct CdsClient {
    http: reqwest::Client,
    config: ProviderConfig,
    progress: MultiProgress,
}

impl CdsClient {
    pub fn new(config: ProviderConfig, progress: MultiProgress) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("era5land/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(CdsClient {
            http,
            config,
            progress,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/retrieve/v1/{}", self.config.url.trim_end_matches('/'), path)
    }

    async fn submit(&self, chunk: &Chunk) -> Result<JobStatus, ProviderError> {
        let inputs = build_inputs(
            &self.config.dataset,
            chunk,
            &self.config.hours,
            self.config.format,
        );
        debug!(chunk = %chunk.label, %inputs, "Submitting request");

        let response = self
            .http
            .post(self.endpoint(&format!("processes/{}/execution", self.config.dataset)))
            .header(TOKEN_HEADER, &self.config.key)
            .json(&json!({ "inputs": inputs }))
            .send()
            .await?;

        parse_json(response).await
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus, ProviderError> {
        let response = self
            .http
            .get(self.endpoint(&format!("jobs/{job_id}")))
            .header(TOKEN_HEADER, &self.config.key)
            .send()
            .await?;

        parse_json(response).await
    }

    async fn results(&self, job_id: &str) -> Result<JobResults, ProviderError> {
        let response = self
            .http
            .get(self.endpoint(&format!("jobs/{job_id}/results")))
            .header(TOKEN_HEADER, &self.config.key)
            .send()
            .await?;

        parse_json(response).await
    }

    /// Polls until the job settles or the configured timeout passes.
    async fn wait(&self, job: &JobStatus, label: &str) -> Result<(), ProviderError> {
        let started = Instant::now();
        let mut status = job.status.clone();

        loop {
            match job_step(&job.job_id, &status, started.elapsed(), self.config.timeout) {
                JobStep::Done => return Ok(()),
                JobStep::Failed => {
                    // the results endpoint carries the failure detail
                    return Err(match self.results(&job.job_id).await {
                        Err(e) => e,
                        Ok(_) => ProviderError::new(RetrievalFailure::Rejected, "job failed"),
                    });
                }
                JobStep::Stop(e) => return Err(e),
                JobStep::Poll => {}
            }

            debug!(chunk = label, job = %job.job_id, %status, "Waiting for job");
            sleep(self.config.poll_interval).await;
            status = self.status(&job.job_id).await?.status;
        }
    }

    async fn download(
        &self,
        chunk: &Chunk,
        target: &Path,
        bar: &ProgressBar,
    ) -> Result<(), ProviderError> {
        let job = self.submit(chunk).await?;
        info!(chunk = %chunk.label, job = %job.job_id, "Job accepted");
        self.wait(&job, &chunk.label).await?;

        let results = self.results(&job.job_id).await?;
        bar.set_message(format!("Downloading {}", chunk.label));
        let size = download_with_progress(&self.http, &results.asset.value.href, target, bar).await?;

        match results.asset.value.size {
            Some(expected) if expected != size => Err(ProviderError::transport(format!(
                "downloaded {size} bytes, expected {expected}"
            ))),
            _ => Ok(()),
        }
    }
}

impl Provider for CdsClient {
    async fn fetch(&self, chunk: &Chunk, target: &Path) -> Result<(), ProviderError> {
        let bar = self
            .progress
            .add(create_spinner(format!("Waiting for {}...", chunk.label)));

        let result = self.download(chunk, target, &bar).await;

        bar.finish_and_clear();
        self.progress.remove(&bar);
        result
    }
}

/// What to do after observing a job status.
#[derive(Debug, PartialEq)]
enum JobStep {
    Done,
    /// Failed upstream; the results document explains why.
    Failed,
    Stop(ProviderError),
    Poll,
}

fn job_step(job_id: &str, status: &str, elapsed: Duration, timeout: Duration) -> JobStep {
    match status {
        "successful" => JobStep::Done,
        "failed" => JobStep::Failed,
        "rejected" | "dismissed" | "deleted" => JobStep::Stop(ProviderError::new(
            RetrievalFailure::Rejected,
            format!("job {job_id} was {status}"),
        )),
        _ if elapsed > timeout => JobStep::Stop(ProviderError::transport(format!(
            "job {job_id} still {status} after {}s",
            timeout.as_secs()
        ))),
        _ => JobStep::Poll,
    }
}

/// Decodes a success body, or classifies the API problem document.
async fn parse_json<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::transport(format!("unreadable response: {e}")));
    }

    let body = response.text().await.unwrap_or_default();
    let problem: ApiProblem = serde_json::from_str(&body).unwrap_or_default();
    if let Some(traceback) = &problem.traceback {
        debug!(%traceback, "Provider traceback");
    }
    let message = match problem.message() {
        m if m.is_empty() => format!("{status}: {body}"),
        m => format!("{status}: {m}"),
    };

    Err(ProviderError::new(classify(status, &message), message))
}

fn classify(status: StatusCode, message: &str) -> RetrievalFailure {
    let lower = message.to_lowercase();
    if lower.contains("no data") || lower.contains("not available") || lower.contains("none of the data") {
        RetrievalFailure::NoData
    } else if status.is_server_error() {
        RetrievalFailure::Transport
    } else {
        RetrievalFailure::Rejected
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_classify_provider_problems() {
        assert_eq!(
            classify(StatusCode::BAD_REQUEST, "400: No data available for 2025-10-02"),
            RetrievalFailure::NoData
        );
        assert_eq!(
            classify(StatusCode::TOO_MANY_REQUESTS, "429: quota exceeded"),
            RetrievalFailure::Rejected
        );
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, "401: invalid token"),
            RetrievalFailure::Rejected
        );
        assert_eq!(
            classify(StatusCode::BAD_GATEWAY, "502: upstream"),
            RetrievalFailure::Transport
        );
    }

    #[test]
    fn should_settle_finished_jobs() {
        let timeout = Duration::from_secs(60);

        assert_eq!(job_step("j1", "successful", Duration::ZERO, timeout), JobStep::Done);
        assert_eq!(job_step("j1", "failed", Duration::ZERO, timeout), JobStep::Failed);
        for status in ["rejected", "dismissed", "deleted"] {
            assert_eq!(
                job_step("j1", status, Duration::ZERO, timeout),
                JobStep::Stop(ProviderError::new(
                    RetrievalFailure::Rejected,
                    format!("job j1 was {status}")
                ))
            );
        }
    }

    #[test]
    fn should_keep_polling_until_timeout() {
        let timeout = Duration::from_secs(60);

        assert_eq!(job_step("j1", "accepted", Duration::from_secs(5), timeout), JobStep::Poll);
        assert_eq!(job_step("j1", "running", timeout, timeout), JobStep::Poll);

        match job_step("j1", "running", Duration::from_secs(61), timeout) {
            JobStep::Stop(e) => {
                assert_eq!(e.kind, RetrievalFailure::Transport);
                assert_eq!(e.message, "job j1 still running after 60s");
            }
            other => panic!("expected timeout, got {other:?}"),
        }

        // a job that settles late is still honoured
        assert_eq!(job_step("j1", "successful", Duration::from_secs(61), timeout), JobStep::Done);
    }

    #[test]
    fn should_decode_job_documents() {
        let job: JobStatus =
            serde_json::from_str(r#"{"jobID": "abc-123", "status": "accepted", "type": "process"}"#)
                .unwrap();
        assert_eq!(job.job_id, "abc-123");
        assert_eq!(job.status, "accepted");

        let results: JobResults = serde_json::from_str(
            r#"{"asset": {"value": {"type": "application/netcdf", "href": "https://host/x.nc", "file:size": 4242}}}"#,
        )
        .unwrap();
        assert_eq!(results.asset.value.href, "https://host/x.nc");
        assert_eq!(results.asset.value.size, Some(4242));
    }

    #[test]
    fn should_join_problem_message() {
        let problem: ApiProblem =
            serde_json::from_str(r#"{"title": "invalid request", "detail": "unknown variable"}"#)
                .unwrap();
        assert_eq!(problem.message(), "invalid request: unknown variable");
        assert_eq!(ApiProblem::default().message(), "");
    }
}
