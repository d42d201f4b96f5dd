use anyhow::{Context, Result};
use chrono::NaiveDate;
use indicatif::MultiProgress;
use tracing::{info, warn};

use crate::{
    cds::CdsClient,
    cli::{args::RunArgs, create_progress_bar},
    config::{default_artifact_dir, CdsCredentials, Config},
    db::{Destination, Store, TableName},
    download::Retriever,
    outcome::RunSummary,
    pipeline::Pipeline,
    plan::{self, calendar, Plan},
    reading::ArtifactReader,
    transform::Transformer,
};

/// Plans the run, then drives every chunk through the pipeline.
///
/// Errors returned here are configuration or planning failures; chunk failures
/// are part of the summary.
pub async fn run(args: &RunArgs) -> Result<RunSummary> {
    let (config, plan) = prepare(args, calendar::today(), CdsCredentials::from_home())?;
    info!(
        chunks = plan.len(),
        granularity = %config.request.granularity,
        start = %config.request.start,
        end = %config.request.end,
        "Run planned"
    );

    let reader = ArtifactReader::for_format(config.provider.format).with_context(|| {
        format!(
            "this build cannot read {:?} artifacts; rebuild with `--features netcdf` or pass `--format csv`",
            config.provider.format
        )
    })?;

    let progress = MultiProgress::new();
    let client = CdsClient::new(config.provider.clone(), progress.clone())
        .context("Failed to build the CDS client")?;
    let store = Destination::connect(&config.destination)
        .await
        .context("Failed to open the destination database")?;
    info!(
        destination = %store.describe(),
        artifacts = %config.artifact_dir.display(),
        "Destination ready"
    );

    let bar = progress.add(create_progress_bar(
        plan.len() as u64,
        "Loading chunks".to_string(),
    ));
    let pipeline = Pipeline::new(
        Retriever::new(client, config.artifact_dir.clone()),
        Transformer::new(reader),
        store,
        config.table.clone(),
        config.mode,
    )
    .with_progress(bar);

    let summary = pipeline.run(&plan).await;
    if summary.succeeded() > 0 {
        match pipeline.store().row_count(&config.table).await {
            Ok(rows) => info!(table = %config.table, rows, "Table row count"),
            Err(e) => warn!(table = %config.table, error = %e, "Could not count rows"),
        }
    }

    Ok(summary)
}

/// Validates everything that can be checked without the network.
fn prepare(
    args: &RunArgs,
    today: NaiveDate,
    rc: Option<CdsCredentials>,
) -> Result<(Config, Plan)> {
    let request = args.plan.to_request(today)?;
    let plan = plan::plan(&request).context("Invalid run configuration")?;
    let table = TableName::parse(&args.table)?;

    let config = Config {
        provider: args.provider(rc)?,
        destination: args.destination.destination()?,
        table,
        mode: args.mode,
        artifact_dir: args.artifact_dir.clone().unwrap_or_else(default_artifact_dir),
        request,
    };

    Ok((config, plan))
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::{
        config::DestinationConfig,
        db::WriteMode,
        error::PlanningError,
    };

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    fn args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["era5land", "--cds-key", "test-key", "--sqlite", "era5.sqlite"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).unwrap().run
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 3).unwrap()
    }

    #[test]
    fn should_prepare_monthly_run() {
        let (config, plan) = prepare(
            &args(&["-g", "monthly", "--start", "2024-01-01", "--end", "2024-12-31", "-m", "append"]),
            today(),
            None,
        )
        .unwrap();

        assert_eq!(plan.len(), 12);
        assert_eq!(config.mode, WriteMode::Append);
        assert_eq!(config.table.to_string(), "era5_land_data");
        assert_eq!(config.provider.key, "test-key");
        assert_eq!(
            config.destination,
            DestinationConfig::Sqlite {
                path: "era5.sqlite".into()
            }
        );
    }

    #[test]
    fn should_fail_on_planning_error() {
        let err = prepare(
            &args(&["-g", "yearly", "--fallback-depth", "2"]),
            today(),
            None,
        )
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PlanningError>(),
            Some(PlanningError::FallbackNotSupported { .. })
        ));
    }

    #[test]
    fn should_fail_on_bad_table_name() {
        assert!(prepare(&args(&["--table", "era5; drop"]), today(), None).is_err());
    }
}
