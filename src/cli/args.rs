//! Arguments for each subcommand, with environment fallbacks for credentials.

use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Days, NaiveDate};
use clap::{Args, ValueEnum};

use crate::{
    config::{
        resolve_credentials, CdsCredentials, DestinationConfig, PostgresConfig, ProviderConfig,
        DEFAULT_DB_PORT, DEFAULT_TABLE,
    },
    dataset::{DEFAULT_VARIABLES, ERA5_LAND_TIMESERIES},
    db::{default_sqlite_path, WriteMode},
    plan::{Granularity, PlanRequest, SpatialExtent},
    reading::{default_format, ArtifactFormat},
};

/// What to retrieve and how to split it.
#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// CDS dataset identifier
    #[arg(long, default_value = ERA5_LAND_TIMESERIES)]
    pub dataset: String,

    /// Comma-separated variables; defaults to the 18 standard ERA5-Land variables
    #[arg(long, value_delimiter = ',')]
    pub variables: Vec<String>,

    /// Latitude of the point to retrieve
    #[arg(long, default_value_t = 13.8, allow_hyphen_values = true)]
    pub lat: f64,

    /// Longitude of the point to retrieve
    #[arg(long, default_value_t = -89.5, allow_hyphen_values = true)]
    pub lon: f64,

    /// Bounding box as NORTH,WEST,SOUTH,EAST (gridded datasets only)
    #[arg(
        long,
        value_delimiter = ',',
        allow_hyphen_values = true,
        conflicts_with_all = ["lat", "lon"]
    )]
    pub area: Option<Vec<f64>>,

    /// First day of the range
    #[arg(long, default_value = "2005-01-01")]
    pub start: NaiveDate,

    /// Last day of the range; defaults to yesterday
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// How the range is split into requests
    #[arg(short, long, value_enum, default_value = "yearly")]
    pub granularity: Granularity,

    /// Candidate periods to try, newest first (latest granularities only)
    #[arg(long)]
    pub fallback_depth: Option<u32>,

    /// Artifact format requested from the provider
    #[arg(long, value_enum)]
    pub format: Option<ArtifactFormat>,
}

impl PlanArgs {
    pub fn format(&self) -> ArtifactFormat {
        self.format.unwrap_or_else(default_format)
    }

    pub fn extent(&self) -> Result<SpatialExtent> {
        match self.area.as_deref() {
            None => Ok(SpatialExtent::Point {
                lat: self.lat,
                lon: self.lon,
            }),
            Some(&[north, west, south, east]) => Ok(SpatialExtent::BoundingBox {
                north,
                west,
                south,
                east,
            }),
            Some(other) => bail!("--area takes 4 values, got {}", other.len()),
        }
    }

    pub fn to_request(&self, today: NaiveDate) -> Result<PlanRequest> {
        let variables = if self.variables.is_empty() {
            DEFAULT_VARIABLES.iter().map(|v| v.to_string()).collect()
        } else {
            self.variables.clone()
        };
        let end = match self.end {
            Some(end) => end,
            None => today
                .checked_sub_days(Days::new(1))
                .ok_or_else(|| anyhow!("cannot compute the day before {today}"))?,
        };

        Ok(PlanRequest {
            dataset: self.dataset.clone(),
            variables,
            extent: self.extent()?,
            start: self.start,
            end,
            granularity: self.granularity,
            fallback_depth: self.fallback_depth,
            today,
            extension: self.format().extension().to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TlsMode {
    Require,
    Prefer,
}

/// Where rows are written.
#[derive(Debug, Clone, Args)]
pub struct DestinationArgs {
    /// Write to this SQLite file instead of Postgres
    #[arg(long, value_name = "PATH")]
    pub sqlite: Option<PathBuf>,

    #[arg(long, env = "DB_HOST")]
    pub db_host: Option<String>,

    #[arg(long, env = "DB_PORT", default_value_t = DEFAULT_DB_PORT)]
    pub db_port: u16,

    #[arg(long, env = "DB_USER")]
    pub db_user: Option<String>,

    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,

    #[arg(long, env = "DB_SSL", value_enum, default_value = "require")]
    pub db_ssl: TlsMode,
}

impl DestinationArgs {
    /// Postgres when a host is configured, otherwise a local SQLite file.
    pub fn destination(&self) -> Result<DestinationConfig> {
        if let Some(path) = &self.sqlite {
            return Ok(DestinationConfig::Sqlite { path: path.clone() });
        }

        let Some(host) = &self.db_host else {
            let path = default_sqlite_path().context("no data directory for the default SQLite file")?;
            return Ok(DestinationConfig::Sqlite { path });
        };

        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .with_context(|| format!("{name} is required when DB_HOST is set"))
        };

        Ok(DestinationConfig::Postgres(PostgresConfig {
            user: required(&self.db_user, "DB_USER")?,
            password: required(&self.db_password, "DB_PASSWORD")?,
            host: host.clone(),
            port: self.db_port,
            database: required(&self.db_name, "DB_NAME")?,
            tls_required: self.db_ssl == TlsMode::Require,
        }))
    }
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    #[command(flatten)]
    pub destination: DestinationArgs,

    /// Destination table, optionally schema-qualified
    #[arg(short, long, default_value = DEFAULT_TABLE)]
    pub table: String,

    /// Replace the table with this run's rows, or append to it
    #[arg(short, long, value_enum, default_value = "replace")]
    pub mode: WriteMode,

    /// Directory holding downloaded artifacts; defaults to the user cache directory
    #[arg(long, value_name = "PATH")]
    pub artifact_dir: Option<PathBuf>,

    #[arg(long, env = "CDSAPI_URL")]
    pub cds_url: Option<String>,

    #[arg(long, env = "CDSAPI_KEY", hide_env_values = true)]
    pub cds_key: Option<String>,

    /// Hours requested from gridded datasets
    #[arg(long, value_delimiter = ',', default_value = "00:00")]
    pub hours: Vec<String>,

    /// Seconds between job status checks
    #[arg(long, default_value_t = 5)]
    pub poll_seconds: u64,

    /// Seconds to wait for a job before giving up on the chunk
    #[arg(long, default_value_t = 3 * 60 * 60)]
    pub timeout_seconds: u64,
}

impl RunArgs {
    pub fn provider(&self, rc: Option<CdsCredentials>) -> Result<ProviderConfig> {
        let (url, key) = resolve_credentials(self.cds_url.clone(), self.cds_key.clone(), rc)
            .context("no CDS API key: set CDSAPI_KEY or add a key line to ~/.cdsapirc")?;

        Ok(ProviderConfig {
            url,
            key,
            dataset: self.plan.dataset.clone(),
            hours: self.hours.clone(),
            format: self.plan.format(),
            poll_interval: Duration::from_secs(self.poll_seconds.max(1)),
            timeout: Duration::from_secs(self.timeout_seconds),
        })
    }
}

#[derive(Debug, Clone, Args)]
pub struct InspectArgs {
    /// Path to a downloaded artifact
    pub artifact: PathBuf,

    /// Format of the artifact; guessed from the extension when omitted
    #[arg(long, value_enum)]
    pub format: Option<ArtifactFormat>,
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    fn parse(args: &[&str]) -> RunArgs {
        let mut argv = vec!["era5land"];
        argv.extend_from_slice(args);
        Harness::try_parse_from(argv).unwrap().run
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn should_default_to_the_standard_load() {
        let args = parse(&["--sqlite", "era5.sqlite"]);
        let request = args.plan.to_request(date("2025-10-03")).unwrap();

        assert_eq!(request.dataset, ERA5_LAND_TIMESERIES);
        assert_eq!(request.variables.len(), 18);
        assert_eq!(request.extent, SpatialExtent::Point { lat: 13.8, lon: -89.5 });
        assert_eq!(request.start, date("2005-01-01"));
        assert_eq!(request.end, date("2025-10-02"));
        assert_eq!(request.granularity, Granularity::Yearly);
        assert_eq!(args.table, DEFAULT_TABLE);
        assert_eq!(args.mode, WriteMode::Replace);
        assert_eq!(args.hours, vec!["00:00"]);
    }

    #[test]
    fn should_parse_bounding_box() {
        let args = parse(&[
            "--sqlite",
            "x.sqlite",
            "--dataset",
            "reanalysis-era5-land",
            "--area",
            "14.5,-90.2,13.1,-87.6",
        ]);

        assert_eq!(
            args.plan.extent().unwrap(),
            SpatialExtent::BoundingBox {
                north: 14.5,
                west: -90.2,
                south: 13.1,
                east: -87.6
            }
        );
    }

    #[test]
    fn should_reject_incomplete_bounding_box() {
        let args = parse(&["--dataset", "reanalysis-era5-land", "--area", "14.5,-90.2,13.1"]);

        let err = args.plan.extent().unwrap_err();
        assert!(err.to_string().contains("4 values, got 3"));
    }

    #[test]
    fn should_parse_latest_day_with_fallback() {
        let args = parse(&[
            "--sqlite",
            "x.sqlite",
            "-g",
            "latest-day",
            "--fallback-depth",
            "3",
            "--variables",
            "2m_temperature,surface_pressure",
        ]);
        let request = args.plan.to_request(date("2025-10-03")).unwrap();

        assert_eq!(request.granularity, Granularity::LatestDay);
        assert_eq!(request.fallback_depth, Some(3));
        assert_eq!(request.variables, vec!["2m_temperature", "surface_pressure"]);
    }

    #[test]
    fn should_choose_sqlite_destination() {
        let args = parse(&["--sqlite", "/tmp/era5.sqlite"]);
        assert_eq!(
            args.destination.destination().unwrap(),
            DestinationConfig::Sqlite {
                path: PathBuf::from("/tmp/era5.sqlite")
            }
        );
    }

    #[test]
    fn should_require_credentials_for_postgres() {
        let mut destination = parse(&["--sqlite", "x.sqlite"]).destination;
        destination.sqlite = None;
        destination.db_host = Some("db.example.supabase.co".to_string());
        destination.db_user = Some("postgres".to_string());
        destination.db_password = None;
        destination.db_name = Some("postgres".to_string());

        let err = destination.destination().unwrap_err();
        assert!(err.to_string().contains("DB_PASSWORD"));

        destination.db_password = Some("secret".to_string());
        destination.db_port = 6543;
        destination.db_ssl = TlsMode::Require;
        let DestinationConfig::Postgres(pg) = destination.destination().unwrap() else {
            panic!("expected postgres");
        };
        assert_eq!(pg.host, "db.example.supabase.co");
        assert_eq!(pg.port, 6543);
        assert!(pg.tls_required);
    }

    #[test]
    fn should_resolve_provider_from_rc_file() {
        let mut args = parse(&["--sqlite", "x.sqlite", "--poll-seconds", "0"]);
        args.cds_url = None;
        args.cds_key = None;
        let rc = CdsCredentials {
            url: None,
            key: Some("rc-key".to_string()),
        };

        let provider = args.provider(Some(rc)).unwrap();
        assert_eq!(provider.key, "rc-key");
        assert_eq!(provider.poll_interval, Duration::from_secs(1));
        assert!(args.provider(None).is_err());
    }
}
