//! Run configuration, built once from the command line and environment.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{db::TableName, db::WriteMode, plan::PlanRequest, reading::ArtifactFormat};

pub const DEFAULT_CDS_URL: &str = "https://cds.climate.copernicus.eu/api";
pub const DEFAULT_TABLE: &str = "era5_land_data";
pub const DEFAULT_DB_PORT: u16 = 6543;

/// Everything the CDS provider needs to submit and fetch a job.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub url: String,
    pub key: String,
    pub dataset: String,
    /// Hours of the day requested from gridded products.
    pub hours: Vec<String>,
    pub format: ArtifactFormat,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub tls_required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationConfig {
    Sqlite { path: PathBuf },
    Postgres(PostgresConfig),
}

/// A fully resolved run.
#[derive(Debug, Clone)]
pub struct Config {
    pub request: PlanRequest,
    pub provider: ProviderConfig,
    pub destination: DestinationConfig,
    pub table: TableName,
    pub mode: WriteMode,
    pub artifact_dir: PathBuf,
}

/// Credentials as found in a `.cdsapirc` file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CdsCredentials {
    pub url: Option<String>,
    pub key: Option<String>,
}

impl CdsCredentials {
    /// Parses `url: ...` and `key: ...` lines; anything else is ignored.
    pub fn parse(text: &str) -> Self {
        let mut credentials = CdsCredentials::default();

        for line in text.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match name.trim() {
                "url" => credentials.url = Some(value.to_string()),
                "key" => credentials.key = Some(value.to_string()),
                _ => {}
            }
        }

        credentials
    }

    pub fn from_file(path: &Path) -> Option<Self> {
        fs::read_to_string(path).ok().map(|text| Self::parse(&text))
    }

    /// Reads `~/.cdsapirc`, if there is one.
    pub fn from_home() -> Option<Self> {
        dirs::home_dir().and_then(|home| Self::from_file(&home.join(".cdsapirc")))
    }
}

/// Fills missing flags from the rc file, then from the public endpoint.
pub fn resolve_credentials(
    url: Option<String>,
    key: Option<String>,
    rc: Option<CdsCredentials>,
) -> Option<(String, String)> {
    let rc = rc.unwrap_or_default();
    let key = key.or(rc.key)?;
    let url = url
        .or(rc.url)
        .unwrap_or_else(|| DEFAULT_CDS_URL.to_string());

    Some((url, key))
}

pub fn default_artifact_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("era5land")
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn should_parse_cdsapirc() {
        let credentials = CdsCredentials::parse(
            "url: https://cds.climate.copernicus.eu/api\nkey: 1234-abcd\n# comment\nverify: 0\n",
        );

        assert_eq!(
            credentials.url.as_deref(),
            Some("https://cds.climate.copernicus.eu/api")
        );
        assert_eq!(credentials.key.as_deref(), Some("1234-abcd"));
    }

    #[test]
    fn should_keep_colons_in_values() {
        let credentials = CdsCredentials::parse("key: 12345:abcdef\nurl:\n");
        assert_eq!(credentials.key.as_deref(), Some("12345:abcdef"));
        assert_eq!(credentials.url, None);
    }

    #[test]
    fn should_read_rc_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".cdsapirc");
        fs::write(&path, "key: from-file\n").unwrap();

        let credentials = CdsCredentials::from_file(&path).unwrap();
        assert_eq!(credentials.key.as_deref(), Some("from-file"));
        assert!(CdsCredentials::from_file(&dir.path().join("missing")).is_none());
    }

    #[test]
    fn should_prefer_flags_over_rc_file() {
        let rc = CdsCredentials {
            url: Some("https://rc.example/api".to_string()),
            key: Some("rc-key".to_string()),
        };

        let (url, key) = resolve_credentials(None, Some("flag-key".to_string()), Some(rc.clone()))
            .unwrap();
        assert_eq!(url, "https://rc.example/api");
        assert_eq!(key, "flag-key");

        let (url, key) = resolve_credentials(None, None, Some(rc)).unwrap();
        assert_eq!((url.as_str(), key.as_str()), ("https://rc.example/api", "rc-key"));
    }

    #[test]
    fn should_default_url_and_require_key() {
        let (url, _) = resolve_credentials(None, Some("k".to_string()), None).unwrap();
        assert_eq!(url, DEFAULT_CDS_URL);
        assert!(resolve_credentials(Some(DEFAULT_CDS_URL.to_string()), None, None).is_none());
    }
}
