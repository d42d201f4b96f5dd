//! Readers that turn a downloaded artifact into an in-memory grid.

mod csv;
#[cfg(feature = "netcdf")]
mod netcdf;
pub mod time;

use std::path::Path;

use chrono::{DateTime, Utc};

pub use self::csv::CsvReader;
#[cfg(feature = "netcdf")]
pub use self::netcdf::NetcdfReader;
use crate::error::TransformError;

pub const TIME_NAMES: [&str; 3] = ["valid_time", "time", "date"];
pub const LATITUDE_NAMES: [&str; 2] = ["latitude", "lat"];
pub const LONGITUDE_NAMES: [&str; 2] = ["longitude", "lon"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ArtifactFormat {
    Netcdf,
    Csv,
}

impl ArtifactFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Netcdf => "nc",
            ArtifactFormat::Csv => "csv",
        }
    }

    /// Name of the format in a CDS request.
    pub fn cds_name(&self) -> &'static str {
        match self {
            ArtifactFormat::Netcdf => "netcdf",
            ArtifactFormat::Csv => "csv",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "nc" | "nc4" | "netcdf" => Some(ArtifactFormat::Netcdf),
            "csv" => Some(ArtifactFormat::Csv),
            _ => None,
        }
    }
}

/// A variable laid out time-major over the dataset grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridVariable {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Coordinates plus variables indexed `[time][latitude][longitude]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GriddedDataset {
    pub times: Vec<DateTime<Utc>>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub variables: Vec<GridVariable>,
}

impl GriddedDataset {
    pub fn cell_count(&self) -> usize {
        self.times.len() * self.latitudes.len() * self.longitudes.len()
    }

    pub fn index(&self, t: usize, lat: usize, lon: usize) -> usize {
        (t * self.latitudes.len() + lat) * self.longitudes.len() + lon
    }
}

pub trait DatasetReader {
    fn read(&self, path: &Path) -> Result<GriddedDataset, TransformError>;
}

/// The reader for the configured artifact format.
#[derive(Debug, Clone)]
pub enum ArtifactReader {
    Csv(CsvReader),
    #[cfg(feature = "netcdf")]
    Netcdf(NetcdfReader),
}

impl ArtifactReader {
    /// Returns `None` when the binary was built without support for `format`.
    pub fn for_format(format: ArtifactFormat) -> Option<Self> {
        match format {
            ArtifactFormat::Csv => Some(ArtifactReader::Csv(CsvReader)),
            #[cfg(feature = "netcdf")]
            ArtifactFormat::Netcdf => Some(ArtifactReader::Netcdf(NetcdfReader)),
            #[cfg(not(feature = "netcdf"))]
            ArtifactFormat::Netcdf => None,
        }
    }
}

impl DatasetReader for ArtifactReader {
    fn read(&self, path: &Path) -> Result<GriddedDataset, TransformError> {
        match self {
            ArtifactReader::Csv(reader) => reader.read(path),
            #[cfg(feature = "netcdf")]
            ArtifactReader::Netcdf(reader) => reader.read(path),
        }
    }
}

/// The default artifact format for this build.
pub fn default_format() -> ArtifactFormat {
    if cfg!(feature = "netcdf") {
        ArtifactFormat::Netcdf
    } else {
        ArtifactFormat::Csv
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn should_detect_format_from_extension() {
        assert_eq!(
            ArtifactFormat::from_path(&PathBuf::from("a/b.nc")),
            Some(ArtifactFormat::Netcdf)
        );
        assert_eq!(
            ArtifactFormat::from_path(&PathBuf::from("b.csv")),
            Some(ArtifactFormat::Csv)
        );
        assert_eq!(ArtifactFormat::from_path(&PathBuf::from("b.zip")), None);
    }

    #[test]
    fn should_index_time_major() {
        let ds = GriddedDataset {
            times: vec![Utc::now(); 2],
            latitudes: vec![14.0, 13.9, 13.8],
            longitudes: vec![-89.6, -89.5],
            variables: vec![],
        };

        assert_eq!(ds.cell_count(), 12);
        assert_eq!(ds.index(0, 0, 1), 1);
        assert_eq!(ds.index(0, 2, 1), 5);
        assert_eq!(ds.index(1, 0, 0), 6);
    }

    #[test]
    fn should_always_read_csv() {
        assert!(ArtifactReader::for_format(ArtifactFormat::Csv).is_some());
    }
}
