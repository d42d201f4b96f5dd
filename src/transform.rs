//! Flattens a gridded artifact into tabular records.

use std::{collections::HashSet, path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    download::RawArtifact,
    error::TransformError,
    reading::{DatasetReader, GriddedDataset},
};

/// Columns every record carries in addition to its variables.
pub const TIME_COLUMN: &str = "time";
pub const LATITUDE_COLUMN: &str = "latitude";
pub const LONGITUDE_COLUMN: &str = "longitude";
pub const INGESTION_COLUMN: &str = "ingestion_timestamp";

/// Lowercase, trim, and join internal whitespace with underscores.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// One grid cell at one time step.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularRecord {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Variable names, shared by every record of an artifact.
    pub columns: Arc<[String]>,
    pub values: Vec<Option<f64>>,
    pub ingestion_timestamp: DateTime<Utc>,
}

impl TabularRecord {
    pub fn value(&self, column: &str) -> Option<f64> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values[idx]
    }
}

pub struct Transformer<R> {
    reader: R,
}

impl<R: DatasetReader> Transformer<R> {
    pub fn new(reader: R) -> Self {
        Transformer { reader }
    }

    pub fn transform(&self, artifact: &RawArtifact) -> Result<Vec<TabularRecord>, TransformError> {
        let dataset = self.reader.read(&artifact.path)?;
        let records = flatten(&artifact.path, dataset, Utc::now())?;

        debug!(
            artifact = %artifact.path.display(),
            records = records.len(),
            "Transformed artifact"
        );

        Ok(records)
    }
}

/// Emits the full time × latitude × longitude cross product, stamped with `ingested_at`.
pub fn flatten(
    path: &Path,
    dataset: GriddedDataset,
    ingested_at: DateTime<Utc>,
) -> Result<Vec<TabularRecord>, TransformError> {
    let corrupt = |reason: &str| TransformError::EmptyOrCorrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let mismatch = |reason: String| TransformError::SchemaMismatch {
        path: path.to_path_buf(),
        reason,
    };

    if dataset.variables.is_empty() {
        return Err(corrupt("no variables declared"));
    }
    let cells = dataset.cell_count();
    if cells == 0 {
        return Err(corrupt("dataset has no rows"));
    }

    let reserved = [TIME_COLUMN, LATITUDE_COLUMN, LONGITUDE_COLUMN, INGESTION_COLUMN];
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(dataset.variables.len());
    for variable in &dataset.variables {
        let name = normalize_name(&variable.name);
        if name.is_empty() {
            return Err(mismatch("variable with an empty name".to_string()));
        }
        if reserved.contains(&name.as_str()) {
            return Err(mismatch(format!("variable `{name}` collides with a reserved column")));
        }
        if !seen.insert(name.clone()) {
            return Err(mismatch(format!("variable `{name}` appears twice")));
        }
        if variable.values.len() != cells {
            return Err(mismatch(format!(
                "variable `{name}` has {} values for {cells} cells",
                variable.values.len()
            )));
        }
        columns.push(name);
    }
    let columns: Arc<[String]> = columns.into();

    let mut records = Vec::with_capacity(cells);
    for (t, time) in dataset.times.iter().enumerate() {
        for (i, latitude) in dataset.latitudes.iter().enumerate() {
            for (j, longitude) in dataset.longitudes.iter().enumerate() {
                let idx = dataset.index(t, i, j);
                records.push(TabularRecord {
                    time: *time,
                    latitude: *latitude,
                    longitude: *longitude,
                    columns: Arc::clone(&columns),
                    values: dataset.variables.iter().map(|v| v.values[idx]).collect(),
                    ingestion_timestamp: ingested_at,
                });
            }
        }
    }

    Ok(records)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;
    use crate::reading::{CsvReader, GridVariable};

    fn path() -> PathBuf {
        PathBuf::from("chunk.nc")
    }

    fn grid(variables: Vec<GridVariable>) -> GriddedDataset {
        GriddedDataset {
            times: vec![
                Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap(),
            ],
            latitudes: vec![13.9, 13.8],
            longitudes: vec![-89.5],
            variables,
        }
    }

    fn variable(name: &str, values: Vec<Option<f64>>) -> GridVariable {
        GridVariable {
            name: name.to_string(),
            values,
        }
    }

    #[test]
    fn should_normalize_names() {
        assert_eq!(normalize_name("Surface Pressure "), "surface_pressure");
        assert_eq!(normalize_name("surface_pressure"), "surface_pressure");
        assert_eq!(normalize_name("  2m   Temperature\t"), "2m_temperature");
        assert_eq!(normalize_name("T2M"), "t2m");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn should_emit_full_cross_product_with_nulls() {
        let ds = grid(vec![
            variable("T2M", vec![Some(1.0), None, Some(3.0), Some(4.0)]),
            variable("Surface Pressure", vec![None, None, None, Some(8.0)]),
        ]);
        let stamp = Utc.with_ymd_and_hms(2025, 10, 3, 12, 0, 0).unwrap();
        let records = flatten(&path(), ds, stamp).unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(&*records[0].columns, &["t2m".to_string(), "surface_pressure".to_string()]);
        assert_eq!(records[1].latitude, 13.8);
        assert_eq!(records[1].value("t2m"), None);
        assert_eq!(records[2].time, Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(records[2].value("t2m"), Some(3.0));
        assert_eq!(records[3].value("surface_pressure"), Some(8.0));
        assert!(records.iter().all(|r| r.ingestion_timestamp == stamp));
    }

    #[test]
    fn should_fail_on_empty_dataset() {
        let mut ds = grid(vec![variable("t2m", vec![])]);
        ds.times.clear();
        let err = flatten(&path(), ds, Utc::now()).unwrap_err();
        assert!(matches!(err, TransformError::EmptyOrCorrupt { .. }));

        let err = flatten(&path(), grid(vec![]), Utc::now()).unwrap_err();
        assert!(matches!(err, TransformError::EmptyOrCorrupt { .. }));
    }

    #[test]
    fn should_fail_on_schema_mismatch() {
        let short = grid(vec![variable("t2m", vec![Some(1.0)])]);
        assert!(matches!(
            flatten(&path(), short, Utc::now()),
            Err(TransformError::SchemaMismatch { .. })
        ));

        let cells = vec![None; 4];
        let clash = grid(vec![
            variable("Surface Pressure", cells.clone()),
            variable("surface_pressure", cells.clone()),
        ]);
        assert!(matches!(
            flatten(&path(), clash, Utc::now()),
            Err(TransformError::SchemaMismatch { .. })
        ));

        let reserved = grid(vec![variable("Latitude", cells)]);
        assert!(matches!(
            flatten(&path(), reserved, Utc::now()),
            Err(TransformError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn should_transform_artifact_and_stamp_at_transform_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chunk.csv");
        fs::write(
            &path,
            "valid_time,latitude,longitude,t2m\n2023-01-01,13.8,-89.5,295.0\n",
        )
        .unwrap();
        let artifact = RawArtifact {
            chunk: "2023-01-01".to_string(),
            path,
            size: 60,
            reused: false,
        };

        let before = Utc::now();
        let records = Transformer::new(CsvReader).transform(&artifact).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value("t2m"), Some(295.0));
        assert!(records[0].ingestion_timestamp >= before);
    }
}
