use std::fmt::Write;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::{
    cli::args::InspectArgs,
    reading::{ArtifactFormat, ArtifactReader, DatasetReader, GriddedDataset},
    transform::flatten,
};

/// Describes an artifact: its grid, its variables and the columns a load would produce.
pub fn inspect(args: &InspectArgs) -> Result<String> {
    let format = match args.format {
        Some(format) => format,
        None => ArtifactFormat::from_path(&args.artifact).with_context(|| {
            format!(
                "cannot tell the format of {}; pass --format",
                args.artifact.display()
            )
        })?,
    };
    let reader = ArtifactReader::for_format(format)
        .with_context(|| format!("this build cannot read {format:?} artifacts"))?;

    let dataset = reader.read(&args.artifact)?;
    let mut out = describe(&dataset)?;

    let records = flatten(&args.artifact, dataset, Utc::now())?;
    if let Some(first) = records.first() {
        writeln!(out, "Columns: time, latitude, longitude, {}, ingestion_timestamp", first.columns.join(", "))?;
    }
    write!(out, "Rows: {}", records.len())?;

    Ok(out)
}

fn describe(dataset: &GriddedDataset) -> Result<String> {
    let mut out = String::new();

    match (dataset.times.first(), dataset.times.last()) {
        (Some(first), Some(last)) => writeln!(
            out,
            "Time: {} steps from {} to {}",
            dataset.times.len(),
            first.format("%Y-%m-%d %H:%M"),
            last.format("%Y-%m-%d %H:%M")
        )?,
        _ => writeln!(out, "Time: no steps")?,
    }
    writeln!(out, "Latitude: {:?}", dataset.latitudes)?;
    writeln!(out, "Longitude: {:?}", dataset.longitudes)?;

    writeln!(out, "Variables:")?;
    for variable in &dataset.variables {
        let missing = variable.values.iter().filter(|v| v.is_none()).count();
        writeln!(
            out,
            "  {:<40} {} values, {} missing",
            variable.name,
            variable.values.len(),
            missing
        )?;
    }

    Ok(out)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn should_describe_csv_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("era5.csv");
        fs::write(
            &path,
            "valid_time,latitude,longitude,2m Temperature,Surface Pressure\n\
             2023-01-01 00:00:00,13.8,-89.5,290.1,98000\n\
             2023-01-01 01:00:00,13.8,-89.5,,98010\n",
        )
        .unwrap();

        let text = inspect(&InspectArgs {
            artifact: path,
            format: None,
        })
        .unwrap();

        assert!(text.contains("Time: 2 steps from 2023-01-01 00:00 to 2023-01-01 01:00"));
        assert!(text.contains("Latitude: [13.8]"));
        assert!(text.contains("2m_temperature"));
        assert!(text.contains("1 missing"));
        assert!(text.contains(
            "Columns: time, latitude, longitude, 2m_temperature, surface_pressure, ingestion_timestamp"
        ));
        assert!(text.ends_with("Rows: 2"));
    }

    #[test]
    fn should_require_known_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("era5.bin");
        fs::write(&path, "data").unwrap();

        let err = inspect(&InspectArgs {
            artifact: path,
            format: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("--format"));
    }
}
