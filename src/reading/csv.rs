//! Long-format CSV artifacts: one row per (time, latitude, longitude) cell.
//!
//! The header names the dimension columns (`valid_time`/`time`/`date`,
//! `latitude`/`lat`, `longitude`/`lon`, in any order and case); every other
//! column is a variable. Empty and `NaN` fields are missing values.

use std::{collections::HashMap, path::Path};

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use super::{
    time::parse_timestamp, DatasetReader, GridVariable, GriddedDataset, LATITUDE_NAMES,
    LONGITUDE_NAMES, TIME_NAMES,
};
use crate::{error::TransformError, transform::normalize_name};

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReader;

impl DatasetReader for CsvReader {
    fn read(&self, path: &Path) -> Result<GriddedDataset, TransformError> {
        let corrupt = |reason: String| TransformError::EmptyOrCorrupt {
            path: path.to_path_buf(),
            reason,
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .comment(Some(b'#'))
            .trim(Trim::All)
            .from_path(path)
            .map_err(|e| corrupt(e.to_string()))?;

        let headers = reader
            .headers()
            .map_err(|e| corrupt(format!("failed to read CSV headers: {e}")))?;
        let layout = Layout::from_header(headers).map_err(corrupt)?;
        debug!(
            path = %path.display(),
            variables = layout.variables.len(),
            "CSV header resolved"
        );

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| corrupt(e.to_string()))?;
            let line = record.position().map_or(0, |p| p.line());
            let row = layout
                .parse_row(&record)
                .map_err(|reason| corrupt(format!("line {line}: {reason}")))?;
            rows.push(row);
        }

        assemble(&layout, rows).map_err(corrupt)
    }
}

/// Column positions resolved from the header.
struct Layout {
    time: usize,
    lat: usize,
    lon: usize,
    variables: Vec<(usize, String)>,
}

impl Layout {
    fn from_header(header: &StringRecord) -> Result<Self, String> {
        let names: Vec<String> = header.iter().map(normalize_name).collect();
        let find = |candidates: &[&str]| names.iter().position(|n| candidates.contains(&n.as_str()));

        let time = find(&TIME_NAMES[..]).ok_or("no time column")?;
        let lat = find(&LATITUDE_NAMES[..]).ok_or("no latitude column")?;
        let lon = find(&LONGITUDE_NAMES[..]).ok_or("no longitude column")?;

        let variables: Vec<(usize, String)> = names
            .iter()
            .enumerate()
            .filter(|(i, _)| ![time, lat, lon].contains(i))
            .map(|(i, n)| (i, n.clone()))
            .collect();

        if variables.is_empty() {
            return Err("no variable columns".to_string());
        }

        Ok(Layout {
            time,
            lat,
            lon,
            variables,
        })
    }

    fn parse_row(&self, record: &StringRecord) -> Result<Row, String> {
        let field = |i: usize| record.get(i).unwrap_or_default();

        let time = parse_timestamp(field(self.time))
            .ok_or_else(|| format!("bad timestamp `{}`", field(self.time)))?;
        let lat = parse_coordinate(field(self.lat))?;
        let lon = parse_coordinate(field(self.lon))?;
        let values = self
            .variables
            .iter()
            .map(|(i, _)| parse_value(field(*i)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Row {
            time,
            lat,
            lon,
            values,
        })
    }
}

struct Row {
    time: DateTime<Utc>,
    lat: f64,
    lon: f64,
    values: Vec<Option<f64>>,
}

fn parse_coordinate(s: &str) -> Result<f64, String> {
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("bad coordinate `{s}`"))
}

fn parse_value(s: &str) -> Result<Option<f64>, String> {
    if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    let v = s.parse::<f64>().map_err(|_| format!("bad value `{s}`"))?;
    Ok(v.is_finite().then_some(v))
}

/// Places rows on the grid formed by the distinct coordinates, in order of first appearance.
fn assemble(layout: &Layout, rows: Vec<Row>) -> Result<GriddedDataset, String> {
    let mut times = Axis::<DateTime<Utc>>::default();
    let mut lats = Axis::<u64>::default();
    let mut lons = Axis::<u64>::default();

    let positions: Vec<(usize, usize, usize)> = rows
        .iter()
        .map(|r| {
            (
                times.insert(r.time),
                lats.insert(r.lat.to_bits()),
                lons.insert(r.lon.to_bits()),
            )
        })
        .collect();

    let mut dataset = GriddedDataset {
        times: times.values,
        latitudes: lats.values.into_iter().map(f64::from_bits).collect(),
        longitudes: lons.values.into_iter().map(f64::from_bits).collect(),
        variables: Vec::new(),
    };

    let cells = dataset.cell_count();
    let mut filled = vec![false; cells];
    let mut columns: Vec<Vec<Option<f64>>> = vec![vec![None; cells]; layout.variables.len()];

    for (row, (t, i, j)) in rows.into_iter().zip(positions) {
        let idx = dataset.index(t, i, j);
        if filled[idx] {
            return Err(format!(
                "duplicate cell at {} ({}, {})",
                row.time,
                dataset.latitudes[i],
                dataset.longitudes[j]
            ));
        }
        filled[idx] = true;
        for (column, value) in columns.iter_mut().zip(row.values) {
            column[idx] = value;
        }
    }

    dataset.variables = layout
        .variables
        .iter()
        .zip(columns)
        .map(|((_, name), values)| GridVariable {
            name: name.clone(),
            values,
        })
        .collect();

    Ok(dataset)
}

struct Axis<K> {
    values: Vec<K>,
    lookup: HashMap<K, usize>,
}

impl<K> Default for Axis<K> {
    fn default() -> Self {
        Axis {
            values: Vec::new(),
            lookup: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + std::hash::Hash> Axis<K> {
    fn insert(&mut self, key: K) -> usize {
        if let Some(&idx) = self.lookup.get(&key) {
            return idx;
        }
        let idx = self.values.len();
        self.values.push(key);
        self.lookup.insert(key, idx);
        idx
    }
}

// -- Tests -------------------------------------------------------------------
