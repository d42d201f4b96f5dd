//! NetCDF artifacts as delivered by the CDS.
//!
//! Coordinates are looked up by name; a scalar latitude or longitude (point
//! time series) becomes an axis of length one. Data variables may omit any of
//! the three axes and are broadcast over the missing ones; any other dimension
//! must have length one.

use std::path::Path;

use netcdf::{AttributeValue, Variable};
use tracing::debug;

use super::{
    time::decode_cf_times, DatasetReader, GridVariable, GriddedDataset, LATITUDE_NAMES,
    LONGITUDE_NAMES, TIME_NAMES,
};
use crate::error::TransformError;

#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfReader;

impl DatasetReader for NetcdfReader {
    fn read(&self, path: &Path) -> Result<GriddedDataset, TransformError> {
        let corrupt = |reason: String| TransformError::EmptyOrCorrupt {
            path: path.to_path_buf(),
            reason,
        };
        let mismatch = |reason: String| TransformError::SchemaMismatch {
            path: path.to_path_buf(),
            reason,
        };

        let file = netcdf::open(path).map_err(|e| corrupt(e.to_string()))?;

        let time = Coordinate::find(&file, &TIME_NAMES[..])
            .map_err(corrupt)?
            .ok_or_else(|| corrupt("no time coordinate".to_string()))?;
        let lat = Coordinate::find(&file, &LATITUDE_NAMES[..])
            .map_err(corrupt)?
            .ok_or_else(|| corrupt("no latitude coordinate".to_string()))?;
        let lon = Coordinate::find(&file, &LONGITUDE_NAMES[..])
            .map_err(corrupt)?
            .ok_or_else(|| corrupt("no longitude coordinate".to_string()))?;

        let time_var = file
            .variable(&time.name)
            .ok_or_else(|| corrupt(format!("variable `{}` vanished", time.name)))?;
        let units = string_attribute(&time_var, "units")
            .ok_or_else(|| corrupt(format!("`{}` has no units", time.name)))?;
        let times = decode_cf_times(&time.values, &units).map_err(corrupt)?;

        let mut dataset = GriddedDataset {
            times,
            latitudes: lat.values.clone(),
            longitudes: lon.values.clone(),
            variables: Vec::new(),
        };
        let axes = [&time, &lat, &lon];

        for var in file.variables() {
            let name = var.name();
            if axes.iter().any(|c| c.name == name) || var.dimensions().is_empty() {
                continue;
            }

            let Some(layout) = VariableLayout::resolve(&var, &axes).map_err(mismatch)? else {
                debug!(variable = %name, "Skipping variable with extra dimensions");
                continue;
            };
            let raw = match var.get_values::<f64, _>(..) {
                Ok(raw) => raw,
                Err(e) => {
                    debug!(variable = %name, error = %e, "Skipping non-numeric variable");
                    continue;
                }
            };

            let packing = Packing::of(&var);
            let values = layout.gather(&dataset, &raw, &packing);
            dataset.variables.push(GridVariable { name, values });
        }

        Ok(dataset)
    }
}

/// A coordinate variable and the dimension it indexes, if any.
struct Coordinate {
    name: String,
    dimension: Option<String>,
    values: Vec<f64>,
}

impl Coordinate {
    fn find(file: &netcdf::File, names: &[&str]) -> Result<Option<Self>, String> {
        for &name in names {
            let Some(var) = file.variable(name) else {
                continue;
            };
            let dims = var.dimensions();
            if dims.len() > 1 {
                return Err(format!("coordinate `{name}` has {} dimensions", dims.len()));
            }
            let values = var
                .get_values::<f64, _>(..)
                .map_err(|e| format!("coordinate `{name}`: {e}"))?;

            return Ok(Some(Coordinate {
                name: name.to_string(),
                dimension: dims.first().map(|d| d.name()),
                values,
            }));
        }

        Ok(None)
    }
}

/// Where the time, latitude and longitude axes sit in a variable's dimensions.
struct VariableLayout {
    /// Stride of each axis in the variable's flat data; zero when broadcast.
    strides: [usize; 3],
    len: usize,
}

impl VariableLayout {
    /// `Ok(None)` when the variable has a dimension other than the three axes.
    fn resolve(var: &Variable, axes: &[&Coordinate; 3]) -> Result<Option<Self>, String> {
        let dims = var.dimensions();
        let shape: Vec<usize> = dims.iter().map(|d| d.len()).collect();

        let mut strides = [0; 3];
        let mut stride = 1;
        for (k, dim) in dims.iter().enumerate().rev() {
            let dim_name = dim.name();
            let axis = axes
                .iter()
                .position(|c| c.dimension.as_deref() == Some(dim_name.as_str()));

            match axis {
                Some(a) => {
                    if shape[k] != axes[a].values.len() {
                        return Err(format!(
                            "`{}` has {} steps along `{dim_name}`, expected {}",
                            var.name(),
                            shape[k],
                            axes[a].values.len()
                        ));
                    }
                    strides[a] = stride;
                }
                None if shape[k] == 1 => {}
                None => return Ok(None),
            }
            stride *= shape[k];
        }

        Ok(Some(VariableLayout {
            strides,
            len: stride,
        }))
    }

    fn gather(&self, dataset: &GriddedDataset, raw: &[f64], packing: &Packing) -> Vec<Option<f64>> {
        let mut values = Vec::with_capacity(dataset.cell_count());
        for t in 0..dataset.times.len() {
            for i in 0..dataset.latitudes.len() {
                for j in 0..dataset.longitudes.len() {
                    let offset = t * self.strides[0] + i * self.strides[1] + j * self.strides[2];
                    let value = if offset < self.len {
                        raw.get(offset).copied().and_then(|v| packing.unpack(v))
                    } else {
                        None
                    };
                    values.push(value);
                }
            }
        }
        values
    }
}

/// CF packing and missing-value conventions.
struct Packing {
    fill: Option<f64>,
    missing: Option<f64>,
    scale: f64,
    offset: f64,
}

impl Packing {
    fn of(var: &Variable) -> Self {
        Packing {
            fill: numeric_attribute(var, "_FillValue"),
            missing: numeric_attribute(var, "missing_value"),
            scale: numeric_attribute(var, "scale_factor").unwrap_or(1.0),
            offset: numeric_attribute(var, "add_offset").unwrap_or(0.0),
        }
    }

    fn unpack(&self, raw: f64) -> Option<f64> {
        if raw.is_nan() || Some(raw) == self.fill || Some(raw) == self.missing {
            return None;
        }
        let value = raw * self.scale + self.offset;
        value.is_finite().then_some(value)
    }
}

fn string_attribute(var: &Variable, name: &str) -> Option<String> {
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn numeric_attribute(var: &Variable, name: &str) -> Option<f64> {
    let value = match var.attribute_value(name)?.ok()? {
        AttributeValue::Double(v) => v,
        AttributeValue::Float(v) => f64::from(v),
        AttributeValue::Int(v) => f64::from(v),
        AttributeValue::Uint(v) => f64::from(v),
        AttributeValue::Short(v) => f64::from(v),
        AttributeValue::Ushort(v) => f64::from(v),
        AttributeValue::Schar(v) => f64::from(v),
        AttributeValue::Uchar(v) => f64::from(v),
        AttributeValue::Longlong(v) => v as f64,
        AttributeValue::Ulonglong(v) => v as f64,
        AttributeValue::Doubles(v) => *v.first()?,
        AttributeValue::Floats(v) => f64::from(*v.first()?),
        AttributeValue::Ints(v) => f64::from(*v.first()?),
        AttributeValue::Shorts(v) => f64::from(*v.first()?),
        _ => return None,
    };
    Some(value)
}

// -- Tests -------------------------------------------------------------------
