//! Request selectors for each CDS dataset family.
//!
//! The time-series product takes an ISO date range and a single location; the
//! gridded products take year/month/day lists and an area box.

use serde_json::{json, Value};

use crate::{
    error::PlanningError,
    plan::{Chunk, SpatialExtent},
    reading::ArtifactFormat,
};

pub const ERA5_LAND_TIMESERIES: &str = "reanalysis-era5-land-timeseries";

/// The variables pulled by the original full-history load.
pub const DEFAULT_VARIABLES: [&str; 18] = [
    "2m_dewpoint_temperature",
    "2m_temperature",
    "surface_pressure",
    "total_precipitation",
    "surface_solar_radiation_downwards",
    "surface_thermal_radiation_downwards",
    "skin_temperature",
    "snow_cover",
    "soil_temperature_level_1",
    "soil_temperature_level_2",
    "soil_temperature_level_3",
    "soil_temperature_level_4",
    "volumetric_soil_water_level_1",
    "volumetric_soil_water_level_2",
    "volumetric_soil_water_level_3",
    "volumetric_soil_water_level_4",
    "10m_u_component_of_wind",
    "10m_v_component_of_wind",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// Point time series addressed by a date range.
    Timeseries,
    /// Gridded fields addressed by year/month/day lists.
    Gridded { product_type: bool },
}

impl DatasetKind {
    pub fn from_identifier(dataset: &str) -> Self {
        if dataset.ends_with("-timeseries") {
            DatasetKind::Timeseries
        } else {
            let product_type = dataset.starts_with("reanalysis-era5-single-levels")
                || dataset.starts_with("reanalysis-era5-pressure-levels");
            DatasetKind::Gridded { product_type }
        }
    }

    pub fn check_extent(&self, dataset: &str, extent: &SpatialExtent) -> Result<(), PlanningError> {
        match (self, extent) {
            (DatasetKind::Timeseries, SpatialExtent::BoundingBox { .. }) => {
                Err(PlanningError::UnsupportedSelector {
                    dataset: dataset.to_string(),
                    reason: "a bounding box (time series take a single point)".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Builds the `inputs` object for a chunk's retrieval request.
pub fn build_inputs(dataset: &str, chunk: &Chunk, hours: &[String], format: ArtifactFormat) -> Value {
    match DatasetKind::from_identifier(dataset) {
        DatasetKind::Timeseries => {
            let [lat, lon, _, _] = chunk.extent.area();
            json!({
                "variable": chunk.variables,
                "location": { "latitude": lat, "longitude": lon },
                "date": [format!("{}/{}", chunk.window.start, chunk.window.end)],
                "data_format": format.cds_name(),
            })
        }
        DatasetKind::Gridded { product_type } => {
            let mut inputs = json!({
                "variable": chunk.variables,
                "year": chunk.years().iter().map(|y| y.to_string()).collect::<Vec<_>>(),
                "month": chunk.months().iter().map(|m| format!("{m:02}")).collect::<Vec<_>>(),
                "day": chunk.days().iter().map(|d| format!("{d:02}")).collect::<Vec<_>>(),
                "time": hours,
                "area": chunk.extent.area(),
                "data_format": format.cds_name(),
                "download_format": "unarchived",
            });
            if product_type {
                inputs["product_type"] = json!(["reanalysis"]);
            }
            inputs
        }
    }
}

// -- Tests -------------------------------------------------------------------
