//! Grid to JSON conversion.
//!
//! The map layer reads one record per component: wind is handed to
//! leaflet-velocity as a flat row-major array, every other variable is drawn
//! from explicit `{lat, lng, value}` points.

use crate::{Grid, Level, ModelRun, Parameter};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableHeader {
    pub discipline: u8,
    pub discipline_name: String,
    pub parameter_category: u8,
    pub parameter_category_name: String,
    pub parameter_number: u16,
    pub parameter_number_name: String,
    pub parameter_unit: String,
    pub forecast_time: u16,
    pub ref_time: String,
    pub surface1_type: u8,
    pub surface1_type_name: String,
    pub surface1_value: i64,
    pub grid_definition: String,
    pub nx: usize,
    pub ny: usize,
    pub lo1: f64,
    pub la1: f64,
    pub lo2: f64,
    pub la2: f64,
    pub dx: f64,
    pub dy: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub lat: f64,
    pub lng: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordData {
    /// Row-major values, `null` where the model has no value
    Flat(Vec<Option<f64>>),
    Points(Vec<GridPoint>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub header: VariableHeader,
    pub data: RecordData,
}

pub fn build_header(
    grid: &Grid,
    parameter: &Parameter,
    level: &Level,
    run: &ModelRun,
) -> VariableHeader {
    let (lat_min, lat_max) = grid.lat_bounds();
    let (lon_min, lon_max) = grid.lon_bounds();

    VariableHeader {
        discipline: 0,
        discipline_name: "Meteorological products".to_string(),
        parameter_category: parameter.category,
        parameter_category_name: parameter.category_name.to_string(),
        parameter_number: parameter.number,
        parameter_number_name: parameter.number_name.to_string(),
        parameter_unit: parameter.unit.to_string(),
        forecast_time: run.fxx,
        ref_time: run.ref_time(),
        surface1_type: level.surface_type(),
        surface1_type_name: level.surface_type_name().to_string(),
        surface1_value: level.surface_value(),
        grid_definition: "Latitude_Longitude".to_string(),
        nx: grid.nx(),
        ny: grid.ny(),
        lo1: lon_min,
        la1: lat_max,
        lo2: lon_max,
        la2: lat_min,
        dx: grid.dx(),
        dy: grid.dy(),
        unit: parameter.display_unit.to_string(),
    }
}

pub fn to_flat_record(
    grid: &Grid,
    parameter: &Parameter,
    level: &Level,
    run: &ModelRun,
) -> VariableRecord {
    let data = grid
        .values()
        .iter()
        .map(|v| v.is_finite().then_some(*v))
        .collect();

    VariableRecord {
        header: build_header(grid, parameter, level, run),
        data: RecordData::Flat(data),
    }
}

/// Point list of every finite cell, in row-major order.
pub fn to_point_record(
    grid: &Grid,
    parameter: &Parameter,
    level: &Level,
    run: &ModelRun,
) -> VariableRecord {
    let nx = grid.nx();
    let points = grid
        .values()
        .iter()
        .enumerate()
        .filter(|(_, value)| value.is_finite())
        .map(|(idx, value)| GridPoint {
            lat: grid.lats()[idx / nx],
            lng: grid.lons()[idx % nx],
            value: *value,
        })
        .collect();

    VariableRecord {
        header: build_header(grid, parameter, level, run),
        data: RecordData::Points(points),
    }
}
