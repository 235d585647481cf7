use crate::{Grid, GridError};
use std::io::Cursor;

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("failed to read GRIB2 data: {0}")]
    Grib(String),
    #[error("no GRIB2 message in downloaded range")]
    Empty,
    #[error("grid is {nx}x{ny} but has {points} coordinates")]
    Coordinates { nx: usize, ny: usize, points: usize },
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Decode the first GRIB2 message in `bytes` into a grid with longitudes in [-180, 180).
pub fn decode_message(bytes: Vec<u8>) -> Result<Grid, DecodeError> {
    let grib2 = ::grib::from_reader(Cursor::new(bytes)).map_err(|e| DecodeError::Grib(e.to_string()))?;
    let (_, submessage) = grib2.iter().next().ok_or(DecodeError::Empty)?;

    let (nx, ny) = submessage
        .grid_shape()
        .map_err(|e| DecodeError::Grib(e.to_string()))?;
    let points: Vec<(f32, f32)> = submessage
        .latlons()
        .map_err(|e| DecodeError::Grib(e.to_string()))?
        .collect();

    let decoder = ::grib::Grib2SubmessageDecoder::from(submessage)
        .map_err(|e| DecodeError::Grib(e.to_string()))?;
    let values: Vec<f64> = decoder
        .dispatch()
        .map_err(|e| DecodeError::Grib(e.to_string()))?
        .map(f64::from)
        .collect();

    Ok(grid_from_points(nx, ny, &points, values)?.recenter_longitudes())
}

/// Rebuild the lat/lon axes of a regular grid from its point list (i varies fastest).
pub fn grid_from_points(
    nx: usize,
    ny: usize,
    points: &[(f32, f32)],
    values: Vec<f64>,
) -> Result<Grid, DecodeError> {
    if points.len() != nx * ny || nx == 0 {
        return Err(DecodeError::Coordinates {
            nx,
            ny,
            points: points.len(),
        });
    }

    let lons = points[..nx].iter().map(|(_, lon)| f64::from(*lon)).collect();
    let lats = points
        .iter()
        .step_by(nx)
        .map(|(lat, _)| f64::from(*lat))
        .collect();

    Ok(Grid::new(lats, lons, values)?)
}
