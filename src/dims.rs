//! Dimension detection by name
//!
//! Gridded products disagree on what they call their axes (`time` vs
//! `valid_time`, `lat` vs `latitude`, ...). These helpers find the dimension or
//! coordinate playing a given role from a fixed alias list.

use crate::errors::{ClimAggError, Result};
use crate::labeled::LabeledArray;

/// Role of an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimAxis {
    /// Time
    T,
    /// Latitude / northing
    Y,
    /// Longitude / easting
    X,
}

impl DimAxis {
    /// Candidate names, in priority order
    #[must_use]
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::T => &["time", "valid_time", "date", "datetime", "t"],
            Self::Y => &["latitude", "lat", "y", "rlat"],
            Self::X => &["longitude", "lon", "x", "rlon"],
        }
    }
}

/// Name of the dimension or coordinate playing the role `axis`
///
/// Each alias is tried in order, first against the dimensions and then
/// against the coordinates, ignoring ASCII case.
///
/// # Errors
///
/// Returns [`ClimAggError::DimensionNotFound`] when nothing matches.
pub fn get_dim_key(array: &LabeledArray, axis: DimAxis) -> Result<String> {
    for alias in axis.aliases() {
        if let Some(dim) = array.dims().iter().find(|d| d.eq_ignore_ascii_case(alias)) {
            return Ok(dim.clone());
        }
        if let Some(name) = array.coords().keys().find(|n| n.eq_ignore_ascii_case(alias)) {
            return Ok(name.clone());
        }
    }
    Err(ClimAggError::DimensionNotFound {
        dim: axis.aliases().join("|"),
        available: array.dims().to_vec(),
    })
}

/// Dimensions spanned by the latitude and longitude keys, in array order
///
/// A key may name a dimension or a coordinate (for curvilinear grids and
/// station networks the coordinates span generic dimensions).
///
/// # Errors
///
/// Returns an error if either key is neither a dimension nor a coordinate.
pub fn get_spatial_dims(array: &LabeledArray, lat_key: &str, lon_key: &str) -> Result<Vec<String>> {
    let mut spanned: Vec<String> = Vec::new();
    for key in [lat_key, lon_key] {
        match array.coord(key) {
            Some(coord) => spanned.extend(coord.dims.iter().cloned()),
            None if array.has_dim(key) => spanned.push(key.to_string()),
            None => {
                return Err(ClimAggError::CoordinateNotFound {
                    name: key.to_string(),
                })
            }
        }
    }
    Ok(array
        .dims()
        .iter()
        .filter(|d| spanned.contains(d))
        .cloned()
        .collect())
}
