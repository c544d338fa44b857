//! Geometry masks over coordinate grids
//!
//! Regular grids are rasterized: each polygon is mapped into pixel space with
//! the inverse of the grid's affine transform and scan-filled, burning every
//! cell whose centre lies inside. Irregular grids and station networks are
//! point-tested instead.

use super::geometry::{Feature, Geometry, GeometryCollection};
use crate::dims::{get_dim_key, DimAxis};
use crate::errors::{ClimAggError, Result};
use crate::labeled::{Attributes, Coordinate, LabeledArray};
use ndarray::{Array2, ArrayD, IxDyn};
use std::collections::BTreeMap;
use std::ops::Mul;

/// Boolean mask over the spatial dimensions of a grid
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub dims: Vec<String>,
    pub values: ArrayD<bool>,
    pub coords: BTreeMap<String, Coordinate>,
}

impl Mask {
    /// The mask as `1.0` / `0.0` values carrying the spatial coordinates
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinates do not match the mask shape.
    pub fn to_labeled(&self) -> Result<LabeledArray> {
        let data = self.values.mapv(|inside| if inside { 1.0 } else { 0.0 });
        LabeledArray::from_parts(data, self.dims.clone(), self.coords.clone(), Attributes::new())
    }

    #[must_use]
    pub fn count_true(&self) -> usize {
        self.values.iter().filter(|v| **v).count()
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }
}

/// 2-D affine transform `x' = a*x + b*y + c`, `y' = d*x + e*y + f`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl AffineTransform {
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 0.0,
            e: 1.0,
            f: 0.0,
        }
    }

    #[must_use]
    pub const fn translation(x: f64, y: f64) -> Self {
        Self {
            c: x,
            f: y,
            ..Self::identity()
        }
    }

    #[must_use]
    pub const fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            e: sy,
            ..Self::identity()
        }
    }

    #[must_use]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.c,
            self.d * x + self.e * y + self.f,
        )
    }

    /// Inverse transform
    ///
    /// # Errors
    ///
    /// Returns [`ClimAggError::InvalidGrid`] for a degenerate transform.
    pub fn inverse(&self) -> Result<Self> {
        let det = self.a * self.e - self.b * self.d;
        if det == 0.0 || !det.is_finite() {
            return Err(ClimAggError::InvalidGrid {
                message: format!("transform {self:?} is not invertible"),
            });
        }
        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;
        Ok(Self {
            a,
            b,
            c: -(a * self.c + b * self.f),
            d,
            e,
            f: -(d * self.c + e * self.f),
        })
    }
}

/// `lhs * rhs` applies `rhs` first
impl Mul for AffineTransform {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self {
            a: self.a * rhs.a + self.b * rhs.d,
            b: self.a * rhs.b + self.b * rhs.e,
            c: self.a * rhs.c + self.b * rhs.f + self.c,
            d: self.d * rhs.a + self.e * rhs.d,
            e: self.d * rhs.b + self.e * rhs.e,
            f: self.d * rhs.c + self.e * rhs.f + self.f,
        }
    }
}

/// Pixel-to-world transform of a regular grid
///
/// Pixel `(0, 0)` starts half a cell before the first sample; the scale is the
/// step between the first two samples. Spacing is assumed uniform.
///
/// # Errors
///
/// Returns [`ClimAggError::InvalidGrid`] when either axis has fewer than two samples.
pub fn transform_from_latlon(lat: &[f64], lon: &[f64]) -> Result<AffineTransform> {
    if lat.len() < 2 || lon.len() < 2 {
        return Err(ClimAggError::InvalidGrid {
            message: format!(
                "at least two samples per axis are required to derive a transform, got {} latitudes and {} longitudes",
                lat.len(),
                lon.len()
            ),
        });
    }
    let dx = lon[1] - lon[0];
    let dy = lat[1] - lat[0];
    Ok(AffineTransform::translation(lon[0] - dx / 2.0, lat[0] - dy / 2.0) * AffineTransform::scale(dx, dy))
}

/// The single dimension a 1-D coordinate (or bare dimension) indexes
fn axis_dim(target: &LabeledArray, key: &str) -> Result<String> {
    match target.coord(key) {
        Some(coord) if coord.dims.len() == 1 => Ok(coord.dims[0].clone()),
        Some(coord) => Err(ClimAggError::InvalidGrid {
            message: format!(
                "coordinate '{key}' spans {:?}; rasterization needs one-dimensional coordinates",
                coord.dims
            ),
        }),
        None => Err(ClimAggError::CoordinateNotFound {
            name: key.to_string(),
        }),
    }
}

fn spatial_coords(target: &LabeledArray, keys: [&str; 2]) -> BTreeMap<String, Coordinate> {
    keys.iter()
        .filter_map(|k| target.coord(k).map(|c| (k.to_string(), c.clone())))
        .collect()
}

/// Burn the cells of a regular grid whose centres fall inside `geometries`
///
/// Holes are honoured with the even-odd rule; separate polygons are unioned.
///
/// # Errors
///
/// Returns an error if the coordinates are missing, not one-dimensional, or
/// have fewer than two samples.
pub fn rasterize(geometries: &[Geometry], target: &LabeledArray, lat_key: &str, lon_key: &str) -> Result<Mask> {
    let lat = target.numeric_labels(lat_key)?;
    let lon = target.numeric_labels(lon_key)?;
    let lat_dim = axis_dim(target, lat_key)?;
    let lon_dim = axis_dim(target, lon_key)?;
    let inverse = transform_from_latlon(lat, lon)?.inverse()?;
    let (rows, cols) = (lat.len(), lon.len());

    let mut burned = Array2::from_elem((rows, cols), false);
    for polygon in geometries.iter().flat_map(Geometry::polygons) {
        let rings: Vec<Vec<(f64, f64)>> = std::iter::once(&polygon.exterior)
            .chain(&polygon.interiors)
            .map(|ring| ring.iter().map(|&(x, y)| inverse.apply(x, y)).collect())
            .collect();

        for row in 0..rows {
            let y = row as f64 + 0.5;
            let mut crossings: Vec<f64> = Vec::new();
            for ring in &rings {
                let n = ring.len();
                for i in 0..n {
                    let (x0, y0) = ring[i];
                    let (x1, y1) = ring[(i + 1) % n];
                    if (y0 > y) != (y1 > y) {
                        crossings.push(x0 + (y - y0) * (x1 - x0) / (y1 - y0));
                    }
                }
            }
            crossings.sort_by(f64::total_cmp);
            for span in crossings.chunks_exact(2) {
                let first = (span[0] - 0.5).ceil().max(0.0) as usize;
                for col in first..cols {
                    if col as f64 + 0.5 >= span[1] {
                        break;
                    }
                    burned[[row, col]] = true;
                }
            }
        }
    }

    tracing::debug!(rows, cols, burned = burned.iter().filter(|b| **b).count(), "rasterized geometries");

    Ok(Mask {
        dims: vec![lat_dim, lon_dim],
        values: burned.into_dyn(),
        coords: spatial_coords(target, [lat_key, lon_key]),
    })
}

/// Point-in-polygon mask for irregular grids and station networks
///
/// Latitude and longitude must either span the same dimensions or each be a
/// dimension coordinate indexed by itself (meshed). Only exterior rings are
/// tested.
///
/// # Errors
///
/// Returns [`ClimAggError::GeometryDimensionMismatch`] for any other layout.
pub fn mask_contains_points(
    geometries: &[Geometry],
    target: &LabeledArray,
    lat_key: &str,
    lon_key: &str,
) -> Result<Mask> {
    let lat_coord = target.require_coord(lat_key)?;
    let lon_coord = target.require_coord(lon_key)?;
    let lat = target.numeric_labels(lat_key)?;
    let lon = target.numeric_labels(lon_key)?;

    let (dims, points): (Vec<String>, Vec<(f64, f64)>) = if lat_coord.dims == lon_coord.dims {
        (lat_coord.dims.clone(), lon.iter().copied().zip(lat.iter().copied()).collect())
    } else if lat_coord.dims == [lat_key] && lon_coord.dims == [lon_key] {
        let points = lat
            .iter()
            .flat_map(|&y| lon.iter().map(move |&x| (x, y)))
            .collect();
        (vec![lat_coord.dims[0].clone(), lon_coord.dims[0].clone()], points)
    } else {
        return Err(ClimAggError::GeometryDimensionMismatch {
            lat_key: lat_key.to_string(),
            lat_dims: lat_coord.dims.clone(),
            lon_key: lon_key.to_string(),
            lon_dims: lon_coord.dims.clone(),
        });
    };

    let mut inside = vec![false; points.len()];
    for polygon in geometries.iter().flat_map(Geometry::polygons) {
        for (flag, hit) in inside.iter_mut().zip(polygon.contains_points(&points)) {
            *flag |= hit;
        }
    }

    let shape = dims
        .iter()
        .map(|d| target.dim_size(d))
        .collect::<Result<Vec<_>>>()?;
    Ok(Mask {
        values: ArrayD::from_shape_vec(IxDyn(&shape), inside)?,
        dims,
        coords: spatial_coords(target, [lat_key, lon_key]),
    })
}

/// How to build masks
#[derive(Debug, Clone, PartialEq)]
pub struct MaskOptions {
    /// Rasterize on a regular lat/lon grid instead of point testing
    pub regular_grid: bool,
    /// Latitude key; detected by alias when `None`
    pub lat_key: Option<String>,
    /// Longitude key; detected by alias when `None`
    pub lon_key: Option<String>,
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self {
            regular_grid: true,
            lat_key: None,
            lon_key: None,
        }
    }
}

impl MaskOptions {
    /// Latitude and longitude keys, detecting missing ones by alias
    ///
    /// # Errors
    ///
    /// Returns an error if a key is not given and cannot be detected.
    pub fn resolve_keys(&self, target: &LabeledArray) -> Result<(String, String)> {
        let lat_key = match &self.lat_key {
            Some(key) => key.clone(),
            None => get_dim_key(target, DimAxis::Y)?,
        };
        let lon_key = match &self.lon_key {
            Some(key) => key.clone(),
            None => get_dim_key(target, DimAxis::X)?,
        };
        Ok((lat_key, lon_key))
    }
}

/// Mask for a single geometry
///
/// # Errors
///
/// Returns an error if the keys cannot be resolved or masking fails.
pub fn mask_geometry(geometry: &Geometry, target: &LabeledArray, options: &MaskOptions) -> Result<Mask> {
    let (lat_key, lon_key) = options.resolve_keys(target)?;
    let geometries = std::slice::from_ref(geometry);
    if options.regular_grid {
        rasterize(geometries, target, &lat_key, &lon_key)
    } else {
        mask_contains_points(geometries, target, &lat_key, &lon_key)
    }
}

/// Lazy per-feature masks, in input order
pub struct MaskIterator<'a> {
    features: std::slice::Iter<'a, Feature>,
    target: &'a LabeledArray,
    options: MaskOptions,
}

impl Iterator for MaskIterator<'_> {
    type Item = Result<Mask>;

    fn next(&mut self) -> Option<Self::Item> {
        let feature = self.features.next()?;
        Some(mask_geometry(&feature.geometry, self.target, &self.options))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.features.size_hint()
    }
}

/// Iterate over one mask per feature of `collection`; call again to restart
#[must_use]
pub fn mask_iterator<'a>(
    collection: &'a GeometryCollection,
    target: &'a LabeledArray,
    options: &MaskOptions,
) -> MaskIterator<'a> {
    MaskIterator {
        features: collection.features.iter(),
        target,
        options: options.clone(),
    }
}
