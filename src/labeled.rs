//! Labeled N-dimensional arrays
//!
//! [`LabeledArray`] pairs an `ndarray::ArrayD<f64>` with dimension names,
//! named coordinates and a free-form attribute map. It is the value type every
//! reduction in this crate consumes and produces. Arrays are immutable by
//! convention: operations return new arrays and never touch their input.

use crate::errors::{ClimAggError, Result};
use chrono::NaiveDateTime;
use ndarray::{ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Descriptive metadata attached to arrays and geometry collections
pub type Attributes = BTreeMap<String, JsonValue>;

/// Labels of a coordinate, flattened in row-major order over its dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum CoordLabels {
    /// Numeric labels such as latitudes or group numbers
    Numeric(Vec<f64>),
    /// Timestamps
    Time(Vec<NaiveDateTime>),
    /// Text labels such as season names or feature identifiers
    Text(Vec<String>),
}

impl CoordLabels {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Time(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gather the labels at `positions`, in that order
    #[must_use]
    pub fn take(&self, positions: &[usize]) -> Self {
        match self {
            Self::Numeric(v) => Self::Numeric(positions.iter().map(|&i| v[i]).collect()),
            Self::Time(v) => Self::Time(positions.iter().map(|&i| v[i]).collect()),
            Self::Text(v) => Self::Text(positions.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    /// Render the label at `index` as a string, used to match labels across arrays
    #[must_use]
    pub fn label_string(&self, index: usize) -> String {
        match self {
            Self::Numeric(v) => v[index].to_string(),
            Self::Time(v) => v[index].to_string(),
            Self::Text(v) => v[index].clone(),
        }
    }

    #[must_use]
    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            Self::Numeric(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_time(&self) -> Option<&[NaiveDateTime]> {
        match self {
            Self::Time(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// A named coordinate: the dimensions it spans and its labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub dims: Vec<String>,
    pub labels: CoordLabels,
}

impl Coordinate {
    #[must_use]
    pub fn new(dims: Vec<String>, labels: CoordLabels) -> Self {
        Self { dims, labels }
    }

    /// Whether this coordinate is indexed by `dim`
    #[must_use]
    pub fn spans(&self, dim: &str) -> bool {
        self.dims.iter().any(|d| d == dim)
    }
}

/// An N-dimensional `f64` array with named dimensions, coordinates and attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LabeledArrayDocument", into = "LabeledArrayDocument")]
pub struct LabeledArray {
    data: ArrayD<f64>,
    dims: Vec<String>,
    coords: BTreeMap<String, Coordinate>,
    attrs: Attributes,
}

impl LabeledArray {
    /// Create an array without coordinates
    ///
    /// # Errors
    ///
    /// Returns an error if the number of dimension names does not match the
    /// array rank or if a dimension name is repeated.
    pub fn new<S: Into<String>>(data: ArrayD<f64>, dims: Vec<S>) -> Result<Self> {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        if dims.len() != data.ndim() {
            return Err(ClimAggError::ShapeMismatch {
                message: format!(
                    "{} dimension names given for an array of rank {}",
                    dims.len(),
                    data.ndim()
                ),
            });
        }
        for (i, dim) in dims.iter().enumerate() {
            if dims[..i].contains(dim) {
                return Err(ClimAggError::ShapeMismatch {
                    message: format!("dimension '{dim}' appears more than once"),
                });
            }
        }
        Ok(Self {
            data,
            dims,
            coords: BTreeMap::new(),
            attrs: Attributes::new(),
        })
    }

    /// Build an array from all of its parts, validating every coordinate
    ///
    /// # Errors
    ///
    /// Returns an error if dimensions or any coordinate are inconsistent with the data.
    pub fn from_parts(
        data: ArrayD<f64>,
        dims: Vec<String>,
        coords: BTreeMap<String, Coordinate>,
        attrs: Attributes,
    ) -> Result<Self> {
        let mut array = Self::new(data, dims)?;
        for (name, coord) in coords {
            array = array.with_coord(name, coord.dims, coord.labels)?;
        }
        array.attrs = attrs;
        Ok(array)
    }

    /// Attach a coordinate spanning `dims`
    ///
    /// # Errors
    ///
    /// Returns an error if a dimension is unknown or the label count does not
    /// equal the product of the spanned dimension sizes.
    pub fn with_coord<N, S>(mut self, name: N, dims: Vec<S>, labels: CoordLabels) -> Result<Self>
    where
        N: Into<String>,
        S: Into<String>,
    {
        let name = name.into();
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        let mut expected = 1usize;
        for dim in &dims {
            expected *= self.dim_size(dim)?;
        }
        if labels.len() != expected {
            return Err(ClimAggError::ShapeMismatch {
                message: format!(
                    "coordinate '{name}' has {} labels but its dimensions {dims:?} hold {expected} positions",
                    labels.len()
                ),
            });
        }
        self.coords.insert(name, Coordinate::new(dims, labels));
        Ok(self)
    }

    /// Attach a dimension coordinate (a coordinate named after the dimension it indexes)
    ///
    /// # Errors
    ///
    /// Returns an error if the dimension is unknown or the label count differs from its size.
    pub fn with_dim_coord<S: Into<String>>(self, dim: S, labels: CoordLabels) -> Result<Self> {
        let dim = dim.into();
        self.with_coord(dim.clone(), vec![dim], labels)
    }

    #[must_use]
    pub fn with_attr<K: Into<String>>(mut self, key: K, value: JsonValue) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    #[must_use]
    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    #[must_use]
    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    #[must_use]
    pub fn coords(&self) -> &BTreeMap<String, Coordinate> {
        &self.coords
    }

    #[must_use]
    pub fn coord(&self, name: &str) -> Option<&Coordinate> {
        self.coords.get(name)
    }

    #[must_use]
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    #[must_use]
    pub fn has_dim(&self, dim: &str) -> bool {
        self.dims.iter().any(|d| d == dim)
    }

    /// Look up a coordinate that must exist
    ///
    /// # Errors
    ///
    /// Returns [`ClimAggError::CoordinateNotFound`] when absent.
    pub fn require_coord(&self, name: &str) -> Result<&Coordinate> {
        self.coords
            .get(name)
            .ok_or_else(|| ClimAggError::CoordinateNotFound {
                name: name.to_string(),
            })
    }

    /// Axis index of a named dimension
    ///
    /// # Errors
    ///
    /// Returns [`ClimAggError::DimensionNotFound`] when the dimension is absent.
    pub fn axis_of(&self, dim: &str) -> Result<usize> {
        self.dims
            .iter()
            .position(|d| d == dim)
            .ok_or_else(|| ClimAggError::DimensionNotFound {
                dim: dim.to_string(),
                available: self.dims.clone(),
            })
    }

    /// Length of a named dimension
    ///
    /// # Errors
    ///
    /// Returns [`ClimAggError::DimensionNotFound`] when the dimension is absent.
    pub fn dim_size(&self, dim: &str) -> Result<usize> {
        Ok(self.data.shape()[self.axis_of(dim)?])
    }

    /// Timestamps of the coordinate indexing `dim`
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinate is missing or does not hold timestamps.
    pub fn time_labels(&self, dim: &str) -> Result<&[NaiveDateTime]> {
        self.axis_of(dim)?;
        let coord = self.require_coord(dim)?;
        coord.labels.as_time().ok_or_else(|| ClimAggError::ShapeMismatch {
            message: format!("coordinate '{dim}' does not hold timestamps"),
        })
    }

    /// Numeric labels of a coordinate
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinate is missing or is not numeric.
    pub fn numeric_labels(&self, name: &str) -> Result<&[f64]> {
        let coord = self.require_coord(name)?;
        coord
            .labels
            .as_numeric()
            .ok_or_else(|| ClimAggError::ShapeMismatch {
                message: format!("coordinate '{name}' is not numeric"),
            })
    }

    /// Select `indices` along `dim`, in the given order
    ///
    /// Coordinates spanning `dim` are subset consistently, including
    /// multi-dimensional auxiliary coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error if `dim` is unknown.
    pub fn select(&self, dim: &str, indices: &[usize]) -> Result<Self> {
        let axis = self.axis_of(dim)?;
        let data = self.data.select(Axis(axis), indices);
        let mut coords = BTreeMap::new();
        for (name, coord) in &self.coords {
            let labels = match coord.dims.iter().position(|d| d == dim) {
                Some(coord_axis) => {
                    let positions = self.coord_positions(coord)?;
                    let picked = positions.select(Axis(coord_axis), indices);
                    let flat: Vec<usize> = picked.iter().copied().collect();
                    coord.labels.take(&flat)
                }
                None => coord.labels.clone(),
            };
            coords.insert(name.clone(), Coordinate::new(coord.dims.clone(), labels));
        }
        Ok(Self {
            data,
            dims: self.dims.clone(),
            coords,
            attrs: self.attrs.clone(),
        })
    }

    /// Select a single position along `dim` and drop that dimension
    ///
    /// Coordinates that only spanned `dim` are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if `dim` is unknown or `index` is out of bounds.
    pub fn index_dim(&self, dim: &str, index: usize) -> Result<Self> {
        let axis = self.axis_of(dim)?;
        if index >= self.shape()[axis] {
            return Err(ClimAggError::ShapeMismatch {
                message: format!(
                    "index {index} out of bounds for dimension '{dim}' of size {}",
                    self.shape()[axis]
                ),
            });
        }
        let data = self.data.index_axis(Axis(axis), index).to_owned();
        let dims: Vec<String> = self.dims.iter().filter(|d| *d != dim).cloned().collect();
        let mut coords = BTreeMap::new();
        for (name, coord) in &self.coords {
            match coord.dims.iter().position(|d| d == dim) {
                Some(_) if coord.dims.len() == 1 => {}
                Some(coord_axis) => {
                    let positions = self.coord_positions(coord)?;
                    let picked = positions.index_axis(Axis(coord_axis), index);
                    let flat: Vec<usize> = picked.iter().copied().collect();
                    let coord_dims = coord.dims.iter().filter(|d| *d != dim).cloned().collect();
                    coords.insert(
                        name.clone(),
                        Coordinate::new(coord_dims, coord.labels.take(&flat)),
                    );
                }
                None => {
                    coords.insert(name.clone(), coord.clone());
                }
            }
        }
        Ok(Self {
            data,
            dims,
            coords,
            attrs: self.attrs.clone(),
        })
    }

    /// Keep the positions along a time dimension whose timestamp satisfies `keep`
    ///
    /// # Errors
    ///
    /// Returns an error if `dim` has no timestamp coordinate.
    pub fn select_time<F>(&self, dim: &str, keep: F) -> Result<Self>
    where
        F: Fn(&NaiveDateTime) -> bool,
    {
        let indices: Vec<usize> = self
            .time_labels(dim)?
            .iter()
            .enumerate()
            .filter_map(|(i, t)| keep(t).then_some(i))
            .collect();
        self.select(dim, &indices)
    }

    /// Replace the data while keeping dimensions, coordinates and attributes
    ///
    /// # Errors
    ///
    /// Returns an error if the new data has a different shape.
    pub fn with_data(&self, data: ArrayD<f64>) -> Result<Self> {
        if data.shape() != self.shape() {
            return Err(ClimAggError::ShapeMismatch {
                message: format!(
                    "replacement data has shape {:?}, expected {:?}",
                    data.shape(),
                    self.shape()
                ),
            });
        }
        Ok(Self {
            data,
            dims: self.dims.clone(),
            coords: self.coords.clone(),
            attrs: self.attrs.clone(),
        })
    }

    /// Rename a dimension and give it new dimension-coordinate labels
    ///
    /// Any coordinate that spanned the old dimension is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if `old` is unknown, `new` already exists or the label
    /// count does not match the dimension size.
    pub fn relabel_dim(&self, old: &str, new: &str, labels: CoordLabels) -> Result<Self> {
        let axis = self.axis_of(old)?;
        if old != new && self.has_dim(new) {
            return Err(ClimAggError::ShapeMismatch {
                message: format!("dimension '{new}' already exists"),
            });
        }
        let mut dims = self.dims.clone();
        dims[axis] = new.to_string();
        let coords = self
            .coords
            .iter()
            .filter(|(_, c)| !c.spans(old))
            .map(|(n, c)| (n.clone(), c.clone()))
            .collect();
        let array = Self {
            data: self.data.clone(),
            dims,
            coords,
            attrs: self.attrs.clone(),
        };
        array.with_dim_coord(new, labels)
    }

    /// Set every position where `mask` is false to NaN
    ///
    /// The mask dimensions must be a subset of this array's dimensions; the mask
    /// is broadcast over the remaining ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the mask does not line up with this array.
    pub fn where_mask(&self, mask: &crate::shapes::Mask) -> Result<Self> {
        let keep = mask.to_labeled()?.broadcast_dims(&self.dims, self.shape())?;
        let mut data = self.data.clone();
        data.zip_mut_with(&keep, |value, &k| {
            if k == 0.0 {
                *value = f64::NAN;
            }
        });
        self.with_data(data)
    }

    /// Broadcast this array's data onto `target_dims` with `target_shape`
    ///
    /// Dimensions are matched by name; missing ones are broadcast.
    ///
    /// # Errors
    ///
    /// Returns an error if this array has a dimension absent from the target
    /// or a dimension whose size differs.
    pub fn broadcast_dims(&self, target_dims: &[String], target_shape: &[usize]) -> Result<ArrayD<f64>> {
        let mut order = Vec::with_capacity(self.dims.len());
        let mut expanded_shape = Vec::with_capacity(target_dims.len());
        for (dim, &size) in target_dims.iter().zip(target_shape) {
            match self.dims.iter().position(|d| d == dim) {
                Some(axis) => {
                    if self.shape()[axis] != size {
                        return Err(ClimAggError::ShapeMismatch {
                            message: format!(
                                "dimension '{dim}' has size {} but {size} is required",
                                self.shape()[axis]
                            ),
                        });
                    }
                    order.push(axis);
                    expanded_shape.push(size);
                }
                None => expanded_shape.push(1),
            }
        }
        if order.len() != self.dims.len() {
            return Err(ClimAggError::ShapeMismatch {
                message: format!(
                    "cannot broadcast dimensions {:?} onto {target_dims:?}",
                    self.dims
                ),
            });
        }
        let permuted = self.data.view().permuted_axes(IxDyn(&order));
        let values: Vec<f64> = permuted.iter().copied().collect();
        let expanded = ArrayD::from_shape_vec(IxDyn(&expanded_shape), values)?;
        let broadcast = expanded
            .broadcast(IxDyn(target_shape))
            .ok_or_else(|| ClimAggError::ShapeMismatch {
                message: format!("cannot broadcast {expanded_shape:?} to {target_shape:?}"),
            })?;
        Ok(broadcast.to_owned())
    }

    /// Stack arrays of identical layout along a new leading dimension
    ///
    /// Coordinates and attributes are taken from the first array.
    ///
    /// # Errors
    ///
    /// Returns an error if `arrays` is empty, layouts differ or the label count
    /// differs from the number of arrays.
    pub fn concat(arrays: &[Self], dim: &str, labels: CoordLabels) -> Result<Self> {
        let first = arrays.first().ok_or_else(|| ClimAggError::ShapeMismatch {
            message: format!("nothing to concatenate along '{dim}'"),
        })?;
        if first.has_dim(dim) {
            return Err(ClimAggError::ShapeMismatch {
                message: format!("dimension '{dim}' already exists"),
            });
        }
        for other in &arrays[1..] {
            if other.dims != first.dims || other.shape() != first.shape() {
                return Err(ClimAggError::ShapeMismatch {
                    message: format!(
                        "cannot concatenate {:?}{:?} with {:?}{:?}",
                        first.dims,
                        first.shape(),
                        other.dims,
                        other.shape()
                    ),
                });
            }
        }
        let views: Vec<_> = arrays.iter().map(|a| a.data.view()).collect();
        let data = ndarray::stack(Axis(0), &views)?;
        let mut dims = Vec::with_capacity(first.dims.len() + 1);
        dims.push(dim.to_string());
        dims.extend(first.dims.iter().cloned());
        let stacked = Self {
            data,
            dims,
            coords: first.coords.clone(),
            attrs: first.attrs.clone(),
        };
        stacked.with_dim_coord(dim, labels)
    }

    /// Serialize to a JSON string
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from a JSON string
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or inconsistent.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write as JSON to `path`, replacing any existing file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Read a JSON document written by [`LabeledArray::to_json_file`]
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Row-major position indices laid out in the shape of a coordinate
    fn coord_positions(&self, coord: &Coordinate) -> Result<ArrayD<usize>> {
        let shape = coord
            .dims
            .iter()
            .map(|d| self.dim_size(d))
            .collect::<Result<Vec<_>>>()?;
        let total: usize = shape.iter().product();
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), (0..total).collect())?)
    }
}

/// On-disk layout of a [`LabeledArray`]; missing values are stored as `null`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LabeledArrayDocument {
    dims: Vec<String>,
    shape: Vec<usize>,
    data: Vec<Option<f64>>,
    #[serde(default)]
    coords: BTreeMap<String, Coordinate>,
    #[serde(default)]
    attrs: Attributes,
}

impl From<LabeledArray> for LabeledArrayDocument {
    fn from(array: LabeledArray) -> Self {
        Self {
            shape: array.shape().to_vec(),
            data: array
                .data
                .iter()
                .map(|v| if v.is_nan() { None } else { Some(*v) })
                .collect(),
            dims: array.dims,
            coords: array.coords,
            attrs: array.attrs,
        }
    }
}

impl TryFrom<LabeledArrayDocument> for LabeledArray {
    type Error = ClimAggError;

    fn try_from(doc: LabeledArrayDocument) -> Result<Self> {
        let values: Vec<f64> = doc.data.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        let data = ArrayD::from_shape_vec(IxDyn(&doc.shape), values)?;
        Self::from_parts(data, doc.dims, doc.coords, doc.attrs)
    }
}
