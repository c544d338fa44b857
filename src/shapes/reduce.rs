//! Spatial reduction by geometry
//!
//! Each feature of a collection masks the input, the masked values are reduced
//! over the spatial dimensions, and the per-feature results are stacked along
//! a new leading feature dimension.

use super::geometry::GeometryCollection;
use super::mask::{mask_geometry, MaskOptions};
use crate::dims::get_spatial_dims;
use crate::errors::{ClimAggError, Result};
use crate::labeled::{CoordLabels, LabeledArray};
use crate::statistics::{reduce, ReduceParams, Reducer};
use ndarray::{ArrayD, IxDyn};
use rayon::prelude::*;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::str::FromStr;

/// Weighting applied to weighted averages
#[derive(Debug, Clone, PartialEq)]
pub enum Weights {
    /// `cos(latitude)`, proportional to cell area on a regular grid
    Latitude,
    /// Caller-supplied weights, broadcast by dimension name
    Array(LabeledArray),
}

impl FromStr for Weights {
    type Err = ClimAggError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "latitude" | "latitude_weighted" | "latitude-weighted" => Ok(Self::Latitude),
            _ => Err(ClimAggError::UnknownWeights {
                name: s.to_string(),
                valid: "latitude".to_string(),
            }),
        }
    }
}

/// Name and labels of the feature dimension
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureDim {
    /// Label features from this property when every feature has it, else by index
    Field(String),
    /// Explicit dimension name and labels
    Labels { name: String, labels: CoordLabels },
}

impl Default for FeatureDim {
    fn default() -> Self {
        Self::Field("FID".to_string())
    }
}

impl FeatureDim {
    /// Accepts a field name or a single-entry `{name: [labels...]}` object
    ///
    /// # Errors
    ///
    /// Returns [`ClimAggError::InvalidMaskDim`] for anything else.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::String(field) => Ok(Self::Field(field.clone())),
            JsonValue::Object(map) if map.len() == 1 => {
                let (name, labels) = map.iter().next().ok_or_else(|| ClimAggError::InvalidMaskDim {
                    message: "empty mapping".to_string(),
                })?;
                let values: Vec<&JsonValue> = labels
                    .as_array()
                    .ok_or_else(|| ClimAggError::InvalidMaskDim {
                        message: format!("labels for '{name}' must be an array, got {labels}"),
                    })?
                    .iter()
                    .collect();
                Ok(Self::Labels {
                    name: name.clone(),
                    labels: json_labels(&values).ok_or_else(|| ClimAggError::InvalidMaskDim {
                        message: format!("labels for '{name}' must be all numbers or all strings"),
                    })?,
                })
            }
            other => Err(ClimAggError::InvalidMaskDim {
                message: format!("got {other}"),
            }),
        }
    }
}

/// Coordinate labels from JSON values that are all numbers or all strings
fn json_labels(values: &[&JsonValue]) -> Option<CoordLabels> {
    if let Some(numbers) = values.iter().map(|v| v.as_f64()).collect::<Option<Vec<_>>>() {
        return Some(CoordLabels::Numeric(numbers));
    }
    values
        .iter()
        .map(|v| v.as_str().map(ToString::to_string))
        .collect::<Option<Vec<_>>>()
        .map(CoordLabels::Text)
}

/// Options for [`reduce_by_shape`] and [`mask_all`]
#[derive(Debug, Clone)]
pub struct ShapeReduceOptions {
    pub how: Reducer,
    pub weights: Option<Weights>,
    /// Latitude key; detected by alias when `None`
    pub lat_key: Option<String>,
    /// Longitude key; detected by alias when `None`
    pub lon_key: Option<String>,
    pub feature_dim: FeatureDim,
    /// Rasterize on a regular grid instead of point testing
    pub regular_grid: bool,
    pub params: ReduceParams,
}

impl Default for ShapeReduceOptions {
    fn default() -> Self {
        Self {
            how: Reducer::Average,
            weights: None,
            lat_key: None,
            lon_key: None,
            feature_dim: FeatureDim::default(),
            regular_grid: true,
            params: ReduceParams::default(),
        }
    }
}

impl ShapeReduceOptions {
    fn mask_options(&self) -> MaskOptions {
        MaskOptions {
            regular_grid: self.regular_grid,
            lat_key: self.lat_key.clone(),
            lon_key: self.lon_key.clone(),
        }
    }
}

/// `cos(latitude)` laid out over the latitude coordinate's dimensions
///
/// # Errors
///
/// Returns an error if the latitude coordinate is missing or not numeric.
pub fn latitude_weights(array: &LabeledArray, lat_key: &str) -> Result<LabeledArray> {
    let coord = array.require_coord(lat_key)?;
    let shape = coord
        .dims
        .iter()
        .map(|d| array.dim_size(d))
        .collect::<Result<Vec<_>>>()?;
    let values: Vec<f64> = array
        .numeric_labels(lat_key)?
        .iter()
        .map(|lat| lat.to_radians().cos())
        .collect();
    LabeledArray::new(ArrayD::from_shape_vec(IxDyn(&shape), values)?, coord.dims.clone())
}

/// Name and labels of the feature dimension for `collection`
fn feature_labels(collection: &GeometryCollection, feature_dim: &FeatureDim) -> Result<(String, CoordLabels)> {
    let n = collection.len();
    match feature_dim {
        FeatureDim::Field(field) => match collection.property_column(field) {
            Some(column) => {
                let labels = json_labels(&column)
                    .unwrap_or_else(|| CoordLabels::Text(column.iter().map(ToString::to_string).collect()));
                let mut seen = HashSet::new();
                for i in 0..labels.len() {
                    let id = labels.label_string(i);
                    if !seen.insert(id.clone()) {
                        return Err(ClimAggError::DuplicateFeatureId {
                            field: field.clone(),
                            id,
                        });
                    }
                }
                Ok((field.clone(), labels))
            }
            None => Ok((field.clone(), CoordLabels::Numeric((0..n).map(|i| i as f64).collect()))),
        },
        FeatureDim::Labels { name, labels } => {
            if labels.len() != n {
                return Err(ClimAggError::ShapeMismatch {
                    message: format!(
                        "{} labels given for dimension '{name}' but the collection has {n} features",
                        labels.len()
                    ),
                });
            }
            Ok((name.clone(), labels.clone()))
        }
    }
}

/// Stack per-feature results and attach the collection attributes
fn stack_features(
    source: &LabeledArray,
    collection: &GeometryCollection,
    feature_dim: &FeatureDim,
    per_feature: &[LabeledArray],
) -> Result<LabeledArray> {
    let (name, labels) = feature_labels(collection, feature_dim)?;
    let mut attrs = source.attrs().clone();
    attrs.extend(collection.attrs.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(LabeledArray::concat(per_feature, &name, labels)?.with_attrs(attrs))
}

/// Reduce `array` within every feature of `collection`
///
/// The spatial dimensions are replaced by a leading feature dimension whose
/// order matches the collection.
///
/// # Errors
///
/// Returns an error if keys cannot be resolved, masking or reduction fails,
/// or the feature labels are invalid.
pub fn reduce_by_shape(
    array: &LabeledArray,
    collection: &GeometryCollection,
    options: &ShapeReduceOptions,
) -> Result<LabeledArray> {
    let mask_options = options.mask_options();
    let (lat_key, lon_key) = mask_options.resolve_keys(array)?;
    let spatial_dims = get_spatial_dims(array, &lat_key, &lon_key)?;
    let spatial: Vec<&str> = spatial_dims.iter().map(String::as_str).collect();

    let mut params = options.params.clone();
    if let Some(weights) = &options.weights {
        let weights = match weights {
            Weights::Latitude => latitude_weights(array, &lat_key)?,
            Weights::Array(weights) => weights.clone(),
        };
        params.weights = Some(weights.broadcast_dims(array.dims(), array.shape())?);
    }

    tracing::debug!(
        features = collection.len(),
        how = %options.how,
        ?spatial_dims,
        regular_grid = options.regular_grid,
        "reducing by shape"
    );

    let reduced = collection
        .features
        .par_iter()
        .map(|feature| {
            let mask = mask_geometry(&feature.geometry, array, &mask_options)?;
            let masked = array.where_mask(&mask)?;
            reduce(&masked, &options.how, &spatial, &params)
        })
        .collect::<Result<Vec<_>>>()?;

    stack_features(array, collection, &options.feature_dim, &reduced)
}

/// Full-size masked copies of `array`, one per feature
///
/// Memory grows with the collection size; meant for small collections.
///
/// # Errors
///
/// Returns an error if keys cannot be resolved, masking fails, or the feature
/// labels are invalid.
pub fn mask_all(array: &LabeledArray, collection: &GeometryCollection, options: &ShapeReduceOptions) -> Result<LabeledArray> {
    let mask_options = options.mask_options();
    let masked = collection
        .features
        .par_iter()
        .map(|feature| array.where_mask(&mask_geometry(&feature.geometry, array, &mask_options)?))
        .collect::<Result<Vec<_>>>()?;
    stack_features(array, collection, &options.feature_dim, &masked)
}
