//! Centralized error handling for RuClimAgg
//!
//! Every fallible operation in the crate returns [`Result`], carrying a
//! [`ClimAggError`] that names the offending value and, where a fixed set of
//! valid inputs exists, lists it.

use thiserror::Error;

/// Main error type for RuClimAgg operations
#[derive(Debug, Error)]
pub enum ClimAggError {
    /// A reducer name that the registry does not know
    #[error("Unknown reduction method '{name}'. Valid methods are: {valid}")]
    UnknownReducer { name: String, valid: String },

    /// The time frequency could not be inferred from the time coordinate
    #[error(
        "Unable to infer time frequency from data ({reason}); please pass the 'frequency' argument explicitly"
    )]
    FrequencyInference { reason: String },

    /// A frequency key that cannot be used to group the time axis
    #[error("Invalid frequency '{frequency}'. Valid frequencies are: {valid}")]
    InvalidFrequency { frequency: String, valid: String },

    /// The feature dimension specification is malformed
    #[error(
        "Unrecognised format for feature dimension ({message}); expected a field name or a single-entry name -> labels mapping"
    )]
    InvalidMaskDim { message: String },

    /// Latitude and longitude coordinates are laid out inconsistently
    #[error(
        "Latitude '{lat_key}' has dimensions {lat_dims:?} but longitude '{lon_key}' has dimensions {lon_dims:?}; they must share dimensions or each be one-dimensional over themselves"
    )]
    GeometryDimensionMismatch {
        lat_key: String,
        lat_dims: Vec<String>,
        lon_key: String,
        lon_dims: Vec<String>,
    },

    /// A weighting scheme name that is not recognised
    #[error("Unknown weighting scheme '{name}'. Valid schemes are: {valid}")]
    UnknownWeights { name: String, valid: String },

    /// Statistics computation errors
    #[error("Statistics computation error: {0}")]
    StatisticsError(String),

    /// Dimension not found in an array
    #[error("Dimension '{dim}' not found in array with dimensions {available:?}")]
    DimensionNotFound { dim: String, available: Vec<String> },

    /// Coordinate not found in an array
    #[error("Coordinate '{name}' not found")]
    CoordinateNotFound { name: String },

    /// Shapes or lengths that do not line up
    #[error("Shape mismatch: {message}")]
    ShapeMismatch { message: String },

    /// Bin edges or widths that cannot partition a frequency
    #[error("Invalid bins: {message}")]
    InvalidBins { message: String },

    /// Quantile or percentile outside its valid range
    #[error("Invalid {kind} {value}: must lie within [0, {upper}]")]
    InvalidQuantile { kind: &'static str, value: f64, upper: f64 },

    /// A reducer was selected without a parameter it requires
    #[error("Reduction method '{method}' requires the '{parameter}' parameter")]
    MissingParameter { method: String, parameter: String },

    /// A group label absent from a reference array
    #[error("Label '{label}' not found along dimension '{dim}'")]
    LabelNotFound { label: String, dim: String },

    /// Feature identifiers that would not make a valid coordinate
    #[error("Feature identifier '{id}' from field '{field}' is not unique")]
    DuplicateFeatureId { field: String, id: String },

    /// Grid coordinates that cannot define a raster
    #[error("Invalid grid: {message}")]
    InvalidGrid { message: String },

    /// Malformed geometry input
    #[error("Invalid geometry: {message}")]
    InvalidGeometry { message: String },

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    ArrayError(#[from] ndarray::ShapeError),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Generic error for messages without a dedicated variant
    #[error("{0}")]
    Generic(String),
}

impl From<String> for ClimAggError {
    fn from(error: String) -> Self {
        ClimAggError::Generic(error)
    }
}

impl From<&str> for ClimAggError {
    fn from(error: &str) -> Self {
        ClimAggError::Generic(error.to_string())
    }
}

/// Result type alias for RuClimAgg operations
pub type Result<T> = std::result::Result<T, ClimAggError>;
