//! RuClimAgg: grouped temporal and shape-based spatial reduction of gridded data
//!
//! A Rust library for aggregating gridded, time-indexed geophysical arrays
//! (temperature, precipitation, ... over time, latitude and longitude). RuClimAgg
//! reduces along time (daily and monthly statistics, climatologies, anomalies,
//! quantiles, rolling windows) and along space (area averages within polygons).
//!
//! ## Key Features
//!
//! - **Parallel Processing**: Lane reductions and per-feature loops run on Rayon
//! - **NaN-aware Statistics**: mean, std, sum, max, min, median, quantiles and weighted averages
//! - **Temporal Grouping**: by month, season, day or week of year, with optional bins
//! - **Climatology**: means, spreads, quantiles, percentiles and anomalies per group
//! - **Shape Reduction**: rasterized or point-tested polygon masks and per-feature reductions
//!
//! ## Module Organization
//!
//! - [`labeled`]: the [`LabeledArray`] value type and its JSON form
//! - [`statistics`]: reduction registry, NaN-aware kernels and parallel reductions
//! - [`grouping`]: temporal grouping and frequency inference
//! - [`rolling`]: rolling-window reductions
//! - [`climatology`]: climatological reductions and anomalies
//! - [`temporal`]: calendar resampling
//! - [`shapes`]: geometries, masks and spatial reduction
//! - [`dims`]: dimension detection by alias
//! - [`parallel`]: parallel processing configuration
//! - [`errors`]: centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use ru_clim_agg::prelude::*;
//! use std::path::Path;
//!
//! let temperature = LabeledArray::from_json_file(Path::new("t2m.json")).unwrap();
//!
//! // Monthly climatology and the anomalies against it
//! let options = ClimatologyOptions::default().frequency("month");
//! let clim = climatology::mean(&temperature, &options).unwrap();
//! let anomalies = climatology::anomaly(&temperature, Some(&clim), (None, None), &options).unwrap();
//!
//! // Area-weighted mean within each polygon
//! let regions = GeometryCollection::from_geojson(&std::fs::read_to_string("regions.geojson").unwrap()).unwrap();
//! let shape_options = ShapeReduceOptions {
//!     weights: Some(Weights::Latitude),
//!     ..ShapeReduceOptions::default()
//! };
//! let regional = reduce_by_shape(&anomalies, &regions, &shape_options).unwrap();
//! ```

// Core modules
pub mod climatology;
pub mod dims;
pub mod errors;
pub mod grouping;
pub mod labeled;
pub mod parallel;
pub mod rolling;
pub mod shapes;
pub mod statistics;
pub mod temporal;

// Command-line interface definition, shared with the binary
pub mod cli;

// Direct re-exports for the public API
pub use errors::{ClimAggError, Result};
pub use labeled::{Attributes, CoordLabels, Coordinate, LabeledArray};
pub use parallel::{get_parallel_info, ParallelConfig, ParallelInfo};
pub use statistics::{nanaverage, reduce, resolve, ReduceParams, Reducer};

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::climatology::{self, ClimatologyOptions};
    pub use crate::dims::{get_dim_key, DimAxis};
    pub use crate::errors::{ClimAggError, Result};
    pub use crate::grouping::{group_by, BinWidths, GroupByOptions, GroupLabel, GroupedArray, TimeGroupKey};
    pub use crate::labeled::{CoordLabels, LabeledArray};
    pub use crate::parallel::ParallelConfig;
    pub use crate::rolling::{rolling_reduce, DropNaHow, RollingOptions};
    pub use crate::shapes::{reduce_by_shape, FeatureDim, GeometryCollection, ShapeReduceOptions, Weights};
    pub use crate::statistics::{reduce, ReduceParams, Reducer, StatisticalReduction};
    pub use crate::temporal::{resample, ResampleFrequency};
}
