//! Shape masking and spatial reduction
//!
//! - [`geometry`]: polygons, features and GeoJSON collections
//! - [`mask`]: rasterization and point-in-polygon masks
//! - [`reduce`]: per-feature spatial reductions

pub mod geometry;
pub mod mask;
pub mod reduce;

pub use geometry::{Bounds, Feature, Geometry, GeometryCollection, Polygon};
pub use mask::{
    mask_contains_points, mask_geometry, mask_iterator, rasterize, transform_from_latlon, AffineTransform, Mask,
    MaskIterator, MaskOptions,
};
pub use reduce::{latitude_weights, mask_all, reduce_by_shape, FeatureDim, ShapeReduceOptions, Weights};
