//! Statistical computations and parallel reduction operations
//!
//! This module provides the reduction registry and the NaN-aware kernels every
//! other layer of the crate reduces with.
//!
//! # Organization
//!
//! This module is organized into submodules:
//! - [`operations`]: the [`Reducer`] type, its parameters and labeled-array reduction
//! - [`registry`]: symbolic reducer names
//! - [`kernels`]: NaN-aware lane kernels and the weighted average
//! - [`parallel`]: parallel lane reduction over arbitrary axes

pub mod kernels;
pub mod operations;
pub mod parallel;
pub mod registry;

// Re-export the main types and functions for convenience
pub use kernels::nanaverage;
pub use operations::{reduce, CustomReducer, LaneFn, ReduceParams, Reducer, StatisticalReduction};
pub use parallel::{parallel_reduce_axes, parallel_reduce_axes_weighted};
pub use registry::{resolve, REDUCER_NAMES};
