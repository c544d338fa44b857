//! Parallel lane reductions
//!
//! The reduced axes are moved to the back and flattened so that every output
//! element owns one contiguous lane. Lanes are reduced across the rayon thread
//! pool and collected in order.

use crate::errors::{ClimAggError, Result};
use ndarray::{Array2, ArrayD, IxDyn};
use rayon::prelude::*;

/// Validates `axes` against the array rank: in bounds and without repeats
///
/// # Errors
///
/// Returns a statistics error describing the first offending axis.
pub fn check_axes(ndim: usize, axes: &[usize]) -> Result<()> {
    for (i, &axis) in axes.iter().enumerate() {
        if axis >= ndim {
            return Err(ClimAggError::StatisticsError(format!(
                "Axis {axis} is out of bounds for array with {ndim} dimensions"
            )));
        }
        if axes[..i].contains(&axis) {
            return Err(ClimAggError::StatisticsError(format!(
                "Axis {axis} is repeated in {axes:?}"
            )));
        }
    }
    Ok(())
}

/// Rearranges `data` into a `(kept, reduced)` matrix and returns the kept shape
fn lanes_matrix(data: &ArrayD<f64>, axes: &[usize]) -> Result<(Array2<f64>, Vec<usize>)> {
    check_axes(data.ndim(), axes)?;
    let kept: Vec<usize> = (0..data.ndim()).filter(|a| !axes.contains(a)).collect();
    let order: Vec<usize> = kept.iter().chain(axes).copied().collect();

    let kept_shape: Vec<usize> = kept.iter().map(|&a| data.shape()[a]).collect();
    let rows: usize = kept_shape.iter().product();
    let cols: usize = axes.iter().map(|&a| data.shape()[a]).product();

    let permuted = data.view().permuted_axes(IxDyn(&order));
    let values: Vec<f64> = permuted.iter().copied().collect();
    Ok((Array2::from_shape_vec((rows, cols), values)?, kept_shape))
}

/// Reduces `data` over `axes` with a lane kernel, in parallel
///
/// # Errors
///
/// Returns an error if the axes are invalid or the result cannot be reshaped.
pub fn parallel_reduce_axes<F>(data: &ArrayD<f64>, axes: &[usize], kernel: F) -> Result<ArrayD<f64>>
where
    F: Fn(&[f64]) -> f64 + Sync + Send,
{
    let (matrix, kept_shape) = lanes_matrix(data, axes)?;

    tracing::debug!(
        lanes = matrix.nrows(),
        lane_len = matrix.ncols(),
        threads = rayon::current_num_threads(),
        "reducing lanes"
    );

    let result: Vec<f64> = (0..matrix.nrows())
        .into_par_iter()
        .map(|row| {
            let lane = matrix.row(row);
            match lane.as_slice() {
                Some(values) => kernel(values),
                None => kernel(&lane.to_vec()),
            }
        })
        .collect();

    Ok(ArrayD::from_shape_vec(IxDyn(&kept_shape), result)?)
}

/// Reduces `data` over `axes` with a kernel that also receives the matching weights
///
/// `weights` must already have the shape of `data`.
///
/// # Errors
///
/// Returns an error if the axes are invalid or the shapes differ.
pub fn parallel_reduce_axes_weighted<F>(
    data: &ArrayD<f64>,
    weights: &ArrayD<f64>,
    axes: &[usize],
    kernel: F,
) -> Result<ArrayD<f64>>
where
    F: Fn(&[f64], &[f64]) -> f64 + Sync + Send,
{
    if data.shape() != weights.shape() {
        return Err(ClimAggError::ShapeMismatch {
            message: format!(
                "weights of shape {:?} do not match data of shape {:?}",
                weights.shape(),
                data.shape()
            ),
        });
    }
    let (values, kept_shape) = lanes_matrix(data, axes)?;
    let (weight_lanes, _) = lanes_matrix(weights, axes)?;

    let result: Vec<f64> = (0..values.nrows())
        .into_par_iter()
        .map(|row| {
            let lane = values.row(row).to_vec();
            let lane_weights = weight_lanes.row(row).to_vec();
            kernel(&lane, &lane_weights)
        })
        .collect();

    Ok(ArrayD::from_shape_vec(IxDyn(&kept_shape), result)?)
}
