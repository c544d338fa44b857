//! NaN-aware reduction kernels
//!
//! Each kernel reduces one lane of values to a scalar, skipping NaN entries
//! with the conventions of NumPy's `nan*` family: an all-NaN lane sums to zero
//! and yields NaN for every other statistic.

use super::parallel::{parallel_reduce_axes, parallel_reduce_axes_weighted};
use crate::errors::{ClimAggError, Result};
use ndarray::ArrayD;

fn valid(lane: &[f64]) -> impl Iterator<Item = f64> + '_ {
    lane.iter().copied().filter(|v| !v.is_nan())
}

/// Number of non-NaN values
#[must_use]
pub fn nancount(lane: &[f64]) -> f64 {
    valid(lane).count() as f64
}

/// Sum of non-NaN values, zero for an all-NaN lane
#[must_use]
pub fn nansum(lane: &[f64]) -> f64 {
    valid(lane).sum()
}

/// Mean of non-NaN values
#[must_use]
pub fn nanmean(lane: &[f64]) -> f64 {
    let (sum, count) = valid(lane).fold((0.0_f64, 0_usize), |(s, c), v| (s + v, c + 1));
    if count > 0 {
        sum / count as f64
    } else {
        f64::NAN
    }
}

/// Variance of non-NaN values with `ddof` delta degrees of freedom
#[must_use]
pub fn nanvar(lane: &[f64], ddof: usize) -> f64 {
    let count = valid(lane).count();
    if count <= ddof {
        return f64::NAN;
    }
    let mean = nanmean(lane);
    let squares: f64 = valid(lane).map(|v| (v - mean).powi(2)).sum();
    squares / (count - ddof) as f64
}

/// Standard deviation of non-NaN values with `ddof` delta degrees of freedom
#[must_use]
pub fn nanstd(lane: &[f64], ddof: usize) -> f64 {
    nanvar(lane, ddof).sqrt()
}

#[must_use]
pub fn nanmax(lane: &[f64]) -> f64 {
    valid(lane).fold(f64::NAN, |acc, v| if acc.is_nan() || v > acc { v } else { acc })
}

#[must_use]
pub fn nanmin(lane: &[f64]) -> f64 {
    valid(lane).fold(f64::NAN, |acc, v| if acc.is_nan() || v < acc { v } else { acc })
}

/// Quantile `q` in `[0, 1]` of non-NaN values, linearly interpolated
///
/// A `q` outside `[0, 1]` yields NaN.
#[must_use]
pub fn nanquantile(lane: &[f64], q: f64) -> f64 {
    if !(0.0..=1.0).contains(&q) {
        return f64::NAN;
    }
    let mut sorted: Vec<f64> = valid(lane).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(f64::total_cmp);
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

#[must_use]
pub fn nanmedian(lane: &[f64]) -> f64 {
    nanquantile(lane, 0.5)
}

/// Weighted mean of one lane
///
/// Pairs with a NaN value or NaN weight are skipped. A lane whose remaining
/// weights sum to zero yields NaN.
#[must_use]
pub fn nanaverage_lane(lane: &[f64], weights: &[f64]) -> f64 {
    let mut numerator = 0.0_f64;
    let mut denominator = 0.0_f64;
    for (&value, &weight) in lane.iter().zip(weights) {
        if value.is_nan() || weight.is_nan() {
            continue;
        }
        numerator += value * weight;
        denominator += weight;
    }
    if denominator == 0.0 || denominator.is_nan() {
        f64::NAN
    } else {
        numerator / denominator
    }
}

/// NaN-ignoring, optionally weighted mean over `axes`
///
/// Without weights this is a NaN-ignoring mean. With weights, the weights are
/// broadcast to the data shape, excluded wherever the data is NaN and
/// normalised by their per-lane sum before the weighted sum is taken.
/// `axes = None` reduces every axis to a 0-dimensional result.
///
/// # Errors
///
/// Returns an error if an axis is out of bounds or the weights cannot be
/// broadcast to the data shape.
pub fn nanaverage(
    data: &ArrayD<f64>,
    weights: Option<&ArrayD<f64>>,
    axes: Option<&[usize]>,
) -> Result<ArrayD<f64>> {
    let all_axes: Vec<usize> = (0..data.ndim()).collect();
    let axes = axes.unwrap_or(&all_axes);
    match weights {
        None => parallel_reduce_axes(data, axes, nanmean),
        Some(weights) => {
            let broadcast = weights
                .broadcast(data.raw_dim())
                .ok_or_else(|| ClimAggError::ShapeMismatch {
                    message: format!(
                        "weights of shape {:?} cannot be broadcast to data of shape {:?}",
                        weights.shape(),
                        data.shape()
                    ),
                })?
                .to_owned();
            parallel_reduce_axes_weighted(data, &broadcast, axes, nanaverage_lane)
        }
    }
}
