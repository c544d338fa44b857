//! Rolling-window reductions
//!
//! Windows slide over one or more named dimensions at once. A fixed set of
//! native methods is tried first; any other name goes through the reduction
//! registry and is applied to each gathered window.

use crate::errors::{ClimAggError, Result};
use crate::labeled::LabeledArray;
use crate::statistics::{kernels, resolve, LaneFn, ReduceParams, Reducer};
use ndarray::{ArrayD, Axis, IxDyn, Zip};
use rayon::prelude::*;
use std::str::FromStr;
use std::sync::Arc;

/// Which labels to drop after rolling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropNaHow {
    /// Drop labels whose slice contains any NaN
    Any,
    /// Drop labels whose slice is entirely NaN
    All,
}

impl FromStr for DropNaHow {
    type Err = ClimAggError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "any" => Ok(Self::Any),
            "all" => Ok(Self::All),
            _ => Err(ClimAggError::Generic(format!(
                "Invalid dropna mode '{s}'. Valid options: any, all"
            ))),
        }
    }
}

/// Methods computed natively by the rolling reducer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollingMethod {
    Mean,
    Sum,
    Max,
    Min,
    Std,
    Var,
    Median,
    Count,
}

impl RollingMethod {
    /// Look up a native method, `None` if the name must go through the registry
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let method = match name {
            "mean" => Self::Mean,
            "sum" => Self::Sum,
            "max" => Self::Max,
            "min" => Self::Min,
            "std" => Self::Std,
            "var" => Self::Var,
            "median" => Self::Median,
            "count" => Self::Count,
            _ => return None,
        };
        Some(method)
    }

    fn lane_fn(self, ddof: usize) -> LaneFn {
        match self {
            Self::Mean => Arc::new(kernels::nanmean),
            Self::Sum => Arc::new(kernels::nansum),
            Self::Max => Arc::new(kernels::nanmax),
            Self::Min => Arc::new(kernels::nanmin),
            Self::Std => Arc::new(move |lane: &[f64]| kernels::nanstd(lane, ddof)),
            Self::Var => Arc::new(move |lane: &[f64]| kernels::nanvar(lane, ddof)),
            Self::Median => Arc::new(kernels::nanmedian),
            Self::Count => Arc::new(kernels::nancount),
        }
    }

    fn has_prefix_path(self) -> bool {
        matches!(self, Self::Mean | Self::Sum | Self::Count)
    }
}

/// Options for [`rolling_reduce`]
#[derive(Debug, Clone, PartialEq)]
pub struct RollingOptions {
    /// Native method name or any name known to the reduction registry
    pub how: String,
    /// `(dimension, window size)` pairs
    pub windows: Vec<(String, usize)>,
    /// Minimum number of valid samples; defaults to the full window size
    pub min_periods: Option<usize>,
    /// Label windows at their centre instead of their last position
    pub center: bool,
    pub dropna_how: Option<DropNaHow>,
    pub params: ReduceParams,
}

impl Default for RollingOptions {
    fn default() -> Self {
        Self {
            how: "mean".to_string(),
            windows: Vec::new(),
            min_periods: None,
            center: false,
            dropna_how: None,
            params: ReduceParams::default(),
        }
    }
}

impl RollingOptions {
    #[must_use]
    pub fn new<S: Into<String>>(how: S) -> Self {
        Self {
            how: how.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn window<S: Into<String>>(mut self, dim: S, size: usize) -> Self {
        self.windows.push((dim.into(), size));
        self
    }

    #[must_use]
    pub fn min_periods(mut self, min_periods: usize) -> Self {
        self.min_periods = Some(min_periods);
        self
    }

    #[must_use]
    pub fn center(mut self, center: bool) -> Self {
        self.center = center;
        self
    }

    #[must_use]
    pub fn dropna(mut self, how: DropNaHow) -> Self {
        self.dropna_how = Some(how);
        self
    }
}

/// What each gathered window is reduced with
enum WindowKernel {
    Lane(LaneFn),
    /// Weighted average; weights have the data's shape and are windowed alongside it
    Weighted(ArrayD<f64>),
}

/// A window bound to an array axis
#[derive(Debug, Clone, Copy)]
struct AxisWindow {
    axis: usize,
    size: usize,
    /// Distance from the label to the last position of its window
    offset: usize,
}

impl AxisWindow {
    /// First position of the window labelled `i`, possibly before the start
    fn start(self, i: usize) -> isize {
        i as isize + self.offset as isize - (self.size as isize - 1)
    }
}

/// Apply a rolling reduction
///
/// # Errors
///
/// Returns an error for a zero window size or a method that is neither native
/// nor registered.
pub fn rolling_reduce(array: &LabeledArray, options: &RollingOptions) -> Result<LabeledArray> {
    let mut windows = Vec::new();
    for (dim, size) in &options.windows {
        if *size == 0 {
            return Err(ClimAggError::Generic(format!(
                "Window size for dimension '{dim}' must be at least 1"
            )));
        }
        match array.axis_of(dim) {
            Ok(axis) => windows.push(AxisWindow {
                axis,
                size: *size,
                offset: if options.center { (size - 1) / 2 } else { 0 },
            }),
            Err(_) => tracing::debug!(%dim, "ignoring rolling window on absent dimension"),
        }
    }
    if windows.is_empty() {
        return Ok(array.clone());
    }

    let min_periods = options
        .min_periods
        .unwrap_or_else(|| windows.iter().map(|w| w.size).product());
    let native = RollingMethod::from_name(&options.how);
    let kernel = match native {
        Some(method) => WindowKernel::Lane(method.lane_fn(options.params.ddof)),
        None => match (resolve(&options.how)?, &options.params.weights) {
            (Reducer::Average, Some(weights)) => {
                let weights = weights
                    .broadcast(array.data().raw_dim())
                    .ok_or_else(|| ClimAggError::ShapeMismatch {
                        message: format!(
                            "weights of shape {:?} cannot be broadcast to data of shape {:?}",
                            weights.shape(),
                            array.shape()
                        ),
                    })?
                    .to_owned();
                WindowKernel::Weighted(weights)
            }
            (reducer, _) => WindowKernel::Lane(reducer.lane_fn(&options.params)?),
        },
    };

    tracing::debug!(how = %options.how, ?windows, min_periods, native = native.is_some(), "rolling reduce");

    let data = match native {
        Some(method) if method.has_prefix_path() && windows.len() == 1 => {
            rolling_prefix(array.data(), windows[0], method, min_periods)
        }
        _ => rolling_windows(array.data(), &windows, &kernel, min_periods)?,
    };

    let mut result = array.with_data(data)?;
    if let Some(how) = options.dropna_how {
        for window in &windows {
            result = drop_missing(&result, &array.dims()[window.axis], how)?;
        }
    }
    Ok(result)
}

/// Prefix-sum rolling mean, sum and count along a single axis
fn rolling_prefix(data: &ArrayD<f64>, window: AxisWindow, method: RollingMethod, min_periods: usize) -> ArrayD<f64> {
    let mut out = ArrayD::from_elem(data.raw_dim(), f64::NAN);
    Zip::from(out.lanes_mut(Axis(window.axis)))
        .and(data.lanes(Axis(window.axis)))
        .par_for_each(|mut out_lane, lane| {
            let n = lane.len();
            let mut sums = vec![0.0; n + 1];
            let mut counts = vec![0usize; n + 1];
            for (i, &v) in lane.iter().enumerate() {
                let valid = !v.is_nan();
                sums[i + 1] = sums[i] + if valid { v } else { 0.0 };
                counts[i + 1] = counts[i] + usize::from(valid);
            }
            for i in 0..n {
                let lo = window.start(i).max(0) as usize;
                let hi = (i + window.offset).min(n - 1) + 1;
                let count = counts[hi] - counts[lo];
                if count < min_periods {
                    continue;
                }
                let sum = sums[hi] - sums[lo];
                out_lane[i] = match method {
                    RollingMethod::Sum => sum,
                    RollingMethod::Count => count as f64,
                    _ if count == 0 => f64::NAN,
                    _ => sum / count as f64,
                };
            }
        });
    out
}

/// Row-major multi-index of flat position `flat`
fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for (slot, &size) in index.iter_mut().zip(shape).rev() {
        *slot = flat % size;
        flat /= size;
    }
    index
}

/// Gather every window explicitly and reduce it with `kernel`
fn rolling_windows(
    data: &ArrayD<f64>,
    windows: &[AxisWindow],
    kernel: &WindowKernel,
    min_periods: usize,
) -> Result<ArrayD<f64>> {
    let shape = data.shape().to_vec();
    let sizes: Vec<usize> = windows.iter().map(|w| w.size).collect();
    let window_len: usize = sizes.iter().product();

    let values: Vec<f64> = (0..data.len())
        .into_par_iter()
        .map(|flat| {
            let centre = unravel(flat, &shape);
            let mut lane = Vec::with_capacity(window_len);
            let mut lane_weights = Vec::new();
            for step in 0..window_len {
                let steps = unravel(step, &sizes);
                let mut position = centre.clone();
                let mut inside = true;
                for (window, k) in windows.iter().zip(steps) {
                    let p = window.start(centre[window.axis]) + k as isize;
                    if p < 0 || p as usize >= shape[window.axis] {
                        inside = false;
                        break;
                    }
                    position[window.axis] = p as usize;
                }
                lane.push(if inside { data[IxDyn(&position)] } else { f64::NAN });
                if let WindowKernel::Weighted(weights) = kernel {
                    lane_weights.push(if inside { weights[IxDyn(&position)] } else { f64::NAN });
                }
            }
            if (kernels::nancount(&lane) as usize) < min_periods {
                return f64::NAN;
            }
            match kernel {
                WindowKernel::Lane(lane_fn) => lane_fn(&lane),
                WindowKernel::Weighted(_) => kernels::nanaverage_lane(&lane, &lane_weights),
            }
        })
        .collect();

    Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?)
}

/// Drop labels along `dim` whose slice is missing according to `how`
fn drop_missing(array: &LabeledArray, dim: &str, how: DropNaHow) -> Result<LabeledArray> {
    let axis = array.axis_of(dim)?;
    let keep: Vec<usize> = array
        .data()
        .axis_iter(Axis(axis))
        .enumerate()
        .filter(|(_, slice)| match how {
            DropNaHow::Any => !slice.iter().any(|v| v.is_nan()),
            DropNaHow::All => !slice.iter().all(|v| v.is_nan()),
        })
        .map(|(i, _)| i)
        .collect();
    array.select(dim, &keep)
}
