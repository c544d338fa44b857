//! Core statistical operations and traits
//!
//! [`Reducer`] is the single calling convention shared by every reduction:
//! `apply(data, axes, params)`. Callers never need to know which statistic
//! they were handed.

use super::kernels;
use super::parallel::{check_axes, parallel_reduce_axes};
use crate::errors::{ClimAggError, Result};
use crate::labeled::{Coordinate, LabeledArray};
use ndarray::ArrayD;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Lane function used by windowed and custom reductions
pub type LaneFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// A caller-supplied reduction over one lane of values
#[derive(Clone)]
pub struct CustomReducer {
    name: String,
    func: LaneFn,
}

impl CustomReducer {
    pub fn new<N, F>(name: N, func: F) -> Self
    where
        N: Into<String>,
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for CustomReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomReducer").field("name", &self.name).finish()
    }
}

/// Supported reductions
#[derive(Debug, Clone)]
pub enum Reducer {
    /// NaN-ignoring arithmetic mean
    Mean,
    /// NaN-ignoring standard deviation (`ddof` from the parameters)
    Std,
    /// NaN-ignoring sum
    Sum,
    /// NaN-ignoring maximum
    Max,
    /// NaN-ignoring minimum
    Min,
    /// NaN-ignoring median
    Median,
    /// NaN-ignoring quantile, `q` in `[0, 1]`
    Quantile,
    /// NaN-ignoring percentile, `q` in `[0, 100]`
    Percentile,
    /// NaN-ignoring weighted average
    Average,
    /// Caller-supplied lane reduction
    Custom(CustomReducer),
}

impl Reducer {
    /// Get the string representation of the reduction
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Mean => "mean",
            Self::Std => "std",
            Self::Sum => "sum",
            Self::Max => "max",
            Self::Min => "min",
            Self::Median => "median",
            Self::Quantile => "quantile",
            Self::Percentile => "percentile",
            Self::Average => "average",
            Self::Custom(custom) => &custom.name,
        }
    }

    /// Build the lane kernel for this reducer with `params` bound in
    ///
    /// Weighted [`Reducer::Average`] has no lane kernel: its weights line up
    /// with the data, not with a lane. Use [`Reducer::apply`] instead.
    ///
    /// # Errors
    ///
    /// Returns an error if a required parameter is missing or out of range, or
    /// for a weighted average.
    pub fn lane_fn(&self, params: &ReduceParams) -> Result<LaneFn> {
        let ddof = params.ddof;
        let kernel: LaneFn = match self {
            Self::Mean => Arc::new(kernels::nanmean),
            Self::Std => Arc::new(move |lane: &[f64]| kernels::nanstd(lane, ddof)),
            Self::Sum => Arc::new(kernels::nansum),
            Self::Max => Arc::new(kernels::nanmax),
            Self::Min => Arc::new(kernels::nanmin),
            Self::Median => Arc::new(kernels::nanmedian),
            Self::Quantile | Self::Percentile => {
                let q = self.probability(params)?;
                Arc::new(move |lane: &[f64]| kernels::nanquantile(lane, q))
            }
            Self::Average => match &params.weights {
                None => Arc::new(kernels::nanmean),
                Some(weights) => {
                    return Err(ClimAggError::ShapeMismatch {
                        message: format!(
                            "weights of shape {:?} cannot be bound to a lane kernel; weighted averages need weights gathered per lane",
                            weights.shape()
                        ),
                    })
                }
            },
            Self::Custom(custom) => Arc::clone(&custom.func),
        };
        Ok(kernel)
    }

    /// Reduce `data` over `axes`
    ///
    /// # Errors
    ///
    /// Returns an error if an axis is invalid, a required parameter is missing
    /// or weights cannot be broadcast.
    pub fn apply(&self, data: &ArrayD<f64>, axes: &[usize], params: &ReduceParams) -> Result<ArrayD<f64>> {
        check_axes(data.ndim(), axes)?;
        match self {
            Self::Average => kernels::nanaverage(data, params.weights.as_ref(), Some(axes)),
            _ => {
                let kernel = self.lane_fn(params)?;
                parallel_reduce_axes(data, axes, move |lane| kernel(lane))
            }
        }
    }

    /// The quantile probability in `[0, 1]` requested through `params.q`
    fn probability(&self, params: &ReduceParams) -> Result<f64> {
        let q = params.q.ok_or_else(|| ClimAggError::MissingParameter {
            method: self.as_str().to_string(),
            parameter: "q".to_string(),
        })?;
        let (kind, upper) = match self {
            Self::Percentile => ("percentile", 100.0),
            _ => ("quantile", 1.0),
        };
        if !(0.0..=upper).contains(&q) {
            return Err(ClimAggError::InvalidQuantile {
                kind,
                value: q,
                upper,
            });
        }
        Ok(q / upper)
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra parameters accepted by reductions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReduceParams {
    /// Quantile (`[0, 1]`) or percentile (`[0, 100]`) to compute
    pub q: Option<f64>,
    /// Delta degrees of freedom for the standard deviation
    pub ddof: usize,
    /// Weights for [`Reducer::Average`], broadcastable to the reduced data
    pub weights: Option<ArrayD<f64>>,
}

impl ReduceParams {
    #[must_use]
    pub fn with_q(mut self, q: f64) -> Self {
        self.q = Some(q);
        self
    }

    #[must_use]
    pub fn with_ddof(mut self, ddof: usize) -> Self {
        self.ddof = ddof;
        self
    }

    #[must_use]
    pub fn with_weights(mut self, weights: ArrayD<f64>) -> Self {
        self.weights = Some(weights);
        self
    }
}

/// Trait for types that can perform statistical reductions along axes
pub trait StatisticalReduction {
    /// Perform a reduction along the specified axes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - An axis is out of bounds for the array
    /// - The reducer needs a parameter that `params` does not provide
    fn reduce_along_axes(&self, axes: &[usize], reducer: &Reducer, params: &ReduceParams) -> Result<ArrayD<f64>>;
}

impl StatisticalReduction for ArrayD<f64> {
    fn reduce_along_axes(&self, axes: &[usize], reducer: &Reducer, params: &ReduceParams) -> Result<ArrayD<f64>> {
        reducer.apply(self, axes, params)
    }
}

/// Reduce a labeled array over the named dimensions
///
/// Reduced dimensions and every coordinate spanning them are dropped; the
/// attributes are kept.
///
/// # Errors
///
/// Returns an error if a dimension is unknown or the reduction fails.
pub fn reduce(array: &LabeledArray, how: &Reducer, dims: &[&str], params: &ReduceParams) -> Result<LabeledArray> {
    let axes = dims
        .iter()
        .map(|d| array.axis_of(d))
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(how = %how, ?dims, "reducing labeled array");

    let data = array.data().reduce_along_axes(&axes, how, params)?;
    let kept_dims: Vec<String> = array
        .dims()
        .iter()
        .filter(|d| !dims.contains(&d.as_str()))
        .cloned()
        .collect();
    let coords: BTreeMap<String, Coordinate> = array
        .coords()
        .iter()
        .filter(|(_, c)| !c.dims.iter().any(|d| dims.contains(&d.as_str())))
        .map(|(n, c)| (n.clone(), c.clone()))
        .collect();

    LabeledArray::from_parts(data, kept_dims, coords, array.attrs().clone())
}
