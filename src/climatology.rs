//! Climatological reductions
//!
//! Every operation runs the same pipeline: resolve the time dimension, split
//! the grouping options from the reduction parameters, group, reduce, and
//! finally put seasons back into calendar order.

use crate::dims::{get_dim_key, DimAxis};
use crate::errors::{ClimAggError, Result};
use crate::grouping::{group_by, BinWidths, GroupByOptions, GroupedArray, TimeGroupKey, SEASON_ORDER};
use crate::labeled::{CoordLabels, Coordinate, LabeledArray};
use crate::statistics::{ReduceParams, Reducer};
use chrono::NaiveDate;
use ndarray::{ArrayD, Axis};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Options shared by every climatological reduction
#[derive(Debug, Clone, PartialEq)]
pub struct ClimatologyOptions {
    /// Time dimension; detected from aliases when `None`
    pub time_dim: Option<String>,
    /// Grouping key or pandas-style offset; inferred when `None`
    pub frequency: Option<String>,
    pub bin_widths: Option<BinWidths>,
    pub squeeze: bool,
    /// Parameters forwarded to the reducer
    pub params: ReduceParams,
}

impl Default for ClimatologyOptions {
    fn default() -> Self {
        Self {
            time_dim: None,
            frequency: None,
            bin_widths: None,
            squeeze: true,
            params: ReduceParams::default(),
        }
    }
}

impl ClimatologyOptions {
    #[must_use]
    pub fn frequency<S: Into<String>>(mut self, frequency: S) -> Self {
        self.frequency = Some(frequency.into());
        self
    }

    #[must_use]
    pub fn bin_widths(mut self, bin_widths: BinWidths) -> Self {
        self.bin_widths = Some(bin_widths);
        self
    }

    #[must_use]
    pub fn time_dim<S: Into<String>>(mut self, time_dim: S) -> Self {
        self.time_dim = Some(time_dim.into());
        self
    }
}

/// Canonical form of a climatology call, filled in by [`PREPROCESS`]
#[derive(Debug, Clone, PartialEq)]
pub struct ClimatologyRequest {
    pub options: ClimatologyOptions,
    pub time_dim: Option<String>,
    pub groupby: Option<GroupByOptions>,
    pub params: ReduceParams,
}

impl ClimatologyRequest {
    #[must_use]
    pub fn new(options: ClimatologyOptions) -> Self {
        Self {
            options,
            time_dim: None,
            groupby: None,
            params: ReduceParams::default(),
        }
    }
}

type PreprocessStep = fn(&LabeledArray, ClimatologyRequest) -> Result<ClimatologyRequest>;

/// Pre-processing steps, applied in order
pub const PREPROCESS: &[PreprocessStep] = &[resolve_time_dim, split_groupby_options];

/// Fill in the time dimension, detecting it by alias when not given
///
/// # Errors
///
/// Returns an error if no time dimension can be found.
pub fn resolve_time_dim(array: &LabeledArray, mut request: ClimatologyRequest) -> Result<ClimatologyRequest> {
    let time_dim = match &request.options.time_dim {
        Some(dim) => dim.clone(),
        None => get_dim_key(array, DimAxis::T)?,
    };
    request.time_dim = Some(time_dim);
    Ok(request)
}

/// Separate the grouping options from the reduction parameters
///
/// # Errors
///
/// Returns an error if the time dimension has not been resolved yet.
pub fn split_groupby_options(_array: &LabeledArray, mut request: ClimatologyRequest) -> Result<ClimatologyRequest> {
    let time_dim = request.time_dim.clone().ok_or_else(|| ClimAggError::MissingParameter {
        method: "climatology".to_string(),
        parameter: "time_dim".to_string(),
    })?;
    request.groupby = Some(GroupByOptions {
        time_dim: Some(time_dim),
        frequency: request.options.frequency.clone(),
        bin_widths: request.options.bin_widths.clone(),
        squeeze: request.options.squeeze,
    });
    request.params = request.options.params.clone();
    Ok(request)
}

/// Run the pre-processing pipeline and group the array
fn prepare(array: &LabeledArray, options: &ClimatologyOptions) -> Result<(GroupedArray, ReduceParams)> {
    let mut request = ClimatologyRequest::new(options.clone());
    for step in PREPROCESS {
        request = step(array, request)?;
    }
    let groupby = request.groupby.unwrap_or_default();
    Ok((group_by(array, &groupby)?, request.params))
}

/// Reindex a season dimension to calendar order, filling absent seasons with NaN
fn order_seasons(grouped: &GroupedArray, result: LabeledArray) -> Result<LabeledArray> {
    if grouped.key() != TimeGroupKey::Season || grouped.is_binned() {
        return Ok(result);
    }
    let dim = grouped.group_dim();
    let axis = result.axis_of(dim)?;
    let present = &result.require_coord(dim)?.labels;

    let mut shape = result.shape().to_vec();
    shape[axis] = SEASON_ORDER.len();
    let mut data = ArrayD::from_elem(shape, f64::NAN);
    for (j, season) in SEASON_ORDER.iter().enumerate() {
        if let Some(p) = (0..present.len()).find(|&p| present.label_string(p) == *season) {
            data.index_axis_mut(Axis(axis), j)
                .assign(&result.data().index_axis(Axis(axis), p));
        }
    }

    let coords: BTreeMap<String, Coordinate> = result
        .coords()
        .iter()
        .filter(|(_, c)| !c.spans(dim))
        .map(|(n, c)| (n.clone(), c.clone()))
        .collect();
    LabeledArray::from_parts(data, result.dims().to_vec(), coords, result.attrs().clone())?.with_dim_coord(
        dim,
        CoordLabels::Text(SEASON_ORDER.iter().map(ToString::to_string).collect()),
    )
}

fn reduce_climatology(array: &LabeledArray, reducer: &Reducer, options: &ClimatologyOptions) -> Result<LabeledArray> {
    let (grouped, params) = prepare(array, options)?;
    tracing::debug!(%reducer, group_dim = grouped.group_dim(), groups = grouped.len(), "climatology");
    let result = grouped.reduce(reducer, &params)?;
    order_seasons(&grouped, result)
}

/// Climatological mean
///
/// # Errors
///
/// Returns an error if grouping or reduction fails.
pub fn mean(array: &LabeledArray, options: &ClimatologyOptions) -> Result<LabeledArray> {
    reduce_climatology(array, &Reducer::Mean, options)
}

/// Climatological standard deviation
///
/// # Errors
///
/// Returns an error if grouping or reduction fails.
pub fn stdev(array: &LabeledArray, options: &ClimatologyOptions) -> Result<LabeledArray> {
    reduce_climatology(array, &Reducer::Std, options)
}

/// Climatological maximum
///
/// # Errors
///
/// Returns an error if grouping or reduction fails.
pub fn max(array: &LabeledArray, options: &ClimatologyOptions) -> Result<LabeledArray> {
    reduce_climatology(array, &Reducer::Max, options)
}

/// Climatological minimum
///
/// # Errors
///
/// Returns an error if grouping or reduction fails.
pub fn min(array: &LabeledArray, options: &ClimatologyOptions) -> Result<LabeledArray> {
    reduce_climatology(array, &Reducer::Min, options)
}

/// Climatological median, the 0.5 quantile without a quantile dimension
///
/// # Errors
///
/// Returns an error if grouping or reduction fails.
pub fn median(array: &LabeledArray, options: &ClimatologyOptions) -> Result<LabeledArray> {
    quantiles(array, &[0.5], options)?.index_dim("quantile", 0)
}

/// Climatological quantiles, stacked along a leading `quantile` dimension
///
/// # Errors
///
/// Returns an error if `qs` is empty, a value lies outside `[0, 1]`, or
/// grouping fails.
pub fn quantiles(array: &LabeledArray, qs: &[f64], options: &ClimatologyOptions) -> Result<LabeledArray> {
    let (grouped, params) = prepare(array, options)?;
    let mut slices = Vec::with_capacity(qs.len());
    for &q in qs {
        let reduced = grouped.reduce(&Reducer::Quantile, &params.clone().with_q(q))?;
        slices.push(order_seasons(&grouped, reduced)?);
    }
    LabeledArray::concat(&slices, "quantile", CoordLabels::Numeric(qs.to_vec()))
}

/// Climatological percentiles, stacked along a leading `percentile` dimension
///
/// # Errors
///
/// Returns an error if a value lies outside `[0, 100]` or grouping fails.
pub fn percentiles(array: &LabeledArray, ps: &[f64], options: &ClimatologyOptions) -> Result<LabeledArray> {
    if let Some(&p) = ps.iter().find(|p| !(0.0..=100.0).contains(*p)) {
        return Err(ClimAggError::InvalidQuantile {
            kind: "percentile",
            value: p,
            upper: 100.0,
        });
    }
    let qs: Vec<f64> = ps.iter().map(|p| p * 0.01).collect();
    quantiles(array, &qs, options)?.relabel_dim("quantile", "percentile", CoordLabels::Numeric(ps.to_vec()))
}

/// Departure of every time step from its group's climatological mean
///
/// Without a reference `climatology` the mean is computed from `array`,
/// restricted to `climatology_range` (inclusive dates) when both bounds are
/// given. The reference is grouped with the same key and bins as `array`.
/// Attributes are copied from the input and the `standard_name` and
/// `long_name` attributes are suffixed when present.
///
/// # Errors
///
/// Returns an error if grouping fails or the reference lacks a group label.
pub fn anomaly(
    array: &LabeledArray,
    climatology: Option<&LabeledArray>,
    climatology_range: (Option<NaiveDate>, Option<NaiveDate>),
    options: &ClimatologyOptions,
) -> Result<LabeledArray> {
    let (grouped, _) = prepare(array, options)?;

    let reference = match climatology {
        Some(reference) => reference.clone(),
        None => {
            let source = match climatology_range {
                (Some(start), Some(end)) => {
                    tracing::debug!(%start, %end, "restricting climatology period");
                    array.select_time(grouped.time_dim(), |t| (start..=end).contains(&t.date()))?
                }
                _ => array.clone(),
            };
            let resolved = ClimatologyOptions {
                time_dim: Some(grouped.time_dim().to_string()),
                frequency: Some(grouped.key().to_string()),
                bin_widths: grouped.bin_widths().cloned(),
                ..options.clone()
            };
            mean(&source, &resolved)?
        }
    };

    let mut attrs = array.attrs().clone();
    for (key, suffix) in [("standard_name", "_anomaly"), ("long_name", " anomaly")] {
        if let Some(JsonValue::String(name)) = attrs.get(key) {
            let renamed = format!("{name}{suffix}");
            attrs.insert(key.to_string(), JsonValue::String(renamed));
        }
    }
    Ok(grouped.subtract(&reference)?.with_attrs(attrs))
}
