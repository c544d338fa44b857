//! Temporal grouping engine
//!
//! Partitions a time-indexed [`LabeledArray`] into groups keyed by a calendar
//! component of its timestamps (month, season, day of year, ...) or by binned
//! intervals of such a component.
//!
//! When no frequency is given it is inferred from the spacing of the time
//! coordinate and translated from pandas-style offsets (`"D"`, `"W"`, `"M"`,
//! with an optional multiplier such as `"3D"`) to a grouping key. A multiplier
//! becomes the bin width.

use crate::dims::{get_dim_key, DimAxis};
use crate::errors::{ClimAggError, Result};
use crate::labeled::{CoordLabels, Coordinate, LabeledArray};
use crate::statistics::{ReduceParams, Reducer};
use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use ndarray::{ArrayD, Axis};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Calendar order of the seasons
pub const SEASON_ORDER: [&str; 4] = ["DJF", "MAM", "JJA", "SON"];

/// Pandas offset aliases that translate to a grouping key
pub const PANDAS_FREQUENCIES: &[(&str, TimeGroupKey)] = &[
    ("D", TimeGroupKey::DayOfYear),
    ("W", TimeGroupKey::WeekOfYear),
    ("M", TimeGroupKey::Month),
    ("MS", TimeGroupKey::Month),
    ("ME", TimeGroupKey::Month),
];

/// Calendar component a time axis can be grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeGroupKey {
    DayOfYear,
    WeekOfYear,
    Month,
    Season,
    Year,
    Day,
    Hour,
    DayOfWeek,
    Quarter,
}

impl TimeGroupKey {
    pub const ALL: [Self; 9] = [
        Self::DayOfYear,
        Self::WeekOfYear,
        Self::Month,
        Self::Season,
        Self::Year,
        Self::Day,
        Self::Hour,
        Self::DayOfWeek,
        Self::Quarter,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DayOfYear => "dayofyear",
            Self::WeekOfYear => "weekofyear",
            Self::Month => "month",
            Self::Season => "season",
            Self::Year => "year",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::DayOfWeek => "dayofweek",
            Self::Quarter => "quarter",
        }
    }

    /// Largest value of the key, for keys that can be binned
    #[must_use]
    pub const fn max_bins(self) -> Option<usize> {
        match self {
            Self::DayOfYear => Some(366),
            Self::WeekOfYear => Some(53),
            Self::Month => Some(12),
            Self::Season => Some(4),
            _ => None,
        }
    }

    /// Group label of a timestamp
    #[must_use]
    pub fn label(self, t: &NaiveDateTime) -> GroupLabel {
        match self {
            Self::Season => GroupLabel::Text(season_of(t.month()).to_string()),
            _ => GroupLabel::Int(self.ordinal(t)),
        }
    }

    /// Numeric value of the key for a timestamp; seasons count 1..=4 from DJF
    #[must_use]
    pub fn ordinal(self, t: &NaiveDateTime) -> i64 {
        match self {
            Self::DayOfYear => i64::from(t.ordinal()),
            Self::WeekOfYear => i64::from(t.iso_week().week()),
            Self::Month => i64::from(t.month()),
            Self::Season => i64::from(t.month() % 12 / 3 + 1),
            Self::Year => i64::from(t.year()),
            Self::Day => i64::from(t.day()),
            Self::Hour => i64::from(t.hour()),
            Self::DayOfWeek => i64::from(t.weekday().num_days_from_monday()),
            Self::Quarter => i64::from((t.month() - 1) / 3 + 1),
        }
    }

    fn valid_names() -> String {
        Self::ALL.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for TimeGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeGroupKey {
    type Err = ClimAggError;

    fn from_str(s: &str) -> Result<Self> {
        let key = match s {
            "dayofyear" => Self::DayOfYear,
            "weekofyear" | "week" => Self::WeekOfYear,
            "month" => Self::Month,
            "season" => Self::Season,
            "year" => Self::Year,
            "day" => Self::Day,
            "hour" => Self::Hour,
            "dayofweek" => Self::DayOfWeek,
            "quarter" => Self::Quarter,
            _ => {
                return Err(ClimAggError::InvalidFrequency {
                    frequency: s.to_string(),
                    valid: Self::valid_names(),
                })
            }
        };
        Ok(key)
    }
}

/// Meteorological season of a month (1-based)
#[must_use]
pub fn season_of(month: u32) -> &'static str {
    SEASON_ORDER[(month % 12 / 3) as usize]
}

/// Key of one group
#[derive(Debug, Clone, PartialEq)]
pub enum GroupLabel {
    Int(i64),
    Text(String),
    /// Right-closed interval `(left, right]`
    Interval { left: f64, right: f64 },
}

impl GroupLabel {
    /// Ordering used to sort groups: numbers numerically, text lexically,
    /// intervals by their left edge
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Interval { left: a, .. }, Self::Interval { left: b, .. }) => a.total_cmp(b),
            _ => self.to_string().cmp(&other.to_string()),
        }
    }
}

impl fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Interval { left, right } => write!(f, "({left}, {right}]"),
        }
    }
}

/// Bin specification for binned grouping
#[derive(Debug, Clone, PartialEq)]
pub enum BinWidths {
    /// Uniform width in units of the grouping key
    Width(usize),
    /// Explicit, strictly increasing edges
    Edges(Vec<f64>),
}

impl BinWidths {
    /// Bin edges for `key`
    ///
    /// A uniform width produces `0, width, 2*width, ...` up to the key's maximum.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero width, a key without a maximum, or edges
    /// that are too few or not strictly increasing.
    pub fn edges(&self, key: TimeGroupKey) -> Result<Vec<f64>> {
        match self {
            Self::Width(0) => Err(ClimAggError::InvalidBins {
                message: "bin width must be at least 1".to_string(),
            }),
            Self::Width(width) => {
                let max = key.max_bins().ok_or_else(|| ClimAggError::InvalidFrequency {
                    frequency: key.to_string(),
                    valid: "dayofyear, weekofyear, month, season (for uniform bin widths)".to_string(),
                })?;
                Ok((0..=max).step_by(*width).map(|e| e as f64).collect())
            }
            Self::Edges(edges) => {
                if edges.len() < 2 {
                    return Err(ClimAggError::InvalidBins {
                        message: format!("at least two edges are required, got {edges:?}"),
                    });
                }
                if edges.windows(2).any(|w| w[1] <= w[0]) {
                    return Err(ClimAggError::InvalidBins {
                        message: format!("edges must be strictly increasing, got {edges:?}"),
                    });
                }
                Ok(edges.clone())
            }
        }
    }
}

/// Options for [`group_by`]; construct per call
#[derive(Debug, Clone, PartialEq)]
pub struct GroupByOptions {
    /// Time dimension; detected from aliases when `None`
    pub time_dim: Option<String>,
    /// Grouping key or pandas-style offset; inferred when `None`
    pub frequency: Option<String>,
    pub bin_widths: Option<BinWidths>,
    /// Drop the time dimension from single-member groups in [`GroupedArray::groups`]
    pub squeeze: bool,
}

impl Default for GroupByOptions {
    fn default() -> Self {
        Self {
            time_dim: None,
            frequency: None,
            bin_widths: None,
            squeeze: true,
        }
    }
}

impl GroupByOptions {
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

/// Split a pandas-style offset into a grouping key name and a bin width
///
/// The leading integer multiplier, if any and other than 1, becomes the bin
/// width. Offsets that are not in [`PANDAS_FREQUENCIES`] are returned
/// unchanged without a width.
#[must_use]
pub fn pandas_frequency_and_bins(frequency: &str) -> (String, Option<usize>) {
    let trimmed = frequency.trim();
    let unit = trimmed.trim_start_matches(|c: char| c.is_ascii_digit());
    let multiplier = &trimmed[..trimmed.len() - unit.len()];
    match PANDAS_FREQUENCIES.iter().find(|(alias, _)| *alias == unit.trim()) {
        Some((_, key)) => (
            key.as_str().to_string(),
            multiplier.parse::<usize>().ok().filter(|m| *m != 1),
        ),
        None => (frequency.to_string(), None),
    }
}

fn count_prefix(count: i64, unit: &str) -> String {
    if count == 1 {
        unit.to_string()
    } else {
        format!("{count}{unit}")
    }
}

fn month_index(t: &NaiveDateTime) -> i64 {
    i64::from(t.year()) * 12 + i64::from(t.month0())
}

fn is_month_end(t: &NaiveDateTime) -> bool {
    (t.date() + Duration::days(1)).day() == 1
}

/// Infer a pandas-style offset from regularly spaced timestamps
///
/// Calendar rules (yearly and monthly spacing anchored at the start or end
/// of the month) are tried before fixed spacing, which yields `W`, `D`, `H`,
/// `min` or `S` with a multiplier.
///
/// # Errors
///
/// Returns [`ClimAggError::FrequencyInference`] for fewer than three samples,
/// unordered or duplicate timestamps, and irregular spacing.
pub fn infer_frequency(times: &[NaiveDateTime]) -> Result<String> {
    if times.len() < 3 {
        return Err(ClimAggError::FrequencyInference {
            reason: format!("at least 3 time samples are required, got {}", times.len()),
        });
    }
    let deltas: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    if deltas.iter().any(|d| *d <= Duration::zero()) {
        return Err(ClimAggError::FrequencyInference {
            reason: "time coordinate is not strictly increasing".to_string(),
        });
    }

    let day = Duration::days(1);
    let first = deltas[0];
    let multiple_of_day = first.num_seconds() % day.num_seconds() == 0;

    if multiple_of_day && times.iter().all(|t| t.time() == times[0].time()) {
        let month_steps: Vec<i64> = times.windows(2).map(|w| month_index(&w[1]) - month_index(&w[0])).collect();
        let uniform_months = month_steps.iter().all(|m| *m == month_steps[0]) && month_steps[0] > 0;
        let anchor = if times.iter().all(|t| t.day() == 1) {
            Some("S")
        } else if times.iter().all(is_month_end) {
            Some("")
        } else {
            None
        };
        if let (true, Some(anchor)) = (uniform_months, anchor) {
            let months = month_steps[0];
            return Ok(if months % 12 == 0 {
                count_prefix(months / 12, &format!("Y{anchor}"))
            } else {
                count_prefix(months, &format!("M{anchor}"))
            });
        }
    }

    if deltas.iter().any(|d| *d != first) {
        return Err(ClimAggError::FrequencyInference {
            reason: "time coordinate is irregularly spaced".to_string(),
        });
    }

    let seconds = first.num_seconds();
    let rule = if multiple_of_day {
        let days = first.num_days();
        if days % 7 == 0 {
            count_prefix(days / 7, "W")
        } else {
            count_prefix(days, "D")
        }
    } else if seconds % 3600 == 0 {
        count_prefix(seconds / 3600, "H")
    } else if seconds % 60 == 0 {
        count_prefix(seconds / 60, "min")
    } else {
        count_prefix(seconds, "S")
    };
    Ok(rule)
}

/// A time-indexed array partitioned into labelled groups
#[derive(Debug, Clone)]
pub struct GroupedArray {
    source: LabeledArray,
    time_dim: String,
    group_dim: String,
    key: TimeGroupKey,
    bin_widths: Option<BinWidths>,
    labels: Vec<GroupLabel>,
    members: Vec<Vec<usize>>,
    squeeze: bool,
}

/// Partition `array` along its time dimension
///
/// # Errors
///
/// Returns an error if the time dimension cannot be found, the frequency
/// cannot be inferred or is not a supported grouping key, or the bins are invalid.
pub fn group_by(array: &LabeledArray, options: &GroupByOptions) -> Result<GroupedArray> {
    let time_dim = match &options.time_dim {
        Some(dim) => dim.clone(),
        None => get_dim_key(array, DimAxis::T)?,
    };
    let times = array.time_labels(&time_dim)?;

    let raw = match &options.frequency {
        Some(frequency) => frequency.clone(),
        None => infer_frequency(times)?,
    };
    let (frequency, multiplier) = pandas_frequency_and_bins(&raw);
    let bin_widths = options.bin_widths.clone().or(multiplier.map(BinWidths::Width));
    let key: TimeGroupKey = frequency.parse()?;

    tracing::debug!(%time_dim, %raw, %key, ?bin_widths, "grouping time axis");

    let mut groups: Vec<(GroupLabel, Vec<usize>)> = Vec::new();
    let mut push = |label: GroupLabel, index: usize| match groups.iter_mut().find(|(l, _)| *l == label) {
        Some((_, members)) => members.push(index),
        None => groups.push((label, vec![index])),
    };

    let group_dim = match &bin_widths {
        Some(bins) => {
            let edges = bins.edges(key)?;
            for (index, t) in times.iter().enumerate() {
                let value = key.ordinal(t) as f64;
                if let Some(bin) = edges.windows(2).position(|e| e[0] < value && value <= e[1]) {
                    push(
                        GroupLabel::Interval {
                            left: edges[bin],
                            right: edges[bin + 1],
                        },
                        index,
                    );
                }
            }
            format!("{key}_bins")
        }
        None => {
            for (index, t) in times.iter().enumerate() {
                push(key.label(t), index);
            }
            key.to_string()
        }
    };

    groups.sort_by(|a, b| a.0.compare(&b.0));
    let (labels, members) = groups.into_iter().unzip();

    Ok(GroupedArray {
        source: array.clone(),
        time_dim,
        group_dim,
        key,
        bin_widths,
        labels,
        members,
        squeeze: options.squeeze,
    })
}

/// Reduce each member list of `axis` to one slice and stack the slices along `axis`
pub(crate) fn reduce_members(
    source: &LabeledArray,
    axis: usize,
    members: &[Vec<usize>],
    reducer: &Reducer,
    params: &ReduceParams,
) -> Result<ArrayD<f64>> {
    let full_weights = params
        .weights
        .as_ref()
        .filter(|w| w.shape() == source.shape());
    let mut slices = Vec::with_capacity(members.len());
    for indices in members {
        let subset = source.data().select(Axis(axis), indices);
        let group_params = match full_weights {
            Some(weights) => ReduceParams {
                weights: Some(weights.select(Axis(axis), indices)),
                ..params.clone()
            },
            None => params.clone(),
        };
        let reduced = reducer.apply(&subset, &[axis], &group_params)?;
        slices.push(reduced.insert_axis(Axis(axis)));
    }
    let views: Vec<_> = slices.iter().map(|s| s.view()).collect();
    Ok(ndarray::concatenate(Axis(axis), &views)?)
}

impl GroupedArray {
    #[must_use]
    pub fn source(&self) -> &LabeledArray {
        &self.source
    }

    #[must_use]
    pub fn time_dim(&self) -> &str {
        &self.time_dim
    }

    /// Name of the dimension that replaces time after reduction
    #[must_use]
    pub fn group_dim(&self) -> &str {
        &self.group_dim
    }

    #[must_use]
    pub fn key(&self) -> TimeGroupKey {
        self.key
    }

    #[must_use]
    pub fn is_binned(&self) -> bool {
        self.bin_widths.is_some()
    }

    /// Bins in effect, including a width taken from a frequency multiplier
    #[must_use]
    pub fn bin_widths(&self) -> Option<&BinWidths> {
        self.bin_widths.as_ref()
    }

    #[must_use]
    pub fn labels(&self) -> &[GroupLabel] {
        &self.labels
    }

    /// Time indices belonging to each group, aligned with [`GroupedArray::labels`]
    #[must_use]
    pub fn members(&self) -> &[Vec<usize>] {
        &self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Group labels as coordinate labels: integers become numeric, intervals text
    #[must_use]
    pub fn group_coord_labels(&self) -> CoordLabels {
        if self.labels.iter().all(|l| matches!(l, GroupLabel::Int(_))) {
            CoordLabels::Numeric(
                self.labels
                    .iter()
                    .map(|l| match l {
                        GroupLabel::Int(v) => *v as f64,
                        _ => f64::NAN,
                    })
                    .collect(),
            )
        } else {
            CoordLabels::Text(self.labels.iter().map(ToString::to_string).collect())
        }
    }

    /// Materialise every group as its own array
    ///
    /// With `squeeze`, single-member groups lose the time dimension.
    ///
    /// # Errors
    ///
    /// Returns an error if selection fails.
    pub fn groups(&self) -> Result<Vec<(GroupLabel, LabeledArray)>> {
        self.labels
            .iter()
            .zip(&self.members)
            .map(|(label, indices)| {
                let array = if self.squeeze && indices.len() == 1 {
                    self.source.index_dim(&self.time_dim, indices[0])?
                } else {
                    self.source.select(&self.time_dim, indices)?
                };
                Ok((label.clone(), array))
            })
            .collect()
    }

    /// Reduce every group over time
    ///
    /// The time dimension is replaced in place by the group dimension. Weights
    /// in `params` with the full shape of the source are subset per group.
    ///
    /// # Errors
    ///
    /// Returns an error if the reduction fails.
    pub fn reduce(&self, reducer: &Reducer, params: &ReduceParams) -> Result<LabeledArray> {
        let axis = self.source.axis_of(&self.time_dim)?;
        let data = reduce_members(&self.source, axis, &self.members, reducer, params)?;

        let mut dims = self.source.dims().to_vec();
        dims[axis] = self.group_dim.clone();
        let coords: BTreeMap<String, Coordinate> = self
            .source
            .coords()
            .iter()
            .filter(|(_, c)| !c.spans(&self.time_dim))
            .map(|(n, c)| (n.clone(), c.clone()))
            .collect();

        LabeledArray::from_parts(data, dims, coords, self.source.attrs().clone())?
            .with_dim_coord(self.group_dim.clone(), self.group_coord_labels())
    }

    /// Per-group quantile `q` in `[0, 1]`
    ///
    /// # Errors
    ///
    /// Returns an error if `q` is out of range.
    pub fn quantile(&self, q: f64) -> Result<LabeledArray> {
        self.reduce(&Reducer::Quantile, &ReduceParams::default().with_q(q))
    }

    /// Subtract a per-group reference from every time step
    ///
    /// `reference` must carry this grouping's dimension with matching labels;
    /// its remaining dimensions are broadcast against the source's non-time
    /// dimensions. Time steps outside every group become NaN. The result keeps
    /// the source layout plus a coordinate recording each step's group.
    ///
    /// # Errors
    ///
    /// Returns [`ClimAggError::LabelNotFound`] if a group is missing from the
    /// reference, or a shape error if the layouts are incompatible.
    pub fn subtract(&self, reference: &LabeledArray) -> Result<LabeledArray> {
        let axis = self.source.axis_of(&self.time_dim)?;
        let ref_labels = &reference.require_coord(&self.group_dim)?.labels;
        let slice_dims: Vec<String> = self
            .source
            .dims()
            .iter()
            .filter(|d| **d != self.time_dim)
            .cloned()
            .collect();
        let slice_shape: Vec<usize> = self
            .source
            .shape()
            .iter()
            .enumerate()
            .filter_map(|(i, s)| (i != axis).then_some(*s))
            .collect();

        let mut data = ArrayD::from_elem(self.source.shape(), f64::NAN);
        let n_times = self.source.shape()[axis];
        let mut step_labels = vec![String::new(); n_times];

        for (label, indices) in self.labels.iter().zip(&self.members) {
            let wanted = label.to_string();
            let position = (0..ref_labels.len())
                .find(|&j| ref_labels.label_string(j) == wanted)
                .ok_or_else(|| ClimAggError::LabelNotFound {
                    label: wanted.clone(),
                    dim: self.group_dim.clone(),
                })?;
            let reference_slice = reference
                .index_dim(&self.group_dim, position)?
                .broadcast_dims(&slice_dims, &slice_shape)?;
            for &t in indices {
                let mut out = data.index_axis_mut(Axis(axis), t);
                out.assign(&self.source.data().index_axis(Axis(axis), t));
                out -= &reference_slice;
                step_labels[t] = wanted.clone();
            }
        }

        let step_coord = if matches!(self.group_coord_labels(), CoordLabels::Numeric(_)) {
            CoordLabels::Numeric(step_labels.iter().map(|s| s.parse().unwrap_or(f64::NAN)).collect())
        } else {
            CoordLabels::Text(step_labels)
        };
        self.source
            .with_data(data)?
            .with_coord(self.group_dim.clone(), vec![self.time_dim.clone()], step_coord)
    }
}
