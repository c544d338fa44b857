//! Calendar resampling
//!
//! Resampling bins a time axis into consecutive calendar periods (hours, days,
//! months, years) starting at the period containing the earliest timestamp.
//! Bins are left-closed and labelled with their start; periods without data
//! are kept and reduce like an empty lane (NaN, or zero for sums).

use crate::dims::{get_dim_key, DimAxis};
use crate::errors::{ClimAggError, Result};
use crate::grouping::reduce_members;
use crate::labeled::{CoordLabels, Coordinate, LabeledArray};
use crate::statistics::{ReduceParams, Reducer};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const VALID_RESAMPLE: &str = "H, D, MS, M, ME, YS, Y, YE, A, AS (with an optional multiplier)";

/// Length of a resampling period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleFrequency {
    Hours(u32),
    Days(u32),
    Months(u32),
    Years(u32),
}

impl FromStr for ResampleFrequency {
    type Err = ClimAggError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ClimAggError::InvalidFrequency {
            frequency: s.to_string(),
            valid: VALID_RESAMPLE.to_string(),
        };
        let trimmed = s.trim();
        let unit = trimmed.trim_start_matches(|c: char| c.is_ascii_digit());
        let digits = &trimmed[..trimmed.len() - unit.len()];
        let n: u32 = if digits.is_empty() {
            1
        } else {
            digits.parse().map_err(|_| invalid())?
        };
        if n == 0 {
            return Err(invalid());
        }
        match unit {
            "H" | "h" => Ok(Self::Hours(n)),
            "D" => Ok(Self::Days(n)),
            "MS" | "M" | "ME" => Ok(Self::Months(n)),
            "YS" | "Y" | "YE" | "A" | "AS" => Ok(Self::Years(n)),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for ResampleFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hours(n) => write!(f, "{n}H"),
            Self::Days(n) => write!(f, "{n}D"),
            Self::Months(n) => write!(f, "{n}MS"),
            Self::Years(n) => write!(f, "{n}YS"),
        }
    }
}

fn month_index(t: &NaiveDateTime) -> i64 {
    i64::from(t.year()) * 12 + i64::from(t.month0())
}

fn month_start(index: i64) -> Option<NaiveDateTime> {
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = u32::try_from(index.rem_euclid(12)).ok()? + 1;
    NaiveDate::from_ymd_opt(year, month, 1).map(|d| d.and_time(NaiveTime::MIN))
}

impl ResampleFrequency {
    /// Start of the period containing `t`, used as the first bin's origin
    ///
    /// Multi-hour periods are aligned to midnight of the day of `t`.
    fn floor(self, t: &NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Self::Hours(n) => t.date().and_hms_opt(t.hour() / n * n, 0, 0),
            Self::Days(_) => Some(t.date().and_time(NaiveTime::MIN)),
            Self::Months(_) => month_start(month_index(t)),
            Self::Years(_) => month_start(i64::from(t.year()) * 12),
        }
    }

    /// Bin number of `t` counted from `origin`
    fn bin(self, origin: &NaiveDateTime, t: &NaiveDateTime) -> usize {
        let bin = match self {
            Self::Hours(n) => (*t - *origin).num_seconds() / (3600 * i64::from(n)),
            Self::Days(n) => (*t - *origin).num_seconds() / (86_400 * i64::from(n)),
            Self::Months(n) => (month_index(t) - month_index(origin)) / i64::from(n),
            Self::Years(n) => i64::from(t.year() - origin.year()) / i64::from(n),
        };
        usize::try_from(bin).unwrap_or(0)
    }

    /// Start of bin `k`
    fn label(self, origin: &NaiveDateTime, k: usize) -> Option<NaiveDateTime> {
        let k = i64::try_from(k).ok()?;
        match self {
            Self::Hours(n) => Some(*origin + chrono::Duration::hours(k * i64::from(n))),
            Self::Days(n) => Some(*origin + chrono::Duration::days(k * i64::from(n))),
            Self::Months(n) => month_start(month_index(origin) + k * i64::from(n)),
            Self::Years(n) => month_start(month_index(origin) + 12 * k * i64::from(n)),
        }
    }
}

/// Resample along a time dimension
///
/// `dim` defaults to the dimension detected by alias. The output keeps the
/// dimension name with the bin starts as its labels.
///
/// # Errors
///
/// Returns an error if the dimension has no timestamps or the reduction fails.
pub fn resample(
    array: &LabeledArray,
    frequency: &ResampleFrequency,
    dim: Option<&str>,
    how: &Reducer,
    params: &ReduceParams,
) -> Result<LabeledArray> {
    let dim = match dim {
        Some(dim) => dim.to_string(),
        None => get_dim_key(array, DimAxis::T)?,
    };
    let times = array.time_labels(&dim)?;
    let earliest = times.iter().min().ok_or_else(|| ClimAggError::ShapeMismatch {
        message: format!("cannot resample empty dimension '{dim}'"),
    })?;
    let overflow = || ClimAggError::Generic(format!("resampling '{dim}' at {frequency} overflows the calendar"));
    let origin = frequency.floor(earliest).ok_or_else(overflow)?;

    let bins: Vec<usize> = times.iter().map(|t| frequency.bin(&origin, t)).collect();
    let n_bins = bins.iter().max().map_or(0, |m| m + 1);
    let mut members = vec![Vec::new(); n_bins];
    for (index, &bin) in bins.iter().enumerate() {
        members[bin].push(index);
    }
    let labels = (0..n_bins)
        .map(|k| frequency.label(&origin, k).ok_or_else(overflow))
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(%dim, %frequency, %how, bins = n_bins, "resampling");

    let axis = array.axis_of(&dim)?;
    let data = reduce_members(array, axis, &members, how, params)?;
    let coords: BTreeMap<String, Coordinate> = array
        .coords()
        .iter()
        .filter(|(_, c)| !c.spans(&dim))
        .map(|(n, c)| (n.clone(), c.clone()))
        .collect();
    LabeledArray::from_parts(data, array.dims().to_vec(), coords, array.attrs().clone())?
        .with_dim_coord(dim.as_str(), CoordLabels::Time(labels))
}

fn resample_with(array: &LabeledArray, frequency: ResampleFrequency, time_dim: Option<&str>, how: Reducer) -> Result<LabeledArray> {
    resample(array, &frequency, time_dim, &how, &ReduceParams::default())
}

/// Daily mean
///
/// # Errors
///
/// Returns an error if resampling fails.
pub fn daily_mean(array: &LabeledArray, time_dim: Option<&str>) -> Result<LabeledArray> {
    resample_with(array, ResampleFrequency::Days(1), time_dim, Reducer::Mean)
}

/// Daily maximum
///
/// # Errors
///
/// Returns an error if resampling fails.
pub fn daily_max(array: &LabeledArray, time_dim: Option<&str>) -> Result<LabeledArray> {
    resample_with(array, ResampleFrequency::Days(1), time_dim, Reducer::Max)
}

/// Daily minimum
///
/// # Errors
///
/// Returns an error if resampling fails.
pub fn daily_min(array: &LabeledArray, time_dim: Option<&str>) -> Result<LabeledArray> {
    resample_with(array, ResampleFrequency::Days(1), time_dim, Reducer::Min)
}

/// Daily standard deviation
///
/// # Errors
///
/// Returns an error if resampling fails.
pub fn daily_std(array: &LabeledArray, time_dim: Option<&str>) -> Result<LabeledArray> {
    resample_with(array, ResampleFrequency::Days(1), time_dim, Reducer::Std)
}

/// Daily sum; days without data sum to zero
///
/// # Errors
///
/// Returns an error if resampling fails.
pub fn daily_sum(array: &LabeledArray, time_dim: Option<&str>) -> Result<LabeledArray> {
    resample_with(array, ResampleFrequency::Days(1), time_dim, Reducer::Sum)
}

/// Monthly mean
///
/// # Errors
///
/// Returns an error if resampling fails.
pub fn monthly_mean(array: &LabeledArray, time_dim: Option<&str>) -> Result<LabeledArray> {
    resample_with(array, ResampleFrequency::Months(1), time_dim, Reducer::Mean)
}

/// Monthly maximum
///
/// # Errors
///
/// Returns an error if resampling fails.
pub fn monthly_max(array: &LabeledArray, time_dim: Option<&str>) -> Result<LabeledArray> {
    resample_with(array, ResampleFrequency::Months(1), time_dim, Reducer::Max)
}

/// Monthly minimum
///
/// # Errors
///
/// Returns an error if resampling fails.
pub fn monthly_min(array: &LabeledArray, time_dim: Option<&str>) -> Result<LabeledArray> {
    resample_with(array, ResampleFrequency::Months(1), time_dim, Reducer::Min)
}
