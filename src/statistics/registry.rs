//! Name → reducer registry
//!
//! Maps the symbolic reducer names accepted throughout the crate (and on the
//! command line) to [`Reducer`] values.

use super::operations::Reducer;
use crate::errors::{ClimAggError, Result};
use std::str::FromStr;

/// Every name [`resolve`] accepts
pub const REDUCER_NAMES: &[&str] = &[
    "average",
    "mean",
    "std",
    "stddev",
    "stdev",
    "sum",
    "max",
    "min",
    "median",
    "quantile",
    "q",
    "percentile",
    "p",
];

/// Look up a reducer by name
///
/// # Errors
///
/// Returns [`ClimAggError::UnknownReducer`] listing the valid names when
/// `name` is not registered.
pub fn resolve(name: &str) -> Result<Reducer> {
    let reducer = match name {
        "average" => Reducer::Average,
        "mean" => Reducer::Mean,
        "std" | "stddev" | "stdev" => Reducer::Std,
        "sum" => Reducer::Sum,
        "max" => Reducer::Max,
        "min" => Reducer::Min,
        "median" => Reducer::Median,
        "quantile" | "q" => Reducer::Quantile,
        "percentile" | "p" => Reducer::Percentile,
        _ => {
            return Err(ClimAggError::UnknownReducer {
                name: name.to_string(),
                valid: REDUCER_NAMES.join(", "),
            })
        }
    };
    Ok(reducer)
}

impl FromStr for Reducer {
    type Err = ClimAggError;

    fn from_str(s: &str) -> Result<Self> {
        resolve(s)
    }
}
