//! Defines command-line interface options using `clap` for the RuClimAgg application.

use crate::grouping::BinWidths;
use crate::rolling::DropNaHow;
use crate::statistics::ReduceParams;
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Climatological reductions selectable with `--climatology`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClimatologyOp {
    Mean,
    Stdev,
    Max,
    Min,
    Median,
    Anomaly,
}

/// A CLI tool for temporal and spatial aggregation of gridded data
#[derive(Parser, Debug)]
#[command(
    version,
    name = "ru_clim_agg",
    about = "Climatologies, rolling windows, resampling and shape reductions over labeled arrays"
)]
pub struct Args {
    /// Path to the input array (JSON written by this tool)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Compute a climatology (or anomalies against one)
    #[arg(long, value_enum)]
    pub climatology: Option<ClimatologyOp>,

    /// Compute climatological quantiles, comma separated values in [0, 1]
    #[arg(long, value_delimiter = ',')]
    pub quantiles: Option<Vec<f64>>,

    /// Compute climatological percentiles, comma separated values in [0, 100]
    #[arg(long, value_delimiter = ',')]
    pub percentiles: Option<Vec<f64>>,

    /// Reduce over dimensions, formatted as <how>:<dim>[,<dim>...]
    #[arg(long, value_parser = parse_reduce_arg)]
    pub reduce: Option<(String, Vec<String>)>,

    /// Rolling reduction, formatted as <how>:<dim>=<window>[,<dim>=<window>...]
    #[arg(long, value_parser = parse_rolling_arg)]
    pub rolling: Option<RollingSpec>,

    /// Centre rolling windows on their label
    #[arg(long, default_value_t = false)]
    pub center: bool,

    /// Minimum number of valid samples in a rolling window
    #[arg(long)]
    pub min_periods: Option<usize>,

    /// Drop rolling labels whose slice has any or only missing values (any, all)
    #[arg(long)]
    pub dropna_how: Option<DropNaHow>,

    /// Quantile in [0, 1] or percentile in [0, 100] for the quantile and percentile reductions
    #[arg(long)]
    pub q: Option<f64>,

    /// Delta degrees of freedom for standard deviations
    #[arg(long, default_value_t = 0)]
    pub ddof: usize,

    /// Calendar resampling, formatted as <how>:<frequency> (e.g. mean:1D, max:MS)
    #[arg(long, value_parser = parse_resample_arg)]
    pub resample: Option<(String, String)>,

    /// GeoJSON FeatureCollection to reduce within
    #[arg(long)]
    pub shapes: Option<PathBuf>,

    /// Reduction used with --shapes
    #[arg(long, default_value = "average")]
    pub how: String,

    /// With --shapes, write one masked copy of the input per feature instead of reducing
    #[arg(long, default_value_t = false, requires = "shapes")]
    pub mask: bool,

    /// Weighting scheme used with --shapes (latitude)
    #[arg(long)]
    pub weights: Option<String>,

    /// Feature dimension: a property name or a JSON object {"name": [labels...]}
    #[arg(long)]
    pub feature_dim: Option<String>,

    /// Point-test grid cells instead of rasterizing (irregular grids, stations)
    #[arg(long, default_value_t = false)]
    pub irregular: bool,

    /// Grouping frequency (month, season, dayofyear, weekofyear, D, W, M, ...)
    #[arg(long)]
    pub frequency: Option<String>,

    /// Bin width or comma separated bin edges for grouped reductions
    #[arg(long, value_parser = parse_bin_widths_arg)]
    pub bin_widths: Option<BinWidths>,

    /// Name of the time dimension (detected when omitted)
    #[arg(long)]
    pub time_dim: Option<String>,

    /// Reference period for anomalies, formatted as <start>:<end> (YYYY-MM-DD)
    #[arg(long, value_parser = parse_range_arg)]
    pub climatology_range: Option<(NaiveDate, NaiveDate)>,

    /// Path to save the result as JSON. If not set, prints a summary.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of threads to use for parallel processing. Defaults to number of CPU cores.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Describe the input array (dimensions, coordinates and attributes)
    #[arg(long)]
    pub describe: bool,
}

impl Args {
    /// Reduction parameters from `--q` and `--ddof`
    #[must_use]
    pub fn reduce_params(&self) -> ReduceParams {
        ReduceParams {
            q: self.q,
            ddof: self.ddof,
            weights: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollingSpec {
    pub how: String,
    pub windows: Vec<(String, usize)>,
}

pub fn parse_reduce_arg(s: &str) -> Result<(String, Vec<String>), String> {
    match s.split_once(':') {
        Some((how, dims)) if !how.is_empty() && !dims.is_empty() => Ok((
            how.to_string(),
            dims.split(',').map(|d| d.trim().to_string()).collect(),
        )),
        _ => Err("Invalid format: Expected '<how>:<dimension>[,<dimension>...]'.".to_string()),
    }
}

pub fn parse_rolling_arg(s: &str) -> Result<RollingSpec, String> {
    let (how, windows) = s
        .split_once(':')
        .ok_or_else(|| "Invalid format: Expected '<how>:<dimension>=<window>[,...]'.".to_string())?;

    let windows = windows
        .split(',')
        .map(|part| {
            let (dim, size) = part
                .split_once('=')
                .ok_or_else(|| format!("Invalid window '{part}': Expected '<dimension>=<window>'"))?;
            let size = size
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("Invalid window size for dimension '{dim}'"))?;
            Ok((dim.trim().to_string(), size))
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok(RollingSpec {
        how: how.to_string(),
        windows,
    })
}

pub fn parse_resample_arg(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [how, frequency] => Ok((how.to_string(), frequency.to_string())),
        _ => Err("Invalid format: Expected '<how>:<frequency>'.".to_string()),
    }
}

pub fn parse_bin_widths_arg(s: &str) -> Result<BinWidths, String> {
    if !s.contains(',') {
        return s
            .trim()
            .parse::<usize>()
            .map(BinWidths::Width)
            .map_err(|_| format!("Invalid bin width '{s}'"));
    }
    s.split(',')
        .map(|edge| edge.trim().parse::<f64>().map_err(|_| format!("Invalid bin edge '{edge}'")))
        .collect::<Result<Vec<_>, String>>()
        .map(BinWidths::Edges)
}

pub fn parse_range_arg(s: &str) -> Result<(NaiveDate, NaiveDate), String> {
    let (start, end) = s
        .split_once(':')
        .ok_or_else(|| "Invalid format: Expected '<start>:<end>'.".to_string())?;
    let parse = |d: &str| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").map_err(|e| format!("Invalid date '{d}': {e}"));
    Ok((parse(start)?, parse(end)?))
}
