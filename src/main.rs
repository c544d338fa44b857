//! Entry point for the RuClimAgg application.
//! Handles CLI parsing, array loading, and dispatches climatology, rolling,
//! resampling and shape reductions.

use clap::Parser;
use ru_clim_agg::cli::{Args, ClimatologyOp};
use ru_clim_agg::climatology::{self, ClimatologyOptions};
use ru_clim_agg::rolling::{rolling_reduce, RollingOptions};
use ru_clim_agg::shapes::{mask_all, reduce_by_shape, FeatureDim, GeometryCollection, ShapeReduceOptions};
use ru_clim_agg::temporal::{resample, ResampleFrequency};
use ru_clim_agg::{get_parallel_info, reduce, LabeledArray, ParallelConfig, Reducer};
use std::fs;
use tracing_subscriber::EnvFilter;

fn describe(array: &LabeledArray) {
    println!("Dimensions:");
    for (dim, size) in array.dims().iter().zip(array.shape()) {
        println!("   {dim}: {size}");
    }
    println!("Coordinates:");
    for (name, coord) in array.coords() {
        println!("   {name} {:?}: {} labels", coord.dims, coord.labels.len());
    }
    println!("Attributes:");
    for (key, value) in array.attrs() {
        println!("   {key}: {value}");
    }
}

fn climatology_options(args: &Args) -> ClimatologyOptions {
    ClimatologyOptions {
        time_dim: args.time_dim.clone(),
        frequency: args.frequency.clone(),
        bin_widths: args.bin_widths.clone(),
        params: args.reduce_params(),
        ..ClimatologyOptions::default()
    }
}

fn feature_dim(arg: Option<&str>) -> ru_clim_agg::Result<FeatureDim> {
    match arg {
        None => Ok(FeatureDim::default()),
        Some(raw) if raw.trim_start().starts_with('{') => FeatureDim::from_json(&serde_json::from_str(raw)?),
        Some(field) => Ok(FeatureDim::Field(field.to_string())),
    }
}

fn run(args: &Args, input: &LabeledArray) -> ru_clim_agg::Result<Option<LabeledArray>> {
    let options = climatology_options(args);

    if let Some(op) = args.climatology {
        tracing::info!(?op, "computing climatology");
        let result = match op {
            ClimatologyOp::Mean => climatology::mean(input, &options)?,
            ClimatologyOp::Stdev => climatology::stdev(input, &options)?,
            ClimatologyOp::Max => climatology::max(input, &options)?,
            ClimatologyOp::Min => climatology::min(input, &options)?,
            ClimatologyOp::Median => climatology::median(input, &options)?,
            ClimatologyOp::Anomaly => {
                let range = args
                    .climatology_range
                    .map_or((None, None), |(start, end)| (Some(start), Some(end)));
                climatology::anomaly(input, None, range, &options)?
            }
        };
        return Ok(Some(result));
    }

    if let Some(qs) = &args.quantiles {
        tracing::info!(?qs, "computing climatological quantiles");
        return Ok(Some(climatology::quantiles(input, qs, &options)?));
    }

    if let Some(ps) = &args.percentiles {
        tracing::info!(?ps, "computing climatological percentiles");
        return Ok(Some(climatology::percentiles(input, ps, &options)?));
    }

    if let Some((how, dims)) = &args.reduce {
        tracing::info!(%how, ?dims, "reducing");
        let reducer: Reducer = how.parse()?;
        let dims: Vec<&str> = dims.iter().map(String::as_str).collect();
        return Ok(Some(reduce(input, &reducer, &dims, &args.reduce_params())?));
    }

    if let Some(spec) = &args.rolling {
        tracing::info!(how = %spec.how, windows = ?spec.windows, "rolling");
        let rolling = RollingOptions {
            how: spec.how.clone(),
            windows: spec.windows.clone(),
            min_periods: args.min_periods,
            center: args.center,
            dropna_how: args.dropna_how,
            params: args.reduce_params(),
        };
        return Ok(Some(rolling_reduce(input, &rolling)?));
    }

    if let Some((how, frequency)) = &args.resample {
        tracing::info!(%how, %frequency, "resampling");
        let reducer: Reducer = how.parse()?;
        let frequency: ResampleFrequency = frequency.parse()?;
        let result = resample(input, &frequency, args.time_dim.as_deref(), &reducer, &args.reduce_params())?;
        return Ok(Some(result));
    }

    if let Some(path) = &args.shapes {
        let collection = GeometryCollection::from_geojson(&fs::read_to_string(path)?)?;
        tracing::info!(features = collection.len(), path = %path.display(), "loaded shapes");
        let shape_options = ShapeReduceOptions {
            weights: args.weights.as_deref().map(str::parse).transpose()?,
            feature_dim: feature_dim(args.feature_dim.as_deref())?,
            regular_grid: !args.irregular,
            params: args.reduce_params(),
            how: args.how.parse()?,
            ..ShapeReduceOptions::default()
        };
        let result = if args.mask {
            mask_all(input, &collection, &shape_options)?
        } else {
            reduce_by_shape(input, &collection, &shape_options)?
        };
        return Ok(Some(result));
    }

    Ok(None)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .init();

    ParallelConfig::new(args.threads).setup_global_pool()?;
    tracing::debug!("{}", get_parallel_info());

    let input = LabeledArray::from_json_file(&args.input)?;
    tracing::info!(path = %args.input.display(), dims = ?input.dims(), shape = ?input.shape(), "loaded array");

    if args.describe {
        describe(&input);
    }

    match run(&args, &input)? {
        Some(result) => match &args.output {
            Some(output_path) => {
                result.to_json_file(output_path)?;
                tracing::info!(path = %output_path.display(), "saved result");
            }
            None => {
                describe(&result);
                println!("Values: {:?}", result.data());
            }
        },
        None if !args.describe => describe(&input),
        None => {}
    }

    Ok(())
}
