use chrono::{Duration, NaiveDate, NaiveDateTime};
use ndarray::{ArrayD, Axis, IxDyn};
use ru_clim_agg::climatology::{self, ClimatologyOptions};
use ru_clim_agg::errors::ClimAggError;
use ru_clim_agg::grouping::BinWidths;
use ru_clim_agg::labeled::{CoordLabels, LabeledArray};
use ru_clim_agg::statistics::{ReduceParams, Reducer};
use ru_clim_agg::temporal::{self, resample, ResampleFrequency};
use serde_json::json;
use tempfile::tempdir;

fn datetime(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn month_starts(start_year: i32, count: usize) -> Vec<NaiveDateTime> {
    (0..count)
        .map(|i| datetime(start_year + (i / 12) as i32, (i % 12) as u32 + 1, 1))
        .collect()
}

/// Monthly data over `years` years at two grid points
///
/// Point 0 holds the month number plus a yearly offset, point 1 its negative.
fn monthly_field(years: usize) -> LabeledArray {
    let n = years * 12;
    let mut values = Vec::with_capacity(n * 2);
    for i in 0..n {
        let v = (i % 12 + 1) as f64 + (i / 12) as f64 * 0.5;
        values.push(v);
        values.push(-v);
    }
    LabeledArray::new(ArrayD::from_shape_vec(IxDyn(&[n, 2]), values).unwrap(), vec!["time", "x"])
        .unwrap()
        .with_dim_coord("time", CoordLabels::Time(month_starts(2000, n)))
        .unwrap()
        .with_dim_coord("x", CoordLabels::Numeric(vec![0.0, 1.0]))
        .unwrap()
        .with_attr("standard_name", json!("air_temperature"))
        .with_attr("long_name", json!("Temperature"))
        .with_attr("units", json!("K"))
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_monthly_climatology_mean() {
    let field = monthly_field(2);
    let clim = climatology::mean(&field, &ClimatologyOptions::default()).unwrap();

    assert_eq!(clim.dims(), &["month".to_string(), "x".to_string()]);
    assert_eq!(clim.shape(), &[12, 2]);
    // January: 1.0 in the first year, 1.5 in the second
    assert_close(clim.data()[[0, 0]], 1.25);
    assert_close(clim.data()[[0, 1]], -1.25);
    assert_close(clim.data()[[11, 0]], 12.25);
    assert_eq!(clim.attrs().get("units"), Some(&json!("K")));
    assert!(clim.coord("x").is_some());
    assert!(clim.coord("time").is_none());

    let spread = climatology::stdev(&field, &ClimatologyOptions::default()).unwrap();
    assert_close(spread.data()[[4, 0]], 0.25);

    let highs = climatology::max(&field, &ClimatologyOptions::default()).unwrap();
    let lows = climatology::min(&field, &ClimatologyOptions::default()).unwrap();
    assert_close(highs.data()[[2, 0]], 3.5);
    assert_close(lows.data()[[2, 0]], 3.0);
}

#[test]
fn test_season_climatology_is_calendar_ordered() {
    let field = monthly_field(1);
    let options = ClimatologyOptions::default().frequency("season");
    let clim = climatology::mean(&field, &options).unwrap();

    assert_eq!(
        clim.require_coord("season").unwrap().labels,
        CoordLabels::Text(vec!["DJF".into(), "MAM".into(), "JJA".into(), "SON".into()])
    );
    let point: Vec<f64> = clim.data().index_axis(Axis(1), 0).iter().copied().collect();
    assert_eq!(point, vec![5.0, 4.0, 7.0, 10.0]);
}

#[test]
fn test_season_climatology_fills_missing_seasons() {
    let field = monthly_field(1).select("time", &[2, 3, 4, 5, 6, 7]).unwrap();
    let options = ClimatologyOptions::default().frequency("season");
    let clim = climatology::mean(&field, &options).unwrap();

    assert_eq!(clim.shape(), &[4, 2]);
    assert!(clim.data()[[0, 0]].is_nan());
    assert_close(clim.data()[[1, 0]], 4.0);
    assert_close(clim.data()[[2, 0]], 7.0);
    assert!(clim.data()[[3, 0]].is_nan());
}

#[test]
fn test_percentiles_match_quantiles() {
    let field = monthly_field(4);
    let options = ClimatologyOptions::default();

    let quantiles = climatology::quantiles(&field, &[0.1, 0.5, 0.9], &options).unwrap();
    let percentiles = climatology::percentiles(&field, &[10.0, 50.0, 90.0], &options).unwrap();

    assert_eq!(quantiles.dims()[0], "quantile");
    assert_eq!(percentiles.dims()[0], "percentile");
    assert_eq!(quantiles.shape(), &[3, 12, 2]);
    assert_eq!(quantiles.shape(), percentiles.shape());
    assert_eq!(
        percentiles.numeric_labels("percentile").unwrap(),
        &[10.0, 50.0, 90.0]
    );
    for (q, p) in quantiles.data().iter().zip(percentiles.data()) {
        assert_close(*q, *p);
    }

    let median = climatology::median(&field, &options).unwrap();
    assert_eq!(median.dims(), &["month".to_string(), "x".to_string()]);
    let middle = quantiles.index_dim("quantile", 1).unwrap();
    for (m, q) in median.data().iter().zip(middle.data()) {
        assert_close(*m, *q);
    }

    assert!(matches!(
        climatology::percentiles(&field, &[120.0], &options),
        Err(ClimAggError::InvalidQuantile { .. })
    ));
}

#[test]
fn test_anomaly_round_trip() {
    let field = monthly_field(3);
    let options = ClimatologyOptions::default();
    let clim = climatology::mean(&field, &options).unwrap();
    let anomaly = climatology::anomaly(&field, Some(&clim), (None, None), &options).unwrap();

    assert_eq!(anomaly.dims(), field.dims());
    assert_eq!(anomaly.shape(), field.shape());
    for t in 0..36 {
        for x in 0..2 {
            let restored = anomaly.data()[[t, x]] + clim.data()[[t % 12, x]];
            assert_close(restored, field.data()[[t, x]]);
        }
    }
    assert_eq!(anomaly.attrs().get("standard_name"), Some(&json!("air_temperature_anomaly")));
    assert_eq!(anomaly.attrs().get("long_name"), Some(&json!("Temperature anomaly")));
    assert_eq!(anomaly.attrs().get("units"), Some(&json!("K")));

    let computed = climatology::anomaly(&field, None, (None, None), &options).unwrap();
    for (a, b) in computed.data().iter().zip(anomaly.data()) {
        assert_close(*a, *b);
    }
}

#[test]
fn test_anomaly_reference_period() {
    let field = monthly_field(2);
    let start = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2000, 12, 31).unwrap();
    let anomaly = climatology::anomaly(&field, None, (Some(start), Some(end)), &ClimatologyOptions::default()).unwrap();

    // The first year is its own climatology; the second sits 0.5 above it
    for t in 0..12 {
        assert_close(anomaly.data()[[t, 0]], 0.0);
        assert_close(anomaly.data()[[t + 12, 0]], 0.5);
        assert_close(anomaly.data()[[t + 12, 1]], -0.5);
    }

    // A single bound is ignored and the whole record is used
    let open = climatology::anomaly(&field, None, (Some(start), None), &ClimatologyOptions::default()).unwrap();
    assert_close(open.data()[[0, 0]], -0.25);
}

#[test]
fn test_daily_climatology_inferred_and_binned() {
    let times: Vec<_> = (0..366).map(|i| datetime(2020, 1, 1) + Duration::days(i)).collect();
    let values: Vec<f64> = (0..366).map(f64::from).collect();
    let series = LabeledArray::new(ArrayD::from_shape_vec(IxDyn(&[366]), values).unwrap(), vec!["time"])
        .unwrap()
        .with_dim_coord("time", CoordLabels::Time(times))
        .unwrap();

    let daily = climatology::mean(&series, &ClimatologyOptions::default()).unwrap();
    assert_eq!(daily.dims(), &["dayofyear".to_string()]);
    assert_eq!(daily.shape(), &[366]);

    let binned = climatology::mean(&series, &ClimatologyOptions::default().bin_widths(BinWidths::Width(61))).unwrap();
    assert_eq!(binned.dims(), &["dayofyear_bins".to_string()]);
    assert_eq!(binned.shape(), &[6]);
    // Days 1..=61 hold the values 0..=60
    assert_close(binned.data()[[0]], 30.0);
}

#[test]
fn test_resample_daily_from_hourly() {
    let times: Vec<_> = (0..48).map(|i| datetime(2021, 6, 1) + Duration::hours(i)).collect();
    let values: Vec<f64> = (0..48).map(f64::from).collect();
    let hourly = LabeledArray::new(ArrayD::from_shape_vec(IxDyn(&[48]), values).unwrap(), vec!["time"])
        .unwrap()
        .with_dim_coord("time", CoordLabels::Time(times))
        .unwrap();

    let daily = temporal::daily_mean(&hourly, None).unwrap();
    assert_eq!(daily.data().iter().copied().collect::<Vec<_>>(), vec![11.5, 35.5]);
    assert_eq!(
        daily.time_labels("time").unwrap(),
        &[datetime(2021, 6, 1), datetime(2021, 6, 2)]
    );
    assert_eq!(temporal::daily_max(&hourly, None).unwrap().data()[[1]], 47.0);
    assert_eq!(temporal::daily_min(&hourly, Some("time")).unwrap().data()[[1]], 24.0);

    let six_hourly = resample(
        &hourly,
        &"6H".parse::<ResampleFrequency>().unwrap(),
        None,
        &Reducer::Sum,
        &ReduceParams::default(),
    )
    .unwrap();
    assert_eq!(six_hourly.shape(), &[8]);
    assert_eq!(six_hourly.data()[[0]], 15.0);
    assert_eq!(six_hourly.time_labels("time").unwrap()[1], datetime(2021, 6, 1) + Duration::hours(6));
}

#[test]
fn test_resample_multi_hour_bins_start_at_midnight() {
    let times: Vec<_> = (1..=8).map(|h| datetime(2021, 6, 1) + Duration::hours(h)).collect();
    let values: Vec<f64> = (1..=8).map(f64::from).collect();
    let hourly = LabeledArray::new(ArrayD::from_shape_vec(IxDyn(&[8]), values).unwrap(), vec!["time"])
        .unwrap()
        .with_dim_coord("time", CoordLabels::Time(times))
        .unwrap();

    let three_hourly = resample(
        &hourly,
        &"3H".parse::<ResampleFrequency>().unwrap(),
        None,
        &Reducer::Mean,
        &ReduceParams::default(),
    )
    .unwrap();
    assert_eq!(three_hourly.data().iter().copied().collect::<Vec<_>>(), vec![1.5, 4.0, 7.0]);
    assert_eq!(
        three_hourly.time_labels("time").unwrap(),
        &[
            datetime(2021, 6, 1),
            datetime(2021, 6, 1) + Duration::hours(3),
            datetime(2021, 6, 1) + Duration::hours(6),
        ]
    );

    let single = resample(&hourly, &ResampleFrequency::Hours(1), None, &Reducer::Mean, &ReduceParams::default()).unwrap();
    assert_eq!(single.shape(), &[8]);
    assert_eq!(single.time_labels("time").unwrap()[0], datetime(2021, 6, 1) + Duration::hours(1));
}

#[test]
fn test_resample_monthly_keeps_empty_bins() {
    let times = vec![datetime(2020, 1, 10), datetime(2020, 1, 20), datetime(2020, 3, 5)];
    let sparse = LabeledArray::new(
        ArrayD::from_shape_vec(IxDyn(&[3]), vec![2.0, 4.0, 9.0]).unwrap(),
        vec!["time"],
    )
    .unwrap()
    .with_dim_coord("time", CoordLabels::Time(times))
    .unwrap();

    let monthly = temporal::monthly_mean(&sparse, None).unwrap();
    assert_eq!(monthly.shape(), &[3]);
    assert_close(monthly.data()[[0]], 3.0);
    assert!(monthly.data()[[1]].is_nan());
    assert_close(monthly.data()[[2]], 9.0);
    assert_eq!(
        monthly.time_labels("time").unwrap(),
        &[datetime(2020, 1, 1), datetime(2020, 2, 1), datetime(2020, 3, 1)]
    );

    let totals = resample(&sparse, &ResampleFrequency::Months(1), None, &Reducer::Sum, &ReduceParams::default()).unwrap();
    assert_eq!(totals.data().iter().copied().collect::<Vec<_>>(), vec![6.0, 0.0, 9.0]);

    assert!(matches!(
        "3W".parse::<ResampleFrequency>(),
        Err(ClimAggError::InvalidFrequency { .. })
    ));
}

#[test]
fn test_json_file_round_trip() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let path = temp_dir.path().join("field.json");

    let field = monthly_field(1);
    let clim = climatology::percentiles(&field, &[25.0, 75.0], &ClimatologyOptions::default().frequency("season"))
        .unwrap();
    clim.to_json_file(&path).expect("Failed to write JSON");

    let restored = LabeledArray::from_json_file(&path).expect("Failed to read JSON");
    assert_eq!(restored.dims(), clim.dims());
    assert_eq!(restored.shape(), clim.shape());
    assert_eq!(restored.coords(), clim.coords());
    assert_eq!(restored.attrs(), clim.attrs());
    for (a, b) in restored.data().iter().zip(clim.data()) {
        assert!((a - b).abs() < 1e-12 || (a.is_nan() && b.is_nan()));
    }
}
