use ndarray::{ArrayD, IxDyn};
use ru_clim_agg::errors::ClimAggError;
use ru_clim_agg::labeled::{CoordLabels, LabeledArray};
use ru_clim_agg::shapes::{
    latitude_weights, mask_all, mask_contains_points, mask_iterator, rasterize, reduce_by_shape,
    transform_from_latlon, AffineTransform, Feature, FeatureDim, Geometry, GeometryCollection, MaskOptions, Polygon,
    ShapeReduceOptions, Weights,
};
use ru_clim_agg::statistics::Reducer;
use serde_json::json;

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

/// A 4x4 grid with unit spacing and no time dimension
fn grid(lat: Vec<f64>) -> LabeledArray {
    LabeledArray::new(ArrayD::zeros(IxDyn(&[lat.len(), 4])), vec!["lat", "lon"])
        .unwrap()
        .with_dim_coord("lat", CoordLabels::Numeric(lat))
        .unwrap()
        .with_dim_coord("lon", CoordLabels::Numeric(vec![0.0, 1.0, 2.0, 3.0]))
        .unwrap()
}

/// Two time steps over a 4x4 grid, valued `100 * t + 10 * row + col`
fn field() -> LabeledArray {
    let values: Vec<f64> = (0..2)
        .flat_map(|t| (0..4).flat_map(move |r| (0..4).map(move |c| f64::from(100 * t + 10 * r + c))))
        .collect();
    LabeledArray::new(ArrayD::from_shape_vec(IxDyn(&[2, 4, 4]), values).unwrap(), vec!["time", "lat", "lon"])
        .unwrap()
        .with_dim_coord("lat", CoordLabels::Numeric(vec![0.0, 1.0, 2.0, 3.0]))
        .unwrap()
        .with_dim_coord("lon", CoordLabels::Numeric(vec![0.0, 1.0, 2.0, 3.0]))
        .unwrap()
        .with_attr("units", json!("mm"))
}

fn regions() -> GeometryCollection {
    let mut collection = GeometryCollection::new(vec![
        Feature::new(Geometry::Polygon(Polygon::rectangle(0.6, 0.6, 1.4, 1.4))).with_property("FID", json!(7)),
        Feature::new(Geometry::Polygon(Polygon::rectangle(1.5, 1.5, 3.5, 3.5))).with_property("FID", json!(3)),
    ]);
    collection.attrs.insert("source".to_string(), json!("regions.geojson"));
    collection
}

#[test]
fn test_affine_transform() {
    let transform = AffineTransform::translation(9.5, -0.5) * AffineTransform::scale(2.0, 3.0);
    assert_eq!(transform.apply(1.0, 1.0), (11.5, 2.5));

    let inverse = transform.inverse().unwrap();
    let (x, y) = inverse.apply(11.5, 2.5);
    assert_close(x, 1.0);
    assert_close(y, 1.0);

    assert!(matches!(
        AffineTransform::scale(0.0, 1.0).inverse(),
        Err(ClimAggError::InvalidGrid { .. })
    ));

    let grid_transform = transform_from_latlon(&[0.0, 1.0, 2.0], &[10.0, 11.0, 12.0]).unwrap();
    assert_eq!(grid_transform.apply(0.0, 0.0), (9.5, -0.5));
    assert_eq!(grid_transform.apply(1.5, 1.5), (11.0, 1.0));
}

#[test]
fn test_rasterize_burns_cell_centres() {
    let square = [Geometry::Polygon(Polygon::rectangle(0.6, 0.6, 1.4, 1.4))];

    let ascending = rasterize(&square, &grid(vec![0.0, 1.0, 2.0, 3.0]), "lat", "lon").unwrap();
    assert_eq!(ascending.dims, vec!["lat".to_string(), "lon".to_string()]);
    assert_eq!(ascending.count_true(), 1);
    assert!(ascending.values[[1, 1]]);

    let descending = rasterize(&square, &grid(vec![3.0, 2.0, 1.0, 0.0]), "lat", "lon").unwrap();
    assert_eq!(descending.count_true(), 1);
    assert!(descending.values[[2, 1]]);
}

#[test]
fn test_rasterize_holes_and_unions() {
    let target = grid(vec![0.0, 1.0, 2.0, 3.0]);
    let with_hole = Polygon::rectangle(-0.5, -0.5, 3.5, 3.5).with_interior(Polygon::rectangle(0.6, 0.6, 1.4, 1.4).exterior);
    let mask = rasterize(&[Geometry::Polygon(with_hole)], &target, "lat", "lon").unwrap();
    assert_eq!(mask.count_true(), 15);
    assert!(!mask.values[[1, 1]]);

    let two_cells = Geometry::MultiPolygon(vec![
        Polygon::rectangle(-0.4, -0.4, 0.4, 0.4),
        Polygon::rectangle(2.6, 2.6, 3.4, 3.4),
    ]);
    let mask = rasterize(&[two_cells], &target, "lat", "lon").unwrap();
    assert_eq!(mask.count_true(), 2);
    assert!(mask.values[[0, 0]] && mask.values[[3, 3]]);
}

#[test]
fn test_rasterize_requires_two_samples() {
    let single = LabeledArray::new(ArrayD::zeros(IxDyn(&[1, 4])), vec!["lat", "lon"])
        .unwrap()
        .with_dim_coord("lat", CoordLabels::Numeric(vec![45.0]))
        .unwrap()
        .with_dim_coord("lon", CoordLabels::Numeric(vec![0.0, 1.0, 2.0, 3.0]))
        .unwrap();
    let square = [Geometry::Polygon(Polygon::rectangle(0.0, 40.0, 2.0, 50.0))];
    assert!(matches!(
        rasterize(&square, &single, "lat", "lon"),
        Err(ClimAggError::InvalidGrid { .. })
    ));
}

#[test]
fn test_station_point_in_polygon() {
    let stations = LabeledArray::new(ArrayD::from_shape_vec(IxDyn(&[3]), vec![1.0, 2.0, 3.0]).unwrap(), vec!["station"])
        .unwrap()
        .with_coord("lat", vec!["station"], CoordLabels::Numeric(vec![1.0, 5.0, 0.5]))
        .unwrap()
        .with_coord("lon", vec!["station"], CoordLabels::Numeric(vec![1.0, 5.0, 2.0]))
        .unwrap();
    let square = [Geometry::Polygon(Polygon::rectangle(0.0, 0.0, 3.0, 3.0))];

    let mask = mask_contains_points(&square, &stations, "lat", "lon").unwrap();
    assert_eq!(mask.dims, vec!["station".to_string()]);
    assert_eq!(mask.values.iter().copied().collect::<Vec<_>>(), vec![true, false, true]);

    let collection = GeometryCollection::new(vec![Feature::new(square[0].clone())]);
    let options = ShapeReduceOptions {
        how: Reducer::Sum,
        regular_grid: false,
        ..ShapeReduceOptions::default()
    };
    let totals = reduce_by_shape(&stations, &collection, &options).unwrap();
    assert_eq!(totals.dims(), &["FID".to_string()]);
    assert_close(totals.data()[[0]], 4.0);
}

#[test]
fn test_point_mask_on_regular_grid_matches_raster() {
    let axis = vec![0.0, 4.0, 8.0, 12.0];
    let values: Vec<f64> = (0..4).flat_map(|r| (0..4).map(move |c| f64::from(10 * r + c))).collect();
    let coarse = LabeledArray::new(ArrayD::from_shape_vec(IxDyn(&[4, 4]), values).unwrap(), vec!["lat", "lon"])
        .unwrap()
        .with_dim_coord("lat", CoordLabels::Numeric(axis.clone()))
        .unwrap()
        .with_dim_coord("lon", CoordLabels::Numeric(axis))
        .unwrap();
    let cell = [Geometry::Polygon(Polygon::rectangle(2.0, 6.0, 6.0, 10.0))];

    let meshed = mask_contains_points(&cell, &coarse, "lat", "lon").unwrap();
    let raster = rasterize(&cell, &coarse, "lat", "lon").unwrap();
    assert_eq!(meshed.dims, vec!["lat".to_string(), "lon".to_string()]);
    assert_eq!(meshed.shape(), &[4, 4]);
    assert_eq!(meshed.values, raster.values);
    assert_eq!(meshed.count_true(), 1);
    assert!(meshed.values[[2, 1]]);

    let collection = GeometryCollection::new(vec![Feature::new(cell[0].clone())]);
    let point_tested = reduce_by_shape(
        &coarse,
        &collection,
        &ShapeReduceOptions {
            regular_grid: false,
            ..ShapeReduceOptions::default()
        },
    )
    .unwrap();
    let rasterized = reduce_by_shape(&coarse, &collection, &ShapeReduceOptions::default()).unwrap();
    assert_close(point_tested.data()[[0]], 21.0);
    assert_eq!(point_tested.data(), rasterized.data());
}

#[test]
fn test_point_mask_requires_self_indexed_coordinates() {
    let crossed = LabeledArray::new(ArrayD::zeros(IxDyn(&[2, 2])), vec!["station", "y"])
        .unwrap()
        .with_coord("lat", vec!["station"], CoordLabels::Numeric(vec![0.0, 1.0]))
        .unwrap()
        .with_coord("lon", vec!["y"], CoordLabels::Numeric(vec![0.0, 1.0]))
        .unwrap();
    let square = [Geometry::Polygon(Polygon::rectangle(-1.0, -1.0, 3.0, 3.0))];
    assert!(matches!(
        mask_contains_points(&square, &crossed, "lat", "lon"),
        Err(ClimAggError::GeometryDimensionMismatch { .. })
    ));
}

#[test]
fn test_point_mask_dimension_mismatch() {
    let curvilinear = LabeledArray::new(ArrayD::zeros(IxDyn(&[2, 2])), vec!["y", "x"])
        .unwrap()
        .with_coord("lat", vec!["y", "x"], CoordLabels::Numeric(vec![0.0, 0.0, 1.0, 1.0]))
        .unwrap()
        .with_coord("lon", vec!["x"], CoordLabels::Numeric(vec![0.0, 1.0]))
        .unwrap();
    let square = [Geometry::Polygon(Polygon::rectangle(0.0, 0.0, 3.0, 3.0))];
    assert!(matches!(
        mask_contains_points(&square, &curvilinear, "lat", "lon"),
        Err(ClimAggError::GeometryDimensionMismatch { .. })
    ));
}

#[test]
fn test_reduce_by_shape_stacks_features_in_order() {
    let result = reduce_by_shape(&field(), &regions(), &ShapeReduceOptions::default()).unwrap();

    assert_eq!(result.dims(), &["FID".to_string(), "time".to_string()]);
    assert_eq!(result.numeric_labels("FID").unwrap(), &[7.0, 3.0]);
    assert_close(result.data()[[0, 0]], 11.0);
    assert_close(result.data()[[0, 1]], 111.0);
    assert_close(result.data()[[1, 0]], 27.5);
    assert_close(result.data()[[1, 1]], 127.5);
    assert!(result.coord("lat").is_none());
    assert_eq!(result.attrs().get("units"), Some(&json!("mm")));
    assert_eq!(result.attrs().get("source"), Some(&json!("regions.geojson")));

    let maxima = reduce_by_shape(
        &field(),
        &regions(),
        &ShapeReduceOptions {
            how: "max".parse().unwrap(),
            feature_dim: FeatureDim::Labels {
                name: "region".to_string(),
                labels: CoordLabels::Text(vec!["small".into(), "large".into()]),
            },
            ..ShapeReduceOptions::default()
        },
    )
    .unwrap();
    assert_eq!(maxima.dims()[0], "region");
    assert_close(maxima.data()[[1, 0]], 33.0);
}

#[test]
fn test_latitude_weighted_average() {
    let values = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 1.0, 2.0, 2.0]).unwrap();
    let coarse = LabeledArray::new(values, vec!["lat", "lon"])
        .unwrap()
        .with_dim_coord("lat", CoordLabels::Numeric(vec![0.0, 30.0]))
        .unwrap()
        .with_dim_coord("lon", CoordLabels::Numeric(vec![0.0, 30.0]))
        .unwrap();

    let weights = latitude_weights(&coarse, "lat").unwrap();
    assert_eq!(weights.dims(), &["lat".to_string()]);
    assert_close(weights.data()[[1]], 30f64.to_radians().cos());

    let everything = GeometryCollection::new(vec![Feature::new(Geometry::Polygon(Polygon::rectangle(
        -20.0, -20.0, 50.0, 50.0,
    )))]);
    let options = ShapeReduceOptions {
        weights: Some(Weights::Latitude),
        ..ShapeReduceOptions::default()
    };
    let result = reduce_by_shape(&coarse, &everything, &options).unwrap();

    let cos30 = 30f64.to_radians().cos();
    assert_eq!(result.numeric_labels("FID").unwrap(), &[0.0]);
    assert_close(result.data()[[0]], (1.0 + 2.0 * cos30) / (1.0 + cos30));

    let unweighted = reduce_by_shape(&coarse, &everything, &ShapeReduceOptions::default()).unwrap();
    assert_close(unweighted.data()[[0]], 1.5);
}

#[test]
fn test_duplicate_feature_ids() {
    let square = Geometry::Polygon(Polygon::rectangle(0.6, 0.6, 1.4, 1.4));
    let collection = GeometryCollection::new(vec![
        Feature::new(square.clone()).with_property("FID", json!("basin")),
        Feature::new(square).with_property("FID", json!("basin")),
    ]);
    assert!(matches!(
        reduce_by_shape(&field(), &collection, &ShapeReduceOptions::default()),
        Err(ClimAggError::DuplicateFeatureId { .. })
    ));
}

#[test]
fn test_feature_dim_and_weights_parsing() {
    assert_eq!(
        FeatureDim::from_json(&json!("region")).unwrap(),
        FeatureDim::Field("region".to_string())
    );
    assert_eq!(
        FeatureDim::from_json(&json!({"region": ["a", "b"]})).unwrap(),
        FeatureDim::Labels {
            name: "region".to_string(),
            labels: CoordLabels::Text(vec!["a".into(), "b".into()]),
        }
    );
    for invalid in [json!({"a": [1], "b": [2]}), json!({"r": [1, "x"]}), json!(5)] {
        assert!(matches!(
            FeatureDim::from_json(&invalid),
            Err(ClimAggError::InvalidMaskDim { .. })
        ));
    }

    assert_eq!("latitude".parse::<Weights>().unwrap(), Weights::Latitude);
    assert!(matches!(
        "area".parse::<Weights>(),
        Err(ClimAggError::UnknownWeights { .. })
    ));
}

#[test]
fn test_mask_all_and_iterator() {
    let options = ShapeReduceOptions {
        feature_dim: FeatureDim::Labels {
            name: "region".to_string(),
            labels: CoordLabels::Text(vec!["small".into(), "large".into()]),
        },
        ..ShapeReduceOptions::default()
    };
    let masked = mask_all(&field(), &regions(), &options).unwrap();
    assert_eq!(masked.dims()[0], "region");
    assert_eq!(masked.shape(), &[2, 2, 4, 4]);
    assert_close(masked.data()[[0, 1, 1, 1]], 111.0);
    assert!(masked.data()[[0, 1, 0, 0]].is_nan());
    assert_eq!(masked.data().iter().filter(|v| !v.is_nan()).count(), 2 * (1 + 4));

    let collection = regions();
    let target = field();
    let counts: Vec<usize> = mask_iterator(&collection, &target, &MaskOptions::default())
        .map(|mask| mask.unwrap().count_true())
        .collect();
    assert_eq!(counts, vec![1, 4]);
}

#[test]
fn test_geojson_collection() {
    let geojson = r#"{
        "type": "FeatureCollection",
        "attrs": {"title": "basins"},
        "features": [
            {
                "type": "Feature",
                "properties": {"name": "east"},
                "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [2, 0], [2, 2], [0, 2], [0, 0]]]}
            },
            {
                "type": "Feature",
                "properties": {"name": "islands"},
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[5, 5], [6, 5], [6, 6], [5, 6], [5, 5]]],
                        [[[8, 8], [9, 8], [9, 9], [8, 9], [8, 8]]]
                    ]
                }
            }
        ]
    }"#;
    let collection = GeometryCollection::from_geojson(geojson).unwrap();

    assert_eq!(collection.len(), 2);
    assert_eq!(collection.attrs.get("title"), Some(&json!("basins")));
    assert_eq!(
        collection.property_column("name").unwrap(),
        vec![&json!("east"), &json!("islands")]
    );
    assert!(collection.property_column("FID").is_none());
    assert_eq!(collection.features[1].geometry.polygons().len(), 2);
    assert!(collection.features[1].geometry.contains_point(8.5, 8.5));
    assert!(!collection.features[1].geometry.contains_point(7.0, 7.0));

    assert!(matches!(
        GeometryCollection::from_geojson(r#"{"type": "FeatureCollection", "features": [{"geometry": {"type": "Point", "coordinates": [0, 0]}}]}"#),
        Err(ClimAggError::InvalidGeometry { .. })
    ));
}
