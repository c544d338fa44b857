//! Polygon geometries and feature collections
//!
//! Coordinates are `(lon, lat)` pairs. Rings may be given open or closed.

use crate::errors::{ClimAggError, Result};
use crate::labeled::Attributes;
use serde_json::Value as JsonValue;

/// Axis-aligned bounds `(min_lon, min_lat, max_lon, max_lat)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// Even-odd ray casting against a single ring
#[must_use]
pub fn ring_contains(ring: &[(f64, f64)], lon: f64, lat: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if ((yi > lat) != (yj > lat)) && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// A polygon with an exterior ring and optional holes
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Vec<(f64, f64)>,
    pub interiors: Vec<Vec<(f64, f64)>>,
}

impl Polygon {
    #[must_use]
    pub fn new(exterior: Vec<(f64, f64)>) -> Self {
        Self {
            exterior,
            interiors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_interior(mut self, ring: Vec<(f64, f64)>) -> Self {
        self.interiors.push(ring);
        self
    }

    /// Rectangle from its bounds, counter-clockwise
    #[must_use]
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(vec![
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
            (min_x, min_y),
        ])
    }

    #[must_use]
    pub fn bounds(&self) -> Bounds {
        self.exterior.iter().fold(
            Bounds {
                min_x: f64::INFINITY,
                min_y: f64::INFINITY,
                max_x: f64::NEG_INFINITY,
                max_y: f64::NEG_INFINITY,
            },
            |b, &(x, y)| Bounds {
                min_x: b.min_x.min(x),
                min_y: b.min_y.min(y),
                max_x: b.max_x.max(x),
                max_y: b.max_y.max(y),
            },
        )
    }

    /// Point test against the exterior ring only
    #[must_use]
    pub fn exterior_contains(&self, lon: f64, lat: f64) -> bool {
        ring_contains(&self.exterior, lon, lat)
    }

    /// Point test honouring holes
    #[must_use]
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        self.exterior_contains(lon, lat) && !self.interiors.iter().any(|r| ring_contains(r, lon, lat))
    }

    /// Batch exterior test over flattened points, with a bounding-box prefilter
    #[must_use]
    pub fn contains_points(&self, points: &[(f64, f64)]) -> Vec<bool> {
        let bounds = self.bounds();
        points
            .iter()
            .map(|&(lon, lat)| bounds.contains(lon, lat) && self.exterior_contains(lon, lat))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
}

impl Geometry {
    #[must_use]
    pub fn polygons(&self) -> &[Polygon] {
        match self {
            Self::Polygon(polygon) => std::slice::from_ref(polygon),
            Self::MultiPolygon(polygons) => polygons,
        }
    }

    #[must_use]
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        self.polygons().iter().any(|p| p.contains_point(lon, lat))
    }

    fn from_geojson(value: &JsonValue) -> Result<Self> {
        let kind = value.get("type").and_then(JsonValue::as_str).unwrap_or_default();
        let coordinates = value.get("coordinates").ok_or_else(|| ClimAggError::InvalidGeometry {
            message: format!("{kind} geometry without coordinates"),
        })?;
        match kind {
            "Polygon" => Ok(Self::Polygon(parse_polygon(coordinates)?)),
            "MultiPolygon" => {
                let parts = coordinates.as_array().ok_or_else(|| ClimAggError::InvalidGeometry {
                    message: "MultiPolygon coordinates must be an array".to_string(),
                })?;
                Ok(Self::MultiPolygon(
                    parts.iter().map(parse_polygon).collect::<Result<Vec<_>>>()?,
                ))
            }
            other => Err(ClimAggError::InvalidGeometry {
                message: format!("unsupported geometry type '{other}', expected Polygon or MultiPolygon"),
            }),
        }
    }
}

fn parse_ring(value: &JsonValue) -> Result<Vec<(f64, f64)>> {
    let invalid = || ClimAggError::InvalidGeometry {
        message: format!("invalid linear ring: {value}"),
    };
    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|position| {
            let x = position.get(0).and_then(JsonValue::as_f64);
            let y = position.get(1).and_then(JsonValue::as_f64);
            x.zip(y).ok_or_else(invalid)
        })
        .collect()
}

fn parse_polygon(value: &JsonValue) -> Result<Polygon> {
    let rings = value.as_array().ok_or_else(|| ClimAggError::InvalidGeometry {
        message: "Polygon coordinates must be an array of rings".to_string(),
    })?;
    let (exterior, interiors) = rings.split_first().ok_or_else(|| ClimAggError::InvalidGeometry {
        message: "Polygon without an exterior ring".to_string(),
    })?;
    Ok(Polygon {
        exterior: parse_ring(exterior)?,
        interiors: interiors.iter().map(parse_ring).collect::<Result<Vec<_>>>()?,
    })
}

/// A geometry with its properties
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: serde_json::Map<String, JsonValue>,
}

impl Feature {
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            properties: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_property<K: Into<String>>(mut self, key: K, value: JsonValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// Ordered features plus collection-level attributes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeometryCollection {
    pub features: Vec<Feature>,
    pub attrs: Attributes,
}

impl GeometryCollection {
    #[must_use]
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            features,
            attrs: Attributes::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn geometries(&self) -> impl Iterator<Item = &Geometry> {
        self.features.iter().map(|f| &f.geometry)
    }

    /// Values of a property, `None` unless every feature has it
    #[must_use]
    pub fn property_column(&self, field: &str) -> Option<Vec<&JsonValue>> {
        self.features.iter().map(|f| f.properties.get(field)).collect()
    }

    /// Parse a GeoJSON `FeatureCollection`
    ///
    /// A top-level `attrs` object, if present, becomes the collection attributes.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON or unsupported geometry types.
    pub fn from_geojson(json: &str) -> Result<Self> {
        let document: JsonValue = serde_json::from_str(json)?;
        if document.get("type").and_then(JsonValue::as_str) != Some("FeatureCollection") {
            return Err(ClimAggError::InvalidGeometry {
                message: "expected a GeoJSON FeatureCollection".to_string(),
            });
        }
        let features = document
            .get("features")
            .and_then(JsonValue::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|feature| {
                let geometry = feature.get("geometry").ok_or_else(|| ClimAggError::InvalidGeometry {
                    message: "feature without geometry".to_string(),
                })?;
                let properties = feature
                    .get("properties")
                    .and_then(JsonValue::as_object)
                    .cloned()
                    .unwrap_or_default();
                Ok(Feature {
                    geometry: Geometry::from_geojson(geometry)?,
                    properties,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let attrs = document
            .get("attrs")
            .and_then(JsonValue::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Ok(Self { features, attrs })
    }
}
