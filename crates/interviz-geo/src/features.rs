//! GeoJSON output of a vectorized job result

use geo::{Coord, MapCoords, MultiPolygon};
use geojson::{Feature, FeatureCollection, Geometry, Value};
use interviz_core::error::Result;
use serde_json::{Map, Value as JsonValue};

use crate::polygonize::Shape;
use crate::transform::ToGeographic;

/// Reproject shapes to geographic coordinates and wrap them as features.
///
/// Each feature carries a single property, `property`, set to the shape's
/// cell value. Reprojection is the last step applied to the geometries.
pub fn to_feature_collection<T: ToGeographic + ?Sized>(
    shapes: &[Shape],
    property: &str,
    transform: &T,
) -> Result<FeatureCollection> {
    let features = shapes
        .iter()
        .map(|shape| {
            let geographic = reproject(&shape.geometry, transform)?;

            let mut properties = Map::new();
            properties.insert(property.to_string(), JsonValue::from(shape.value));

            Ok(Feature {
                geometry: Some(Geometry::new(geometry_value(&geographic))),
                properties: Some(properties),
                id: None,
                bbox: None,
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FeatureCollection {
        features,
        bbox: None,
        foreign_members: None,
    })
}

fn reproject<T: ToGeographic + ?Sized>(
    geometry: &MultiPolygon<f64>,
    transform: &T,
) -> Result<MultiPolygon<f64>> {
    geometry.try_map_coords(|c| {
        transform.to_geographic(c.x, c.y).map(|(x, y)| Coord { x, y })
    })
}

/// Single polygons are emitted as `Polygon`, the rest as `MultiPolygon`
fn geometry_value(geometry: &MultiPolygon<f64>) -> Value {
    match geometry.0.as_slice() {
        [polygon] => Value::from(polygon),
        _ => Value::from(geometry),
    }
}
