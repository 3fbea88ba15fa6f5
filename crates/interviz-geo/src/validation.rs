//! Validation of untrusted request parameters.
//!
//! Every function here is pure. A failure short-circuits the request before
//! any worker is engaged.

use chrono::{NaiveDate, NaiveTime};
use interviz_core::error::{InterVizError, Result};
use interviz_core::models::{JobKind, NativeCoord, RasterExtent, SunDateTime};
use std::ops::RangeInclusive;

use crate::transform::ToNative;

pub const DEFAULT_VIEWSHED_MAX_DISTANCE: f64 = 22000.0;
pub const DEFAULT_SUNMASK_MAX_DISTANCE: f64 = 4000.0;
pub const DEFAULT_TIMEZONE: i32 = 1;
pub const TIMEZONE_RANGE: RangeInclusive<i32> = 0..=25;

/// Fetch a required query parameter
pub fn required<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str> {
    value.ok_or_else(|| InterVizError::MissingParameter {
        name: name.to_string(),
    })
}

/// Parse a `lat,lon` pair, latitude first
pub fn parse_lat_lon(raw: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 2 {
        return Err(InterVizError::parameter(
            "coordinates",
            format!("expected 'lat,lon', got '{}'", raw),
        ));
    }

    let lat = parse_number("coordinates", parts[0])?;
    let lon = parse_number("coordinates", parts[1])?;
    Ok((lat, lon))
}

/// Convert a raw `lat,lon` pair to native coordinates strictly inside the extent
pub fn validate_coordinates<P: ToNative + ?Sized>(
    raw: &str,
    projector: &P,
    extent: &RasterExtent,
) -> Result<NativeCoord> {
    let (lat, lon) = parse_lat_lon(raw)?;
    // An unprojectable point lies outside every raster
    let (x, y) = projector.to_native(lon, lat).unwrap_or_else(|e| {
        tracing::debug!(lat, lon, error = %e, "Coordinates cannot be projected");
        (f64::INFINITY, f64::INFINITY)
    });

    if !x.is_finite() || !y.is_finite() || !extent.contains_strict(x, y) {
        return Err(InterVizError::OutOfBounds {
            x,
            y,
            west: extent.west,
            east: extent.east,
            south: extent.south,
            north: extent.north,
        });
    }

    Ok(NativeCoord::new(x, y))
}

/// Parse a finite floating point value
pub fn parse_number(name: &str, raw: &str) -> Result<f64> {
    let value: f64 = raw.trim().parse().map_err(|_| {
        InterVizError::parameter(name, format!("could not convert '{}' to a number", raw))
    })?;

    if !value.is_finite() {
        return Err(InterVizError::parameter(name, format!("'{}' is not a finite number", raw)));
    }

    Ok(value)
}

/// Parse an integer value
pub fn parse_integer(name: &str, raw: &str) -> Result<i64> {
    raw.trim().parse().map_err(|_| {
        InterVizError::parameter(name, format!("could not convert '{}' to an integer", raw))
    })
}

/// Parse the optional max distance, falling back to the per-kind default.
///
/// Sun-mask distances are whole map units.
pub fn parse_max_distance(raw: Option<&str>, kind: JobKind) -> Result<f64> {
    let value = match (raw, kind) {
        (None, JobKind::Viewshed) => DEFAULT_VIEWSHED_MAX_DISTANCE,
        (None, JobKind::Sunmask) => DEFAULT_SUNMASK_MAX_DISTANCE,
        (Some(raw), JobKind::Viewshed) => parse_number("max_distance", raw)?,
        (Some(raw), JobKind::Sunmask) => parse_integer("max_distance", raw)? as f64,
    };

    if value <= 0.0 {
        return Err(InterVizError::parameter(
            "max_distance",
            format!("must be positive, got {}", value),
        ));
    }

    Ok(value)
}

/// Parse the optional timezone offset, in `[0, 25]`
pub fn parse_timezone(raw: Option<&str>) -> Result<i32> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_TIMEZONE);
    };

    let value = parse_integer("timezone", raw)?;
    match i32::try_from(value) {
        Ok(tz) if TIMEZONE_RANGE.contains(&tz) => Ok(tz),
        _ => Err(InterVizError::parameter(
            "timezone",
            format!(
                "Invalid timezone {}: expected a value between {} and {}",
                value,
                TIMEZONE_RANGE.start(),
                TIMEZONE_RANGE.end()
            ),
        )),
    }
}

/// Parse the sun-mask date and time fields
pub fn parse_datetime(
    year: &str,
    month: &str,
    day: &str,
    hour: &str,
    minute: &str,
) -> Result<SunDateTime> {
    let year = parse_integer("year", year)?;
    let month = parse_integer("month", month)?;
    let day = parse_integer("day", day)?;
    let hour = parse_integer("hour", hour)?;
    let minute = parse_integer("minute", minute)?;

    let year = i32::try_from(year)
        .map_err(|_| InterVizError::parameter("year", format!("{} is out of range", year)))?;
    let month = u32::try_from(month)
        .map_err(|_| InterVizError::parameter("month", format!("{} is out of range", month)))?;
    let day = u32::try_from(day)
        .map_err(|_| InterVizError::parameter("day", format!("{} is out of range", day)))?;
    let hour = u32::try_from(hour)
        .map_err(|_| InterVizError::parameter("hour", format!("{} is out of range", hour)))?;
    let minute = u32::try_from(minute)
        .map_err(|_| InterVizError::parameter("minute", format!("{} is out of range", minute)))?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        InterVizError::parameter("date", format!("{}-{}-{} is not a valid date", year, month, day))
    })?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
        InterVizError::parameter("time", format!("{}:{} is not a valid time", hour, minute))
    })?;

    Ok(SunDateTime {
        year,
        month,
        day,
        hour,
        minute,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Identity projector: native coordinates equal (lon, lat)
    struct Identity;

    impl ToNative for Identity {
        fn to_native(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
            Ok((lon, lat))
        }
    }

    /// Fails like PROJ does for latitudes beyond the poles
    struct PoleBound;

    impl ToNative for PoleBound {
        fn to_native(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
            if lat.abs() > 90.0 {
                return Err(InterVizError::parameter("coordinates", "cannot be projected"));
            }
            Ok((lon, lat))
        }
    }

    fn unit_extent() -> RasterExtent {
        RasterExtent::new(None, "", [0.0, 0.0, 10.0, 10.0], 1.0, 1.0).unwrap()
    }

    #[test]
    fn test_latitude_comes_first() {
        let coord = validate_coordinates("2.5,7.5", &Identity, &unit_extent()).unwrap();
        assert_eq!(coord.x, 7.5);
        assert_eq!(coord.y, 2.5);
        assert_eq!(coord.to_string(), "7.5,2.5");
    }

    #[test]
    fn test_malformed_coordinates() {
        for raw in ["", "1.0", "1,2,3", "a,b", "1.0;2.0", "nan,1"] {
            let err = validate_coordinates(raw, &Identity, &unit_extent()).unwrap_err();
            assert!(
                matches!(err, InterVizError::Parameter { .. }),
                "{} should be a parameter error, got {:?}",
                raw,
                err
            );
        }
    }

    #[test]
    fn test_unprojectable_point_is_out_of_bounds() {
        let err = validate_coordinates("91,5", &PoleBound, &unit_extent()).unwrap_err();

        assert!(matches!(err, InterVizError::OutOfBounds { .. }), "{:?}", err);
        assert!(err.to_string().contains("outside the allowed region"));
        assert!(err.to_string().starts_with("Requested point [inf, inf]"));
    }

    #[test]
    fn test_edges_are_out_of_bounds() {
        for raw in ["5,0", "5,10", "0,5", "10,5", "-1,5", "5,11"] {
            let err = validate_coordinates(raw, &Identity, &unit_extent()).unwrap_err();
            assert!(matches!(err, InterVizError::OutOfBounds { .. }), "{}", raw);
        }
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("height1", " 1.6 ").unwrap(), 1.6);
        assert_eq!(parse_number("height1", "-3").unwrap(), -3.0);
        assert!(parse_number("height1", "tall").is_err());
        assert!(parse_number("height1", "inf").is_err());
        assert!(parse_number("height1", "").is_err());
    }

    #[test]
    fn test_max_distance_defaults() {
        assert_eq!(parse_max_distance(None, JobKind::Viewshed).unwrap(), 22000.0);
        assert_eq!(parse_max_distance(None, JobKind::Sunmask).unwrap(), 4000.0);
        assert_eq!(parse_max_distance(Some("5000.5"), JobKind::Viewshed).unwrap(), 5000.5);
        assert_eq!(parse_max_distance(Some("3000"), JobKind::Sunmask).unwrap(), 3000.0);
    }

    #[test]
    fn test_max_distance_rejections() {
        assert!(parse_max_distance(Some("far"), JobKind::Viewshed).is_err());
        assert!(parse_max_distance(Some("0"), JobKind::Viewshed).is_err());
        assert!(parse_max_distance(Some("-10"), JobKind::Sunmask).is_err());
        assert!(parse_max_distance(Some("3000.5"), JobKind::Sunmask).is_err());
    }

    #[test]
    fn test_timezone_boundaries() {
        assert_eq!(parse_timezone(None).unwrap(), DEFAULT_TIMEZONE);
        assert_eq!(parse_timezone(Some("0")).unwrap(), 0);
        assert_eq!(parse_timezone(Some("25")).unwrap(), 25);
        assert!(parse_timezone(Some("-1")).is_err());
        assert!(parse_timezone(Some("26")).is_err());
        assert!(parse_timezone(Some("utc")).is_err());
        assert!(parse_timezone(Some("99999999999")).is_err());
    }

    #[test]
    fn test_parse_datetime() {
        let dt = parse_datetime("2024", "6", "21", "12", "30").unwrap();
        let expected = SunDateTime {
            year: 2024,
            month: 6,
            day: 21,
            hour: 12,
            minute: 30,
        };
        assert_eq!(dt, expected);

        assert!(parse_datetime("2024", "june", "21", "12", "30").is_err());
        assert!(parse_datetime("2024", "2", "30", "12", "0").is_err());
        assert!(parse_datetime("2024", "6", "21", "24", "0").is_err());
        assert!(parse_datetime("2024", "6", "21", "12", "60").is_err());
        assert!(parse_datetime("2024", "-6", "21", "12", "0").is_err());
    }

    #[test]
    fn test_required() {
        assert_eq!(required("height1", Some("1.0")).unwrap(), "1.0");
        let err = required("height1", None).unwrap_err();
        assert_eq!(err.to_string(), "Missing parameter: height1");
    }
}
