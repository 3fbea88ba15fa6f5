use geojson::FeatureCollection;
use interviz_core::error::Result;
use interviz_core::models::{Job, JobKind};
use interviz_geo::validation::{
    parse_datetime, parse_max_distance, parse_number, parse_timezone, required,
    validate_coordinates,
};

use crate::dto::{SunmaskQuery, ViewshedQuery};
use crate::state::AppState;

/// Turns validated requests into jobs and runs them on the worker pool
pub struct AnalysisService;

impl AnalysisService {
    /// Validate a viewshed request: coordinates, heights, then max distance
    pub fn viewshed_job(state: &AppState, query: &ViewshedQuery) -> Result<Job> {
        let coord = validate_coordinates(
            required("coordinates", query.coordinates.as_deref())?,
            state.projector.as_ref(),
            &state.extent,
        )?;
        let height1 = required("height1", query.height1.as_deref())?;
        let observer_height = parse_number("height1", height1)?;
        let height2 = required("height2", query.height2.as_deref())?;
        let target_height = parse_number("height2", height2)?;
        let max_distance = parse_max_distance(query.max_distance.as_deref(), JobKind::Viewshed)?;

        Ok(Job::viewshed(coord, observer_height, target_height, max_distance))
    }

    /// Validate a sun-mask request: date and time, coordinates, max
    /// distance, then timezone
    pub fn sunmask_job(state: &AppState, query: &SunmaskQuery) -> Result<Job> {
        let datetime = parse_datetime(
            required("year", query.year.as_deref())?,
            required("month", query.month.as_deref())?,
            required("day", query.day.as_deref())?,
            required("hour", query.hour.as_deref())?,
            required("minute", query.minute.as_deref())?,
        )?;
        let coord = validate_coordinates(
            required("coordinates", query.coordinates.as_deref())?,
            state.projector.as_ref(),
            &state.extent,
        )?;
        let max_distance = parse_max_distance(query.max_distance.as_deref(), JobKind::Sunmask)?;
        let timezone = parse_timezone(query.timezone.as_deref())?;

        Ok(Job::sunmask(coord, datetime, timezone, max_distance))
    }

    pub async fn run(state: &AppState, job: Job) -> Result<FeatureCollection> {
        state.dispatcher.submit(job).await
    }
}
