use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier namespacing every artifact a job creates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the engine-internal raster layer produced by the job
    pub fn layer_name(&self) -> String {
        format!("output_{}", self.0)
    }

    /// Name of the per-job mapset clone
    pub fn mapset_name(&self) -> String {
        format!("job_{}", self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Analysis kinds offered by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Viewshed,
    Sunmask,
}

impl JobKind {
    /// Property carried by each output feature
    pub fn property_name(&self) -> &'static str {
        match self {
            JobKind::Viewshed => "visibility",
            JobKind::Sunmask => "sun",
        }
    }

    /// Whether the job narrows the active region while it runs
    pub fn narrows_region(&self) -> bool {
        matches!(self, JobKind::Sunmask)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Viewshed => write!(f, "viewshed"),
            JobKind::Sunmask => write!(f, "sunmask"),
        }
    }
}

/// A point in the raster's native projected CRS
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NativeCoord {
    pub x: f64,
    pub y: f64,
}

impl NativeCoord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Formats as `x,y`, the form the engine expects for `coordinates=`
impl fmt::Display for NativeCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Local date and time of a sun-mask computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SunDateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobParams {
    Viewshed {
        observer_height: f64,
        target_height: f64,
        max_distance: f64,
    },
    Sunmask {
        datetime: SunDateTime,
        timezone: i32,
        max_distance: f64,
    },
}

impl JobParams {
    pub fn max_distance(&self) -> f64 {
        match self {
            JobParams::Viewshed { max_distance, .. } | JobParams::Sunmask { max_distance, .. } => {
                *max_distance
            }
        }
    }
}

/// One request's unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub coord: NativeCoord,
    pub params: JobParams,
}

impl Job {
    pub fn new(coord: NativeCoord, params: JobParams) -> Self {
        Self {
            id: JobId::new(),
            coord,
            params,
        }
    }

    pub fn viewshed(
        coord: NativeCoord,
        observer_height: f64,
        target_height: f64,
        max_distance: f64,
    ) -> Self {
        let params = JobParams::Viewshed {
            observer_height,
            target_height,
            max_distance,
        };
        Self::new(coord, params)
    }

    pub fn sunmask(
        coord: NativeCoord,
        datetime: SunDateTime,
        timezone: i32,
        max_distance: f64,
    ) -> Self {
        let params = JobParams::Sunmask {
            datetime,
            timezone,
            max_distance,
        };
        Self::new(coord, params)
    }

    pub fn kind(&self) -> JobKind {
        match self.params {
            JobParams::Viewshed { .. } => JobKind::Viewshed,
            JobParams::Sunmask { .. } => JobKind::Sunmask,
        }
    }
}

/// Lifecycle of a dispatched job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Running => write!(f, "running"),
            JobState::Succeeded => write!(f, "succeeded"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}
