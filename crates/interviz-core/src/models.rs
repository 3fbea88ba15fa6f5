pub mod extent;
pub mod job;
pub mod region;

pub use extent::RasterExtent;
pub use job::{Job, JobId, JobKind, JobParams, JobState, NativeCoord, SunDateTime};
pub use region::Region;
