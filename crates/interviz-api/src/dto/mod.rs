mod request;
mod response;

pub use request::{QueryPairs, SunmaskQuery, ViewshedQuery};
pub use response::{HealthResponse, MessageResponse};
