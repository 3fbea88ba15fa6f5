mod health;
mod index;
mod sunmask;
mod viewshed;

pub use health::health_check;
pub use index::{index_service, not_found};
pub use sunmask::handle_sunmask;
pub use viewshed::handle_viewshed;
