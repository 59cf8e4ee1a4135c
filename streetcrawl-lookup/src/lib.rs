pub mod client;
pub mod error;
pub mod lookup;
pub mod record;

pub use client::PanoramaClient;
pub use error::LookupError;
pub use lookup::PanoramaLookup;
pub use record::{AdjacentPanorama, PanoramaRecord};
