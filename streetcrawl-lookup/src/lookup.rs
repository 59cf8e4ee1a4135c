use crate::error::Result;
use crate::record::PanoramaRecord;

/// Source of panorama records for the crawl engine.
///
/// Both operations return `Ok(None)` when the service has no matching
/// panorama; `Err` is reserved for transport failures and malformed payloads.
#[allow(async_fn_in_trait)]
pub trait PanoramaLookup {
    /// Nearest panorama to a point, searching within `radius` meters.
    async fn nearest(&self, lat: f64, lon: f64, radius: u32) -> Result<Option<PanoramaRecord>>;

    /// Panorama by its identifier.
    async fn fetch(&self, id: &str) -> Result<Option<PanoramaRecord>>;
}
