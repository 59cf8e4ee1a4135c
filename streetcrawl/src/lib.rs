// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    PanoramaTarget, build_crawl_options, describe_boundary, expand_path, find_panorama,
    parse_radii, stats_report,
};
