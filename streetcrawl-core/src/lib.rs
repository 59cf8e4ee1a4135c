pub mod boundary;
pub mod crawl;
pub mod data;
pub mod report;

use colored::Colorize;

pub use boundary::{Boundary, BoundaryError, BoundaryOracle};
pub use crawl::{CrawlContext, CrawlError, CrawlOptions, CrawlSummary};
pub use data::{Database, EdgeKind, PanoramaStatus};

pub fn print_banner() {
    println!(
        "{} {}",
        "streetcrawl".bright_cyan().bold(),
        env!("CARGO_PKG_VERSION").dimmed()
    );
    println!("{}", "boundary-constrained Street View panorama crawler".dimmed());
    println!();
}
