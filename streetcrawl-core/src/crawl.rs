use crate::boundary::BoundaryOracle;
use crate::data::{Database, EdgeKind, PanoramaStatus, RunCounts};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use streetcrawl_lookup::{PanoramaLookup, PanoramaRecord};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Boundary has no centerpoint to seed the crawl from")]
    NoCenterpoint,

    #[error("No panorama found near ({lat:.6}, {lon:.6}) with radii {radii:?}")]
    NoSeed { lat: f64, lon: f64, radii: Vec<u32> },

    #[error("Seed panorama {id} at ({lat:.6}, {lon:.6}) is outside the boundary")]
    SeedOutsideBoundary { id: String, lat: f64, lon: f64 },
}

/// Options for a single crawl run
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Maximum number of panoramas to expand in this run
    pub max_new: usize,
    /// First search radius in meters
    pub radius: u32,
    /// Radii tried in order when the first one finds nothing
    pub extra_radii: Vec<u32>,
    pub show_progress_bars: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_new: 50,
            radius: 50,
            extra_radii: vec![100, 200],
            show_progress_bars: false,
        }
    }
}

impl CrawlOptions {
    pub fn radii(&self) -> Vec<u32> {
        std::iter::once(self.radius)
            .chain(self.extra_radii.iter().copied())
            .collect()
    }
}

/// Outcome of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrawlSummary {
    pub run_id: String,
    /// Seed inserted by this run, if the store was empty
    pub seeded: Option<String>,
    pub processed: usize,
    /// Attempts whose lookup failed at every radius
    pub failed: usize,
    /// Panoramas newly added as pending
    pub discovered: usize,
    /// Adjacent panoramas dropped for lying outside the boundary
    pub discarded: usize,
    /// Adjacent panoramas the store rejected
    pub skipped: usize,
    pub total: usize,
    pub pending: usize,
}

#[derive(Debug, Default)]
struct Expansion {
    discovered: usize,
    discarded: usize,
    skipped: usize,
}

/// Everything a crawl run needs, passed around explicitly.
///
/// The context owns the store for its whole lifetime: `init` opens it and
/// `teardown` closes it. The boundary and lookup are borrowed so one process
/// can share them across several contexts.
pub struct CrawlContext<'a, B: ?Sized, L> {
    db: Database,
    boundary: &'a B,
    lookup: &'a L,
}

impl<'a, B, L> CrawlContext<'a, B, L>
where
    B: BoundaryOracle + ?Sized,
    L: PanoramaLookup,
{
    pub fn init(db_path: &Path, boundary: &'a B, lookup: &'a L) -> Result<Self, CrawlError> {
        let db = Database::new(db_path)?;
        debug!("Opened store at {}", db_path.display());
        Ok(Self::with_database(db, boundary, lookup))
    }

    pub fn with_database(db: Database, boundary: &'a B, lookup: &'a L) -> Self {
        Self {
            db,
            boundary,
            lookup,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn teardown(self) -> Result<(), CrawlError> {
        self.db.close()?;
        Ok(())
    }

    /// Seeds an empty store with the panorama nearest to the boundary's
    /// centerpoint. Returns the seed id, or `None` when resuming.
    pub async fn seed(&self, options: &CrawlOptions) -> Result<Option<String>, CrawlError> {
        let existing = self.db.count_panoramas()?;
        if existing > 0 {
            info!("Resuming crawl ({} panoramas in store)", existing);
            return Ok(None);
        }

        let (lat, lon) = self.boundary.centerpoint().ok_or(CrawlError::NoCenterpoint)?;
        let radii = options.radii();

        for &radius in &radii {
            info!(
                "Searching for seed panorama near {:.6}, {:.6} with radius {}m",
                lat, lon, radius
            );
            match self.lookup.nearest(lat, lon, radius).await {
                Ok(Some(record)) => {
                    if !self.boundary.contains(record.lat, record.lon) {
                        return Err(CrawlError::SeedOutsideBoundary {
                            id: record.id,
                            lat: record.lat,
                            lon: record.lon,
                        });
                    }
                    self.db.upsert_panorama(
                        &record.id,
                        record.lat,
                        record.lon,
                        PanoramaStatus::Pending,
                    )?;
                    info!(
                        "Seeded crawl with {} at {:.6}, {:.6}",
                        record.id, record.lat, record.lon
                    );
                    return Ok(Some(record.id));
                }
                Ok(None) => debug!("No panorama within {}m", radius),
                Err(e) => warn!("Seed lookup with radius {}m failed: {}", radius, e),
            }
        }

        Err(CrawlError::NoSeed { lat, lon, radii })
    }

    /// Expands up to `max_new` pending panoramas, seeding first if the store
    /// is empty. Seeding does not count against the budget.
    ///
    /// Work is pulled from the frontier in waves of at most the remaining
    /// budget, so panoramas discovered during the run are expanded by the same
    /// run. Every attempt, failed or not, consumes budget, and a panorama is
    /// attempted at most once per run.
    pub async fn run(&self, options: &CrawlOptions) -> Result<CrawlSummary, CrawlError> {
        let seeded = self.seed(options).await?;
        let run_id = self.db.create_run(options.max_new)?;
        let radii = options.radii();

        let progress_bar = (options.show_progress_bars && options.max_new > 0).then(|| {
            let pb = ProgressBar::new(options.max_new as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb
        });

        let mut counts = RunCounts::default();
        let mut skipped = 0;
        let mut attempted: HashSet<String> = HashSet::new();

        while attempted.len() < options.max_new {
            let remaining = options.max_new - attempted.len();
            // Ids attempted earlier in this run and still pending are exactly
            // the failed ones, so over-fetching by that many is enough.
            let wave: Vec<String> = self
                .db
                .get_pending(remaining + counts.failed)?
                .into_iter()
                .filter(|id| !attempted.contains(id))
                .take(remaining)
                .collect();
            if wave.is_empty() {
                if attempted.is_empty() {
                    info!("No pending panoramas to process");
                }
                break;
            }
            debug!("Pulled {} pending panoramas", wave.len());

            for id in wave {
                if let Some(ref pb) = progress_bar {
                    pb.set_message(id.clone());
                }

                match self.fetch_record(&id, &radii).await {
                    Some(record) => match self.expand(&record) {
                        Ok(expansion) => {
                            counts.processed += 1;
                            counts.discovered += expansion.discovered;
                            counts.discarded += expansion.discarded;
                            skipped += expansion.skipped;
                            debug!(
                                "Expanded {}: {} new, {} outside boundary",
                                id, expansion.discovered, expansion.discarded
                            );
                            if counts.processed % 25 == 0 {
                                info!("Processed {} panoramas...", counts.processed);
                            }
                        }
                        Err(e) => {
                            warn!("Failed to store expansion of {}: {}", id, e);
                            counts.failed += 1;
                        }
                    },
                    None => counts.failed += 1,
                }

                attempted.insert(id);
                if let Some(ref pb) = progress_bar {
                    pb.inc(1);
                }
            }
        }

        if let Some(ref pb) = progress_bar {
            pb.finish_with_message(format!("{} panoramas processed", counts.processed));
        }

        let totals = self
            .db
            .count_panoramas()
            .and_then(|total| Ok((total, self.db.count_by_status(PanoramaStatus::Pending)?)));
        let (total, pending) = match totals {
            Ok(totals) => totals,
            Err(e) => {
                if let Err(fail_err) = self.db.fail_run(&run_id, &counts) {
                    warn!("Could not record failed run {}: {}", run_id, fail_err);
                }
                return Err(e.into());
            }
        };
        self.db.complete_run(&run_id, &counts)?;

        info!(
            "Run complete: {} processed, {} failed, {} discovered, {} pending",
            counts.processed, counts.failed, counts.discovered, pending
        );

        Ok(CrawlSummary {
            run_id,
            seeded,
            processed: counts.processed,
            failed: counts.failed,
            discovered: counts.discovered,
            discarded: counts.discarded,
            skipped,
            total,
            pending,
        })
    }

    /// Looks the panorama up by id, then by its stored position at each
    /// radius. Only a record carrying the requested id is accepted.
    async fn fetch_record(&self, id: &str, radii: &[u32]) -> Option<PanoramaRecord> {
        match self.lookup.fetch(id).await {
            Ok(Some(record)) if record.id == id => return Some(record),
            Ok(Some(record)) => warn!("Lookup of {} returned {} instead", id, record.id),
            Ok(None) => debug!("{} not found by id", id),
            Err(e) => warn!("Lookup of {} failed: {}", id, e),
        }

        let row = match self.db.get_panorama(id) {
            Ok(Some(row)) => row,
            Ok(None) => return None,
            Err(e) => {
                warn!("Could not read {} from store: {}", id, e);
                return None;
            }
        };

        for &radius in radii {
            match self.lookup.nearest(row.lat, row.lon, radius).await {
                Ok(Some(record)) if record.id == id => return Some(record),
                Ok(_) => debug!("{} not found within {}m", id, radius),
                Err(e) => warn!("Lookup of {} with radius {}m failed: {}", id, radius, e),
            }
        }

        warn!("Could not retrieve panorama {}; it stays pending", id);
        None
    }

    /// Stores the in-boundary adjacency of `record` and marks it processed.
    /// The status flips only after the adjacency has been committed.
    fn expand(&self, record: &PanoramaRecord) -> rusqlite::Result<Expansion> {
        let mut expansion = Expansion::default();
        let tx = self.db.transaction()?;

        let adjacency = record
            .neighbors
            .iter()
            .map(|a| (EdgeKind::Neighbor, a))
            .chain(record.links.iter().map(|a| (EdgeKind::Link, a)));

        for (kind, adjacent) in adjacency {
            if adjacent.id == record.id {
                continue;
            }
            if !self.boundary.contains(adjacent.lat, adjacent.lon) {
                expansion.discarded += 1;
                continue;
            }

            match self.db.upsert_panorama(
                &adjacent.id,
                adjacent.lat,
                adjacent.lon,
                PanoramaStatus::Pending,
            ) {
                Ok(true) => expansion.discovered += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Skipping {} {} of {}: {}", kind.table(), adjacent.id, record.id, e);
                    expansion.skipped += 1;
                    continue;
                }
            }

            self.db
                .insert_edge(kind, &record.id, &adjacent.id, adjacent.direction)?;
        }

        tx.commit()?;
        self.db.mark_processed(&record.id)?;
        Ok(expansion)
    }
}
