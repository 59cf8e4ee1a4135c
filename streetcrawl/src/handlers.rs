use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use streetcrawl_core::boundary::{Boundary, BoundaryOracle};
use streetcrawl_core::crawl::{CrawlContext, CrawlOptions};
use streetcrawl_core::data::Database;
use streetcrawl_core::report::{
    ReportFormat, StoreStats, generate_crawl_report, generate_stats_report, save_report,
};
use streetcrawl_lookup::record::valid_coordinates;
use streetcrawl_lookup::{PanoramaClient, PanoramaLookup, PanoramaRecord};
use tracing::warn;
use url::Url;

// Argument helpers

/// Parse a comma-separated list of radii in meters. Blank entries are ignored.
pub fn parse_radii(list: &str) -> Result<Vec<u32>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let radius: u32 = entry
                .parse()
                .map_err(|_| anyhow!("Invalid radius '{}'", entry))?;
            if radius == 0 {
                bail!("Radius must be greater than zero");
            }
            Ok(radius)
        })
        .collect()
}

/// Expand a leading `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

pub fn build_crawl_options(
    max_new: usize,
    radius: u32,
    extra_radii: &str,
    show_progress_bars: bool,
) -> Result<CrawlOptions> {
    if radius == 0 {
        bail!("Radius must be greater than zero");
    }
    Ok(CrawlOptions {
        max_new,
        radius,
        extra_radii: parse_radii(extra_radii)?,
        show_progress_bars,
    })
}

/// What `panorama` looks up
#[derive(Debug, Clone, PartialEq)]
pub enum PanoramaTarget {
    Id(String),
    Point { lat: f64, lon: f64 },
}

/// Fetch the target by id, or search around the point at each radius in turn.
pub async fn find_panorama<L: PanoramaLookup>(
    lookup: &L,
    target: &PanoramaTarget,
    radii: &[u32],
) -> Result<PanoramaRecord> {
    match target {
        PanoramaTarget::Id(id) => lookup
            .fetch(id)
            .await?
            .ok_or_else(|| anyhow!("No panorama with id {}", id)),
        PanoramaTarget::Point { lat, lon } => {
            if !valid_coordinates(*lat, *lon) {
                bail!("Invalid coordinates ({}, {})", lat, lon);
            }
            for &radius in radii {
                match lookup.nearest(*lat, *lon, radius).await {
                    Ok(Some(record)) => return Ok(record),
                    Ok(None) => {}
                    Err(e) => warn!("Lookup with radius {}m failed: {}", radius, e),
                }
            }
            bail!(
                "No panorama found near ({:.6}, {:.6}) with radii {:?}",
                lat,
                lon,
                radii
            )
        }
    }
}

pub fn stats_report(db_path: &Path, format: ReportFormat, runs: usize) -> Result<String> {
    if !Database::exists(db_path) {
        bail!(
            "No store at {}; run `streetcrawl crawl` first",
            db_path.display()
        );
    }
    let db = Database::new(db_path)
        .with_context(|| format!("Failed to open store {}", db_path.display()))?;
    let stats = StoreStats::collect(&db, runs)?;
    db.close()?;
    Ok(generate_stats_report(&stats, format)?)
}

pub fn describe_boundary(boundary: &Boundary) -> String {
    let (min_lat, min_lon, max_lat, max_lon) = boundary.bounding_box();
    let mut out = String::new();
    out.push_str(&format!("  Polygons: {}\n", boundary.polygon_count()));
    out.push_str(&format!("  Vertices: {}\n", boundary.vertex_count()));
    out.push_str(&format!(
        "  Bounding box: ({:.6}, {:.6}) to ({:.6}, {:.6})\n",
        min_lat, min_lon, max_lat, max_lon
    ));
    match boundary.centerpoint() {
        Some((lat, lon)) => {
            let inside = if boundary.contains(lat, lon) {
                "inside"
            } else {
                "outside"
            };
            out.push_str(&format!(
                "  Centerpoint: {:.6}, {:.6} ({})\n",
                lat, lon, inside
            ));
        }
        None => out.push_str("  Centerpoint: none\n"),
    }
    out
}

fn print_status(msg: &str, value: &str) {
    println!("{} {} {}", "→".blue(), msg, value.bright_white());
}

async fn load_boundary(sub_matches: &ArgMatches) -> Result<Boundary> {
    let path = expand_path(
        sub_matches
            .get_one::<String>("boundary")
            .map(String::as_str)
            .unwrap_or("boundary.geojson"),
    );
    let url = sub_matches.get_one::<Url>("boundary-url").map(Url::as_str);
    Boundary::load_or_fetch(&path, url)
        .await
        .with_context(|| format!("Failed to load boundary {}", path.display()))
}

fn lookup_client(sub_matches: &ArgMatches) -> Result<PanoramaClient> {
    let api_url = sub_matches
        .get_one::<Url>("api-url")
        .ok_or_else(|| anyhow!("--api-url is required"))?;
    let timeout = *sub_matches.get_one::<u64>("timeout").unwrap_or(&10);
    let client = match sub_matches.get_one::<String>("user-agent") {
        Some(agent) => PanoramaClient::with_user_agent(api_url.as_str(), timeout, agent)?,
        None => PanoramaClient::with_timeout(api_url.as_str(), timeout)?,
    };
    Ok(client)
}

fn radii_from_args(sub_matches: &ArgMatches) -> (u32, &str) {
    let radius = *sub_matches.get_one::<u32>("radius").unwrap_or(&50);
    let extra = sub_matches
        .get_one::<String>("extra-radii")
        .map(String::as_str)
        .unwrap_or("");
    (radius, extra)
}

// Command handlers

pub async fn handle_crawl(sub_matches: &ArgMatches, quiet: bool) -> Result<()> {
    let db_path = expand_path(
        sub_matches
            .get_one::<String>("db")
            .map(String::as_str)
            .unwrap_or("streetview.db"),
    );
    let max_new = *sub_matches.get_one::<usize>("max-new").unwrap_or(&50);
    let (radius, extra_radii) = radii_from_args(sub_matches);
    let show_progress = !quiet && !sub_matches.get_flag("no-progress");
    let options = build_crawl_options(max_new, radius, extra_radii, show_progress)?;

    let boundary = load_boundary(sub_matches).await?;
    let lookup = lookup_client(sub_matches)?;

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    if !quiet {
        println!("\n{} Crawling panoramas", "🛰".bright_cyan());
        print_status("Store:", &db_path.display().to_string());
        print_status("Service:", lookup.base_url().as_str());
        print_status("Budget:", &options.max_new.to_string());
        print_status("Radii:", &format!("{:?}", options.radii()));
        println!();
    }

    let ctx = CrawlContext::init(&db_path, &boundary, &lookup)
        .with_context(|| format!("Failed to open store {}", db_path.display()))?;
    let summary = ctx.run(&options).await;
    ctx.teardown()?;
    let summary = summary?;

    println!("\n{} Run complete!\n", "✓".green().bold());
    print!("{}", generate_crawl_report(&summary));
    Ok(())
}

pub fn handle_stats(sub_matches: &ArgMatches) -> Result<()> {
    let db_path = expand_path(
        sub_matches
            .get_one::<String>("db")
            .map(String::as_str)
            .unwrap_or("streetview.db"),
    );
    let format = sub_matches
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::parse(f))
        .unwrap_or(ReportFormat::Text);
    let runs = *sub_matches.get_one::<usize>("runs").unwrap_or(&5);

    let report = stats_report(&db_path, format, runs)?;

    match sub_matches.get_one::<PathBuf>("output") {
        Some(path) => {
            save_report(&report, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => print!("{}", report),
    }
    Ok(())
}

pub async fn handle_boundary(sub_matches: &ArgMatches) -> Result<()> {
    let boundary = load_boundary(sub_matches).await?;
    println!("{}", "BOUNDARY".bright_blue().bold());
    print!("{}", describe_boundary(&boundary));
    Ok(())
}

pub async fn handle_panorama(sub_matches: &ArgMatches) -> Result<()> {
    let (radius, extra_radii) = radii_from_args(sub_matches);
    let radii = build_crawl_options(0, radius, extra_radii, false)?.radii();
    let lookup = lookup_client(sub_matches)?;

    let target = if let Some(id) = sub_matches.get_one::<String>("id") {
        PanoramaTarget::Id(id.clone())
    } else if let (Some(&lat), Some(&lon)) = (
        sub_matches.get_one::<f64>("lat"),
        sub_matches.get_one::<f64>("lon"),
    ) {
        PanoramaTarget::Point { lat, lon }
    } else {
        let boundary = load_boundary(sub_matches).await?;
        let (lat, lon) = boundary
            .centerpoint()
            .ok_or_else(|| anyhow!("Boundary has no centerpoint"))?;
        PanoramaTarget::Point { lat, lon }
    };

    let record = find_panorama(&lookup, &target, &radii).await?;
    let json = serde_json::to_string_pretty(&record)?;

    match sub_matches.get_one::<PathBuf>("output") {
        Some(path) => {
            save_report(&json, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{} Panorama {} saved to {}",
                "✓".green().bold(),
                record.id,
                path.display().to_string().bright_white()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}
