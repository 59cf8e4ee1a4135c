use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

fn boundary_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-b --"boundary" <PATH>)
            .required(false)
            .help("GeoJSON file with the crawl boundary (Polygon or MultiPolygon)")
            .default_value("boundary.geojson"),
    )
    .arg(
        arg!(--"boundary-url" <URL>)
            .required(false)
            .help("Download the boundary from this URL when the GeoJSON file does not exist yet")
            .value_parser(clap::value_parser!(Url)),
    )
}

fn lookup_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-a --"api-url" <URL>)
            .required(true)
            .help("Base URL of the panorama metadata service")
            .value_parser(clap::value_parser!(Url)),
    )
    .arg(
        arg!(-r --"radius" <METERS>)
            .required(false)
            .help("Search radius for nearest-panorama lookups")
            .value_parser(clap::value_parser!(u32))
            .default_value("50"),
    )
    .arg(
        arg!(--"extra-radii" <LIST>)
            .required(false)
            .help("Comma-separated radii tried in order when the first radius finds nothing")
            .default_value("100,200"),
    )
    .arg(
        arg!(--"timeout" <SECONDS>)
            .required(false)
            .help("Request timeout in seconds")
            .value_parser(clap::value_parser!(u64))
            .default_value("10"),
    )
    .arg(
        arg!(--"user-agent" <AGENT>)
            .required(false)
            .help("User-Agent header sent to the panorama service"),
    )
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("streetcrawl")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("streetcrawl")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Enable debug logging")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(lookup_args(boundary_args(
            command!("crawl")
                .about(
                    "Expand up to --max-new pending panoramas inside the boundary, seeding an \
                empty store from the boundary's centerpoint. Resumes where the last run stopped.",
                )
                .arg(
                    arg!(-d --"db" <PATH>)
                        .required(false)
                        .help("SQLite store for panoramas and their adjacency")
                        .default_value("streetview.db"),
                )
                .arg(
                    arg!(-n --"max-new" <COUNT>)
                        .required(false)
                        .help("Maximum number of panoramas to expand in this run")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("50"),
                )
                .arg(
                    arg!(--"no-progress")
                        .required(false)
                        .help("Disable the progress bar")
                        .action(clap::ArgAction::SetTrue),
                ),
        )))
        .subcommand(
            command!("stats")
                .about("Show store statistics and recent runs")
                .arg(
                    arg!(-d --"db" <PATH>)
                        .required(false)
                        .help("SQLite store to inspect")
                        .default_value("streetview.db"),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                )
                .arg(
                    arg!(--"runs" <COUNT>)
                        .required(false)
                        .help("Number of recent runs to list")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("5"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
        .subcommand(boundary_args(
            command!("boundary")
                .about("Load the crawl boundary and print its shape and centerpoint"),
        ))
        .subcommand(lookup_args(boundary_args(
            command!("panorama")
                .about(
                    "Look up the panorama nearest to the boundary's centerpoint, or to \
                --lat/--lon, and print its record as JSON",
                )
                .arg(
                    arg!(--"lat" <LAT>)
                        .required(false)
                        .help("Latitude to search around instead of the centerpoint")
                        .value_parser(clap::value_parser!(f64))
                        .allow_negative_numbers(true)
                        .requires("lon"),
                )
                .arg(
                    arg!(--"lon" <LON>)
                        .required(false)
                        .help("Longitude to search around instead of the centerpoint")
                        .value_parser(clap::value_parser!(f64))
                        .allow_negative_numbers(true)
                        .requires("lat"),
                )
                .arg(
                    arg!(-i --"id" <PANO_ID>)
                        .required(false)
                        .help("Fetch this panorama by id instead of searching")
                        .conflicts_with_all(["lat", "lon"]),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save the record to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )))
}
