use crate::CLAP_STYLING;
use clap::{arg, command};

/// Flags shared by every subcommand that talks to a provider.
fn provider_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-t --"map-type" <VENDOR>)
            .required(false)
            .help("Panorama provider")
            .value_parser(["gmap", "amap", "qmap"])
            .default_value("qmap"),
    )
    .arg(
        arg!(--"cache-dir" <PATH>)
            .required(false)
            .help("Directory holding cached provider documents and the failure list")
            .default_value("info_cache"),
    )
    .arg(
        arg!(--"backend" <BACKEND>)
            .required(false)
            .help("Document store: one file per document, or a single SQLite database")
            .value_parser(["fs", "sqlite"])
            .default_value("fs"),
    )
    .arg(
        arg!(--"timeout" <SECONDS>)
            .required(false)
            .help("Timeout of the first attempt, doubled after every failure")
            .value_parser(clap::value_parser!(u64))
            .default_value("4"),
    )
    .arg(
        arg!(--"retries" <ATTEMPTS>)
            .required(false)
            .help("Total attempts per request")
            .value_parser(clap::value_parser!(u32))
            .default_value("8"),
    )
    .arg(
        arg!(--"floor" <ORDINAL>)
            .required(false)
            .help("Floor to follow in multi-level panoramas (gmap)")
            .value_parser(clap::value_parser!(i64))
            .allow_negative_numbers(true)
            .default_value("0"),
    )
    .arg(
        arg!(--"boundary" <PATH>)
            .required(false)
            .help("JSON country boundary replacing the built-in one")
            .value_parser(clap::value_parser!(std::path::PathBuf)),
    )
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("panogrid")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("panogrid")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            provider_args(
                command!("crawl")
                    .about(
                        "Crawl every panorama inside the regions of a regions file and write \
                    them to a single output file.",
                    )
                    .arg(
                        arg!(<REGIONS>)
                            .required(true)
                            .help("YAML file with seed_gap and a list of regions")
                            .value_parser(clap::value_parser!(std::path::PathBuf)),
                    )
                    .arg(
                        arg!(-o --"out" <PATH>)
                            .required(false)
                            .help("Output file, .yaml or .json (default: <REGIONS stem>_panos.yaml)")
                            .value_parser(clap::value_parser!(std::path::PathBuf)),
                    )
                    .arg(
                        arg!(-w --"workers" <NUM_WORKERS>)
                            .required(false)
                            .help("Requests in flight while expanding a level")
                            .value_parser(clap::value_parser!(usize))
                            .default_value("8"),
                    )
                    .arg(
                        arg!(--"inset" <FRACTION>)
                            .required(false)
                            .help("Shrink each side of the seed grid box by this fraction")
                            .value_parser(clap::value_parser!(f64))
                            .default_value("0"),
                    ),
            ),
        )
        .subcommand(provider_args(
            command!("pano")
                .about("Fetch one panorama by ID and print its position")
                .arg(arg!(<ID>).required(true).help("Provider panorama ID")),
        ))
        .subcommand(provider_args(
            command!("locate")
                .about("Find the panorama nearest to a WGS-84 point or a named place")
                .arg(arg!(<LAT>).required(true).help("Latitude, or a place name").allow_negative_numbers(true))
                .arg(arg!([LNG]).required(false).help("Longitude").allow_negative_numbers(true)),
        ))
        .subcommand(
            command!("convert")
                .about("Convert a point between wgs84, gcj02 and bd09")
                .arg(arg!(<LAT>).required(true).help("Latitude, or a place name").allow_negative_numbers(true))
                .arg(arg!([LNG]).required(false).help("Longitude").allow_negative_numbers(true))
                .arg(
                    arg!(--"from" <FRAME>)
                        .required(false)
                        .value_parser(["wgs84", "gcj02", "bd09"])
                        .default_value("wgs84"),
                )
                .arg(
                    arg!(--"to" <FRAME>)
                        .required(false)
                        .value_parser(["wgs84", "gcj02", "bd09"])
                        .default_value("gcj02"),
                )
                .arg(
                    arg!(--"boundary" <PATH>)
                        .required(false)
                        .help("JSON country boundary replacing the built-in one")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
}
