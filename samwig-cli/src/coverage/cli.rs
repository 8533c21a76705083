use clap::{Arg, ArgAction, Command, arg, value_parser};

use samwig_core::utils::STDIO_PATH;
use samwig_coverage::config::DEFAULT_TRACK_NAME;

pub const COVERAGE_CMD: &str = "coverage";

pub fn create_coverage_cli() -> Command {
    Command::new(COVERAGE_CMD)
        .author("Databio")
        .about("Compute a coverage depth track (wiggle or bedGraph) from a coordinate sorted SAM file.")
        .arg(
            Arg::new("input")
                .default_value(STDIO_PATH)
                .help("SAM file to read, plain or gzip compressed. Use - for standard input"),
        )
        .arg(
            arg!(-o --output <OUTPUT>)
                .required(false)
                .help("Where to write the track (default: stdout)"),
        )
        .arg(
            arg!(-n --name <NAME>)
                .default_value(DEFAULT_TRACK_NAME)
                .help("Track name written to the track line"),
        )
        .arg(
            arg!(-d --description <DESCRIPTION>)
                .required(false)
                .help("Track description written to the track line"),
        )
        .arg(
            Arg::new("min-depth")
                .short('m')
                .long("min-depth")
                .default_value("1")
                .value_parser(value_parser!(u32).range(1..))
                .help("Only report positions covered by at least this many alignments"),
        )
        .arg(
            arg!(-f --format <FORMAT>)
                .default_value("variable")
                .value_parser(["variable", "fixed", "bedgraph"])
                .help("Track format: variableStep wiggle, fixedStep wiggle or bedGraph"),
        )
        .arg(
            arg!(-w --window <WINDOW>)
                .default_value("1")
                .value_parser(value_parser!(u64).range(1..))
                .help("Step and span of fixedStep windows"),
        )
        .arg(
            Arg::new("fixed-value")
                .long("fixed-value")
                .default_value("mean")
                .value_parser(["mean", "reads"])
                .help("fixedStep window value: mean depth or number of alignments touching the window"),
        )
        .arg(
            Arg::new("skip-invalid")
                .long("skip-invalid")
                .action(ArgAction::SetTrue)
                .help("Warn about and skip unparsable lines instead of failing"),
        )
        .arg(
            arg!(-c --config <CONFIG>)
                .required(false)
                .help("TOML file with default settings. Flags given on the command line take precedence"),
        )
        .arg(
            Arg::new("progress")
                .long("progress")
                .action(ArgAction::SetTrue)
                .help("Show a progress spinner on stderr"),
        )
}
