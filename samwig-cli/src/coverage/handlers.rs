use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ArgMatches;
use clap::parser::ValueSource;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use samwig_core::utils::{STDIO_PATH, get_dynamic_reader_w_stdin, get_dynamic_writer};
use samwig_coverage::{
    CoverageConfig, FixedValue, ParseErrorPolicy, TrackFormat, sam_to_wig_with_progress,
};

/// Values with a clap default only override the config file when typed out.
fn given_on_command_line(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

///
/// Build the run configuration: the config file (if any) provides the
/// defaults and command line flags are layered on top.
///
pub fn resolve_config(matches: &ArgMatches) -> Result<CoverageConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => CoverageConfig::try_from(Path::new(path))
            .with_context(|| format!("Failed to load config file {}", path))?,
        None => CoverageConfig::default(),
    };

    if given_on_command_line(matches, "name") {
        if let Some(name) = matches.get_one::<String>("name") {
            config.name = name.clone();
        }
    }
    if let Some(description) = matches.get_one::<String>("description") {
        config.description = Some(description.clone());
    }
    if given_on_command_line(matches, "min-depth") {
        if let Some(min_depth) = matches.get_one::<u32>("min-depth") {
            config.min_depth = *min_depth;
        }
    }
    if given_on_command_line(matches, "format") {
        if let Some(format) = matches.get_one::<String>("format") {
            config.format = format.parse::<TrackFormat>()?;
        }
    }
    if given_on_command_line(matches, "window") {
        if let Some(window) = matches.get_one::<u64>("window") {
            config.window = *window;
        }
    }
    if given_on_command_line(matches, "fixed-value") {
        if let Some(value) = matches.get_one::<String>("fixed-value") {
            config.fixed_value = value.parse::<FixedValue>()?;
        }
    }
    if matches.get_flag("skip-invalid") {
        config.on_parse_error = ParseErrorPolicy::Skip;
    }
    if let Some(output) = matches.get_one::<String>("output") {
        config.output = Some(PathBuf::from(output));
    }

    config.validate()?;
    Ok(config)
}

fn create_progress_bar(enabled: bool) -> Result<ProgressBar> {
    if !enabled {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg} ({pos} lines)")?,
    );
    pb.set_message("Computing coverage");
    Ok(pb)
}

pub fn run_coverage(matches: &ArgMatches) -> Result<()> {
    let config = resolve_config(matches)?;

    let input = matches
        .get_one::<String>("input")
        .map(String::as_str)
        .unwrap_or(STDIO_PATH);

    let reader = get_dynamic_reader_w_stdin(input)
        .with_context(|| format!("Failed to open input {}", input))?;
    let mut writer = get_dynamic_writer(config.output.as_deref())
        .with_context(|| format!("Failed to open output {:?}", config.output))?;

    let progress = create_progress_bar(matches.get_flag("progress"))?;
    let stats = sam_to_wig_with_progress(reader, &mut writer, &config, &progress)
        .with_context(|| format!("Failed to compute coverage for {}", input))?;
    progress.finish_and_clear();

    info!(
        "Coverage for {} written to {}: {}",
        input,
        config
            .output
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".to_string()),
        stats
    );
    Ok(())
}
