//! geotweet - mean thought-vector features for Twitter user geolocation
//!
//! Main entry point for the geotweet command-line tool.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, ValueEnum};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, warn};

use geotweet::aggregate::write_feature_rows;
use geotweet::cli::{AggregateArgs, Cli, Commands, CompletionsArgs, ConfigArgs, InspectArgs, OutputFormat};
use geotweet::config::Config;
use geotweet::dataset::summarize;
use geotweet::logging::{LogConfig, OperationGuard, init_logging};
use geotweet::*;

/// Resolved settings shared by all commands.
struct App {
    config: Config,
    format: OutputFormat,
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut config = Config::load();

    if let Some(dir) = &cli.data_dir {
        config.paths.data_dir = Some(dir.clone());
    }
    if !config.output.colors {
        colored::control::set_override(false);
    }

    let quiet = cli.quiet || config.output.quiet;
    let mut log_config = LogConfig::from_verbosity(quiet, cli.verbose);
    let mut bad_log_setting = None;
    if !quiet && cli.verbose == 0 {
        match log_config.clone().with_overrides(
            config.output.log_level.as_deref(),
            config.output.log_format.as_deref(),
        ) {
            Ok(overridden) => log_config = overridden,
            Err(e) => bad_log_setting = Some(e),
        }
    }
    if !config.output.colors {
        log_config = log_config.without_colors();
    }
    init_logging(&log_config);
    if let Some(e) = bad_log_setting {
        warn!("{e}; using default logging");
    }

    let format = cli.format.unwrap_or_else(|| {
        OutputFormat::from_str(&config.output.format, true).unwrap_or_default()
    });
    let app = App {
        config,
        format,
        quiet,
    };

    let result = match &cli.command {
        Commands::Aggregate(args) => cmd_aggregate(&app, args),
        Commands::Inspect(args) => cmd_inspect(&app, args),
        Commands::States => cmd_states(&app),
        Commands::Config(args) => cmd_config(&app, args),
        Commands::Completions(args) => cmd_completions(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            exit_code(&err)
        }
    }
}

/// 2 for errors the user can fix by changing arguments or files, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> ExitCode {
    let recoverable = err
        .chain()
        .find_map(|e| e.downcast_ref::<GeoError>())
        .is_some_and(GeoError::is_recoverable);
    if recoverable {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

fn report_error(err: &anyhow::Error) {
    let geo = err.chain().find_map(|e| e.downcast_ref::<GeoError>());

    if let Some(GeoError::InvalidDataset { value }) = geo {
        eprintln!("{}", format_unknown_value_error("split", value, VALID_SPLITS));
        return;
    }

    eprintln!("{} {err:#}", "error:".red().bold());
    if let Some(hint) = geo.and_then(GeoError::suggestion) {
        eprintln!("  {} {hint}", "hint:".cyan());
    }
}

fn parse_split(value: &str) -> Result<Split> {
    Ok(value.parse::<Split>()?)
}

fn cmd_aggregate(app: &App, args: &AggregateArgs) -> Result<()> {
    let split = parse_split(&args.split)?;
    let config = &app.config;
    let data_dir = config.data_dir();

    let dimension = args.dimension.unwrap_or(config.aggregate.dimension);
    if dimension == 0 {
        anyhow::bail!("--dimension must be greater than zero");
    }

    let checkpoint_path = if args.no_checkpoint {
        None
    } else {
        Some(args.checkpoint.clone().unwrap_or_else(|| config.checkpoint_path()))
    };
    let output_path = args
        .output
        .clone()
        .or_else(|| config.paths.output.clone())
        .unwrap_or_else(|| default_output_path(&data_dir, split));

    let users = load_twitter_users(&data_dir, split)
        .with_context(|| format!("Failed to load the {split} split from {}", data_dir.display()))?;

    let options = AggregateOptions {
        checkpoint_path: checkpoint_path.clone(),
        checkpoint_every: args.checkpoint_every.unwrap_or(config.aggregate.checkpoint_every),
        progress_every: args.progress_every.unwrap_or(config.aggregate.progress_every),
        keep_checkpoints: args.keep_checkpoints.unwrap_or(config.aggregate.keep_checkpoints),
    };
    debug!(?options, dimension, "Aggregate options");

    let mut aggregator =
        FeatureAggregator::new(HashEncoder::new(dimension), UsStateGeolocator::new(), options);
    let encoder = aggregator.encoder_info();

    if args.resume {
        match checkpoint_path.as_deref().filter(|p| p.exists()) {
            Some(path) => {
                let previous = CheckpointMap::load(path)?;
                aggregator = aggregator.with_resume(previous)?;
            }
            None => warn!("No checkpoint to resume from; starting fresh"),
        }
    }

    let show_progress = !app.quiet && app.format == OutputFormat::Text;
    let pb = if show_progress {
        let pb = ProgressBar::new(users.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} users")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let guard = OperationGuard::new(format!("aggregate {split}"));
    let output = match aggregator.aggregate_with(&users, |processed| pb.set_position(processed as u64)) {
        Ok(output) => {
            guard.complete();
            output
        }
        Err(e) => {
            pb.abandon();
            guard.fail(&e);
            return Err(e.into());
        }
    };
    pb.finish_and_clear();

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    write_feature_rows(&output_path, &users, &output.matrix)?;

    let stats = &output.stats;
    match app.format {
        OutputFormat::Json => {
            let summary = json!({
                "split": split,
                "output": output_path,
                "checkpoint": checkpoint_path,
                "encoder": encoder,
                "width": output.matrix.cols(),
                "stats": stats,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            if app.quiet {
                return Ok(());
            }
            println!("{}", format!("Aggregated {split} split").bold().cyan());
            println!("{}", "=".repeat(HEADER_DIVIDER_WIDTH).dimmed());
            println!("  Users:       {}", format_number_usize(stats.users));
            println!("  Filled:      {}", format_number_usize(stats.filled).green());
            if stats.empty > 0 {
                println!(
                    "  Empty:       {} {}",
                    format_number_usize(stats.empty).yellow(),
                    "(no tweets, zero rows)".dimmed()
                );
            }
            if stats.resumed > 0 {
                println!("  Resumed:     {}", format_number_usize(stats.resumed));
            }
            println!("  Encoder:     {} ({} dims)", encoder.id, encoder.dimension);
            println!("  Width:       {}", output.matrix.cols());
            println!("  Elapsed:     {}", format_elapsed(stats.elapsed));
            println!("  Output:      {}", output_path.display());
            if let Some(path) = &checkpoint_path {
                println!(
                    "  Checkpoint:  {} ({} writes)",
                    path.display(),
                    stats.checkpoints_written
                );
            }
        }
    }
    Ok(())
}

fn cmd_inspect(app: &App, args: &InspectArgs) -> Result<()> {
    let split = parse_split(&args.split)?;
    let data_dir = app.config.data_dir();
    let users = load_twitter_users(&data_dir, split)
        .with_context(|| format!("Failed to load the {split} split from {}", data_dir.display()))?;
    let summary = summarize(&users);

    if app.format == OutputFormat::Json {
        let out = json!({ "split": split, "summary": summary });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", format!("Split: {split}").bold().cyan());
    println!("{}", "=".repeat(HEADER_DIVIDER_WIDTH).dimmed());
    println!("  Users:           {}", format_number_usize(summary.users));
    println!("  Tweets:          {}", format_number_usize(summary.tweets));
    println!(
        "  Without tweets:  {}",
        format_number_usize(summary.users_without_tweets)
    );
    println!("  States:          {}", summary.states.len());

    if !summary.states.is_empty() && args.top > 0 {
        let mut by_count: Vec<(&String, &usize)> = summary.states.iter().collect();
        by_count.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        println!();
        println!("{}", "Top states".bold());
        for (state, count) in by_count.into_iter().take(args.top) {
            println!("  {state:<22} {:>8}", format_number_usize(*count));
        }
    }
    Ok(())
}

fn cmd_states(app: &App) -> Result<()> {
    let geo = UsStateGeolocator::new();

    if app.format == OutputFormat::Json {
        let rows: Vec<_> = geo
            .states()
            .iter()
            .enumerate()
            .map(|(index, s)| {
                json!({
                    "index": index,
                    "name": s.name,
                    "code": s.code,
                    "region": s.region.name(),
                    "region_code": s.region.code(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "{}",
        format!("{:>5}  {:<4}  {:<22}  {}", "INDEX", "CODE", "STATE", "REGION").bold()
    );
    for (index, s) in geo.states().iter().enumerate() {
        println!(
            "{index:>5}  {:<4}  {:<22}  {} ({})",
            s.code,
            s.name,
            s.region.name(),
            s.region.code()
        );
    }
    println!();
    println!("{} states, {} regions", geo.state_count(), Region::ALL.len());
    Ok(())
}

fn cmd_config(app: &App, args: &ConfigArgs) -> Result<()> {
    if args.init {
        let path = Config::user_config_path()
            .context("Could not determine the user config directory")?;
        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }
        let written = Config::default()
            .save()
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} Wrote {}", "✓".green(), written.display());
        return Ok(());
    }

    if args.show {
        match app.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&app.config)?),
            OutputFormat::Text => {
                println!("{}", "Current Configuration".bold().cyan());
                println!("  Data dir:    {}", app.config.data_dir().display());
                println!("  Checkpoint:  {}", app.config.checkpoint_path().display());
                println!();
                print!("{}", toml::to_string_pretty(&app.config)?);
            }
        }
        return Ok(());
    }

    let location = Config::user_config_path()
        .map_or_else(|| "<unknown>".to_string(), |p: PathBuf| p.display().to_string());
    println!("Config file: {location}");
    println!("Run 'geotweet config --show' to print the effective configuration,");
    println!("or 'geotweet config --init' to write the defaults:");
    println!();
    print!("{}", Config::default_config_content());
    Ok(())
}

fn cmd_completions(args: &CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "geotweet", &mut io::stdout());
    Ok(())
}
