//! CLI definitions for geotweet.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// geotweet - mean thought-vector features for Twitter user geolocation
#[derive(Parser, Debug)]
#[command(name = "geotweet")]
#[command(version)]
#[command(about = "Build per-user mean thought-vector features for Twitter geolocation")]
#[command(long_about = r#"
geotweet turns a split of Twitter users into a feature matrix for a state /
region classifier. Each row is the mean of the user's tweet vectors followed
by the user's region code and state index.

Data layout (under --data-dir):
  user_states.<split>.jsonl   username -> home state (or null)
  user_tweets.<split>.jsonl   username -> tweets

Quick start:
  1. Inspect a split:   geotweet inspect --split dev
  2. Build features:    geotweet aggregate --split train
  3. Resume after kill: geotweet aggregate --split train --resume
"#)]
pub struct Cli {
    /// Directory holding the split files
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Output format [default: text, or `output.format` from the config file]
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Aggregate a split into a feature matrix
    Aggregate(AggregateArgs),

    /// Load a split and summarize it
    Inspect(InspectArgs),

    /// List the state table used for region / index lookups
    States,

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct AggregateArgs {
    /// Dataset split: train, dev or test
    #[arg(long, short = 's', default_value = "train")]
    pub split: String,

    /// Feature rows output file [default: <data-dir>/features.<split>.jsonl]
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Checkpoint file [default: <data-dir>/user_vector_means.train.jsonl]
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Disable checkpoint writes
    #[arg(long, conflicts_with_all = ["checkpoint", "resume"])]
    pub no_checkpoint: bool,

    /// Users between checkpoint writes (0 = only at the end)
    #[arg(long)]
    pub checkpoint_every: Option<usize>,

    /// Users between progress log lines (0 = never)
    #[arg(long)]
    pub progress_every: Option<usize>,

    /// Numbered checkpoint copies to keep (0 = overwrite a single file)
    #[arg(long)]
    pub keep_checkpoints: Option<usize>,

    /// Reuse rows from an existing checkpoint
    #[arg(long)]
    pub resume: bool,

    /// Encoder output width
    #[arg(long, short = 'd')]
    pub dimension: Option<usize>,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Dataset split: train, dev or test
    #[arg(long, short = 's', default_value = "dev")]
    pub split: String,

    /// Number of states to show in text output
    #[arg(long, short = 'n', default_value = "10")]
    pub top: usize,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Write a default config file to the user config directory
    #[arg(long, conflicts_with = "show")]
    pub init: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
