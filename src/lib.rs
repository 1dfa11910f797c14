//! geotweet - mean thought-vector features for Twitter user geolocation
//!
//! This library turns a split of Twitter users (username, tweets, home state)
//! into a fixed-width feature matrix: the mean of each user's tweet vectors
//! followed by a region code and a state index.
//!
//! # Modules
//!
//! - [`dataset`] - Split selection and the JSON Lines dataset format
//! - [`user`] - Per-user records and derived features
//! - [`encoder`] / [`hash_encoder`] - Sentence encoder trait and a hashing encoder
//! - [`geolocator`] - State label to region / index mapping
//! - [`aggregate`] - Feature matrix construction with periodic checkpoints
//! - [`checkpoint`] - Atomic checkpoint persistence
//! - [`error`] - Custom error types with rich context

pub mod aggregate;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod geolocator;
pub mod hash_encoder;
pub mod logging;
pub mod user;

pub use aggregate::{
    AggregateOptions, AggregateOutput, AggregateStats, FeatureAggregator, FeatureMatrix, RowStatus,
};
pub use checkpoint::CheckpointMap;
pub use dataset::{Split, SplitFiles, load_twitter_users};
pub use encoder::{Encoder, EncoderError};
pub use error::{GeoError, Result, VALID_SPLITS, format_error, format_unknown_value_error};
pub use geolocator::{Geolocator, Region, UsStateGeolocator};
pub use hash_encoder::HashEncoder;
pub use user::{MeanVector, TwitterUser, raw_tweet_list};

use std::path::PathBuf;
use std::time::Duration;

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default checkpoint file name inside the data directory.
pub const DEFAULT_CHECKPOINT_NAME: &str = "user_vector_means.train.jsonl";

/// Standard width for major header dividers in CLI output
pub const HEADER_DIVIDER_WIDTH: usize = 40;

/// Get the default data directory
#[must_use]
pub fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

/// Default checkpoint path under `data_dir`.
#[must_use]
pub fn default_checkpoint_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(DEFAULT_CHECKPOINT_NAME)
}

/// Default feature output path for `split` under `data_dir`.
#[must_use]
pub fn default_output_path(data_dir: &std::path::Path, split: Split) -> PathBuf {
    data_dir.join(format!("features.{split}.jsonl"))
}

/// Format a duration as `HH:MM:SS`. Hours are not wrapped at 24.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Format an unsigned integer with thousands separators.
#[must_use]
pub fn format_number_u64(value: u64) -> String {
    let mut out = String::with_capacity(24);

    for (idx, ch) in value.to_string().chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out.chars().rev().collect()
}

/// Format a usize with thousands separators.
#[must_use]
pub fn format_number_usize(value: usize) -> String {
    format_number_u64(u64::try_from(value).unwrap_or(u64::MAX))
}
