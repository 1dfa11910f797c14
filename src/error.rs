//! Custom error types for geotweet.
//!
//! Provides structured error handling with detailed context for better
//! diagnostics. Users with zero tweets are deliberately *not* an error: see
//! [`MeanVector::NoData`](crate::user::MeanVector).

use std::path::PathBuf;
use thiserror::Error;

use crate::encoder::EncoderError;

/// Primary error type for geotweet operations.
#[derive(Error, Debug)]
pub enum GeoError {
    // =========================================================================
    // Dataset Errors
    // =========================================================================
    /// Split selector outside {train, dev, test}.
    #[error("Dataset value '{value}' is not valid. Valid values: 'train', 'dev', 'test'")]
    InvalidDataset { value: String },

    /// Username listed in the states file has no entry in the tweets file.
    #[error("User '{username}' has a state label but no tweets entry")]
    MissingAssociation { username: String },

    /// The same username appears twice in one dataset file.
    #[error("Duplicate user '{username}' in '{file}'")]
    DuplicateUser { username: String, file: String },

    /// Failed to parse a dataset or checkpoint file.
    #[error("Failed to parse '{file}': {reason}")]
    ParseError { file: String, reason: String },

    // =========================================================================
    // Geolocation Errors
    // =========================================================================
    /// Derived geolocation requested for a user whose state is null.
    #[error("State is None for user '{username}'")]
    InvalidState { username: String },

    /// The geolocator does not recognise the label.
    #[error("Unknown state label '{label}'")]
    UnknownState { label: String },

    // =========================================================================
    // Feature Errors
    // =========================================================================
    /// A vector does not have the width the matrix or checkpoint expects.
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// The encoder failed.
    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    // =========================================================================
    // IO Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },
}

/// Result type alias for geotweet operations.
pub type Result<T> = std::result::Result<T, GeoError>;

impl GeoError {
    /// Create an invalid dataset error.
    pub fn invalid_dataset(value: impl Into<String>) -> Self {
        Self::InvalidDataset {
            value: value.into(),
        }
    }

    /// Create a missing association error.
    pub fn missing_association(username: impl Into<String>) -> Self {
        Self::MissingAssociation {
            username: username.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(username: impl Into<String>) -> Self {
        Self::InvalidState {
            username: username.into(),
        }
    }

    /// Create an unknown state error.
    pub fn unknown_state(label: impl Into<String>) -> Self {
        Self::UnknownState {
            label: label.into(),
        }
    }

    /// Create a parse error.
    pub fn parse_error(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseError {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Check if this error is recoverable (user can fix it).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidDataset { .. } | Self::ConfigError { .. } | Self::PathError { .. }
        )
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidDataset { .. } => Some("Pass one of: train, dev, test."),
            Self::MissingAssociation { .. } => {
                Some("Regenerate the split so every labelled user has a tweets entry.")
            }
            Self::UnknownState { .. } => {
                Some("Run 'geotweet states' to list the labels the geolocator accepts.")
            }
            Self::DimensionMismatch { .. } => {
                Some("Use the same --dimension as the run that wrote the checkpoint.")
            }
            _ => None,
        }
    }
}

// =============================================================================
// CLI Error Formatting Utilities
// =============================================================================

use colored::Colorize;

/// Format a structured CLI error with explanation and suggestions.
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), title.bold());

    if !explanation.is_empty() {
        let _ = write!(output, "\n\n   {explanation}");
    }

    if !suggestions.is_empty() {
        output.push_str("\n\n   ");
        if suggestions.len() == 1 {
            let _ = write!(output, "{} {}", "Hint:".cyan(), suggestions[0]);
        } else {
            let _ = write!(output, "{}:", "Try".cyan());
            for suggestion in suggestions {
                let _ = write!(output, "\n     {} {}", "•".dimmed(), suggestion);
            }
        }
    }

    output
}

/// Calculate the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev_row: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr_row: Vec<usize> = vec![0; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_chars.len()]
}

/// Find the closest candidate within `max_distance` edits (default 2).
#[must_use]
pub fn find_closest_match<'a>(
    input: &str,
    candidates: &[&'a str],
    max_distance: Option<usize>,
) -> Option<&'a str> {
    let max_dist = max_distance.unwrap_or(2);
    let input_lower = input.to_lowercase();

    candidates
        .iter()
        .map(|&candidate| {
            let distance = levenshtein_distance(&input_lower, &candidate.to_lowercase());
            (candidate, distance)
        })
        .filter(|(candidate, distance)| *distance <= max_dist && input != *candidate)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Format an error for an unknown value with "did you mean?" support.
#[must_use]
pub fn format_unknown_value_error(kind: &str, input: &str, valid_options: &[&str]) -> String {
    let title = format!("Unknown {kind}: '{input}'");

    let mut suggestions = Vec::new();
    if let Some(closest) = find_closest_match(input, valid_options, None) {
        suggestions.push(format!("Did you mean '{}'?", closest.green()));
    }
    if valid_options.len() <= 8 {
        suggestions.push(format!("Valid {kind}s: {}", valid_options.join(", ")));
    }

    let suggestion_refs: Vec<&str> = suggestions.iter().map(String::as_str).collect();
    format_error(&title, "", &suggestion_refs)
}

/// Valid dataset split names.
pub const VALID_SPLITS: &[&str] = &["train", "dev", "test"];
