//! Mean thought-vector feature construction.
//!
//! For every user, in input order, the aggregator encodes the user's tweets,
//! averages the rows, appends `[region, state_index]`, and writes the result
//! into row `i` of a pre-allocated [`FeatureMatrix`] and into the
//! [`CheckpointMap`]. Users without tweets keep a zero row marked
//! [`RowStatus::Empty`] and stay out of the checkpoint map.
//!
//! Every `checkpoint_every` users the checkpoint map is written to disk;
//! every `progress_every` users a progress event is logged. Neither affects
//! the result.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::checkpoint::CheckpointMap;
use crate::encoder::{Encoder, EncoderError, EncoderInfo};
use crate::error::{GeoError, Result};
use crate::format_elapsed;
use crate::geolocator::Geolocator;
use crate::user::{MeanVector, TwitterUser};

/// Default number of users between checkpoint writes.
pub const DEFAULT_CHECKPOINT_EVERY: usize = 10_000;

/// Default number of users between progress events.
pub const DEFAULT_PROGRESS_EVERY: usize = 100;

/// Categorical columns appended after the mean vector: region, state index.
pub const GEO_COLUMNS: usize = 2;

/// Format tag of the feature rows file.
pub const FEATURES_FORMAT: &str = "geotweet-features";

/// Whether a matrix row holds real features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    /// Mean vector and geolocation columns were written.
    Filled,
    /// The user had no tweets; the row is all zeros.
    Empty,
}

/// Dense row-major `f32` matrix, one row per user.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
    status: Vec<RowStatus>,
}

impl FeatureMatrix {
    /// A `rows x cols` matrix of zeros, every row [`RowStatus::Empty`].
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
            status: vec![RowStatus::Empty; rows],
        }
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// # Panics
    ///
    /// Panics if `i >= rows()`.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// # Panics
    ///
    /// Panics if `i >= rows()`.
    #[must_use]
    pub fn status(&self, i: usize) -> RowStatus {
        self.status[i]
    }

    /// Overwrite row `i` and mark it filled.
    ///
    /// # Errors
    ///
    /// [`GeoError::DimensionMismatch`] if `values` is not `cols()` long.
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows()`.
    pub fn set_row(&mut self, i: usize, values: &[f32]) -> Result<()> {
        if values.len() != self.cols {
            return Err(GeoError::DimensionMismatch {
                expected: self.cols,
                found: values.len(),
            });
        }
        self.data[i * self.cols..(i + 1) * self.cols].copy_from_slice(values);
        self.status[i] = RowStatus::Filled;
        Ok(())
    }

    /// Rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact(0) panics; a zero-width matrix has no row data anyway.
        self.data.chunks_exact(self.cols.max(1)).take(self.rows)
    }

    /// Whole matrix as one row-major slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[must_use]
    pub fn filled_rows(&self) -> usize {
        self.status
            .iter()
            .filter(|s| **s == RowStatus::Filled)
            .count()
    }
}

/// Knobs for one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Where to write checkpoints; `None` disables them.
    pub checkpoint_path: Option<PathBuf>,
    /// Users between checkpoint writes (0 = only the final write).
    pub checkpoint_every: usize,
    /// Users between progress events (0 = none).
    pub progress_every: usize,
    /// Numbered checkpoint copies to retain (0 = single overwritten file).
    pub keep_checkpoints: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            checkpoint_path: None,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            progress_every: DEFAULT_PROGRESS_EVERY,
            keep_checkpoints: 0,
        }
    }
}

/// Counters reported after a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub users: usize,
    pub filled: usize,
    pub empty: usize,
    /// Rows taken from a resumed checkpoint instead of re-encoded.
    pub resumed: usize,
    pub checkpoints_written: usize,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_millis())
}

/// Result of [`FeatureAggregator::aggregate`].
#[derive(Debug, Clone)]
pub struct AggregateOutput {
    pub matrix: FeatureMatrix,
    pub checkpoint: CheckpointMap,
    pub stats: AggregateStats,
}

/// Builds the feature matrix from users.
pub struct FeatureAggregator<E, G> {
    encoder: E,
    geolocator: G,
    options: AggregateOptions,
    resume: Option<CheckpointMap>,
}

impl<E: Encoder, G: Geolocator> FeatureAggregator<E, G> {
    pub fn new(encoder: E, geolocator: G, options: AggregateOptions) -> Self {
        Self {
            encoder,
            geolocator,
            options,
            resume: None,
        }
    }

    /// Reuse rows from a previous run's checkpoint.
    ///
    /// # Errors
    ///
    /// [`GeoError::DimensionMismatch`] if the checkpoint rows do not match
    /// this aggregator's [`width`](Self::width).
    pub fn with_resume(mut self, checkpoint: CheckpointMap) -> Result<Self> {
        if checkpoint.width() != self.width() {
            return Err(GeoError::DimensionMismatch {
                expected: self.width(),
                found: checkpoint.width(),
            });
        }
        info!(entries = checkpoint.len(), "Resuming from checkpoint");
        self.resume = Some(checkpoint);
        Ok(self)
    }

    /// Columns per feature row: encoder width plus the geolocation columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.encoder.dimension() + GEO_COLUMNS
    }

    /// Identity and width of the encoder behind this aggregator.
    #[must_use]
    pub fn encoder_info(&self) -> EncoderInfo {
        self.encoder.info()
    }

    #[must_use]
    pub const fn options(&self) -> &AggregateOptions {
        &self.options
    }

    /// Feature row for one user, `None` if the user has no tweets.
    ///
    /// # Errors
    ///
    /// Encoder failures (including a non-finite mean), a null state, or a
    /// label the geolocator rejects.
    pub fn feature_row(&self, user: &TwitterUser) -> Result<Option<Vec<f32>>> {
        let mean = match user.embedding_mean(&self.encoder)? {
            MeanVector::Mean(mean) => mean,
            MeanVector::NoData => return Ok(None),
        };
        if let Some(pos) = mean.iter().position(|v| !v.is_finite()) {
            return Err(EncoderError::EncodingFailed(format!(
                "non-finite value at column {pos} in the mean for user '{}'",
                user.username()
            ))
            .into());
        }
        self.with_geo_columns(user, &mean).map(Some)
    }

    /// `mean ++ [region code, state index]` for `user`.
    #[allow(clippy::cast_precision_loss)]
    fn with_geo_columns(&self, user: &TwitterUser, mean: &[f32]) -> Result<Vec<f32>> {
        let region = user.region(&self.geolocator)?;
        let state_index = user.state_index(&self.geolocator)?;

        let mut row = Vec::with_capacity(self.width());
        row.extend_from_slice(mean);
        row.push(region.code() as f32);
        row.push(state_index as f32);
        Ok(row)
    }

    /// Aggregate `users` into a feature matrix.
    ///
    /// # Errors
    ///
    /// Fails fast on the first encoder, geolocation, or checkpoint I/O
    /// error. A user without tweets is not an error.
    pub fn aggregate(&self, users: &[TwitterUser]) -> Result<AggregateOutput> {
        self.aggregate_with(users, |_| {})
    }

    /// [`aggregate`](Self::aggregate), calling `on_user(processed)` after
    /// each user.
    ///
    /// # Errors
    ///
    /// Same as [`aggregate`](Self::aggregate).
    pub fn aggregate_with<F>(&self, users: &[TwitterUser], mut on_user: F) -> Result<AggregateOutput>
    where
        F: FnMut(usize),
    {
        let width = self.width();
        let mut matrix = FeatureMatrix::zeros(users.len(), width);
        let mut checkpoint = CheckpointMap::new(width);
        let mut stats = AggregateStats {
            users: users.len(),
            ..AggregateStats::default()
        };

        let encoder = self.encoder_info();
        info!(
            users = users.len(),
            width,
            encoder = %encoder.id,
            dimension = encoder.dimension,
            "Aggregating mean thought vectors"
        );

        let run_start = Instant::now();
        let mut window_start = run_start;
        let mut dirty = false;

        for (i, user) in users.iter().enumerate() {
            // Only the mean is reused; the geo columns follow the current state.
            let resumed = self
                .resume
                .as_ref()
                .and_then(|r| r.get(user.username()))
                .map(|row| &row[..self.encoder.dimension()]);

            let row = if let Some(mean) = resumed {
                stats.resumed += 1;
                Some(self.with_geo_columns(user, mean)?)
            } else {
                self.feature_row(user)?
            };

            if let Some(row) = row {
                matrix.set_row(i, &row)?;
                checkpoint.insert(user.username(), row)?;
                stats.filled += 1;
                dirty = true;
            } else {
                stats.empty += 1;
                debug!(row = i, username = %user.username(), "Left empty row");
            }

            let processed = i + 1;
            on_user(processed);

            let every = self.options.checkpoint_every;
            if let Some(path) = &self.options.checkpoint_path {
                if every > 0 && processed % every == 0 {
                    self.write_checkpoint(&checkpoint, path, processed)?;
                    stats.checkpoints_written += 1;
                    dirty = false;
                }
            }

            if self.options.progress_every > 0 && processed % self.options.progress_every == 0 {
                let now = Instant::now();
                info!(
                    processed,
                    total = users.len(),
                    elapsed = %format_elapsed(now - window_start),
                    "Iteration {processed}"
                );
                window_start = now;
            }
        }

        if let Some(path) = self.options.checkpoint_path.as_deref().filter(|_| dirty) {
            self.write_checkpoint(&checkpoint, path, users.len())?;
            stats.checkpoints_written += 1;
        }

        stats.elapsed = run_start.elapsed();
        info!(
            filled = stats.filled,
            empty = stats.empty,
            resumed = stats.resumed,
            elapsed = %format_elapsed(stats.elapsed),
            "Aggregation finished"
        );

        Ok(AggregateOutput {
            matrix,
            checkpoint,
            stats,
        })
    }

    fn write_checkpoint(&self, checkpoint: &CheckpointMap, path: &Path, processed: usize) -> Result<()> {
        checkpoint.save_numbered(path, processed, self.options.keep_checkpoints)?;
        info!(
            path = %path.display(),
            processed,
            entries = checkpoint.len(),
            "Checkpoint written"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct FeaturesHeader<'a> {
    format: &'a str,
    version: u32,
    rows: usize,
    cols: usize,
}

#[derive(Serialize)]
struct FeatureLine<'a> {
    username: &'a str,
    status: RowStatus,
    row: &'a [f32],
}

/// Write `matrix` as JSON Lines, one `{"username","status","row"}` object
/// per user, after a header line.
///
/// # Errors
///
/// [`GeoError::DimensionMismatch`] if `users` and `matrix` disagree on the
/// row count, or any I/O failure.
pub fn write_feature_rows(path: &Path, users: &[TwitterUser], matrix: &FeatureMatrix) -> Result<()> {
    if users.len() != matrix.rows() {
        return Err(GeoError::DimensionMismatch {
            expected: matrix.rows(),
            found: users.len(),
        });
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| GeoError::path_error("create directory", parent, e))?;
    }

    let file = File::create(path).map_err(|e| GeoError::path_error("create", path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(
        &mut writer,
        &FeaturesHeader {
            format: FEATURES_FORMAT,
            version: 1,
            rows: matrix.rows(),
            cols: matrix.cols(),
        },
    )?;
    writer.write_all(b"\n")?;

    for (i, (user, row)) in users.iter().zip(matrix.iter_rows()).enumerate() {
        let line = FeatureLine {
            username: user.username(),
            status: matrix.status(i),
            row,
        };
        serde_json::to_writer(&mut writer, &line)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geolocator::UsStateGeolocator;
    use crate::user::tests::TableEncoder;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// In-memory sink for a test subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn encoder() -> TableEncoder {
        TableEncoder::new(
            2,
            &[
                ("t1", &[1.0, 3.0]),
                ("t2", &[3.0, 5.0]),
                ("t3", &[-2.0, 0.5]),
            ],
        )
    }

    fn user(name: &str, state: &str, tweets: &[&str]) -> TwitterUser {
        TwitterUser::new(name, tweets.iter().map(|t| (*t).to_string()).collect())
            .with_state(Some(state))
    }

    fn users() -> Vec<TwitterUser> {
        vec![
            user("alice", "Texas", &["t1", "t2"]),
            user("bob", "Ohio", &[]),
            user("carol", "California", &["t3"]),
        ]
    }

    #[test]
    fn test_matrix_zeros_and_set_row() {
        let mut m = FeatureMatrix::zeros(2, 3);
        assert_eq!(m.row(1), &[0.0, 0.0, 0.0]);
        assert_eq!(m.status(1), RowStatus::Empty);
        m.set_row(1, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(m.row(1), &[1.0, 2.0, 3.0]);
        assert_eq!(m.status(1), RowStatus::Filled);
        assert_eq!(m.filled_rows(), 1);
        assert!(m.set_row(0, &[1.0]).is_err());
        assert_eq!(m.iter_rows().count(), 2);
    }

    #[test]
    fn test_rows_are_mean_then_region_then_state() {
        let agg = FeatureAggregator::new(encoder(), UsStateGeolocator::new(), AggregateOptions::default());
        let out = agg.aggregate(&users()).unwrap();

        assert_eq!(out.matrix.rows(), 3);
        assert_eq!(out.matrix.cols(), 4);
        // Texas: South (2), index 43
        assert_eq!(out.matrix.row(0), &[2.0, 4.0, 2.0, 43.0]);
        // California: West (3), index 4
        assert_eq!(out.matrix.row(2), &[-2.0, 0.5, 3.0, 4.0]);
    }

    #[test]
    fn test_empty_user_keeps_zero_row_and_skips_checkpoint() {
        let agg = FeatureAggregator::new(encoder(), UsStateGeolocator::new(), AggregateOptions::default());
        let out = agg.aggregate(&users()).unwrap();

        assert_eq!(out.matrix.row(1), &[0.0; 4]);
        assert_eq!(out.matrix.status(1), RowStatus::Empty);
        assert_eq!(out.stats.filled, 2);
        assert_eq!(out.stats.empty, 1);
        assert_eq!(
            out.checkpoint.usernames().collect::<Vec<_>>(),
            vec!["alice", "carol"]
        );
        assert_eq!(out.checkpoint.get("alice"), Some(out.matrix.row(0)));
        assert_eq!(out.checkpoint.get("carol"), Some(out.matrix.row(2)));
    }

    #[test]
    fn test_unknown_state_aborts_run() {
        let agg = FeatureAggregator::new(encoder(), UsStateGeolocator::new(), AggregateOptions::default());
        let bad = vec![user("alice", "Texas", &["t1"]), user("zed", "Atlantis", &["t1"])];
        assert!(matches!(agg.aggregate(&bad), Err(GeoError::UnknownState { .. })));
    }

    #[test]
    fn test_periodic_checkpoints() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("means.jsonl");
        let options = AggregateOptions {
            checkpoint_path: Some(path.clone()),
            checkpoint_every: 2,
            progress_every: 1,
            keep_checkpoints: 0,
        };
        let agg = FeatureAggregator::new(encoder(), UsStateGeolocator::new(), options);

        let mut seen = Vec::new();
        let out = agg.aggregate_with(&users(), |n| seen.push(n)).unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
        // After user 2, then a final write for carol.
        assert_eq!(out.stats.checkpoints_written, 2);

        let saved = CheckpointMap::load(&path).unwrap();
        assert_eq!(saved, out.checkpoint);
    }

    #[test]
    fn test_no_final_write_when_nothing_changed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("means.jsonl");
        let options = AggregateOptions {
            checkpoint_path: Some(path),
            checkpoint_every: 1,
            ..AggregateOptions::default()
        };
        let agg = FeatureAggregator::new(encoder(), UsStateGeolocator::new(), options);
        let out = agg.aggregate(&users()).unwrap();
        assert_eq!(out.stats.checkpoints_written, 3);
    }

    #[test]
    fn test_resume_reuses_rows() {
        let mut previous = CheckpointMap::new(4);
        previous.insert("alice", vec![7.0, 7.0, 2.0, 43.0]).unwrap();

        let agg = FeatureAggregator::new(encoder(), UsStateGeolocator::new(), AggregateOptions::default())
            .with_resume(previous)
            .unwrap();
        let out = agg.aggregate(&users()).unwrap();
        assert_eq!(out.stats.resumed, 1);
        assert_eq!(out.matrix.row(0), &[7.0, 7.0, 2.0, 43.0]);
        assert_eq!(out.matrix.row(2), &[-2.0, 0.5, 3.0, 4.0]);
    }

    #[test]
    fn test_resume_width_mismatch() {
        let agg = FeatureAggregator::new(encoder(), UsStateGeolocator::new(), AggregateOptions::default());
        let err = agg.with_resume(CheckpointMap::new(10)).err().unwrap();
        assert!(matches!(err, GeoError::DimensionMismatch { expected: 4, found: 10 }));
    }

    #[test]
    fn test_write_feature_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("features.jsonl");
        let agg = FeatureAggregator::new(encoder(), UsStateGeolocator::new(), AggregateOptions::default());
        let users = users();
        let out = agg.aggregate(&users).unwrap();
        write_feature_rows(&path, &users, &out.matrix).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["cols"], 4);
        assert_eq!(lines[1]["username"], "alice");
        assert_eq!(lines[2]["status"], "empty");
        assert_eq!(lines[3]["row"][3], 4.0);
    }

    #[test]
    fn test_resume_recomputes_geo_columns() {
        let mut previous = CheckpointMap::new(4);
        previous.insert("alice", vec![1.0, 1.0, 2.0, 43.0]).unwrap();

        let moved = vec![user("alice", "Ohio", &["t1"])];
        let agg = FeatureAggregator::new(encoder(), UsStateGeolocator::new(), AggregateOptions::default())
            .with_resume(previous)
            .unwrap();
        let out = agg.aggregate(&moved).unwrap();

        assert_eq!(out.stats.resumed, 1);
        assert_eq!(out.matrix.row(0), &[1.0, 1.0, 1.0, 35.0]);
        assert_eq!(out.checkpoint.get("alice"), Some(&[1.0, 1.0, 1.0, 35.0][..]));
    }

    #[test]
    fn test_non_finite_mean_is_rejected() {
        let enc = TableEncoder::new(2, &[("bad", &[f32::NAN, 1.0])]);
        let agg = FeatureAggregator::new(enc, UsStateGeolocator::new(), AggregateOptions::default());
        let err = agg.aggregate(&[user("alice", "Texas", &["bad"])]).unwrap_err();
        assert!(matches!(err, GeoError::Encoder(EncoderError::EncodingFailed(_))));
    }

    #[test]
    fn test_checkpoint_never_holds_non_finite_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("means.jsonl");
        let enc = TableEncoder::new(2, &[("ok", &[1.0, 2.0]), ("inf", &[f32::INFINITY, 0.0])]);
        let options = AggregateOptions {
            checkpoint_path: Some(path.clone()),
            checkpoint_every: 1,
            ..AggregateOptions::default()
        };
        let agg = FeatureAggregator::new(enc, UsStateGeolocator::new(), options);
        let users = vec![user("alice", "Texas", &["ok"]), user("bob", "Ohio", &["inf"])];
        assert!(agg.aggregate(&users).is_err());

        let saved = CheckpointMap::load(&path).unwrap();
        assert_eq!(saved.usernames().collect::<Vec<_>>(), ["alice"]);
    }

    #[test]
    fn test_progress_events_every_n_users() {
        let logs = CapturedLogs::default();
        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::INFO)
            .finish();

        let users: Vec<TwitterUser> = (0..5)
            .map(|i| user(&format!("u{i}"), "Ohio", &["t1"]))
            .collect();
        let options = AggregateOptions {
            progress_every: 2,
            ..AggregateOptions::default()
        };
        let agg = FeatureAggregator::new(encoder(), UsStateGeolocator::new(), options);
        tracing::subscriber::with_default(subscriber, || agg.aggregate(&users)).unwrap();

        let text = logs.text();
        let progress: Vec<&str> = text.lines().filter(|l| l.contains("Iteration ")).collect();
        assert_eq!(progress.len(), 2, "{text}");
        assert!(progress[0].contains("Iteration 2") && progress[0].contains("processed=2"));
        assert!(progress[1].contains("Iteration 4") && progress[1].contains("processed=4"));
        assert!(progress.iter().all(|l| l.contains("elapsed=00:00:00")));
    }

    #[test]
    fn test_encoder_info_reports_width() {
        let agg = FeatureAggregator::new(encoder(), UsStateGeolocator::new(), AggregateOptions::default());
        let info = agg.encoder_info();
        assert_eq!(info.dimension, 2);
        assert_eq!(agg.width(), info.dimension + GEO_COLUMNS);
    }
}
