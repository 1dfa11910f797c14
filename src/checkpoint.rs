//! Checkpoint map: `username -> feature row`, persisted during long runs.
//!
//! The file is JSON Lines: a header line, then one entry per user in
//! insertion order.
//!
//! ```text
//! {"format":"geotweet-checkpoint","version":1,"width":2402,"entries":2,"written_at":"..."}
//! {"username":"alice","row":[0.12,...,2.0,43.0]}
//! ```
//!
//! Writes go to a temp file in the target directory, are synced, then renamed
//! over the target. A reader never sees a half-written checkpoint.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{GeoError, Result};

/// Format tag written in every checkpoint header.
pub const CHECKPOINT_FORMAT: &str = "geotweet-checkpoint";

/// Current checkpoint format version.
pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointHeader {
    format: String,
    version: u32,
    width: usize,
    entries: usize,
    written_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct EntryRef<'a> {
    username: &'a str,
    row: &'a [f32],
}

#[derive(Debug, Deserialize)]
struct Entry {
    username: String,
    row: Vec<f32>,
}

/// Insertion-ordered map from username to feature row.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointMap {
    width: usize,
    entries: Vec<(String, Vec<f32>)>,
    index: HashMap<String, usize>,
}

impl CheckpointMap {
    /// Create an empty map for rows of `width` values.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self {
            width,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace the row for `username`. A replaced entry keeps its
    /// original position.
    ///
    /// # Errors
    ///
    /// [`GeoError::DimensionMismatch`] if `row` is not [`width`](Self::width)
    /// long.
    pub fn insert(&mut self, username: impl Into<String>, row: Vec<f32>) -> Result<()> {
        if row.len() != self.width {
            return Err(GeoError::DimensionMismatch {
                expected: self.width,
                found: row.len(),
            });
        }
        let username = username.into();
        if let Some(&pos) = self.index.get(&username) {
            self.entries[pos].1 = row;
        } else {
            self.index.insert(username.clone(), self.entries.len());
            self.entries.push((username, row));
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, username: &str) -> Option<&[f32]> {
        self.index
            .get(username)
            .map(|&pos| self.entries[pos].1.as_slice())
    }

    #[must_use]
    pub fn contains(&self, username: &str) -> bool {
        self.index.contains_key(username)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.entries.iter().map(|(u, r)| (u.as_str(), r.as_slice()))
    }

    /// Usernames in insertion order.
    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(u, _)| u.as_str())
    }

    fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let header = CheckpointHeader {
            format: CHECKPOINT_FORMAT.to_string(),
            version: CHECKPOINT_VERSION,
            width: self.width,
            entries: self.entries.len(),
            written_at: Utc::now(),
        };
        serde_json::to_writer(&mut writer, &header)?;
        writer.write_all(b"\n")?;
        for (username, row) in &self.entries {
            serde_json::to_writer(&mut writer, &EntryRef { username, row })?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Atomically replace `path` with this map.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp file cannot be written, synced, or renamed.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)
            .map_err(|e| GeoError::path_error("create directory", &parent, e))?;

        let mut tmp = NamedTempFile::new_in(&parent)
            .map_err(|e| GeoError::path_error("create temp file in", &parent, e))?;
        self.write_to(BufWriter::new(&mut tmp))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| GeoError::path_error("sync", tmp.path(), e))?;
        tmp.persist(path)
            .map_err(|e| GeoError::path_error("rename checkpoint to", path, e.error))?;
        fsync_dir(&parent)?;

        debug!(path = %path.display(), entries = self.len(), "Wrote checkpoint");
        Ok(())
    }

    /// [`save`](Self::save) to `path`, plus a numbered copy `path.<seq>`,
    /// keeping only the newest `keep` numbered copies. `keep == 0` writes no
    /// numbered copy.
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save), plus failures removing old copies.
    pub fn save_numbered(&self, path: &Path, seq: usize, keep: usize) -> Result<()> {
        self.save(path)?;
        if keep == 0 {
            return Ok(());
        }

        self.save(&numbered_path(path, seq))?;

        let mut copies = numbered_copies(path)?;
        copies.sort_by_key(|(n, _)| *n);
        let excess = copies.len().saturating_sub(keep);
        for (_, old) in copies.into_iter().take(excess) {
            std::fs::remove_file(&old).map_err(|e| GeoError::path_error("remove", &old, e))?;
            debug!(path = %old.display(), "Pruned old checkpoint");
        }
        Ok(())
    }

    /// Read a checkpoint written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable, has an unknown header, or
    /// holds rows of the wrong width.
    pub fn load(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let file = File::open(path).map_err(|e| GeoError::path_error("open", path, e))?;
        let mut lines = BufReader::new(file).lines().enumerate();

        let header: CheckpointHeader = loop {
            let Some((idx, line)) = lines.next() else {
                return Err(GeoError::parse_error(name, "missing header"));
            };
            let line = line.map_err(|e| GeoError::path_error("read", path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            break serde_json::from_str(&line).map_err(|e| {
                GeoError::parse_error(&name, format!("line {}: bad header: {e}", idx + 1))
            })?;
        };

        if header.format != CHECKPOINT_FORMAT || header.version != CHECKPOINT_VERSION {
            return Err(GeoError::parse_error(
                name,
                format!(
                    "unsupported checkpoint '{}' version {}",
                    header.format, header.version
                ),
            ));
        }

        let mut map = Self::new(header.width);
        for (idx, line) in lines {
            let line = line.map_err(|e| GeoError::path_error("read", path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: Entry = serde_json::from_str(&line)
                .map_err(|e| GeoError::parse_error(&name, format!("line {}: {e}", idx + 1)))?;
            map.insert(entry.username, entry.row)?;
        }

        if map.len() != header.entries {
            return Err(GeoError::parse_error(
                name,
                format!(
                    "header announces {} entries, found {}",
                    header.entries,
                    map.len()
                ),
            ));
        }

        info!(path = %path.display(), entries = map.len(), "Loaded checkpoint");
        Ok(map)
    }
}

/// `path` with `.<seq>` appended to the file name.
#[must_use]
pub fn numbered_path(path: &Path, seq: usize) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{seq}"));
    path.with_file_name(name)
}

/// Numbered copies of `path` that exist on disk, unordered.
fn numbered_copies(path: &Path) -> Result<Vec<(usize, PathBuf)>> {
    let Some(base) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(Vec::new());
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = format!("{base}.");

    let mut copies = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(|e| GeoError::path_error("list", &dir, e))? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(seq) = file_name
            .to_str()
            .and_then(|n| n.strip_prefix(&prefix))
            .and_then(|s| s.parse::<usize>().ok())
        else {
            continue;
        };
        copies.push((seq, entry.path()));
    }
    Ok(copies)
}

#[cfg(unix)]
fn fsync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| GeoError::path_error("sync directory", dir, e))
}

#[cfg(not(unix))]
fn fsync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
