//! Dataset splits and their on-disk format.
//!
//! Each split is two JSON Lines files in the data directory:
//!
//! ```text
//! user_states.<split>.jsonl   {"format":"geotweet","version":1,"kind":"states"}
//!                             {"username":"alice","state":"Texas"}
//!                             {"username":"bob","state":null}
//! user_tweets.<split>.jsonl   {"format":"geotweet","version":1,"kind":"tweets"}
//!                             {"username":"alice","tweets":["howdy","..."]}
//! ```
//!
//! The first non-blank line is a header; blank lines are ignored. Record
//! order in the states file is the order users come back in.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GeoError, Result};
use crate::user::TwitterUser;

/// Format tag written in every dataset header.
pub const DATASET_FORMAT: &str = "geotweet";

/// Current dataset format version.
pub const DATASET_VERSION: u32 = 1;

/// A named dataset split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Dev,
    Test,
}

impl Split {
    pub const ALL: [Self; 3] = [Self::Train, Self::Dev, Self::Test];

    /// File names of the (states, tweets) pair for this split.
    #[must_use]
    pub const fn file_names(self) -> (&'static str, &'static str) {
        match self {
            Self::Train => ("user_states.train.jsonl", "user_tweets.train.jsonl"),
            Self::Dev => ("user_states.dev.jsonl", "user_tweets.dev.jsonl"),
            Self::Test => ("user_states.test.jsonl", "user_tweets.test.jsonl"),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Dev => "dev",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Self::Train),
            "dev" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            other => Err(GeoError::invalid_dataset(other)),
        }
    }
}

/// Resolved file paths for one split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitFiles {
    pub states: PathBuf,
    pub tweets: PathBuf,
}

impl SplitFiles {
    #[must_use]
    pub fn for_split(data_dir: &Path, split: Split) -> Self {
        let (states, tweets) = split.file_names();
        Self {
            states: data_dir.join(states),
            tweets: data_dir.join(tweets),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FileHeader {
    format: String,
    version: u32,
    kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateRecord {
    username: String,
    state: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TweetsRecord {
    username: String,
    tweets: Vec<String>,
}

const KIND_STATES: &str = "states";
const KIND_TWEETS: &str = "tweets";

fn display_name(path: &Path) -> String {
    path.display().to_string()
}

/// Read a headed JSON Lines file of `kind`.
fn read_records<T: DeserializeOwned>(path: &Path, kind: &str) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|e| GeoError::path_error("open", path, e))?;
    let reader = BufReader::new(file);

    let mut header_seen = false;
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| GeoError::path_error("read", path, e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = idx + 1;

        if !header_seen {
            let header: FileHeader = serde_json::from_str(line).map_err(|e| {
                GeoError::parse_error(display_name(path), format!("line {line_no}: bad header: {e}"))
            })?;
            check_header(&header, kind, path)?;
            header_seen = true;
            continue;
        }

        let record = serde_json::from_str(line).map_err(|e| {
            GeoError::parse_error(display_name(path), format!("line {line_no}: {e}"))
        })?;
        records.push(record);
    }

    if !header_seen {
        return Err(GeoError::parse_error(display_name(path), "missing header"));
    }

    debug!(path = %path.display(), records = records.len(), "Loaded dataset file");
    Ok(records)
}

fn check_header(header: &FileHeader, kind: &str, path: &Path) -> Result<()> {
    if header.format != DATASET_FORMAT {
        return Err(GeoError::parse_error(
            display_name(path),
            format!("unknown format '{}'", header.format),
        ));
    }
    if header.version != DATASET_VERSION {
        return Err(GeoError::parse_error(
            display_name(path),
            format!(
                "unsupported version {} (expected {DATASET_VERSION})",
                header.version
            ),
        ));
    }
    if header.kind != kind {
        return Err(GeoError::parse_error(
            display_name(path),
            format!("expected a '{kind}' file, found '{}'", header.kind),
        ));
    }
    Ok(())
}

fn write_records<T: Serialize>(path: &Path, kind: &str, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| GeoError::path_error("create directory", parent, e))?;
    }
    let file = File::create(path).map_err(|e| GeoError::path_error("create", path, e))?;
    let mut writer = BufWriter::new(file);

    let header = FileHeader {
        format: DATASET_FORMAT.to_string(),
        version: DATASET_VERSION,
        kind: kind.to_string(),
    };
    serde_json::to_writer(&mut writer, &header)?;
    writer.write_all(b"\n")?;
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a states file: `username -> state label (or null)`, in order.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_states_file<'a, I>(path: &Path, entries: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let records: Vec<StateRecord> = entries
        .into_iter()
        .map(|(username, state)| StateRecord {
            username: username.to_string(),
            state: state.map(str::to_string),
        })
        .collect();
    write_records(path, KIND_STATES, &records)
}

/// Write a tweets file: `username -> tweets`, in order.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_tweets_file<'a, I>(path: &Path, entries: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
{
    let records: Vec<TweetsRecord> = entries
        .into_iter()
        .map(|(username, tweets)| TweetsRecord {
            username: username.to_string(),
            tweets: tweets.to_vec(),
        })
        .collect();
    write_records(path, KIND_TWEETS, &records)
}

/// Load the users of `split` from `data_dir`.
///
/// # Errors
///
/// See [`load_split_files`].
pub fn load_twitter_users(data_dir: &Path, split: Split) -> Result<Vec<TwitterUser>> {
    info!(split = %split, data_dir = %data_dir.display(), "Loading split");
    load_split_files(&SplitFiles::for_split(data_dir, split))
}

/// Load users from an explicit pair of files.
///
/// Every username in the states file must have a tweets entry, whether or
/// not its state is null. Users with a null or blank state are dropped.
///
/// # Errors
///
/// - [`GeoError::PathError`] / [`GeoError::ParseError`] for unreadable files
/// - [`GeoError::DuplicateUser`] if a username repeats within a file
/// - [`GeoError::MissingAssociation`] if a username has no tweets entry
pub fn load_split_files(files: &SplitFiles) -> Result<Vec<TwitterUser>> {
    let states: Vec<StateRecord> = read_records(&files.states, KIND_STATES)?;
    let tweet_records: Vec<TweetsRecord> = read_records(&files.tweets, KIND_TWEETS)?;

    let mut tweets: HashMap<String, Vec<String>> = HashMap::with_capacity(tweet_records.len());
    for record in tweet_records {
        if tweets.contains_key(&record.username) {
            return Err(GeoError::DuplicateUser {
                username: record.username,
                file: display_name(&files.tweets),
            });
        }
        tweets.insert(record.username, record.tweets);
    }

    let mut seen = HashSet::with_capacity(states.len());
    let mut users = Vec::with_capacity(states.len());
    let mut dropped = 0usize;
    for record in states {
        if !seen.insert(record.username.clone()) {
            return Err(GeoError::DuplicateUser {
                username: record.username,
                file: display_name(&files.states),
            });
        }

        let user_tweets = tweets
            .remove(&record.username)
            .ok_or_else(|| GeoError::missing_association(&record.username))?;

        let mut user = TwitterUser::new(record.username, user_tweets);
        user.set_state(record.state);
        if user.has_state() {
            users.push(user);
        } else {
            dropped += 1;
        }
    }

    info!(
        users = users.len(),
        dropped_without_state = dropped,
        "Loaded users"
    );
    Ok(users)
}

/// Aggregate counts over a loaded split.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub users: usize,
    pub tweets: usize,
    pub users_without_tweets: usize,
    /// Users per state label, sorted by label.
    pub states: BTreeMap<String, usize>,
}

/// Summarize a collection of users.
#[must_use]
pub fn summarize(users: &[TwitterUser]) -> DatasetSummary {
    let mut summary = DatasetSummary {
        users: users.len(),
        ..DatasetSummary::default()
    };
    for user in users {
        summary.tweets += user.tweets().len();
        if user.tweets().is_empty() {
            summary.users_without_tweets += 1;
        }
        if let Some(state) = user.state() {
            *summary.states.entry(state.to_string()).or_default() += 1;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn s(items: &[&str]) -> Vec<String> {
        items.iter().map(|x| (*x).to_string()).collect()
    }

    fn write_split(dir: &Path, split: Split, states: &[(&str, Option<&str>)], tweets: &[(&str, Vec<String>)]) {
        let files = SplitFiles::for_split(dir, split);
        write_states_file(&files.states, states.iter().copied()).unwrap();
        write_tweets_file(
            &files.tweets,
            tweets.iter().map(|(u, t)| (*u, t.as_slice())),
        )
        .unwrap();
    }

    #[test]
    fn test_split_from_str() {
        assert_eq!("train".parse::<Split>().unwrap(), Split::Train);
        assert_eq!("dev".parse::<Split>().unwrap(), Split::Dev);
        assert_eq!("test".parse::<Split>().unwrap(), Split::Test);
        let err = "validation".parse::<Split>().unwrap_err();
        assert!(matches!(err, GeoError::InvalidDataset { ref value } if value == "validation"));
        assert!("Dev".parse::<Split>().is_err());
    }

    #[test]
    fn test_split_files_table() {
        let dir = Path::new("data");
        for split in Split::ALL {
            let files = SplitFiles::for_split(dir, split);
            assert!(files.states.to_string_lossy().contains(split.as_str()));
            assert!(files.tweets.to_string_lossy().contains(split.as_str()));
            assert_ne!(files.states, files.tweets);
        }
    }

    #[test]
    fn test_dev_example_filters_null_state() {
        let dir = TempDir::new().unwrap();
        write_split(
            dir.path(),
            Split::Dev,
            &[("alice", Some("Texas")), ("bob", None), ("carol", Some("Ohio"))],
            &[
                ("carol", s(&["go bucks"])),
                ("alice", s(&["howdy"])),
                ("bob", s(&["hi"])),
            ],
        );

        let users = load_twitter_users(dir.path(), Split::Dev).unwrap();
        let names: Vec<&str> = users.iter().map(TwitterUser::username).collect();
        assert_eq!(names, vec!["alice", "carol"]);
        assert_eq!(users[0].tweets(), &s(&["howdy"])[..]);
        assert_eq!(users[1].state(), Some("Ohio"));
    }

    #[test]
    fn test_blank_state_is_dropped() {
        let dir = TempDir::new().unwrap();
        write_split(
            dir.path(),
            Split::Train,
            &[("alice", Some("")), ("bob", Some("Maine"))],
            &[("alice", vec![]), ("bob", vec![])],
        );
        let users = load_twitter_users(dir.path(), Split::Train).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username(), "bob");
    }

    #[test]
    fn test_missing_tweets_entry_fails() {
        let dir = TempDir::new().unwrap();
        write_split(
            dir.path(),
            Split::Test,
            &[("alice", Some("Texas")), ("bob", None)],
            &[("alice", s(&["howdy"]))],
        );
        let err = load_twitter_users(dir.path(), Split::Test).unwrap_err();
        assert!(matches!(err, GeoError::MissingAssociation { ref username } if username == "bob"));
    }

    #[test]
    fn test_duplicate_user_fails() {
        let dir = TempDir::new().unwrap();
        write_split(
            dir.path(),
            Split::Dev,
            &[("alice", Some("Texas")), ("alice", Some("Ohio"))],
            &[("alice", vec![])],
        );
        let err = load_twitter_users(dir.path(), Split::Dev).unwrap_err();
        assert!(matches!(err, GeoError::DuplicateUser { .. }));
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = load_twitter_users(dir.path(), Split::Dev).unwrap_err();
        assert!(matches!(err, GeoError::PathError { operation: "open", .. }));
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let dir = TempDir::new().unwrap();
        let files = SplitFiles::for_split(dir.path(), Split::Dev);
        // Tweets written where the states file is expected.
        write_tweets_file(&files.states, std::iter::empty()).unwrap();
        write_tweets_file(&files.tweets, std::iter::empty()).unwrap();
        let err = load_split_files(&files).unwrap_err();
        assert!(err.to_string().contains("expected a 'states' file"));
    }

    #[test]
    fn test_bad_version_and_line_numbers() {
        let dir = TempDir::new().unwrap();
        let files = SplitFiles::for_split(dir.path(), Split::Dev);
        std::fs::write(
            &files.states,
            "{\"format\":\"geotweet\",\"version\":9,\"kind\":\"states\"}\n",
        )
        .unwrap();
        write_tweets_file(&files.tweets, std::iter::empty()).unwrap();
        let err = load_split_files(&files).unwrap_err();
        assert!(err.to_string().contains("unsupported version 9"));

        std::fs::write(
            &files.states,
            "{\"format\":\"geotweet\",\"version\":1,\"kind\":\"states\"}\n\nnot json\n",
        )
        .unwrap();
        let err = load_split_files(&files).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_summarize() {
        let users = vec![
            TwitterUser::new("a", s(&["x", "y"])).with_state(Some("Texas")),
            TwitterUser::new("b", vec![]).with_state(Some("Texas")),
            TwitterUser::new("c", s(&["z"])).with_state(Some("Ohio")),
        ];
        let summary = summarize(&users);
        assert_eq!(summary.users, 3);
        assert_eq!(summary.tweets, 3);
        assert_eq!(summary.users_without_tweets, 1);
        assert_eq!(summary.states.get("Texas"), Some(&2));
        assert_eq!(summary.states.get("Ohio"), Some(&1));
    }
}
