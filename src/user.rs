//! Per-user records and their derived features.
//!
//! A [`TwitterUser`] is populated once at load time and read-only after.
//! Region and state index are not stored: they are recomputed from the
//! current state label through an explicitly passed [`Geolocator`] each time
//! they are asked for.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::encoder::{Encoder, EncoderError, column_mean};
use crate::error::{GeoError, Result};
use crate::geolocator::{Geolocator, Region};

/// Mean thought vector of a user, or the absence of one.
#[derive(Debug, Clone, PartialEq)]
pub enum MeanVector {
    /// Column-wise mean over all of the user's tweet vectors.
    Mean(Vec<f32>),
    /// The user has no tweets, so no mean exists.
    NoData,
}

impl MeanVector {
    #[must_use]
    pub const fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }

    #[must_use]
    pub fn into_option(self) -> Option<Vec<f32>> {
        match self {
            Self::Mean(v) => Some(v),
            Self::NoData => None,
        }
    }
}

/// A Twitter user with their tweets and (optional) home state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwitterUser {
    username: String,
    tweets: Vec<String>,
    state: Option<String>,
}

impl TwitterUser {
    /// Create a user with no state label.
    pub fn new(username: impl Into<String>, tweets: Vec<String>) -> Self {
        Self {
            username: username.into(),
            tweets,
            state: None,
        }
    }

    /// Builder-style [`set_state`](Self::set_state).
    #[must_use]
    pub fn with_state(mut self, state: Option<impl Into<String>>) -> Self {
        self.set_state(state.map(Into::into));
        self
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn tweets(&self) -> &[String] {
        &self.tweets
    }

    /// The state label, `None` if unknown. Blank labels read as `None`.
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn set_state(&mut self, state: Option<String>) {
        self.state = state.filter(|s| !s.trim().is_empty());
    }

    /// Whether this user carries a usable state label.
    #[must_use]
    pub const fn has_state(&self) -> bool {
        self.state.is_some()
    }

    fn require_state(&self) -> Result<&str> {
        self.state()
            .ok_or_else(|| GeoError::invalid_state(&self.username))
    }

    /// # Errors
    ///
    /// [`GeoError::InvalidState`] if the state is null, otherwise whatever
    /// the geolocator reports.
    pub fn state_index<G: Geolocator + ?Sized>(&self, geo: &G) -> Result<usize> {
        state_index(self.require_state()?, geo)
    }

    /// # Errors
    ///
    /// [`GeoError::InvalidState`] if the state is null, otherwise whatever
    /// the geolocator reports.
    pub fn region<G: Geolocator + ?Sized>(&self, geo: &G) -> Result<Region> {
        state_region(self.require_state()?, geo)
    }

    /// # Errors
    ///
    /// [`GeoError::InvalidState`] if the state is null, otherwise whatever
    /// the geolocator reports.
    pub fn region_name<G: Geolocator + ?Sized>(&self, geo: &G) -> Result<String> {
        state_region_name(self.require_state()?, geo)
    }

    /// Encode every tweet without normalization, one row per tweet.
    ///
    /// # Errors
    ///
    /// Propagates encoder failures, and returns
    /// [`GeoError::DimensionMismatch`] if a row is not `encoder.dimension()`
    /// wide.
    pub fn embedding_vectors<E: Encoder + ?Sized>(&self, encoder: &E) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<&str> = self.tweets.iter().map(String::as_str).collect();
        let rows = encoder.encode(&texts, false)?;

        if rows.len() != texts.len() {
            return Err(EncoderError::EncodingFailed(format!(
                "expected {} rows, got {}",
                texts.len(),
                rows.len()
            ))
            .into());
        }
        let expected = encoder.dimension();
        if let Some(bad) = rows.iter().find(|r| r.len() != expected) {
            return Err(GeoError::DimensionMismatch {
                expected,
                found: bad.len(),
            });
        }
        Ok(rows)
    }

    /// Column-wise mean of [`embedding_vectors`](Self::embedding_vectors).
    ///
    /// A user without tweets yields [`MeanVector::NoData`] instead of an
    /// error; the condition is logged and the caller decides what to do.
    ///
    /// # Errors
    ///
    /// Same as [`embedding_vectors`](Self::embedding_vectors).
    pub fn embedding_mean<E: Encoder + ?Sized>(&self, encoder: &E) -> Result<MeanVector> {
        if self.tweets.is_empty() {
            warn!(username = %self.username, "User has no tweets, no mean vector");
            return Ok(MeanVector::NoData);
        }

        let rows = self.embedding_vectors(encoder)?;
        Ok(column_mean(&rows).map_or(MeanVector::NoData, MeanVector::Mean))
    }
}

/// State index for `state`.
///
/// # Errors
///
/// Whatever the geolocator reports for an unrecognised label.
pub fn state_index<G: Geolocator + ?Sized>(state: &str, geo: &G) -> Result<usize> {
    geo.state_index(state)
}

/// Region for `state`.
///
/// # Errors
///
/// Whatever the geolocator reports for an unrecognised label.
pub fn state_region<G: Geolocator + ?Sized>(state: &str, geo: &G) -> Result<Region> {
    geo.state_region(state)
}

/// Region name for `state`.
///
/// # Errors
///
/// Whatever the geolocator reports for an unrecognised label.
pub fn state_region_name<G: Geolocator + ?Sized>(state: &str, geo: &G) -> Result<String> {
    geo.state_region_name(state)
}

/// All tweets of all users, flattened in user order.
#[must_use]
pub fn raw_tweet_list(users: &[TwitterUser]) -> Vec<&str> {
    users
        .iter()
        .flat_map(|u| u.tweets.iter().map(String::as_str))
        .collect()
}
