//! State label resolution.
//!
//! A [`Geolocator`] turns a state label into the two categorical feature
//! columns (region code, state index) and a readable region name. The
//! built-in [`UsStateGeolocator`] covers the 50 states plus the District of
//! Columbia, with indices in alphabetical order and US Census regions.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::{GeoError, Result};

/// US Census Bureau region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Region {
    Northeast,
    Midwest,
    South,
    West,
}

impl Region {
    /// All regions in code order.
    pub const ALL: [Self; 4] = [Self::Northeast, Self::Midwest, Self::South, Self::West];

    /// Numeric code used as a feature column.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Northeast => 0,
            Self::Midwest => 1,
            Self::South => 2,
            Self::West => 3,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Northeast => "Northeast",
            Self::Midwest => "Midwest",
            Self::South => "South",
            Self::West => "West",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps state labels to stable categorical features.
pub trait Geolocator {
    /// Stable non-negative index for `label`.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::UnknownState`] for labels outside the table.
    fn state_index(&self, label: &str) -> Result<usize>;

    /// Region containing `label`.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::UnknownState`] for labels outside the table.
    fn state_region(&self, label: &str) -> Result<Region>;

    /// Readable name of the region containing `label`.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::UnknownState`] for labels outside the table.
    fn state_region_name(&self, label: &str) -> Result<String> {
        self.state_region(label).map(|r| r.name().to_string())
    }

    /// Number of distinct state indices.
    fn state_count(&self) -> usize;
}

/// One row of the state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateInfo {
    pub name: &'static str,
    pub code: &'static str,
    pub region: Region,
}

const fn state(name: &'static str, code: &'static str, region: Region) -> StateInfo {
    StateInfo { name, code, region }
}

/// States in index order.
pub const US_STATES: [StateInfo; 51] = [
    state("Alabama", "AL", Region::South),
    state("Alaska", "AK", Region::West),
    state("Arizona", "AZ", Region::West),
    state("Arkansas", "AR", Region::South),
    state("California", "CA", Region::West),
    state("Colorado", "CO", Region::West),
    state("Connecticut", "CT", Region::Northeast),
    state("Delaware", "DE", Region::South),
    state("District of Columbia", "DC", Region::South),
    state("Florida", "FL", Region::South),
    state("Georgia", "GA", Region::South),
    state("Hawaii", "HI", Region::West),
    state("Idaho", "ID", Region::West),
    state("Illinois", "IL", Region::Midwest),
    state("Indiana", "IN", Region::Midwest),
    state("Iowa", "IA", Region::Midwest),
    state("Kansas", "KS", Region::Midwest),
    state("Kentucky", "KY", Region::South),
    state("Louisiana", "LA", Region::South),
    state("Maine", "ME", Region::Northeast),
    state("Maryland", "MD", Region::South),
    state("Massachusetts", "MA", Region::Northeast),
    state("Michigan", "MI", Region::Midwest),
    state("Minnesota", "MN", Region::Midwest),
    state("Mississippi", "MS", Region::South),
    state("Missouri", "MO", Region::Midwest),
    state("Montana", "MT", Region::West),
    state("Nebraska", "NE", Region::Midwest),
    state("Nevada", "NV", Region::West),
    state("New Hampshire", "NH", Region::Northeast),
    state("New Jersey", "NJ", Region::Northeast),
    state("New Mexico", "NM", Region::West),
    state("New York", "NY", Region::Northeast),
    state("North Carolina", "NC", Region::South),
    state("North Dakota", "ND", Region::Midwest),
    state("Ohio", "OH", Region::Midwest),
    state("Oklahoma", "OK", Region::South),
    state("Oregon", "OR", Region::West),
    state("Pennsylvania", "PA", Region::Northeast),
    state("Rhode Island", "RI", Region::Northeast),
    state("South Carolina", "SC", Region::South),
    state("South Dakota", "SD", Region::Midwest),
    state("Tennessee", "TN", Region::South),
    state("Texas", "TX", Region::South),
    state("Utah", "UT", Region::West),
    state("Vermont", "VT", Region::Northeast),
    state("Virginia", "VA", Region::South),
    state("Washington", "WA", Region::West),
    state("West Virginia", "WV", Region::South),
    state("Wisconsin", "WI", Region::Midwest),
    state("Wyoming", "WY", Region::West),
];

/// Table-backed geolocator for US states.
///
/// Accepts full names (any case) and two-letter postal codes.
#[derive(Debug, Clone)]
pub struct UsStateGeolocator {
    lookup: HashMap<String, usize>,
}

impl UsStateGeolocator {
    #[must_use]
    pub fn new() -> Self {
        let mut lookup = HashMap::with_capacity(US_STATES.len() * 2);
        for (idx, info) in US_STATES.iter().enumerate() {
            lookup.insert(info.name.to_lowercase(), idx);
            lookup.insert(info.code.to_lowercase(), idx);
        }
        Self { lookup }
    }

    /// Resolve `label` to its table row.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::UnknownState`] if the label is not in the table.
    pub fn resolve(&self, label: &str) -> Result<(usize, &'static StateInfo)> {
        self.lookup
            .get(&label.trim().to_lowercase())
            .map(|&idx| (idx, &US_STATES[idx]))
            .ok_or_else(|| GeoError::unknown_state(label))
    }

    /// All table rows in index order.
    #[must_use]
    pub const fn states(&self) -> &'static [StateInfo] {
        &US_STATES
    }
}

impl Default for UsStateGeolocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Geolocator for UsStateGeolocator {
    fn state_index(&self, label: &str) -> Result<usize> {
        self.resolve(label).map(|(idx, _)| idx)
    }

    fn state_region(&self, label: &str) -> Result<Region> {
        self.resolve(label).map(|(_, info)| info.region)
    }

    fn state_count(&self) -> usize {
        US_STATES.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted_and_unique() {
        for pair in US_STATES.windows(2) {
            assert!(pair[0].name < pair[1].name, "{} >= {}", pair[0].name, pair[1].name);
        }
        let geo = UsStateGeolocator::new();
        assert_eq!(geo.lookup.len(), US_STATES.len() * 2);
    }

    #[test]
    fn test_state_index_is_stable() {
        let geo = UsStateGeolocator::new();
        assert_eq!(geo.state_index("Alabama").unwrap(), 0);
        assert_eq!(geo.state_index("Texas").unwrap(), 43);
        assert_eq!(geo.state_index("Wyoming").unwrap(), 50);
        assert_eq!(geo.state_count(), 51);
    }

    #[test]
    fn test_codes_and_case_resolve_to_same_index() {
        let geo = UsStateGeolocator::new();
        let idx = geo.state_index("Ohio").unwrap();
        assert_eq!(geo.state_index("OH").unwrap(), idx);
        assert_eq!(geo.state_index("ohio").unwrap(), idx);
        assert_eq!(geo.state_index("  OHIO ").unwrap(), idx);
    }

    #[test]
    fn test_regions() {
        let geo = UsStateGeolocator::new();
        assert_eq!(geo.state_region("California").unwrap(), Region::West);
        assert_eq!(geo.state_region("Texas").unwrap(), Region::South);
        assert_eq!(geo.state_region("Ohio").unwrap(), Region::Midwest);
        assert_eq!(geo.state_region("Maine").unwrap(), Region::Northeast);
        assert_eq!(geo.state_region_name("NY").unwrap(), "Northeast");
        assert_eq!(Region::West.code(), 3);
    }

    #[test]
    fn test_unknown_label() {
        let geo = UsStateGeolocator::new();
        let err = geo.state_index("Ontario").unwrap_err();
        assert!(matches!(err, GeoError::UnknownState { label } if label == "Ontario"));
        assert!(geo.state_region("").is_err());
    }

    #[test]
    fn test_every_region_populated() {
        for region in Region::ALL {
            assert!(US_STATES.iter().any(|s| s.region == region));
        }
    }
}
