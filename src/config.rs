//! Configuration for index construction, scanning and planning.
//!
//! Every field has a default so partial JSON or TOML documents are accepted;
//! unknown fields are rejected.
use crate::error::{GeoscanError, Result};
#[cfg(feature = "toml")]
use serde::de::Error;

/// Scalar key used to order entries before packing.
///
/// The ordering only affects how well leaves cluster spatially, never the
/// correctness of search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Sort by the minimum x coordinate of each entry's bounding box.
    #[default]
    MinX,
    /// Sort by the x coordinate of each bounding box's center.
    CenterX,
}

/// Index and planner configuration
///
/// # Example
///
/// ```rust
/// use geoscan::Config;
///
/// let config = Config::from_json(r#"{ "fanout": 16, "build_threads": 4 }"#).unwrap();
/// assert_eq!(config.fanout, 16);
/// assert!(config.enable_index_scan);
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Maximum number of children per tree node
    #[serde(default = "Config::default_fanout")]
    pub fanout: usize,

    /// Worker threads used to pack leaves; 1 builds on the calling thread
    #[serde(default = "Config::default_build_threads")]
    pub build_threads: usize,

    /// Entry count below which packing always stays single-threaded
    #[serde(default = "Config::default_parallel_build_threshold")]
    pub parallel_build_threshold: usize,

    #[serde(default)]
    pub sort_key: SortKey,

    /// Row ids handed to the row fetcher per index scan batch
    #[serde(default = "Config::default_scan_batch_size")]
    pub scan_batch_size: usize,

    /// Register the R-tree index scan rule in new planner contexts
    #[serde(default = "Config::default_enable_index_scan")]
    pub enable_index_scan: bool,
}

impl Config {
    pub const MIN_FANOUT: usize = 2;
    pub const MAX_FANOUT: usize = 1024;

    const fn default_fanout() -> usize {
        64
    }

    const fn default_build_threads() -> usize {
        1
    }

    const fn default_parallel_build_threshold() -> usize {
        65_536
    }

    const fn default_scan_batch_size() -> usize {
        2048
    }

    const fn default_enable_index_scan() -> bool {
        true
    }

    pub fn with_fanout(mut self, fanout: usize) -> Self {
        assert!(
            (Self::MIN_FANOUT..=Self::MAX_FANOUT).contains(&fanout),
            "Fanout must be between {} and {}",
            Self::MIN_FANOUT,
            Self::MAX_FANOUT
        );
        self.fanout = fanout;
        self
    }

    pub fn with_build_threads(mut self, threads: usize) -> Self {
        assert!(threads > 0, "Build threads must be greater than zero");
        self.build_threads = threads;
        self
    }

    pub fn with_parallel_build_threshold(mut self, threshold: usize) -> Self {
        self.parallel_build_threshold = threshold;
        self
    }

    pub fn with_sort_key(mut self, sort_key: SortKey) -> Self {
        self.sort_key = sort_key;
        self
    }

    pub fn with_scan_batch_size(mut self, batch_size: usize) -> Self {
        assert!(batch_size > 0, "Scan batch size must be greater than zero");
        self.scan_batch_size = batch_size;
        self
    }

    pub fn with_index_scan(mut self, enabled: bool) -> Self {
        self.enable_index_scan = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(Self::MIN_FANOUT..=Self::MAX_FANOUT).contains(&self.fanout) {
            return Err(GeoscanError::Config(format!(
                "Fanout must be between {} and {}, got: {}",
                Self::MIN_FANOUT,
                Self::MAX_FANOUT,
                self.fanout
            )));
        }

        if self.build_threads == 0 {
            return Err(GeoscanError::Config(
                "Build threads must be greater than zero".to_string(),
            ));
        }

        if self.scan_batch_size == 0 {
            return Err(GeoscanError::Config(
                "Scan batch size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fanout: Self::default_fanout(),
            build_threads: Self::default_build_threads(),
            parallel_build_threshold: Self::default_parallel_build_threshold(),
            sort_key: SortKey::default(),
            scan_batch_size: Self::default_scan_batch_size(),
            enable_index_scan: Self::default_enable_index_scan(),
        }
    }
}
