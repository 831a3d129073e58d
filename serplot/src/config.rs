//! Configuration
//!
//! Options recognized by the `StreamParser` and the `SeriesBuffer`.
//! All types deserialize with serde, so tools can load them from a
//! configuration file; every field has a default.

use crate::data::PALETTE;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Record separator understood without compiling a regex.
pub const DEFAULT_RECORD_SEPARATOR: &str = r"\r?\n";

/// Space, tab and comma.
pub const DEFAULT_FIELD_DELIMITERS: &str = " \t,";

/// Largest incomplete record kept between two parse calls.
pub const DEFAULT_MAX_LEFTOVER: usize = 64 * 1024;

/// Points kept per series by default.
pub const DEFAULT_RETENTION_POINTS: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid record separator {pattern:?}: {source}")]
    InvalidSeparator {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("record separator {0:?} matches the empty string")]
    EmptySeparator(String),
    #[error("field delimiter set is empty")]
    NoDelimiters,
    #[error("field delimiter {0:?} is reserved for labeled values")]
    ReservedDelimiter(char),
    #[error("series cap must be between 1 and {max}, got {cap}")]
    SeriesCap { cap: usize, max: usize },
    #[error("retention must keep at least one point, got {0:?}")]
    Retention(Retention),
}

/// How many points each series keeps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "limit", rename_all = "snake_case")]
pub enum Retention {
    /// Keep the most recent `n` points.
    Points(usize),
    /// Keep points with `x >= latest - w`, where `latest` is the most
    /// recent cursor. Counter mode measures in records, realtime mode in
    /// milliseconds.
    Span(f64),
}

impl Default for Retention {
    fn default() -> Self {
        Retention::Points(DEFAULT_RETENTION_POINTS)
    }
}

impl Retention {
    fn is_valid(&self) -> bool {
        match *self {
            Retention::Points(n) => n > 0,
            Retention::Span(w) => w.is_finite() && w > 0.0,
        }
    }
}

/// Source of the x-position assigned to each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XAxisMode {
    /// Incrementing record counter.
    #[default]
    Counter,
    /// Wall-clock milliseconds since the Unix epoch.
    Realtime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Regular expression matching one record separator.
    pub record_separator: String,
    /// Every character in this string separates two fields.
    pub field_delimiters: String,
    /// Incomplete records longer than this many bytes are dropped.
    pub max_leftover: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            record_separator: DEFAULT_RECORD_SEPARATOR.to_string(),
            field_delimiters: DEFAULT_FIELD_DELIMITERS.to_string(),
            max_leftover: DEFAULT_MAX_LEFTOVER,
        }
    }
}

impl ParserConfig {
    /// Compiles the separator. Returns `None` for the default newline
    /// separator, which the parser scans for directly.
    pub(crate) fn separator_regex(&self) -> Result<Option<Regex>, ConfigError> {
        if self.record_separator == DEFAULT_RECORD_SEPARATOR {
            return Ok(None);
        }
        let re = Regex::new(&self.record_separator).map_err(|source| {
            ConfigError::InvalidSeparator {
                pattern: self.record_separator.clone(),
                source,
            }
        })?;
        if re.is_match("") {
            return Err(ConfigError::EmptySeparator(self.record_separator.clone()));
        }
        Ok(Some(re))
    }

    pub(crate) fn delimiters(&self) -> Result<Vec<char>, ConfigError> {
        let mut delimiters: Vec<char> = self.field_delimiters.chars().collect();
        delimiters.sort_unstable();
        delimiters.dedup();
        if delimiters.is_empty() {
            return Err(ConfigError::NoDelimiters);
        }
        if delimiters.contains(&':') {
            return Err(ConfigError::ReservedDelimiter(':'));
        }
        Ok(delimiters)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.separator_regex()?;
        self.delimiters()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    pub retention: Retention,
    /// Maximum number of live series.
    pub series_cap: usize,
    pub x_axis: XAxisMode,
    /// Remove a series once eviction leaves it without points.
    pub evict_empty: bool,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        SeriesConfig {
            retention: Retention::default(),
            series_cap: PALETTE.len(),
            x_axis: XAxisMode::default(),
            evict_empty: false,
        }
    }
}

impl SeriesConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.series_cap == 0 || self.series_cap > PALETTE.len() {
            return Err(ConfigError::SeriesCap {
                cap: self.series_cap,
                max: PALETTE.len(),
            });
        }
        if !self.retention.is_valid() {
            return Err(ConfigError::Retention(self.retention));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotterConfig {
    pub parser: ParserConfig,
    pub series: SeriesConfig,
    /// Also clear the series when the connection is re-established.
    pub reset_series_on_reconnect: bool,
}

impl Default for PlotterConfig {
    fn default() -> Self {
        PlotterConfig {
            parser: ParserConfig::default(),
            series: SeriesConfig::default(),
            reset_series_on_reconnect: true,
        }
    }
}

impl PlotterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parser.validate()?;
        self.series.validate()
    }
}
