//! Session
//!
//! Ties one `StreamParser` to one `SeriesBuffer` for a single device
//! connection, and holds the pause state of the driver.
//!
//! While paused, incoming text is still parsed so that record boundaries
//! stay in sync with the device, but the decoded records are dropped and
//! the series are left untouched: no point is appended and none evicted.
//! Resuming continues from the next record received.

use crate::config::{ConfigError, PlotterConfig};
use crate::data::SeriesBuffer;
use crate::text::{ParseOutput, StreamParser};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Session {
    parser: StreamParser,
    buffer: SeriesBuffer,
    paused: bool,
    reset_series_on_reconnect: bool,
}

impl Session {
    pub fn new(config: &PlotterConfig) -> Result<Session, ConfigError> {
        Ok(Session::from_parts(
            StreamParser::new(&config.parser)?,
            SeriesBuffer::new(config.series.clone())?,
            config.reset_series_on_reconnect,
        ))
    }

    pub fn from_parts(
        parser: StreamParser,
        buffer: SeriesBuffer,
        reset_series_on_reconnect: bool,
    ) -> Session {
        Session {
            parser,
            buffer,
            paused: false,
            reset_series_on_reconnect,
        }
    }

    /// Parses `chunks` and, unless paused, adds the records to the series.
    /// Returns the number of records decoded.
    pub fn feed<S: AsRef<str>>(&mut self, chunks: &[S]) -> usize {
        let parsed = self.parser.parse(chunks);
        self.apply(&parsed)
    }

    /// Adds records parsed elsewhere, e.g. by a `worker::Worker`.
    pub fn apply(&mut self, parsed: &ParseOutput) -> usize {
        if self.paused {
            if !parsed.records.is_empty() {
                debug!(records = parsed.records.len(), "paused, dropping records");
            }
        } else {
            self.buffer.ingest(parsed);
        }
        parsed.records.len()
    }

    /// Must be called whenever the device connection is (re)established.
    pub fn reconnect(&mut self) {
        info!(
            reset_series = self.reset_series_on_reconnect,
            "device reconnected, resetting session"
        );
        self.parser.reset();
        if self.reset_series_on_reconnect {
            self.buffer.reset();
        }
    }

    /// Empties the series without touching the parser state.
    pub fn clear_series(&mut self) {
        self.buffer.reset();
    }

    pub fn set_paused(&mut self, paused: bool) {
        if paused != self.paused {
            debug!(paused, "pause state changed");
        }
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn parser(&self) -> &StreamParser {
        &self.parser
    }

    pub fn buffer(&self) -> &SeriesBuffer {
        &self.buffer
    }
}
