//! Stream parser
//!
//! Reassembles text chunks into complete records and decodes them.
//! A `StreamParser` holds two pieces of session state:
//! - the leftover: the tail of the input that did not end on a record
//!   separator yet, carried over to the next call;
//! - whether a separator has been seen since the last reset. Until then
//!   the input may start in the middle of a record, so everything up to
//!   and including the first separator is discarded.
//!
//! Callers must `reset()` the parser whenever the underlying connection is
//! (re)established. The parser cannot tell two sessions apart on its own,
//! and without a reset the tail of the old session is glued to the head of
//! the new one.

use super::record::{decode_record, DecodedRecord};
use crate::config::{ConfigError, ParserConfig};
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Result of one `StreamParser::parse` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutput {
    /// Every name seen since the last reset, in first-seen order.
    pub dataset_names: Vec<String>,
    /// Records completed by this call, in input order.
    pub records: Vec<DecodedRecord>,
}

impl ParseOutput {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug)]
enum Separator {
    /// `\r?\n`, scanned for directly.
    Line,
    Pattern(Regex),
}

impl Separator {
    /// Byte range of the first separator at or after `from`.
    fn find(&self, text: &str, from: usize) -> Option<(usize, usize)> {
        match self {
            Separator::Line => {
                let nl = from + text[from..].find('\n')?;
                let start = if nl > from && text.as_bytes()[nl - 1] == b'\r' {
                    nl - 1
                } else {
                    nl
                };
                Some((start, nl + 1))
            }
            Separator::Pattern(re) => re
                .find_at(text, from)
                .filter(|m| m.end() > m.start())
                .map(|m| (m.start(), m.end())),
        }
    }

    /// Length of a pending record, not counting a separator that may have
    /// started arriving.
    fn pending_len(&self, text: &str) -> usize {
        match self {
            Separator::Line => text.strip_suffix('\r').unwrap_or(text).len(),
            Separator::Pattern(_) => text.len(),
        }
    }
}

#[derive(Debug)]
pub struct StreamParser {
    separator: Separator,
    delimiters: Vec<char>,
    max_leftover: usize,

    leftover: String,
    synced: bool,
    dataset_names: Vec<String>,
    seen: HashSet<String>,
}

impl Default for StreamParser {
    fn default() -> Self {
        let config = ParserConfig::default();
        StreamParser::with_parts(
            Separator::Line,
            config.field_delimiters.chars().collect(),
            config.max_leftover,
        )
    }
}

impl StreamParser {
    pub fn new(config: &ParserConfig) -> Result<StreamParser, ConfigError> {
        let separator = match config.separator_regex()? {
            Some(re) => Separator::Pattern(re),
            None => Separator::Line,
        };
        Ok(StreamParser::with_parts(
            separator,
            config.delimiters()?,
            config.max_leftover,
        ))
    }

    fn with_parts(separator: Separator, delimiters: Vec<char>, max_leftover: usize) -> Self {
        StreamParser {
            separator,
            delimiters,
            max_leftover,
            leftover: String::new(),
            synced: false,
            dataset_names: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Forgets the leftover, the names seen so far, and re-arms the
    /// discard of the first record.
    pub fn reset(&mut self) {
        self.leftover.clear();
        self.synced = false;
        self.dataset_names.clear();
        self.seen.clear();
    }

    /// Text carried over to the next call.
    pub fn leftover(&self) -> &str {
        &self.leftover
    }

    /// Whether a record separator was seen since the last reset.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn dataset_names(&self) -> &[String] {
        &self.dataset_names
    }

    pub fn parse_str(&mut self, chunk: &str) -> ParseOutput {
        self.parse(&[chunk])
    }

    /// Appends `chunks` to the pending input and returns every record
    /// completed by it.
    pub fn parse<S: AsRef<str>>(&mut self, chunks: &[S]) -> ParseOutput {
        let mut text = std::mem::take(&mut self.leftover);
        for chunk in chunks {
            text.push_str(chunk.as_ref());
        }

        let mut pos = 0;
        if !self.synced {
            match self.separator.find(&text, 0) {
                Some((_, end)) => {
                    debug!(bytes = end, "discarding first record");
                    self.synced = true;
                    pos = end;
                }
                None => {
                    self.keep_leftover(text);
                    return self.output(Vec::new());
                }
            }
        }

        let mut records = Vec::new();
        while let Some((start, end)) = self.separator.find(&text, pos) {
            let line = &text[pos..start];
            if line.len() > self.max_leftover {
                warn!(
                    bytes = line.len(),
                    limit = self.max_leftover,
                    "record too long, dropping it"
                );
            } else if !line.is_empty() {
                let record = decode_record(line, &self.delimiters);
                self.register_names(&record);
                records.push(record);
            }
            pos = end;
        }

        text.drain(..pos);
        self.keep_leftover(text);
        self.output(records)
    }

    fn keep_leftover(&mut self, text: String) {
        if self.separator.pending_len(&text) > self.max_leftover {
            warn!(
                bytes = text.len(),
                limit = self.max_leftover,
                "record too long, dropping it"
            );
            // The rest of this record is still to come: drop it too.
            self.leftover.clear();
            self.synced = false;
        } else {
            self.leftover = text;
        }
    }

    fn register_names(&mut self, record: &DecodedRecord) {
        for name in record.names() {
            if !self.seen.contains(name) {
                self.seen.insert(name.to_string());
                self.dataset_names.push(name.to_string());
            }
        }
    }

    fn output(&self, records: Vec<DecodedRecord>) -> ParseOutput {
        ParseOutput {
            dataset_names: self.dataset_names.clone(),
            records,
        }
    }
}
