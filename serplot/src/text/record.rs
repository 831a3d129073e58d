//! Record decoding
//!
//! A record is one line of device output. Two dialects are understood:
//! - positional: `<value1> <value2> <value3>`, named `value 1`, `value 2`, ...
//! - labeled: `name1:<value1>,name2:<value2>`
//!
//! A record containing a colon anywhere is labeled, otherwise it is
//! positional. Fields that do not decode are dropped one by one; the rest
//! of the record survives. A record where nothing decodes is still a
//! record, with no values.

use tracing::trace;

/// Named values decoded from one record, in the order they appeared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRecord {
    fields: Vec<(String, f64)>,
}

impl DecodedRecord {
    pub fn new() -> DecodedRecord {
        DecodedRecord { fields: Vec::new() }
    }

    /// Sets `name` to `value`. A repeated name keeps its first position
    /// and takes the latest value.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(field) => field.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for DecodedRecord {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut record = DecodedRecord::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl std::fmt::Display for DecodedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// Parses the leading numeric part of `text`: optional sign, digits with an
/// optional fraction, and an optional exponent. Trailing characters such as
/// units are ignored, so `3.3V` gives `3.3`. Returns `None` when no digit
/// leads the text or the value is not finite.
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut i = 0;

    if i < len && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let int_start = i;
    while i < len && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;
    if i < len && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < len && bytes[i].is_ascii_digit() {
            i += 1;
        }
        digits += i - frac_start;
    }
    if digits == 0 {
        return None;
    }

    let mut end = i;
    if i < len && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < len && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < len && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            end = j;
        }
    }

    text[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Decodes one complete record.
pub fn decode_record(line: &str, delimiters: &[char]) -> DecodedRecord {
    let mut record = DecodedRecord::new();
    let tokens = line
        .split(|c: char| delimiters.contains(&c))
        .filter(|t| !t.is_empty());

    if line.contains(':') {
        for token in tokens {
            let mut parts = token.split(':');
            let name = parts.next().unwrap_or_default().trim();
            let value = parts.next().unwrap_or_default().trim();
            if name.is_empty() || value.is_empty() {
                trace!(token, "dropping incomplete labeled field");
                continue;
            }
            match parse_number(value) {
                Some(v) => record.insert(name, v),
                None => trace!(name, value, "dropping non-numeric field"),
            }
        }
    } else {
        for (i, token) in tokens.enumerate() {
            match parse_number(token) {
                Some(v) => record.insert(format!("value {}", i + 1), v),
                None => trace!(token, "dropping non-numeric field"),
            }
        }
    }

    record
}
