//! Series buffer
//! Keeps a bounded set of named series fed from decoded records.
//!
//! Assumptions:
//! 1. Every record gets one x-position, shared by all the values it holds,
//!    so series stay aligned even when a record lacks some of them
//! 2. At most `series_cap` series live at once; extra names are ignored
//!    until eviction frees a slot
//! 3. A name is admitted only by a batch holding a value for it, so a
//!    series always has points when it is created
//! 4. Eviction runs once per ingested batch, never between records

use super::clock::{Clock, SystemClock};
use super::palette::ColorAllocator;
use super::series::Series;
use crate::config::{ConfigError, Retention, SeriesConfig, XAxisMode};
use crate::text::{DecodedRecord, ParseOutput};
use tracing::{debug, trace};

enum Cursor {
    Counter { next: u64 },
    Realtime { clock: Box<dyn Clock> },
}

impl Cursor {
    fn new(mode: XAxisMode, clock: Box<dyn Clock>) -> Cursor {
        match mode {
            XAxisMode::Counter => Cursor::Counter { next: 0 },
            XAxisMode::Realtime => Cursor::Realtime { clock },
        }
    }

    fn advance(&mut self) -> f64 {
        match self {
            Cursor::Counter { next } => {
                let x = *next as f64;
                *next += 1;
                x
            }
            Cursor::Realtime { clock } => clock.now_ms(),
        }
    }

    fn reset(&mut self) {
        if let Cursor::Counter { next } = self {
            *next = 0;
        }
    }
}

pub struct SeriesBuffer {
    config: SeriesConfig,
    series: Vec<Series>,
    colors: ColorAllocator,
    cursor: Cursor,
    latest: Option<f64>,
}

impl SeriesBuffer {
    pub fn new(config: SeriesConfig) -> Result<SeriesBuffer, ConfigError> {
        SeriesBuffer::with_clock(config, Box::new(SystemClock))
    }

    /// Uses `clock` for x-positions in realtime mode.
    pub fn with_clock(
        config: SeriesConfig,
        clock: Box<dyn Clock>,
    ) -> Result<SeriesBuffer, ConfigError> {
        config.validate()?;
        Ok(SeriesBuffer {
            cursor: Cursor::new(config.x_axis, clock),
            config,
            series: Vec::new(),
            colors: ColorAllocator::default(),
            latest: None,
        })
    }

    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    /// Live series in admission order.
    pub fn series(&self) -> &[Series] {
        &self.series
    }

    pub fn get(&self, name: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.name() == name)
    }

    /// Names of the live series in admission order.
    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(|s| s.name())
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// x-position of the most recent record.
    pub fn latest_x(&self) -> Option<f64> {
        self.latest
    }

    /// Drops every series and restarts the cursor.
    pub fn reset(&mut self) {
        self.series.clear();
        self.colors.reset();
        self.cursor.reset();
        self.latest = None;
    }

    pub fn ingest(&mut self, parsed: &ParseOutput) {
        self.ingest_records(&parsed.dataset_names, &parsed.records);
    }

    /// Appends `records`. `names` gives the admission order for new series;
    /// names without a value in `records` are skipped, and names missing
    /// from it are admitted after the listed ones, in record order.
    pub fn ingest_records<S: AsRef<str>>(&mut self, names: &[S], records: &[DecodedRecord]) {
        let mut candidates: Vec<&str> = names
            .iter()
            .map(AsRef::<str>::as_ref)
            .filter(|&n| records.iter().any(|r| r.contains(n)))
            .collect();
        for record in records {
            for name in record.names() {
                if !candidates.contains(&name) {
                    candidates.push(name);
                }
            }
        }
        self.admit(&candidates);

        for record in records {
            let mut x = self.cursor.advance();
            // The wall clock may step back; points must not.
            if let Some(latest) = self.latest {
                x = x.max(latest);
            }
            self.latest = Some(x);
            for series in self.series.iter_mut() {
                if let Some(y) = record.get(series.name()) {
                    series.push(x, y);
                }
            }
        }

        self.evict();
    }

    fn admit(&mut self, names: &[&str]) {
        for &name in names {
            if self.get(name).is_some() {
                continue;
            }
            if self.series.len() >= self.config.series_cap {
                trace!(name, cap = self.config.series_cap, "series cap reached, ignoring");
                continue;
            }
            let in_use: Vec<usize> = self.series.iter().map(|s| s.color_slot()).collect();
            let slot = self.colors.allocate(&in_use);
            debug!(name, slot, "new series");
            self.series.push(Series::new(name.to_string(), slot));
        }
    }

    fn evict(&mut self) {
        let Some(latest) = self.latest else {
            return;
        };
        let retention = self.config.retention;
        let evict_empty = self.config.evict_empty;

        self.series.retain_mut(|series| {
            match retention {
                Retention::Points(n) => series.retain_last(n),
                Retention::Span(w) => series.retain_from(latest - w),
            };
            if evict_empty && series.is_empty() {
                debug!(name = series.name(), "series aged out");
                false
            } else {
                true
            }
        });
    }
}

impl std::fmt::Debug for SeriesBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesBuffer")
            .field("config", &self.config)
            .field("series", &self.series)
            .field("latest", &self.latest)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PALETTE;
    use crate::text::StreamParser;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn rec(fields: &[(&str, f64)]) -> DecodedRecord {
        fields.iter().map(|&(n, v)| (n, v)).collect()
    }

    fn names(records: &[DecodedRecord]) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for r in records {
            for n in r.names() {
                if !names.iter().any(|m| m == n) {
                    names.push(n.to_string());
                }
            }
        }
        names
    }

    fn feed(buf: &mut SeriesBuffer, records: Vec<DecodedRecord>) {
        buf.ingest_records(&names(&records), &records);
    }

    fn xs(buf: &SeriesBuffer, name: &str) -> Vec<f64> {
        buf.get(name).unwrap().points().iter().map(|p| p.x).collect()
    }

    fn config(retention: Retention) -> SeriesConfig {
        SeriesConfig {
            retention,
            ..SeriesConfig::default()
        }
    }

    struct FakeClock(Arc<AtomicU64>);

    impl Clock for FakeClock {
        fn now_ms(&self) -> f64 {
            self.0.load(Ordering::SeqCst) as f64
        }
    }

    #[test]
    fn starts_empty() {
        let buf = SeriesBuffer::new(SeriesConfig::default()).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.latest_x(), None);
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = SeriesConfig {
            series_cap: 0,
            ..SeriesConfig::default()
        };
        assert!(SeriesBuffer::new(cfg).is_err());
    }

    #[test]
    fn cap_keeps_first_seen_names() {
        let mut buf = SeriesBuffer::new(SeriesConfig {
            series_cap: 7,
            ..SeriesConfig::default()
        })
        .unwrap();
        let record: DecodedRecord = (1..=9).map(|i| (format!("s{}", i), i as f64)).collect();
        feed(&mut buf, vec![record]);
        assert_eq!(buf.len(), 7);
        let kept: Vec<_> = buf.dataset_names().collect();
        assert_eq!(kept, vec!["s1", "s2", "s3", "s4", "s5", "s6", "s7"]);
        assert!(buf.get("s8").is_none());
    }

    #[test]
    fn records_share_one_cursor() {
        let mut buf = SeriesBuffer::new(SeriesConfig::default()).unwrap();
        feed(
            &mut buf,
            vec![
                rec(&[("a", 1.0), ("b", 1.0)]),
                rec(&[("a", 2.0)]),
                rec(&[("b", 3.0)]),
                rec(&[("a", 4.0), ("b", 4.0)]),
            ],
        );
        assert_eq!(xs(&buf, "a"), vec![0.0, 1.0, 3.0]);
        assert_eq!(xs(&buf, "b"), vec![0.0, 2.0, 3.0]);
        assert_eq!(buf.latest_x(), Some(3.0));
    }

    #[test]
    fn alternating_series_never_overlap() {
        let mut buf = SeriesBuffer::new(config(Retention::Points(100))).unwrap();
        let records: Vec<_> = (0..20)
            .map(|i| {
                if i % 2 == 0 {
                    rec(&[("even", i as f64)])
                } else {
                    rec(&[("odd", i as f64)])
                }
            })
            .collect();
        feed(&mut buf, records);
        let even = xs(&buf, "even");
        let odd = xs(&buf, "odd");
        assert_eq!(even.len(), 10);
        assert_eq!(odd.len(), 10);
        assert!(even.iter().all(|x| !odd.contains(x)));
    }

    #[test]
    fn cursor_continues_across_batches() {
        let mut buf = SeriesBuffer::new(SeriesConfig::default()).unwrap();
        feed(&mut buf, vec![rec(&[("a", 1.0)])]);
        feed(&mut buf, vec![rec(&[("a", 2.0)]), rec(&[("a", 3.0)])]);
        assert_eq!(xs(&buf, "a"), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn point_retention_keeps_most_recent() {
        let mut buf = SeriesBuffer::new(config(Retention::Points(5))).unwrap();
        let records: Vec<_> = (0..12).map(|i| rec(&[("a", i as f64)])).collect();
        feed(&mut buf, records);
        let ys: Vec<_> = buf.get("a").unwrap().points().iter().map(|p| p.y).collect();
        assert_eq!(ys, vec![7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn span_retention_drops_by_cursor() {
        let mut buf = SeriesBuffer::new(config(Retention::Span(3.0))).unwrap();
        feed(
            &mut buf,
            vec![
                rec(&[("a", 0.0), ("b", 0.0)]),
                rec(&[("a", 1.0)]),
                rec(&[("a", 2.0)]),
                rec(&[("a", 3.0)]),
                rec(&[("a", 4.0)]),
            ],
        );
        // latest - w = 1: the point on the boundary stays.
        assert_eq!(xs(&buf, "a"), vec![1.0, 2.0, 3.0, 4.0]);
        // Without the delete policy an aged-out series stays, empty.
        assert!(buf.get("b").unwrap().is_empty());
    }

    #[test]
    fn aged_out_series_frees_its_slot() {
        let mut buf = SeriesBuffer::new(SeriesConfig {
            retention: Retention::Span(2.0),
            series_cap: 2,
            evict_empty: true,
            ..SeriesConfig::default()
        })
        .unwrap();
        feed(&mut buf, vec![rec(&[("a", 1.0), ("b", 1.0), ("c", 1.0)])]);
        assert_eq!(buf.dataset_names().collect::<Vec<_>>(), vec!["a", "b"]);

        feed(
            &mut buf,
            vec![rec(&[("a", 2.0)]), rec(&[("a", 3.0)]), rec(&[("a", 4.0)])],
        );
        assert_eq!(buf.dataset_names().collect::<Vec<_>>(), vec!["a"]);

        feed(&mut buf, vec![rec(&[("a", 5.0), ("c", 5.0)])]);
        assert_eq!(buf.dataset_names().collect::<Vec<_>>(), vec!["a", "c"]);
        // "b" held slot 1; "c" takes the next unused color, not the freed one.
        assert_eq!(buf.get("c").unwrap().color(), PALETTE[2]);
    }

    #[test]
    fn listed_names_without_values_are_not_admitted() {
        let mut buf = SeriesBuffer::new(SeriesConfig {
            retention: Retention::Points(3),
            evict_empty: true,
            ..SeriesConfig::default()
        })
        .unwrap();
        buf.ingest_records(&["z", "a"], &[rec(&[("a", 1.0), ("b", 2.0)])]);
        assert_eq!(buf.dataset_names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn evicted_names_stay_out_across_parser_batches() {
        let mut buf = SeriesBuffer::new(SeriesConfig {
            retention: Retention::Span(2.0),
            series_cap: 2,
            evict_empty: true,
            ..SeriesConfig::default()
        })
        .unwrap();
        let mut parser = StreamParser::default();
        let mut ingest = |buf: &mut SeriesBuffer, text: &str| {
            let parsed = parser.parse_str(text);
            buf.ingest(&parsed);
        };

        ingest(&mut buf, "
a:1,b:1
");
        ingest(&mut buf, "a:2
a:3
a:4
");
        assert_eq!(buf.dataset_names().collect::<Vec<_>>(), vec!["a"]);

        // "b" is still in the parser's names but has no value here.
        ingest(&mut buf, "a:5
");
        assert_eq!(buf.dataset_names().collect::<Vec<_>>(), vec!["a"]);

        ingest(&mut buf, "a:6,z:1
");
        assert_eq!(buf.dataset_names().collect::<Vec<_>>(), vec!["a", "z"]);

        // "z" ages out too, and the freed slot keeps taking new names.
        ingest(&mut buf, "a:7
a:8
a:9
");
        ingest(&mut buf, "c:1
");
        ingest(&mut buf, "c:2
c:3
c:4
");
        ingest(&mut buf, "d:1
");
        assert_eq!(buf.dataset_names().collect::<Vec<_>>(), vec!["c", "d"]);
        assert!(buf.series().iter().all(|s| !s.is_empty()));
    }

    #[test]
    fn records_without_values_still_take_a_position() {
        let mut buf = SeriesBuffer::new(SeriesConfig::default()).unwrap();
        feed(
            &mut buf,
            vec![rec(&[("a", 1.0)]), DecodedRecord::new(), rec(&[("a", 2.0)])],
        );
        assert_eq!(xs(&buf, "a"), vec![0.0, 2.0]);
    }

    #[test]
    fn colors_follow_admission_order() {
        let mut buf = SeriesBuffer::new(SeriesConfig::default()).unwrap();
        feed(&mut buf, vec![rec(&[("x", 1.0), ("y", 2.0), ("z", 3.0)])]);
        let colors: Vec<_> = buf.series().iter().map(|s| s.color()).collect();
        assert_eq!(colors, PALETTE[..3].to_vec());
    }

    #[test]
    fn reset_returns_to_empty() {
        let mut buf = SeriesBuffer::new(SeriesConfig::default()).unwrap();
        feed(&mut buf, vec![rec(&[("a", 1.0)]), rec(&[("b", 2.0)])]);
        buf.reset();
        assert!(buf.is_empty());
        feed(&mut buf, vec![rec(&[("b", 2.0)])]);
        assert_eq!(xs(&buf, "b"), vec![0.0]);
        assert_eq!(buf.get("b").unwrap().color(), PALETTE[0]);
    }

    #[test]
    fn realtime_uses_clock_and_never_goes_back() {
        let now = Arc::new(AtomicU64::new(1_000));
        let mut buf = SeriesBuffer::with_clock(
            SeriesConfig {
                x_axis: XAxisMode::Realtime,
                retention: Retention::Span(500.0),
                ..SeriesConfig::default()
            },
            Box::new(FakeClock(now.clone())),
        )
        .unwrap();
        feed(&mut buf, vec![rec(&[("a", 1.0)])]);
        now.store(900, Ordering::SeqCst);
        feed(&mut buf, vec![rec(&[("a", 2.0)])]);
        now.store(1_600, Ordering::SeqCst);
        feed(&mut buf, vec![rec(&[("a", 3.0)])]);
        assert_eq!(xs(&buf, "a"), vec![1_600.0]);
        now.store(1_700, Ordering::SeqCst);
        feed(&mut buf, vec![rec(&[("a", 4.0)])]);
        assert_eq!(xs(&buf, "a"), vec![1_600.0, 1_700.0]);
    }
}
