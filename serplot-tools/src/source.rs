//! Text sources
//!
//! A `Source` names where device output comes from: a serial port, a TCP
//! bridge, a file, or stdin. `spawn` reads it on a dedicated thread and
//! forwards text chunks as `Event`s on a `crossbeam::channel`. Serial and
//! TCP sources reconnect after errors; every (re)connection is announced
//! with `Event::Connected`, so that consumers can reset their parsers.

use crate::ToolError;
use crossbeam::channel;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Wait between reconnection attempts.
static RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Serial read timeout, bounding how long a reader ignores a closed channel.
static SERIAL_TIMEOUT: Duration = Duration::from_millis(100);

const READ_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Serial { path: String, baud: u32 },
    Tcp(String),
    File(String),
    Stdin,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A new connection to the device started. Text from earlier
    /// connections must not be stitched to what follows.
    Connected,
    Data(String),
    Disconnected(String),
    /// The source reached its end and will not reconnect.
    Finished,
}

impl Source {
    /// Parses an address like `serial:///dev/ttyUSB0:115200`, `/dev/ttyACM0`,
    /// `COM3`, `tcp://host:port`, `file://log.txt` or `-`.
    /// `baud` applies to serial addresses without an explicit rate.
    pub fn parse(url: &str, baud: u32) -> Result<Source, ToolError> {
        if url == "-" || url == "stdin" {
            return Ok(Source::Stdin);
        }
        if let Some(path) = url.strip_prefix("file://") {
            if path.is_empty() {
                return Err(ToolError::InvalidSource(url.to_string()));
            }
            return Ok(Source::File(path.to_string()));
        }
        if let Some(addr) = url.strip_prefix("tcp://") {
            if !addr.contains(':') {
                return Err(ToolError::InvalidSource(url.to_string()));
            }
            return Ok(Source::Tcp(addr.to_string()));
        }
        if url.contains("://") && !url.starts_with("serial://") {
            return Err(ToolError::InvalidSource(url.to_string()));
        }
        let port = url.strip_prefix("serial://").unwrap_or(url);
        let (path, baud) = match port.rsplit_once(':') {
            Some((path, rate)) if !path.is_empty() => match rate.parse::<u32>() {
                Ok(rate) => (path, rate),
                Err(_) => return Err(ToolError::InvalidSource(url.to_string())),
            },
            _ => (port, baud),
        };
        if path.is_empty() {
            return Err(ToolError::InvalidSource(url.to_string()));
        }
        Ok(Source::Serial {
            path: path.to_string(),
            baud,
        })
    }

    fn reconnects(&self) -> bool {
        matches!(self, Source::Serial { .. } | Source::Tcp(_))
    }

    fn open(&self) -> Result<Box<dyn Read + Send>, ToolError> {
        let reader: Box<dyn Read + Send> = match self {
            Source::Serial { path, baud } => Box::new(
                serialport::new(path.as_str(), *baud)
                    .timeout(SERIAL_TIMEOUT)
                    .open()?,
            ),
            Source::Tcp(addr) => Box::new(TcpStream::connect(addr)?),
            Source::File(path) => Box::new(File::open(path)?),
            Source::Stdin => Box::new(io::stdin()),
        };
        Ok(reader)
    }

    /// Opens the source for writing to the device.
    pub fn open_writer(&self) -> Result<Box<dyn Write + Send>, ToolError> {
        match self {
            Source::Serial { path, baud } => Ok(Box::new(
                serialport::new(path.as_str(), *baud)
                    .timeout(SERIAL_TIMEOUT)
                    .open()?,
            )),
            Source::Tcp(addr) => Ok(Box::new(TcpStream::connect(addr)?)),
            other => Err(ToolError::ReadOnly(other.to_string())),
        }
    }

    /// Reads this source on a new thread. The thread stops once the
    /// receiving end of `events` is dropped, or the source is finished.
    pub fn spawn(self, events: channel::Sender<Event>) -> thread::JoinHandle<()> {
        thread::spawn(move || self.run(events))
    }

    fn run(self, events: channel::Sender<Event>) {
        loop {
            let reader = match self.open() {
                Ok(reader) => reader,
                Err(e) => {
                    warn!(source = %self, error = %e, "failed to open source");
                    if !self.reconnects() || events.send(Event::Disconnected(e.to_string())).is_err() {
                        let _ = events.send(Event::Finished);
                        return;
                    }
                    thread::sleep(RECONNECT_DELAY);
                    continue;
                }
            };
            info!(source = %self, "connected");
            if events.send(Event::Connected).is_err() {
                return;
            }
            match pump(reader, &events) {
                Ok(Pump::ReceiverGone) => return,
                Ok(Pump::Eof) if !self.reconnects() => {
                    let _ = events.send(Event::Finished);
                    return;
                }
                Ok(Pump::Eof) => {
                    if events.send(Event::Disconnected("end of stream".to_string())).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(source = %self, error = %e, "read failed");
                    if events.send(Event::Disconnected(e.to_string())).is_err() {
                        return;
                    }
                    if !self.reconnects() {
                        let _ = events.send(Event::Finished);
                        return;
                    }
                }
            }
            thread::sleep(RECONNECT_DELAY);
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Serial { path, baud } => write!(f, "serial://{}:{}", path, baud),
            Source::Tcp(addr) => write!(f, "tcp://{}", addr),
            Source::File(path) => write!(f, "file://{}", path),
            Source::Stdin => write!(f, "stdin"),
        }
    }
}

enum Pump {
    Eof,
    ReceiverGone,
}

fn pump(mut reader: Box<dyn Read + Send>, events: &channel::Sender<Event>) -> io::Result<Pump> {
    let mut decoder = Utf8Decoder::default();
    let mut buf = [0u8; READ_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(Pump::Eof),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                // Serial ports time out while the device is quiet.
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let text = decoder.decode(&buf[..n]);
        if text.is_empty() {
            continue;
        }
        if events.send(Event::Data(text)).is_err() {
            debug!("event receiver dropped, stopping reader");
            return Ok(Pump::ReceiverGone);
        }
    }
}

/// Converts a byte stream to text, holding back multi-byte characters
/// split across reads. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        let incomplete = rest.to_vec();
        self.pending = incomplete;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_addresses() {
        assert_eq!(Source::parse("-", 9600).unwrap(), Source::Stdin);
        assert_eq!(
            Source::parse("/dev/ttyACM0", 9600).unwrap(),
            Source::Serial {
                path: "/dev/ttyACM0".to_string(),
                baud: 9600
            }
        );
        assert_eq!(
            Source::parse("serial://COM3:115200", 9600).unwrap(),
            Source::Serial {
                path: "COM3".to_string(),
                baud: 115200
            }
        );
        assert_eq!(
            Source::parse("tcp://localhost:5555", 9600).unwrap(),
            Source::Tcp("localhost:5555".to_string())
        );
        assert_eq!(
            Source::parse("file://capture.txt", 9600).unwrap(),
            Source::File("capture.txt".to_string())
        );
        assert!(Source::parse("tcp://localhost", 9600).is_err());
        assert!(Source::parse("udp://localhost:1", 9600).is_err());
        assert!(Source::parse("/dev/ttyS0:fast", 9600).is_err());
    }

    #[test]
    fn decoder_holds_split_characters() {
        let mut d = Utf8Decoder::default();
        let bytes = "t:21°C\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC2).unwrap() + 1;
        assert_eq!(d.decode(&bytes[..split]), "t:21");
        assert_eq!(d.decode(&bytes[split..]), "°C\n");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut d = Utf8Decoder::default();
        assert_eq!(d.decode(b"1\xff2\n"), "1\u{FFFD}2\n");
    }

    #[test]
    fn file_source_reads_to_end() {
        let path = std::env::temp_dir().join(format!("serplot-source-{}.txt", std::process::id()));
        std::fs::write(&path, "0\n1 2\n").unwrap();
        let (tx, rx) = channel::unbounded();
        let handle = Source::File(path.display().to_string()).spawn(tx);
        let mut text = String::new();
        assert_eq!(rx.recv().unwrap(), Event::Connected);
        loop {
            match rx.recv().unwrap() {
                Event::Data(s) => text.push_str(&s),
                Event::Finished => break,
                other => panic!("unexpected event {:?}", other),
            }
        }
        handle.join().unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(text, "0\n1 2\n");
    }
}
