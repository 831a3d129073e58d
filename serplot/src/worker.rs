//! Parse worker
//!
//! Runs a `StreamParser` on a dedicated thread, so that a slow consumer
//! (e.g. a renderer) does not hold up reading from the device. Text goes
//! in and `ParseOutput`s come out through `crossbeam::channel`s; the parser
//! itself is never shared.
//!
//! Note: the thread exits when the `Worker` is dropped.

use crate::config::{ConfigError, ParserConfig};
use crate::text::{ParseOutput, StreamParser};
use crossbeam::channel;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Requests handled by the worker thread, in order.
#[derive(Debug, Clone)]
pub enum Command {
    /// Chunks received from the device since the last command.
    Data(Vec<String>),
    /// Resets the parser, e.g. after a reconnection.
    Cleanup,
}

#[derive(Debug, Clone)]
pub enum SendError {
    WorkerDisconnected(Command),
}

#[derive(Debug, Clone)]
pub enum RecvError {
    WouldBlock,
    WorkerDisconnected,
}

pub struct Worker {
    tx: Option<channel::Sender<Command>>,
    rx: channel::Receiver<ParseOutput>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    pub fn new(config: &ParserConfig) -> Result<Worker, ConfigError> {
        Ok(Worker::spawn(StreamParser::new(config)?))
    }

    /// Moves `parser` to a new thread.
    pub fn spawn(mut parser: StreamParser) -> Worker {
        let (tx, commands) = channel::unbounded::<Command>();
        let (results, rx) = channel::unbounded::<ParseOutput>();

        let thread = thread::spawn(move || {
            for command in commands.iter() {
                match command {
                    Command::Data(chunks) => {
                        let parsed = parser.parse(chunks.as_slice());
                        if parsed.is_empty() {
                            continue;
                        }
                        if results.send(parsed).is_err() {
                            break;
                        }
                    }
                    Command::Cleanup => parser.reset(),
                }
            }
            debug!("parse worker exiting");
        });

        Worker {
            tx: Some(tx),
            rx,
            thread: Some(thread),
        }
    }

    pub fn send(&self, command: Command) -> Result<(), SendError> {
        match &self.tx {
            Some(tx) => tx
                .send(command)
                .map_err(|e| SendError::WorkerDisconnected(e.into_inner())),
            None => Err(SendError::WorkerDisconnected(command)),
        }
    }

    pub fn send_data(&self, chunks: Vec<String>) -> Result<(), SendError> {
        self.send(Command::Data(chunks))
    }

    pub fn cleanup(&self) -> Result<(), SendError> {
        self.send(Command::Cleanup)
    }

    /// Waits for the next batch of records.
    pub fn recv(&self) -> Result<ParseOutput, RecvError> {
        self.rx.recv().map_err(|_| RecvError::WorkerDisconnected)
    }

    pub fn try_recv(&self) -> Result<ParseOutput, RecvError> {
        match self.rx.try_recv() {
            Ok(parsed) => Ok(parsed),
            Err(channel::TryRecvError::Empty) => Err(RecvError::WouldBlock),
            Err(channel::TryRecvError::Disconnected) => Err(RecvError::WorkerDisconnected),
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<ParseOutput, RecvError> {
        match self.rx.recv_timeout(timeout) {
            Ok(parsed) => Ok(parsed),
            Err(channel::RecvTimeoutError::Timeout) => Err(RecvError::WouldBlock),
            Err(channel::RecvTimeoutError::Disconnected) => Err(RecvError::WorkerDisconnected),
        }
    }

    /// Receiving end of the results, for use in `crossbeam::select!`.
    pub fn receiver(&self) -> &channel::Receiver<ParseOutput> {
        &self.rx
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn chunks(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_on_worker_thread() {
        let worker = Worker::spawn(StreamParser::default());
        worker.send_data(chunks(&["0\n", "a:1,b:"])).unwrap();
        worker.send_data(chunks(&["2\n"])).unwrap();
        let parsed = worker.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].get("b"), Some(2.0));
        assert_eq!(parsed.dataset_names, vec!["a", "b"]);
    }

    #[test]
    fn cleanup_resets_parser() {
        let worker = Worker::spawn(StreamParser::default());
        worker.send_data(chunks(&["\n1 2\n", "3"])).unwrap();
        assert_eq!(worker.recv_timeout(TIMEOUT).unwrap().records.len(), 1);

        worker.cleanup().unwrap();
        worker.send_data(chunks(&["47", "3\n1 2\n"])).unwrap();
        let parsed = worker.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].get("value 1"), Some(1.0));
        assert!(matches!(worker.try_recv(), Err(RecvError::WouldBlock)));
    }

    #[test]
    fn batches_without_records_are_not_sent() {
        let worker = Worker::spawn(StreamParser::default());
        worker.send_data(chunks(&["partial"])).unwrap();
        assert!(matches!(
            worker.recv_timeout(Duration::from_millis(50)),
            Err(RecvError::WouldBlock)
        ));
    }
}
