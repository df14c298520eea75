//! Pluggable event source abstraction.
//!
//! The consumer only needs a cancellation-aware pull primitive:
//! [`EventSource::poll`] waits at most `timeout` for the next message. Blocking
//! transports (stdin, a tailed spool file) run on their own thread and hand
//! messages over a bounded channel wrapped in a [`ChannelSource`].

use std::fs::File;
use std::io::{self, BufRead, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info};

use crate::error::{ConfigError, SourceError};

/// Capacity of the handoff channel between a reader thread and the consumer.
const CHANNEL_CAP: usize = 4096;

/// How often the tail thread checks its file for appended lines. Bounds how
/// far the read-time stamp can trail the actual append.
const TAIL_INTERVAL: Duration = Duration::from_millis(10);

/// One inbound message. The body may hold several newline-delimited records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    pub body: Vec<u8>,
    /// When the transport accepted the message. Fills the terminal stage for
    /// records that carry no `/TimeE` of their own. The stdin and tail
    /// adapters have no broker clock and stamp the time they read the line.
    pub enqueued_at: Option<DateTime<Utc>>,
}

impl EventMessage {
    pub fn new(body: impl Into<Vec<u8>>, enqueued_at: Option<DateTime<Utc>>) -> Self {
        Self {
            body: body.into(),
            enqueued_at,
        }
    }
}

/// Source of only-new events.
pub trait EventSource: Send {
    /// Wait up to `timeout` for the next message. `Ok(None)` means nothing
    /// arrived in time; `Err(SourceError::Closed)` means end of stream.
    fn poll(&mut self, timeout: Duration) -> Result<Option<EventMessage>, SourceError>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// ChannelSource
// ---------------------------------------------------------------------------

/// Item carried from a producer thread to the consumer.
pub type SourceItem = Result<EventMessage, SourceError>;

/// [`EventSource`] backed by a crossbeam channel. Closed once every sender
/// has been dropped and the channel is drained.
pub struct ChannelSource {
    name: String,
    rx: Receiver<SourceItem>,
    _reader: Option<JoinHandle<()>>,
}

impl ChannelSource {
    /// Bounded channel pair; the sender side is handed to a producer.
    pub fn pair(name: impl Into<String>, cap: usize) -> (Sender<SourceItem>, Self) {
        let (tx, rx) = crossbeam_channel::bounded(cap);
        let source = Self {
            name: name.into(),
            rx,
            _reader: None,
        };
        (tx, source)
    }

    fn with_reader(mut self, handle: JoinHandle<()>) -> Self {
        self._reader = Some(handle);
        self
    }
}

impl EventSource for ChannelSource {
    fn poll(&mut self, timeout: Duration) -> Result<Option<EventMessage>, SourceError> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(msg)) => Ok(Some(msg)),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Closed),
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Where to read events from, resolved from the connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointKind {
    /// Standard input, one message per line batch.
    Stdin,
    /// A spool file tailed from its current end.
    Tail(PathBuf),
}

/// Validated connection parameters. Building one performs no I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Event-source identifier (hub name); used in logs and report headers.
    pub source: String,
    pub kind: EndpointKind,
}

impl Endpoint {
    /// Validate `source` and the `;`-separated `Key=Value` connection string.
    /// The `Endpoint` key selects the transport: `stdin:`/`-` or `file://<path>`.
    pub fn parse(source: &str, credential: &str) -> Result<Self, ConfigError> {
        let source = source.trim();
        let credential = credential.trim();
        if source.is_empty() {
            return Err(ConfigError::MissingSource);
        }
        if credential.is_empty() {
            return Err(ConfigError::MissingCredential);
        }

        let mut endpoint = None;
        for segment in credential.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| ConfigError::BadSegment(segment.to_string()))?;
            if key.trim().eq_ignore_ascii_case("endpoint") {
                endpoint = Some(value.trim().to_string());
            }
        }
        let endpoint = endpoint.ok_or(ConfigError::MissingEndpoint)?;

        let kind = if endpoint == "-" || endpoint.eq_ignore_ascii_case("stdin:") {
            EndpointKind::Stdin
        } else if let Some(path) = endpoint.strip_prefix("file://") {
            if path.is_empty() {
                return Err(ConfigError::UnsupportedEndpoint(endpoint));
            }
            EndpointKind::Tail(PathBuf::from(path))
        } else {
            return Err(ConfigError::UnsupportedEndpoint(endpoint));
        };

        Ok(Self {
            source: source.to_string(),
            kind,
        })
    }

    /// Open the transport and start reading only events that arrive from now on.
    pub fn open(&self) -> Result<ChannelSource, SourceError> {
        match &self.kind {
            EndpointKind::Stdin => spawn_stdin(&self.source),
            EndpointKind::Tail(path) => spawn_tail(&self.source, path, TAIL_INTERVAL),
        }
    }
}

// ---------------------------------------------------------------------------
// Reader threads
// ---------------------------------------------------------------------------

fn spawn_stdin(name: &str) -> Result<ChannelSource, SourceError> {
    let (tx, source) = ChannelSource::pair(format!("{} (stdin)", name), CHANNEL_CAP);
    let handle = std::thread::Builder::new()
        .name("stdin-source".into())
        .spawn(move || {
            forward_lines(io::stdin().lock(), "stdin", &tx);
            debug!("stdin source reached end of input");
        })
        .map_err(|e| SourceError::Io {
            origin: "stdin".into(),
            source: e,
        })?;
    Ok(source.with_reader(handle))
}

/// Send each `\n`-terminated line of `reader` as one message, stamped with
/// its read time. Bodies are raw bytes; decoding is left to the consumer so a
/// line that is not UTF-8 only costs that record. Stops at end of input, on a
/// read error (forwarded) or once the consumer has gone away.
pub(crate) fn forward_lines<R: BufRead>(mut reader: R, origin: &str, tx: &Sender<SourceItem>) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let msg = EventMessage::new(buf.as_slice(), Some(Utc::now()));
                if tx.send(Ok(msg)).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Err(SourceError::Io {
                    origin: origin.to_string(),
                    source: e,
                }));
                break;
            }
        }
    }
}

fn spawn_tail(name: &str, path: &Path, poll_interval: Duration) -> Result<ChannelSource, SourceError> {
    let io_err = |e: io::Error| SourceError::Io {
        origin: path.display().to_string(),
        source: e,
    };
    let mut tail = FileTail::open(path).map_err(io_err)?;
    info!("tailing {} from offset {}", path.display(), tail.offset);

    let (tx, source) = ChannelSource::pair(format!("{} ({})", name, path.display()), CHANNEL_CAP);
    let origin = path.display().to_string();
    let handle = std::thread::Builder::new()
        .name("tail-source".into())
        .spawn(move || loop {
            match tail.read_complete_lines() {
                Ok(Some(body)) => {
                    if tx.send(Ok(EventMessage::new(body, Some(Utc::now())))).is_err() {
                        break;
                    }
                }
                Ok(None) => std::thread::sleep(poll_interval),
                Err(e) => {
                    let _ = tx.send(Err(SourceError::Io {
                        origin: origin.clone(),
                        source: e,
                    }));
                    break;
                }
            }
        })
        .map_err(io_err)?;
    Ok(source.with_reader(handle))
}

/// Incremental reader over a growing file. Emits only whole lines; a partial
/// trailing line is held back until its newline arrives.
pub struct FileTail {
    file: File,
    offset: u64,
    pending: Vec<u8>,
}

impl FileTail {
    /// Open `path` positioned at its current end.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let offset = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            file,
            offset,
            pending: Vec::new(),
        })
    }

    /// Read whatever was appended since the last call and return the complete
    /// lines, or `None` if no full line is available yet.
    pub fn read_complete_lines(&mut self) -> io::Result<Option<Vec<u8>>> {
        let len = self.file.metadata()?.len();
        if len < self.offset {
            // Truncated or rotated in place: start over from the beginning.
            self.file.seek(SeekFrom::Start(0))?;
            self.offset = 0;
            self.pending.clear();
        }
        let mut chunk = Vec::new();
        let n = (&mut self.file).take(len - self.offset).read_to_end(&mut chunk)?;
        self.offset += n as u64;
        self.pending.extend_from_slice(&chunk);

        let Some(last_nl) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Ok(None);
        };
        let rest = self.pending.split_off(last_nl + 1);
        let body = std::mem::replace(&mut self.pending, rest);
        Ok(Some(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_endpoint_requires_source_and_credential() {
        assert_eq!(Endpoint::parse("", "Endpoint=-"), Err(ConfigError::MissingSource));
        assert_eq!(Endpoint::parse("  ", "Endpoint=-"), Err(ConfigError::MissingSource));
        assert_eq!(Endpoint::parse("hub", ""), Err(ConfigError::MissingCredential));
        assert_eq!(ConfigError::MissingSource.to_string(), "event source identifier is empty");
        assert_eq!(ConfigError::MissingCredential.to_string(), "connection credential is empty");
    }

    #[test]
    fn test_endpoint_connection_string() {
        let ep = Endpoint::parse(
            "telemetry",
            "Endpoint=file:///var/spool/hub.jsonl;SharedAccessKeyName=listen;SharedAccessKey=abc=",
        )
        .unwrap();
        assert_eq!(ep.source, "telemetry");
        assert_eq!(ep.kind, EndpointKind::Tail(PathBuf::from("/var/spool/hub.jsonl")));

        let ep = Endpoint::parse("telemetry", "endpoint = stdin: ;").unwrap();
        assert_eq!(ep.kind, EndpointKind::Stdin);
    }

    #[test]
    fn test_endpoint_rejects_bad_strings() {
        assert_eq!(
            Endpoint::parse("hub", "SharedAccessKey=abc"),
            Err(ConfigError::MissingEndpoint)
        );
        assert_eq!(
            Endpoint::parse("hub", "Endpoint=-;garbage"),
            Err(ConfigError::BadSegment("garbage".into()))
        );
        assert_eq!(
            Endpoint::parse("hub", "Endpoint=sb://hub.example.net/"),
            Err(ConfigError::UnsupportedEndpoint("sb://hub.example.net/".into()))
        );
    }

    #[test]
    fn test_channel_source_timeout_and_close() {
        let (tx, mut source) = ChannelSource::pair("test", 8);
        assert!(source.poll(Duration::from_millis(5)).unwrap().is_none());
        tx.send(Ok(EventMessage::new("x", None))).unwrap();
        let msg = source.poll(Duration::from_millis(5)).unwrap().unwrap();
        assert_eq!(msg.body, b"x");
        drop(tx);
        assert!(matches!(source.poll(Duration::from_millis(5)), Err(SourceError::Closed)));
    }

    #[test]
    fn test_forward_lines_passes_non_utf8_through() {
        let input: &[u8] = b"good\n\xff\xfe bad bytes\r\nlast";
        let (tx, mut source) = ChannelSource::pair("bytes", 8);
        forward_lines(input, "test", &tx);
        drop(tx);

        let mut bodies = Vec::new();
        while let Ok(Some(msg)) = source.poll(Duration::from_millis(5)) {
            assert!(msg.enqueued_at.is_some());
            bodies.push(msg.body);
        }
        assert_eq!(
            bodies,
            vec![b"good\n".to_vec(), b"\xff\xfe bad bytes\r\n".to_vec(), b"last".to_vec()]
        );
    }

    #[test]
    fn test_tail_stamp_follows_append_closely() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let ep = Endpoint {
            source: "hub".into(),
            kind: EndpointKind::Tail(file.path().to_path_buf()),
        };
        let mut source = ep.open().unwrap();
        std::thread::sleep(Duration::from_millis(30));

        let written = Utc::now();
        writeln!(file, "{{}}").unwrap();
        file.flush().unwrap();
        let msg = source.poll(Duration::from_secs(2)).unwrap().unwrap();
        let lag = (msg.enqueued_at.unwrap() - written).num_milliseconds();
        assert!((0..150).contains(&lag), "read stamp lagged the append by {}ms", lag);
    }

    #[test]
    fn test_file_tail_skips_backlog_and_holds_partial_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "old record").unwrap();
        file.flush().unwrap();

        let mut tail = FileTail::open(file.path()).unwrap();
        assert!(tail.read_complete_lines().unwrap().is_none());

        write!(file, "first\nsecond\nthi").unwrap();
        file.flush().unwrap();
        assert_eq!(tail.read_complete_lines().unwrap().unwrap(), b"first\nsecond\n");
        assert!(tail.read_complete_lines().unwrap().is_none());

        writeln!(file, "rd").unwrap();
        file.flush().unwrap();
        assert_eq!(tail.read_complete_lines().unwrap().unwrap(), b"third\n");
    }
}
