//! One end of the line-framed duplex channel to the request server.
//!
//! Reads are made non-blocking by a small pump thread: it blocks on the
//! underlying reader, splits on `\n` and forwards each raw line over a
//! channel that [`BridgeEndpoint::try_recv`] polls.  The pump is the only
//! reader of the stream and the endpoint the only writer, so neither side
//! needs a lock on the stream itself.
//!
//! Lines are capped at [`MAX_LINE`] bytes.  Anything longer is skipped up to
//! its newline and reported as invalid, so a peer that never sends a newline
//! cannot grow this process's memory.

use std::io::{BufRead, BufReader, Read, Write};
use std::sync::mpsc::{self, TryRecvError};

use super::message::{BridgeError, BridgeMessage};

/// Longest line accepted from the peer, newline excluded.
pub const MAX_LINE: usize = 64 * 1024;

enum Incoming {
    Line(Vec<u8>),
    /// A line over [`MAX_LINE`]; carries how many bytes were discarded.
    Oversize(usize),
    Failed(std::io::Error),
}

pub struct BridgeEndpoint {
    incoming: mpsc::Receiver<Incoming>,
    writer: Box<dyn Write + Send>,
    closed: bool,
}

impl std::fmt::Debug for BridgeEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeEndpoint")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl BridgeEndpoint {
    /// Wrap a reader/writer pair, e.g. a child process's stdout and stdin.
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let pump = std::thread::Builder::new()
            .name("bridge-reader".into())
            .spawn(move || pump_lines(reader, tx));
        if let Err(e) = pump {
            // Without a pump the receiver sees a closed channel straight away.
            log::error!("bridge: failed to spawn reader thread: {e}");
        }

        Self {
            incoming: rx,
            writer: Box::new(writer),
            closed: false,
        }
    }

    /// Take the next message if one has fully arrived.
    ///
    /// `Ok(None)` when nothing is waiting.  A malformed line yields its
    /// decode error and is gone; the next call moves on to the following
    /// line.  Once the other side has closed, every call returns
    /// [`BridgeError::Closed`].
    pub fn try_recv(&mut self) -> Result<Option<BridgeMessage>, BridgeError> {
        if self.closed {
            return Err(BridgeError::Closed);
        }
        match self.incoming.try_recv() {
            Ok(Incoming::Line(line)) => BridgeMessage::decode(&line).map(Some),
            Ok(Incoming::Oversize(len)) => Err(BridgeError::Invalid(format!(
                "line of {len} bytes exceeds the {MAX_LINE}-byte limit"
            ))),
            Ok(Incoming::Failed(e)) => {
                self.closed = true;
                Err(BridgeError::Io(e))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                Err(BridgeError::Closed)
            }
        }
    }

    /// Write one message to the other side.
    pub fn send(&mut self, message: &BridgeMessage) -> Result<(), BridgeError> {
        let line = message.encode()?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Forward raw lines until end-of-stream or a read error.  Blank lines are
/// skipped.  Dropping `tx` on return is what signals closure.
fn pump_lines<R: Read>(reader: R, tx: mpsc::Sender<Incoming>) {
    let mut reader = BufReader::new(reader);
    loop {
        let mut line = Vec::new();
        let read = (&mut reader)
            .take(MAX_LINE as u64 + 1)
            .read_until(b'\n', &mut line);

        let incoming = match read {
            Ok(0) => break,
            Ok(_) if line.len() > MAX_LINE && !line.ends_with(b"\n") => {
                match skip_line(&mut reader) {
                    Ok(rest) => Incoming::Oversize(line.len() + rest),
                    Err(e) => Incoming::Failed(e),
                }
            }
            Ok(_) if line.iter().all(u8::is_ascii_whitespace) => continue,
            Ok(_) => Incoming::Line(line),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => Incoming::Failed(e),
        };

        let failed = matches!(incoming, Incoming::Failed(_));
        if tx.send(incoming).is_err() || failed {
            break;
        }
    }
    log::debug!("bridge: reader reached end of stream");
}

/// Discard input up to and including the next newline.  Returns the number
/// of bytes dropped.
fn skip_line<B: BufRead>(reader: &mut B) -> std::io::Result<usize> {
    let mut skipped = 0;
    loop {
        let available = match reader.fill_buf() {
            Ok(available) => available,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            return Ok(skipped);
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(skipped + i + 1);
            }
            None => {
                let n = available.len();
                reader.consume(n);
                skipped += n;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::message::Command;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    /// Writer whose bytes stay inspectable after it is boxed.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Poll until something other than `Ok(None)` arrives.
    fn next(ep: &mut BridgeEndpoint) -> Result<Option<BridgeMessage>, BridgeError> {
        let start = Instant::now();
        loop {
            match ep.try_recv() {
                Ok(None) if start.elapsed() < Duration::from_secs(5) => {
                    std::thread::sleep(Duration::from_millis(2))
                }
                other => return other,
            }
        }
    }

    #[test]
    fn delivers_lines_in_order_then_closes() {
        let input = concat!(
            "{\"kind\":\"command\",\"module\":\"calendar\",\"reload\":true}\n",
            "\n",
            "{\"kind\":\"server_exited\"}\n",
        );
        let mut ep = BridgeEndpoint::from_streams(Cursor::new(input), std::io::sink());

        assert_eq!(
            next(&mut ep).unwrap(),
            Some(BridgeMessage::Command(Command::reload("calendar")))
        );
        assert_eq!(next(&mut ep).unwrap(), Some(BridgeMessage::ServerExited));
        assert!(matches!(next(&mut ep), Err(BridgeError::Closed)));
        assert!(ep.is_closed());
        assert!(matches!(ep.try_recv(), Err(BridgeError::Closed)));
    }

    #[test]
    fn malformed_line_does_not_hide_the_next_one() {
        let input = "garbage\n{\"kind\":\"server_exited\"}\n";
        let mut ep = BridgeEndpoint::from_streams(Cursor::new(input), std::io::sink());

        assert!(matches!(next(&mut ep), Err(BridgeError::Decode(_))));
        assert_eq!(next(&mut ep).unwrap(), Some(BridgeMessage::ServerExited));
    }

    #[test]
    fn last_line_without_newline_is_delivered() {
        let mut ep = BridgeEndpoint::from_streams(
            Cursor::new("{\"kind\":\"server_exited\"}"),
            std::io::sink(),
        );
        assert_eq!(next(&mut ep).unwrap(), Some(BridgeMessage::ServerExited));
    }

    #[test]
    fn overlong_line_is_dropped_and_reading_resumes() {
        let mut input = "a".repeat(MAX_LINE * 3);
        input.push('\n');
        input.push_str("{\"kind\":\"server_exited\"}\n");
        let mut ep = BridgeEndpoint::from_streams(Cursor::new(input), std::io::sink());

        match next(&mut ep) {
            Err(BridgeError::Invalid(why)) => assert!(why.contains("limit"), "{why}"),
            other => panic!("expected an oversize error, got {other:?}"),
        }
        assert_eq!(next(&mut ep).unwrap(), Some(BridgeMessage::ServerExited));
        assert!(matches!(next(&mut ep), Err(BridgeError::Closed)));
    }

    #[test]
    fn line_at_the_limit_is_accepted() {
        let message = "{\"kind\":\"server_exited\"}";
        let mut input = format!("{message}{}", " ".repeat(MAX_LINE - message.len()));
        assert_eq!(input.len(), MAX_LINE);
        input.push('\n');
        let mut ep = BridgeEndpoint::from_streams(Cursor::new(input), std::io::sink());

        assert_eq!(next(&mut ep).unwrap(), Some(BridgeMessage::ServerExited));
    }

    #[test]
    fn send_writes_one_line() {
        let out = SharedBuf::default();
        let mut ep = BridgeEndpoint::from_streams(std::io::empty(), out.clone());
        ep.send(&BridgeMessage::Command(Command::reload("media"))).unwrap();

        let written = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written, "{\"kind\":\"command\",\"module\":\"media\",\"reload\":true}\n");
    }
}
