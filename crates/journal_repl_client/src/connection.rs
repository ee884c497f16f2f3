//! Pooled transport connections.
//!
//! A connection is a TCP stream plus its buffers. It carries no protocol
//! state, so it can serve any number of transactions one after another.

use std::io::{self, BufReader, BufWriter, Read};
use std::net::TcpStream;
use std::time::{Duration, Instant};
use url::Url;

/// Read half of a connection with an absolute deadline.
///
/// The remaining time is applied as the socket read timeout before every
/// read, so a response trickling in byte by byte still ends at the deadline.
#[derive(Debug)]
pub(crate) struct DeadlineReader {
    stream: TcpStream,
    deadline: Option<Instant>,
}

impl DeadlineReader {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            deadline: None,
        }
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.deadline = deadline;
        if deadline.is_none() {
            self.stream.set_read_timeout(None)?;
        }
        Ok(())
    }
}

fn deadline_exceeded() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "read deadline exceeded")
}

impl Read for DeadlineReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(deadline) = self.deadline else {
            return self.stream.read(buf);
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(deadline_exceeded());
        }
        self.stream.set_read_timeout(Some(remaining))?;
        match self.stream.read(buf) {
            // Unix reports an expired socket timeout as WouldBlock.
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Err(deadline_exceeded())
            }
            other => other,
        }
    }
}

/// A transport connection with buffered reader and writer.
#[derive(Debug)]
pub struct PooledConnection {
    pub(crate) reader: BufReader<DeadlineReader>,
    pub(crate) writer: BufWriter<TcpStream>,
}

impl PooledConnection {
    /// Wraps an established stream.
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        let read_half = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(DeadlineReader::new(read_half)),
            writer: BufWriter::new(stream),
        })
    }

    /// Connects to the host and port of `url`, trying each resolved address.
    pub(crate) fn dial(url: &Url, timeout: Option<Duration>) -> io::Result<Self> {
        let addrs = url.socket_addrs(|| None)?;
        let mut last_err = None;
        for addr in addrs {
            let connected = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match connected {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Self::from_stream(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no addresses for {url}"),
            )
        }))
    }

    /// Fails reads that have not completed `timeout` from now.
    pub fn set_read_deadline(&mut self, timeout: Duration) -> io::Result<()> {
        self.reader
            .get_mut()
            .set_deadline(Some(Instant::now() + timeout))
    }

    /// Removes the read deadline.
    pub fn clear_read_deadline(&mut self) -> io::Result<()> {
        self.reader.get_mut().set_deadline(None)
    }

    /// Returns true while a read deadline is armed.
    pub fn has_read_deadline(&self) -> bool {
        self.reader.get_ref().deadline.is_some()
    }
}
