//! Chunked transfer framing.

use crate::error::{ProtocolError, ProtocolResult};
use crate::headers::{is_blank, parse_trailers, read_head, read_line, HeadLimits};
use http::HeaderMap;
use std::io::{self, BufRead, Read, Write};

/// Frames every write as one chunk on the wrapped writer.
///
/// No buffering happens here; chunks go straight to `W`. The trailer
/// section after [`ChunkedWriter::finish`] is left to the caller.
#[derive(Debug)]
pub struct ChunkedWriter<W: Write> {
    inner: W,
    finished: bool,
}

impl<W: Write> ChunkedWriter<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            finished: false,
        }
    }

    /// Writes `data` as a single chunk and returns its length.
    ///
    /// Empty input writes nothing, since a zero-length chunk would end the body.
    pub fn write_chunk(&mut self, data: &[u8]) -> ProtocolResult<usize> {
        if self.finished {
            return Err(ProtocolError::ChunkedWriterFinished);
        }
        if data.is_empty() {
            return Ok(0);
        }
        write!(self.inner, "{:x}\r\n", data.len())?;
        self.inner.write_all(data)?;
        self.inner.write_all(b"\r\n")?;
        Ok(data.len())
    }

    /// Emits the terminal `0\r\n` chunk. Idempotent.
    pub fn finish(&mut self) -> ProtocolResult<()> {
        if !self.finished {
            self.inner.write_all(b"0\r\n")?;
            self.finished = true;
        }
        Ok(())
    }

    /// Returns true once the terminal chunk has been written.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Mutable access to the wrapped writer, e.g. to append trailers.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Unwraps the writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ChunkedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_chunk(buf).map_err(|e| match e {
            ProtocolError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::Other, other),
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decodes a chunked body, returning the payload and any trailer fields.
pub fn read_chunked_body<R: BufRead + ?Sized>(
    reader: &mut R,
    limits: &HeadLimits,
) -> ProtocolResult<(Vec<u8>, HeaderMap)> {
    let mut body = Vec::new();
    loop {
        let line = read_line(reader, limits.max_head_len, "chunk size")?;
        let size = match httparse::parse_chunk_size(&line) {
            Ok(httparse::Status::Complete((_, size))) => size,
            _ => return Err(invalid_chunk_line(&line)),
        };

        if size == 0 {
            let block = read_head(reader, limits)?;
            return Ok((body, parse_trailers(&block, limits)?));
        }

        let start = body.len();
        (&mut *reader).take(size).read_to_end(&mut body)?;
        if (body.len() - start) as u64 != size {
            return Err(ProtocolError::UnexpectedEof("chunk data"));
        }
        let terminator = read_line(reader, limits.max_head_len, "chunk data")?;
        if !is_blank(&terminator) {
            return Err(invalid_chunk_line(&terminator));
        }
    }
}

fn invalid_chunk_line(line: &[u8]) -> ProtocolError {
    ProtocolError::InvalidChunkSize(String::from_utf8_lossy(line).trim().to_string())
}
