//! # Delimiter aware line reader
//!
//! The flight controller CLI is a plain text console without framing: a reply
//! is "done" when the prompt shows up, or when the line ends, depending on the
//! command. This reader accumulates bytes from the transport until one of the
//! configured delimiters terminates the buffer, or until a deadline passes.
//!
//! A timeout is not an error. The caller gets whatever was received so far
//! (possibly nothing) and decides what it means.
//!
//! Bytes received after a delimiter stay buffered for the next read. They are
//! only dropped by an explicit [`clear`](LineReader::clear).

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{self, Instant};

use crate::logging::prelude::*;

/// Timeout used by [`LineReader::read_line`] when none is given
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

// Inter-byte delay for half-duplex links, lets the echo of each byte clear the wire
const HALF_DUPLEX_BYTE_DELAY: Duration = Duration::from_millis(20);
const READ_CHUNK_SIZE: usize = 64;

/// Line oriented reader/writer over a byte transport
pub struct LineReader<T> {
    transport: T,
    buffer: Vec<u8>,
    delimiters: Vec<String>,
    default_timeout: Duration,
}

impl<T> LineReader<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new LineReader
    ///
    /// # Arguments
    /// * `transport` - The byte stream to the device, usually an open serial port
    /// * `default_timeout` - Timeout used by [`read_line`](Self::read_line)
    /// * `delimiters` - Initial set of line terminators
    pub fn new(transport: T, default_timeout: Duration, delimiters: &[&str]) -> Self {
        let mut reader = LineReader {
            transport,
            buffer: Vec::new(),
            delimiters: Vec::new(),
            default_timeout,
        };
        reader.set_delimiters(delimiters);
        reader
    }

    /// Replace the set of line terminators used by subsequent reads
    ///
    /// Empty delimiters are ignored since they would match everywhere.
    pub fn set_delimiters(&mut self, delimiters: &[&str]) {
        self.delimiters = delimiters
            .iter()
            .filter(|d| !d.is_empty())
            .map(|d| d.to_string())
            .collect();
    }

    /// Currently active line terminators
    pub fn delimiters(&self) -> &[String] {
        &self.delimiters
    }

    /// Discard buffered bytes, including anything the transport already has pending
    ///
    /// Only data that is readable right now is drained; this never waits.
    /// Draining is best effort: bytes the OS holds but has not yet signalled as
    /// readable survive, since a generic transport has no input-buffer flush.
    ///
    /// # Errors
    ///
    /// Propagates transport read errors
    pub async fn clear(&mut self) -> io::Result<()> {
        let mut discarded = self.buffer.len();
        self.buffer.clear();

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match time::timeout(Duration::ZERO, self.transport.read(&mut chunk)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => break,
                Ok(Err(e)) => return Err(e),
            }
        }

        if discarded > 0 {
            trace!("Discarded {} stale bytes", discarded);
        }
        Ok(())
    }

    /// Read one line using the default timeout
    ///
    /// See [`read_line_timeout`](Self::read_line_timeout).
    pub async fn read_line(&mut self) -> io::Result<String> {
        self.read_line_timeout(self.default_timeout).await
    }

    /// Read until a delimiter terminates the buffer or the timeout elapses
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum time to wait for a delimiter
    ///
    /// # Returns
    ///
    /// The shortest buffered prefix ending with any delimiter, delimiter included.
    /// If no delimiter shows up in time, or the transport reaches end of stream,
    /// everything accumulated so far (possibly an empty string).
    ///
    /// # Errors
    ///
    /// Only transport errors, a timeout is a valid outcome
    pub async fn read_line_timeout(&mut self, timeout: Duration) -> io::Result<String> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            if let Some(end) = find_line_end(&self.buffer, &self.delimiters) {
                let line: Vec<u8> = self.buffer.drain(..end).collect();
                let line = String::from_utf8_lossy(&line).into_owned();
                trace!("Read line {:?}", line);
                return Ok(line);
            }

            match time::timeout_at(deadline, self.transport.read(&mut chunk)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => self.buffer.extend_from_slice(&chunk[..n]),
                // Blocking serial backends report their port timeout this way
                Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => continue,
                Ok(Err(e)) => return Err(e),
                Err(_) => break,
            }
        }

        let partial = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned();
        trace!("No delimiter within {:?}, got {:?}", timeout, partial);
        Ok(partial)
    }

    /// Write text to the transport
    ///
    /// # Arguments
    ///
    /// * `text` - Text to send, sent as-is (callers add line endings)
    /// * `half_duplex` - Send one byte at a time with a short pause after each
    ///   byte instead of one burst. The device echo of these bytes will be part
    ///   of the next read.
    ///
    /// # Errors
    ///
    /// Propagates transport write errors
    pub async fn write(&mut self, text: &str, half_duplex: bool) -> io::Result<()> {
        trace!("Write {:?} (half duplex: {})", text, half_duplex);

        if half_duplex {
            for byte in text.as_bytes() {
                self.transport.write_all(std::slice::from_ref(byte)).await?;
                self.transport.flush().await?;
                time::sleep(HALF_DUPLEX_BYTE_DELAY).await;
            }
        } else {
            self.transport.write_all(text.as_bytes()).await?;
            self.transport.flush().await?;
        }
        Ok(())
    }

    /// Flush and shut down the transport, then release it
    pub async fn close(mut self) -> io::Result<()> {
        self.transport.shutdown().await
    }

    /// Give back the underlying transport, dropping any buffered bytes
    pub fn into_inner(self) -> T {
        self.transport
    }
}

// End index of the shortest prefix of `buffer` that ends with one of `delimiters`
fn find_line_end(buffer: &[u8], delimiters: &[String]) -> Option<usize> {
    delimiters
        .iter()
        .filter_map(|delimiter| {
            let delimiter = delimiter.as_bytes();
            buffer
                .windows(delimiter.len())
                .position(|window| window == delimiter)
                .map(|start| start + delimiter.len())
        })
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn reader(delimiters: &[&str]) -> (LineReader<tokio::io::DuplexStream>, tokio::io::DuplexStream) {
        let (host, device) = duplex(256);
        (LineReader::new(host, DEFAULT_READ_TIMEOUT, delimiters), device)
    }

    #[test]
    fn line_end_is_earliest_delimiter_end() {
        let delimiters = vec!["CCC".to_string(), "# ".to_string()];
        assert_eq!(find_line_end(b"abc# CCC", &delimiters), Some(5));
        assert_eq!(find_line_end(b"xxCCCyy# ", &delimiters), Some(5));
        assert_eq!(find_line_end(b"no prompt#", &delimiters), None);
        assert_eq!(find_line_end(b"", &delimiters), None);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_shortest_prefix_and_keeps_the_rest() {
        let (mut reader, mut device) = reader(&["# "]);
        device.write_all(b"first# second# tail").await.unwrap();

        assert_eq!(reader.read_line().await.unwrap(), "first# ");
        assert_eq!(reader.read_line().await.unwrap(), "second# ");
        assert_eq!(reader.read_line_timeout(Duration::from_secs(1)).await.unwrap(), "tail");
    }

    #[tokio::test(start_paused = true)]
    async fn any_delimiter_terminates_the_line() {
        let (mut reader, mut device) = reader(&["CCC", "# "]);
        device.write_all(b"\r\nCCC").await.unwrap();

        assert_eq!(reader.read_line().await.unwrap(), "\r\nCCC");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_returns_partial_data_without_error() {
        let (mut reader, mut device) = reader(&["# "]);
        device.write_all(b"partial").await.unwrap();

        let start = Instant::now();
        let line = reader.read_line_timeout(Duration::from_secs(1)).await.unwrap();

        assert_eq!(line, "partial");
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_with_nothing_received_is_empty() {
        let (mut reader, _device) = reader(&["# "]);
        assert_eq!(reader.read_line_timeout(Duration::from_secs(2)).await.unwrap(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn default_timeout_is_used_by_read_line() {
        let (mut reader, _device) = reader(&["\n"]);

        let start = Instant::now();
        assert_eq!(reader.read_line().await.unwrap(), "");
        assert!(start.elapsed() >= DEFAULT_READ_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn delimiter_split_across_reads() {
        let (mut reader, mut device) = reader(&["# "]);
        tokio::spawn(async move {
            device.write_all(b"prompt#").await.unwrap();
            time::sleep(Duration::from_millis(300)).await;
            device.write_all(b" after").await.unwrap();
            time::sleep(Duration::from_secs(10)).await;
        });

        assert_eq!(reader.read_line().await.unwrap(), "prompt# ");
    }

    #[tokio::test(start_paused = true)]
    async fn clear_discards_stale_bytes() {
        let (mut reader, mut device) = reader(&["\n"]);
        device.write_all(b"stale line\nstale partial").await.unwrap();
        reader.clear().await.unwrap();

        device.write_all(b"fresh\n").await.unwrap();
        assert_eq!(reader.read_line().await.unwrap(), "fresh\n");
    }

    #[tokio::test(start_paused = true)]
    async fn set_delimiters_replaces_previous_set() {
        let (mut reader, mut device) = reader(&["# "]);
        reader.set_delimiters(&["\n"]);
        assert_eq!(reader.delimiters(), ["\n".to_string()]);

        device.write_all(b"serial 0 64\r\n# ").await.unwrap();
        assert_eq!(reader.read_line().await.unwrap(), "serial 0 64\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_stream_returns_what_was_received() {
        let (mut reader, mut device) = reader(&["# "]);
        device.write_all(b"bye").await.unwrap();
        drop(device);

        assert_eq!(reader.read_line().await.unwrap(), "bye");
    }

    #[tokio::test(start_paused = true)]
    async fn half_duplex_write_paces_bytes() {
        let (mut reader, mut device) = reader(&["\n"]);

        let start = Instant::now();
        reader.write("#\r\n", true).await.unwrap();
        assert!(start.elapsed() >= HALF_DUPLEX_BYTE_DELAY * 3);

        let mut received = [0u8; 3];
        device.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"#\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn full_duplex_write_is_one_burst() {
        let (mut reader, mut device) = reader(&["\n"]);

        let start = Instant::now();
        reader.write("serial\r\n", false).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        let mut received = [0u8; 8];
        device.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"serial\r\n");
    }
}
