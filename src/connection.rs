//! Line-oriented connection over any byte stream

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
    ReadHalf, WriteHalf,
};
use tokio::net::UnixStream;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::protocol::Response;

/// Longest request line accepted, terminator included
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// A client connection split into buffered reader and writer halves
pub struct Connection<S = UnixStream> {
    reader: Mutex<BufReader<ReadHalf<S>>>,
    writer: Mutex<BufWriter<WriteHalf<S>>>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    pub fn new(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(BufReader::new(read_half)),
            writer: Mutex::new(BufWriter::new(write_half)),
        }
    }

    /// Read the next request line
    ///
    /// Returns `None` once the peer has closed the stream. The trailing
    /// `\n` (and a `\r` before it) is removed; a final line without a
    /// terminator is still returned.
    pub async fn read_line(&self) -> Result<Option<String>> {
        let mut guard = self.reader.lock().await;
        let mut buf = Vec::new();

        let n = (&mut *guard)
            .take(MAX_LINE_LENGTH as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            return Ok(None);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        } else if n > MAX_LINE_LENGTH {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("line exceeds {} bytes", MAX_LINE_LENGTH),
            )
            .into());
        }

        let line = String::from_utf8(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Some(line))
    }

    /// Write a response line and flush it
    pub async fn write_response(&self, response: &Response) -> Result<()> {
        let mut guard = self.writer.lock().await;
        guard.write_all(response.to_string().as_bytes()).await?;
        guard.flush().await?;
        Ok(())
    }
}
