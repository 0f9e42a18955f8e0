//! Buffered byte sink over the write half of a connection.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};

const WRITE_BUF_CAPACITY: usize = 8 * 1024;

/// Staging buffer in front of the transport's write half.
///
/// Encoders append into the buffer; `flush` pushes the buffered bytes to the
/// transport in one write.
#[derive(Debug)]
pub(crate) struct WriteSink<W> {
    writer: W,
    buf: BytesMut,
}

impl<W: AsyncWrite + Unpin> WriteSink<W> {
    pub(crate) fn new(writer: W) -> Self {
        Self { writer, buf: BytesMut::with_capacity(WRITE_BUF_CAPACITY) }
    }

    /// The staging buffer. Encoders write wire bytes directly into it.
    pub(crate) fn buffer(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    pub(crate) async fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.writer.write_all_buf(&mut self.buf).await?;
        }
        self.writer.flush().await
    }
}
