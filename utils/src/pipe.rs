use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::Stream;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::PollSender;

/// Creates an in-memory unidirectional byte pipe holding at most `buffer_size` pending writes.
///
/// Writes park once the buffer is full and resume as the reader drains it. Dropping or shutting
/// down the [`ChannelWriter`] is end-of-stream for the reader; [`ChannelWriter::abort`] hands an
/// error to the reader instead.
pub fn pipe(buffer_size: usize) -> (ChannelWriter, ChannelStream) {
    let (sender, receiver) = mpsc::channel(buffer_size.max(1));
    (ChannelWriter::new(sender), ChannelStream::new(receiver))
}

/// Adapter that implements Stream (and AsyncRead through [`ChannelStream::reader`]) from an mpsc Receiver
pub struct ChannelStream(mpsc::Receiver<io::Result<Bytes>>);

impl ChannelStream {
    fn new(rx: mpsc::Receiver<io::Result<Bytes>>) -> Self {
        Self(rx)
    }

    pub fn reader(self) -> ChannelReader {
        ChannelReader::new(self)
    }
}

impl Stream for ChannelStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.poll_recv(cx)
    }
}

pub type ChannelReader = StreamReader<ChannelStream, Bytes>;

/// Adapter that implements AsyncWrite from a mpsc Sender
pub struct ChannelWriter(PollSender<io::Result<Bytes>>);

impl ChannelWriter {
    fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self(PollSender::new(tx))
    }

    /// Closes the pipe with an error; the reader sees `err` instead of a clean end-of-stream.
    pub async fn abort(self, err: io::Error) {
        if let Some(sender) = self.0.get_ref() {
            // The reader may be gone already, in which case there is nobody to tell.
            let _ = sender.send(Err(err)).await;
        }
    }
}

impl AsyncWrite for ChannelWriter {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        if ready!(self.0.poll_reserve(cx)).is_err() {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "receiver closed")));
        }

        let data = Bytes::copy_from_slice(buf);
        let len = data.len();
        if self.0.send_item(Ok(data)).is_err() {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "receiver closed")));
        }

        Poll::Ready(Ok(len))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Every write is handed to the channel immediately.
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.0.close();
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn test_channel_read_write() {
        let (mut writer, stream) = pipe(10);
        let mut reader = stream.reader();

        writer.write_all(b"Hello, ").await.unwrap();
        writer.write_all(b"World!").await.unwrap();

        // Drop writer to signal EOF
        drop(writer);

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();

        assert_eq!(buf, b"Hello, World!");
    }

    #[tokio::test]
    async fn test_writer_waits_for_reader() {
        // A single slot buffer forces the writer to park until the reader catches up.
        let (mut writer, stream) = pipe(1);
        let mut reader = stream.reader();

        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let expected = data.clone();

        let write_task = tokio::spawn(async move {
            for block in data.chunks(997) {
                writer.write_all(block).await.unwrap();
            }
            writer.shutdown().await.unwrap();
        });

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        write_task.await.unwrap();

        assert_eq!(buf, expected);
    }

    #[tokio::test]
    async fn test_abort_reaches_reader() {
        let (mut writer, stream) = pipe(4);
        let mut reader = stream.reader();

        writer.write_all(b"partial").await.unwrap();
        writer.abort(io::Error::other("source vanished")).await;

        let mut buf = Vec::new();
        let err = reader.read_to_end(&mut buf).await.unwrap_err();
        assert_eq!(err.to_string(), "source vanished");
        assert_eq!(buf, b"partial");
    }

    #[tokio::test]
    async fn test_write_after_reader_dropped() {
        let (mut writer, stream) = pipe(4);
        drop(stream);

        let err = writer.write_all(b"nobody listening").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
