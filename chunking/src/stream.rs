use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::constants::READ_BLOCK_SIZE;
use crate::{Chunk, Chunker};

/// Drives a [`Chunker`] from an async reader, yielding chunks lazily.
///
/// The stream can be consumed once; end of input is `Ok(None)`, any read failure is returned as is.
pub struct ChunkStream<R> {
    reader: R,
    chunker: Chunker,
    buf: Vec<u8>,
    pos: usize,
    filled: usize,
    eof: bool,
}

impl<R: AsyncRead + Unpin> ChunkStream<R> {
    pub fn new(reader: R, chunker: Chunker) -> Self {
        Self {
            reader,
            chunker,
            buf: vec![0u8; READ_BLOCK_SIZE],
            pos: 0,
            filled: 0,
            eof: false,
        }
    }

    pub async fn next_chunk(&mut self) -> io::Result<Option<Chunk>> {
        loop {
            if self.pos == self.filled {
                if self.eof {
                    return Ok(self.chunker.finish());
                }

                let n = self.reader.read(&mut self.buf).await?;
                self.pos = 0;
                self.filled = n;

                // 0 byte read is EOF
                if n == 0 {
                    self.eof = true;
                    return Ok(self.chunker.finish());
                }
            }

            let (maybe_chunk, consumed) = self.chunker.next(&self.buf[self.pos..self.filled], false);
            self.pos += consumed;

            if maybe_chunk.is_some() {
                return Ok(maybe_chunk);
            }
        }
    }
}
