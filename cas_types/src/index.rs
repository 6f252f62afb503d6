use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::CasTypesError;
use crate::key::{Key, KEY_SIZE};

/// Writes keys in order as the binary index format: raw 32-byte keys, back to back.
pub struct IndexWriter<W> {
    writer: W,
    num_keys: usize,
}

impl<W: AsyncWrite + Unpin> IndexWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, num_keys: 0 }
    }

    pub async fn write_key(&mut self, key: &Key) -> std::io::Result<()> {
        self.writer.write_all(key.as_bytes()).await?;
        self.num_keys += 1;
        Ok(())
    }

    pub fn num_keys(&self) -> usize {
        self.num_keys
    }

    /// Gives back the underlying writer without closing it.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Flushes and closes the underlying writer, returning the number of keys written.
    pub async fn finish(mut self) -> std::io::Result<usize> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(self.num_keys)
    }
}

/// Parses a serialized index back into its ordered keys.
pub fn parse_index(data: &[u8]) -> Result<Vec<Key>, CasTypesError> {
    if data.len() % KEY_SIZE != 0 {
        return Err(CasTypesError::MalformedIndex(data.len()));
    }

    data.chunks_exact(KEY_SIZE).map(Key::try_from).collect()
}

/// Serializes keys into the index format.
pub fn serialize_index(keys: &[Key]) -> Vec<u8> {
    let mut out = Vec::with_capacity(keys.len() * KEY_SIZE);
    for k in keys {
        out.extend_from_slice(k.as_bytes());
    }
    out
}
