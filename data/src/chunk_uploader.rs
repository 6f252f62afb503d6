use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use cas_client::ObjectClient;
use cas_types::{DatasetSummary, IndexWriter, Key};
use chunking::{Chunk, ChunkStream};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use utils::ChannelWriter;

use crate::errors::{DataTransferError, Result};
use crate::ordered::ordered_dispatcher;

/// Where chunks go and who hears about them.
#[derive(Clone)]
pub struct ChunkUploadTarget {
    pub client: Arc<dyn ObjectClient>,
    pub dataset: Arc<DatasetSummary>,
    pub progress: Option<mpsc::Sender<u64>>,
    pub concurrency: usize,
}

/// Keys already claimed by a worker of this run, so identical chunks are stored once.
type SeenKeys = Arc<Mutex<HashSet<Key>>>;

/// Stores every chunk of `chunks` that is not in object storage yet and writes the chunk keys,
/// in stream order, to `index`.
///
/// Up to `target.concurrency` chunks are hashed, checked and uploaded at the same time. Returns
/// the number of keys written. On any failure the index stream is aborted, so its reader never
/// mistakes a partial index for a complete one.
pub async fn upload_chunks<R>(
    mut chunks: ChunkStream<R>,
    index: IndexWriter<ChannelWriter>,
    target: ChunkUploadTarget,
    token: CancellationToken,
) -> Result<usize>
where
    R: AsyncRead + Unpin + Send,
{
    info!("Uploading chunks to {}/{}", target.dataset.bucket, target.dataset.project_root);

    let (mut dispatcher, mut results) = ordered_dispatcher::<Key>(target.concurrency, token.clone());
    let seen: SeenKeys = Arc::default();

    let producer = async move {
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                c = chunks.next_chunk() => c,
            };

            match next {
                Ok(Some(chunk)) => {
                    let task = upload_chunk(chunk, target.clone(), seen.clone());
                    if dispatcher.dispatch(task).await.is_err() {
                        return;
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    // Goes through the ordered results so the consumer fails on it rather than
                    // seeing a clean end of the chunk stream.
                    let _ = dispatcher.push_error(DataTransferError::pipe("failed to read chunk", e)).await;
                    break;
                },
            }
        }
        dispatcher.finish().await;
    };

    let consumer = async move {
        let mut index = index;
        let result = async {
            while let Some(key) = results.next().await? {
                index
                    .write_key(&key)
                    .await
                    .map_err(|e| DataTransferError::pipe("failed to write key", e))?;
            }
            Ok::<(), DataTransferError>(())
        }
        .await;

        match result {
            Ok(()) => index
                .finish()
                .await
                .map_err(|e| DataTransferError::pipe("failed to close index stream", e)),
            Err(e) => {
                index.into_inner().abort(e.to_io_error()).await;
                Err(e)
            },
        }
    };

    let ((), result) = tokio::join!(producer, consumer);

    if let Ok(n) = &result {
        info!("Chunk upload complete, {n} chunks");
    }
    result
}

/// Hashes one chunk and stores it unless it is already present.
async fn upload_chunk(chunk: Chunk, target: ChunkUploadTarget, seen: SeenKeys) -> Result<Key> {
    let key = Key::from_data(&chunk.data);
    let len = chunk.len();

    let first_in_run = seen.lock().map_err(DataTransferError::internal)?.insert(key);

    if first_in_run {
        let bucket = target.dataset.bucket.as_str();
        let object_key = target.dataset.chunk_object_key(&key);

        let exists = target
            .client
            .exists(bucket, &object_key)
            .await
            .map_err(|e| DataTransferError::transport(format!("failed to check chunk {}", key.prefix()), e))?;

        if exists {
            debug!("Chunk {} already stored", key.prefix());
        } else {
            target
                .client
                .upload(bucket, &object_key, chunk.data)
                .await
                .map_err(|e| DataTransferError::transport(format!("failed to upload chunk {}", key.prefix()), e))?;
            debug!("Uploaded chunk {} ({len} bytes)", key.prefix());
        }
    } else {
        debug!("Chunk {} repeats within this upload", key.prefix());
    }

    if let Some(progress) = &target.progress {
        // A closed progress channel only means nobody is watching anymore.
        let _ = progress.send(len as u64).await;
    }

    Ok(key)
}
