use std::sync::Arc;

use bytes::Bytes;
use cas_client::ObjectClient;
use cas_types::{parse_index, DatasetSummary, Key, Metadata};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};
use utils::{pipe, ChannelWriter};

use crate::archive::extract_archive;
use crate::configurations::DownloadConfig;
use crate::errors::{DataTransferError, Result};
use crate::ordered::ordered_dispatcher;
use crate::run_state::RunState;

/// Size in bytes of the archived dataset, as stored in its metadata object.
pub async fn get_remote_dataset_size(client: &dyn ObjectClient, dataset: &DatasetSummary) -> Result<u64> {
    let data = client
        .download(&dataset.bucket, &dataset.metadata_object_key())
        .await
        .map_err(|e| DataTransferError::transport("failed to download metadata", e))?;
    let metadata = Metadata::from_json(&data)?;
    u64::try_from(metadata.size).map_err(DataTransferError::internal)
}

async fn fetch_index(client: &dyn ObjectClient, dataset: &DatasetSummary) -> Result<Vec<Key>> {
    let data = client
        .download(&dataset.bucket, &dataset.index_object_key())
        .await
        .map_err(|e| DataTransferError::transport("failed to download index", e))?;
    Ok(parse_index(&data)?)
}

async fn fetch_chunk(client: Arc<dyn ObjectClient>, dataset: Arc<DatasetSummary>, key: Key) -> Result<Bytes> {
    let data = client
        .download(&dataset.bucket, &dataset.chunk_object_key(&key))
        .await
        .map_err(|e| DataTransferError::transport(format!("failed to download chunk {}", key.prefix()), e))?;

    if Key::from_data(&data) != key {
        return Err(DataTransferError::InternalError(format!("chunk {} is corrupt", key.prefix())));
    }
    debug!("Downloaded chunk {} ({} bytes)", key.prefix(), data.len());
    Ok(data)
}

/// Fetches the chunks named by `keys`, up to `concurrency` at a time, and writes them to `writer`
/// in index order. Returns the number of bytes written.
async fn write_chunks(
    keys: Vec<Key>,
    mut writer: ChannelWriter,
    client: Arc<dyn ObjectClient>,
    dataset: Arc<DatasetSummary>,
    concurrency: usize,
    progress: Option<mpsc::Sender<u64>>,
    token: CancellationToken,
) -> Result<u64> {
    let (mut dispatcher, mut results) = ordered_dispatcher::<Bytes>(concurrency, token.clone());

    let producer = async move {
        for key in keys {
            let task = fetch_chunk(client.clone(), dataset.clone(), key);
            if dispatcher.dispatch(task).await.is_err() {
                return;
            }
        }
        dispatcher.finish().await;
    };

    let consumer = async move {
        let mut n = 0u64;
        let result = async {
            while let Some(data) = results.next().await? {
                let len = data.len() as u64;
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(DataTransferError::Cancelled),
                    r = writer.write_all(&data) => r.map_err(|e| DataTransferError::pipe("failed to write archive stream", e))?,
                }
                n += len;

                if let Some(progress) = &progress {
                    let _ = progress.send(len).await;
                }
            }
            Ok::<(), DataTransferError>(())
        }
        .await;

        match result {
            Ok(()) => {
                writer
                    .shutdown()
                    .await
                    .map_err(|e| DataTransferError::pipe("failed to close archive stream", e))?;
                Ok(n)
            },
            Err(e) => {
                if !token.is_cancelled() {
                    writer.abort(e.to_io_error()).await;
                }
                Err(e)
            },
        }
    };

    let ((), result) = tokio::join!(producer, consumer);
    result
}

/// Downloads a dataset into `config.output_dir`.
///
/// The index is fetched first; the chunks it names are then fetched concurrently and fed, in
/// order, to a tar extractor writing the output directory. Returns the number of bytes received.
pub async fn download(config: DownloadConfig) -> Result<u64> {
    let DownloadConfig {
        object_client,
        dataset,
        output_dir,
        concurrency,
        pipe_buffer_size,
        progress,
        cancellation_token,
    } = config;

    let span = info_span!("download", project = %dataset.project_id, dataset = %dataset.dataset_id);

    async move {
        let token = cancellation_token.map(|t| t.child_token()).unwrap_or_default();
        let run_state = RunState::new(token.clone());
        let dataset = Arc::new(dataset);

        let keys = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(DataTransferError::Cancelled),
            r = fetch_index(object_client.as_ref(), &dataset) => r?,
        };
        info!("Downloading {} chunks into {output_dir:?}", keys.len());

        let (tx, rx) = pipe(pipe_buffer_size);

        let writer = tokio::spawn(write_chunks(
            keys,
            tx,
            object_client.clone(),
            dataset.clone(),
            concurrency,
            progress,
            token.clone(),
        ));
        let extracted = extract_archive(rx.reader(), &output_dir, token.clone()).await;

        // A failed fetch surfaces in the extractor too; the fetch error is the one to report.
        let total = run_state.record(writer.await.map_err(DataTransferError::from).and_then(|r| r));
        run_state.record(extracted);
        run_state.check()?;

        let total = total.unwrap_or_default();
        info!("Download complete, {total} bytes");
        Ok(total)
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use batch_client::MockBatchClient;
    use cas_client::MemoryClient;
    use chunking::ChunkerParams;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use tempfile::TempDir;

    use super::*;
    use crate::configurations::UploadConfig;
    use crate::upload_process::upload;

    fn dataset() -> DatasetSummary {
        DatasetSummary {
            project_id: "p-2".to_owned(),
            dataset_id: "d-2".to_owned(),
            bucket: "nerd".to_owned(),
            project_root: "projects/p-2".to_owned(),
            dataset_root: "projects/p-2/datasets/d-2".to_owned(),
        }
    }

    fn populate(dir: &Path) {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        fs::create_dir_all(dir.join("nested/more")).unwrap();
        for (name, len) in [("a.bin", 900_000usize), ("nested/b.bin", 250_000), ("nested/more/c.txt", 12)] {
            let mut data = vec![0u8; len];
            rng.fill(&mut data[..]);
            fs::write(dir.join(name), data).unwrap();
        }
    }

    async fn uploaded(objects: &Arc<MemoryClient>) -> (TempDir, u64) {
        let src = TempDir::new().unwrap();
        populate(src.path());

        let params = ChunkerParams {
            minimum_chunk: 16 * 1024,
            target_chunk: 64 * 1024,
            maximum_chunk: 256 * 1024,
            ..Default::default()
        };
        let summary = upload(
            UploadConfig::new(MockBatchClient::new(), objects.clone(), src.path(), dataset())
                .with_chunker_params(params)
                .with_heartbeat_interval(Duration::from_secs(3600)),
        )
        .await
        .unwrap();
        (src, summary.size)
    }

    #[tokio::test]
    async fn test_download_restores_directory() {
        let objects = MemoryClient::new();
        let (src, size) = uploaded(&objects).await;

        assert_eq!(get_remote_dataset_size(objects.as_ref(), &dataset()).await.unwrap(), size);

        objects.set_api_delay_range(Some(Duration::from_millis(1)..Duration::from_millis(15)));
        let dst = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let progress = tokio::spawn(async move {
            let mut total = 0;
            while let Some(n) = rx.recv().await {
                total += n;
            }
            total
        });

        let received = download(
            DownloadConfig::new(objects.clone(), dataset(), dst.path().join("out"))
                .with_concurrency(8)
                .with_progress(tx),
        )
        .await
        .unwrap();

        assert_eq!(received, size);
        assert_eq!(progress.await.unwrap(), size);
        for name in ["a.bin", "nested/b.bin", "nested/more/c.txt"] {
            assert_eq!(fs::read(src.path().join(name)).unwrap(), fs::read(dst.path().join("out").join(name)).unwrap());
        }
    }

    #[tokio::test]
    async fn test_missing_chunk() {
        let objects = MemoryClient::new();
        uploaded(&objects).await;

        // Drop one chunk by replacing the store contents with everything but it.
        let keys = objects.object_keys("nerd").await;
        let victim = keys.iter().find(|k| !k.contains("datasets")).unwrap().clone();
        let damaged = MemoryClient::new();
        for k in keys.iter().filter(|k| **k != victim) {
            damaged.upload("nerd", k, objects.get("nerd", k).await.unwrap()).await.unwrap();
        }

        let dst = TempDir::new().unwrap();
        let err = download(DownloadConfig::new(damaged, dataset(), dst.path())).await.unwrap_err();
        assert!(err.to_string().starts_with("failed to download chunk "), "{err}");
    }

    #[tokio::test]
    async fn test_missing_dataset() {
        let dst = TempDir::new().unwrap();
        let err = download(DownloadConfig::new(MemoryClient::new(), dataset(), dst.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, DataTransferError::Transport { .. }));
        assert!(get_remote_dataset_size(MemoryClient::new().as_ref(), &dataset()).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_download() {
        let objects = MemoryClient::new();
        uploaded(&objects).await;
        objects.set_api_delay_range(Some(Duration::from_millis(500)..Duration::from_millis(500)));

        let token = CancellationToken::new();
        let dst = TempDir::new().unwrap();
        let task = tokio::spawn(download(
            DownloadConfig::new(objects.clone(), dataset(), dst.path()).with_cancellation_token(token.clone()),
        ));

        // Past the index fetch, in the middle of the chunks.
        tokio::time::sleep(Duration::from_millis(700)).await;
        objects.set_api_delay_range(Some(Duration::from_secs(3600)..Duration::from_secs(3600)));
        token.cancel();

        let err = tokio::time::timeout(Duration::from_secs(10), task).await.unwrap().unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }
}
