use std::sync::Arc;

use cas_client::ObjectClient;
use cas_types::{parse_index, DatasetSummary, IndexWriter, Metadata};
use chunking::{ChunkStream, Chunker};
use countio::Counter;
use error_printer::ErrorPrinter;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};
use utils::{pipe, ChannelWriter};

use crate::archive::archive_directory;
use crate::chunk_uploader::{upload_chunks, ChunkUploadTarget};
use crate::configurations::UploadConfig;
use crate::errors::{DataTransferError, Result};
use crate::heartbeat::run_heartbeat;
use crate::run_state::RunState;

/// What a successful upload produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    /// Size of the archived stream, as recorded in the metadata object.
    pub size: u64,
    pub num_chunks: usize,
    pub metadata: Metadata,
}

/// Forwards everything read from `reader` into `writer` unchanged, counting the bytes on the way.
///
/// Returns the byte count once the input ends; the writer is shut down then. If either side fails
/// the writer is aborted, so the reader downstream sees the failure.
pub async fn count_bytes<R>(reader: R, mut writer: ChannelWriter, token: CancellationToken) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut counter = Counter::new(reader);

    let copied = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(DataTransferError::Cancelled),
        r = tokio::io::copy(&mut counter, &mut writer) => r,
    };

    match copied {
        Ok(_) => {
            writer
                .shutdown()
                .await
                .map_err(|e| DataTransferError::pipe("failed to close chunker stream", e))?;
            let total = counter.reader_bytes() as u64;
            info!("Archive stream complete, {total} bytes");
            Ok(total)
        },
        Err(e) => {
            let err = DataTransferError::pipe("failed to forward archive stream", e);
            tokio::select! {
                biased;
                _ = token.cancelled() => {},
                _ = writer.abort(err.to_io_error()) => {},
            }
            Err(err)
        },
    }
}

/// Reads the whole key index from `reader` and stores it as the dataset's index object.
///
/// Returns the number of keys in the index.
pub async fn upload_index<R>(
    mut reader: R,
    client: &dyn ObjectClient,
    dataset: &DatasetSummary,
    token: CancellationToken,
) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    tokio::select! {
        biased;
        _ = token.cancelled() => return Err(DataTransferError::Cancelled),
        r = reader.read_to_end(&mut buf) => r.map_err(|e| DataTransferError::pipe("failed to read keys", e))?,
    };

    let num_keys = parse_index(&buf)?.len();
    let object_key = dataset.index_object_key();

    tokio::select! {
        biased;
        _ = token.cancelled() => return Err(DataTransferError::Cancelled),
        r = client.upload(&dataset.bucket, &object_key, buf.into()) => {
            r.map_err(|e| DataTransferError::transport("failed to upload index", e))?
        },
    };

    info!("Uploaded index with {num_keys} keys");
    Ok(num_keys)
}

/// Stores the metadata object of a dataset of `size` archived bytes.
pub async fn upload_metadata(
    client: &dyn ObjectClient,
    dataset: &DatasetSummary,
    size: u64,
    token: CancellationToken,
) -> Result<Metadata> {
    let size = i64::try_from(size).map_err(DataTransferError::internal)?;
    let metadata = Metadata::new(size);
    let data = metadata.to_json()?;
    let object_key = dataset.metadata_object_key();

    tokio::select! {
        biased;
        _ = token.cancelled() => return Err(DataTransferError::Cancelled),
        r = client.upload(&dataset.bucket, &object_key, data.into()) => {
            r.map_err(|e| DataTransferError::transport("failed to upload metadata", e))?
        },
    };

    info!("Uploaded metadata, size {size}");
    Ok(metadata)
}

/// Output of one pipeline stage.
enum StageOutput {
    Archived,
    Counted(u64),
    Chunked(usize),
    Indexed,
}

/// Uploads a local directory as a dataset.
///
/// The directory is archived, the archive split into content defined chunks, chunks missing from
/// object storage are uploaded and the ordered list of chunk keys stored as the dataset index.
/// Metadata is written once all of that succeeded, and the control plane is told about the
/// success last. While the upload runs the control plane receives heartbeats; if it answers that
/// the upload expired, the upload stops.
///
/// The first failure of any stage cancels every other stage and is the error returned.
pub async fn upload(config: UploadConfig) -> Result<UploadSummary> {
    let UploadConfig {
        batch_client,
        object_client,
        local_dir,
        dataset,
        heartbeat_interval,
        concurrency,
        pipe_buffer_size,
        progress,
        chunker_params,
        cancellation_token,
    } = config;

    let span = info_span!("upload", project = %dataset.project_id, dataset = %dataset.dataset_id);

    async move {
        if heartbeat_interval.is_zero() {
            return Err(DataTransferError::InvalidConfiguration("heartbeat interval must be non-zero".to_owned()));
        }
        let chunker = Chunker::new(&chunker_params)?;

        let token = cancellation_token.map(|t| t.child_token()).unwrap_or_default();
        let run_state = RunState::new(token.clone());
        let dataset = Arc::new(dataset);

        // Heartbeats continue until metadata is written, so they get their own child token.
        let heartbeat_token = token.child_token();
        let heartbeat = {
            let run_state = run_state.clone();
            let client = batch_client.clone();
            let dataset = dataset.clone();
            let token = heartbeat_token.clone();
            tokio::spawn(async move {
                let r = run_heartbeat(client, &dataset.project_id, &dataset.dataset_id, heartbeat_interval, token).await;
                run_state.record(r);
            })
        };

        let (archive_tx, archive_rx) = pipe(pipe_buffer_size);
        let (chunk_tx, chunk_rx) = pipe(pipe_buffer_size);
        let (index_tx, index_rx) = pipe(pipe_buffer_size);

        let mut stages = JoinSet::new();

        let t = token.clone();
        stages.spawn(async move { archive_directory(local_dir, archive_tx, t).await.map(|_| StageOutput::Archived) });

        let t = token.clone();
        stages.spawn(async move { count_bytes(archive_rx.reader(), chunk_tx, t).await.map(StageOutput::Counted) });

        let target = ChunkUploadTarget {
            client: object_client.clone(),
            dataset: dataset.clone(),
            progress,
            concurrency,
        };
        let t = token.clone();
        stages.spawn(async move {
            let chunks = ChunkStream::new(chunk_rx.reader(), chunker);
            upload_chunks(chunks, IndexWriter::new(index_tx), target, t)
                .await
                .map(StageOutput::Chunked)
        });

        let (client, ds, t) = (object_client.clone(), dataset.clone(), token.clone());
        stages.spawn(async move {
            upload_index(index_rx.reader(), client.as_ref(), &ds, t)
                .await
                .map(|_| StageOutput::Indexed)
        });

        let mut size = 0;
        let mut num_chunks = 0;
        while let Some(joined) = stages.join_next().await {
            match run_state.record(joined.map_err(DataTransferError::from).and_then(|r| r)) {
                Some(StageOutput::Counted(n)) => size = n,
                Some(StageOutput::Chunked(n)) => num_chunks = n,
                Some(StageOutput::Archived | StageOutput::Indexed) | None => {},
            }
        }

        let metadata = if !run_state.has_error() && !run_state.is_cancelled() {
            let r = upload_metadata(object_client.as_ref(), &dataset, size, token.clone()).await;
            run_state.record(r)
        } else {
            None
        };

        heartbeat_token.cancel();
        run_state.record(heartbeat.await.map_err(DataTransferError::from));
        run_state.check()?;

        let Some(metadata) = metadata else {
            return Err(DataTransferError::InternalError("metadata missing after successful upload".to_owned()));
        };

        batch_client
            .send_upload_success(&dataset.project_id, &dataset.dataset_id)
            .await
            .log_error("failed to report upload success")?;

        info!("Upload complete: {size} bytes in {num_chunks} chunks");
        Ok(UploadSummary {
            size,
            num_chunks,
            metadata,
        })
    }
    .instrument(span)
    .await
}
