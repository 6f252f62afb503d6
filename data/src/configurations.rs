use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use batch_client::BatchClient;
use cas_client::ObjectClient;
use cas_types::DatasetSummary;
use chunking::ChunkerParams;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::constants::*;

/// Everything one dataset upload needs.
pub struct UploadConfig {
    pub batch_client: Arc<dyn BatchClient>,
    pub object_client: Arc<dyn ObjectClient>,
    /// Directory whose contents become the dataset.
    pub local_dir: PathBuf,
    /// Project and dataset ids plus where the dataset is stored.
    pub dataset: DatasetSummary,
    pub heartbeat_interval: Duration,
    /// Number of chunks in flight.
    pub concurrency: usize,
    pub pipe_buffer_size: usize,
    /// Receives the size of every chunk once it is stored (or found to be stored already).
    pub progress: Option<mpsc::Sender<u64>>,
    pub chunker_params: ChunkerParams,
    /// Cancelling this token cancels the upload.
    pub cancellation_token: Option<CancellationToken>,
}

impl UploadConfig {
    /// A config with the environment defaults from [`crate::constants`].
    pub fn new(
        batch_client: Arc<dyn BatchClient>,
        object_client: Arc<dyn ObjectClient>,
        local_dir: impl AsRef<Path>,
        dataset: DatasetSummary,
    ) -> Self {
        Self {
            batch_client,
            object_client,
            local_dir: local_dir.as_ref().to_path_buf(),
            dataset,
            heartbeat_interval: *HEARTBEAT_INTERVAL,
            concurrency: *UPLOAD_CONCURRENCY,
            pipe_buffer_size: *PIPE_BUFFER_SIZE,
            progress: None,
            chunker_params: ChunkerParams::with_polynomial(*CHUNKER_POLYNOMIAL),
            cancellation_token: None,
        }
    }

    pub fn with_progress(mut self, progress: mpsc::Sender<u64>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_chunker_params(mut self, params: ChunkerParams) -> Self {
        self.chunker_params = params;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }
}

/// Everything one dataset download needs.
pub struct DownloadConfig {
    pub object_client: Arc<dyn ObjectClient>,
    pub dataset: DatasetSummary,
    /// Directory the dataset is extracted into; created if missing.
    pub output_dir: PathBuf,
    pub concurrency: usize,
    pub pipe_buffer_size: usize,
    /// Receives the size of every chunk once it has been handed to the extractor.
    pub progress: Option<mpsc::Sender<u64>>,
    pub cancellation_token: Option<CancellationToken>,
}

impl DownloadConfig {
    pub fn new(object_client: Arc<dyn ObjectClient>, dataset: DatasetSummary, output_dir: impl AsRef<Path>) -> Self {
        Self {
            object_client,
            dataset,
            output_dir: output_dir.as_ref().to_path_buf(),
            concurrency: *DOWNLOAD_CONCURRENCY,
            pipe_buffer_size: *PIPE_BUFFER_SIZE,
            progress: None,
            cancellation_token: None,
        }
    }

    pub fn with_progress(mut self, progress: mpsc::Sender<u64>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }
}
