use std::time::Duration;

use chunking::constants::DEFAULT_POLYNOMIAL;
use chunking::Pol;

utils::configurable_constants! {

    /// Number of chunks hashed, checked and uploaded at the same time.
    ref UPLOAD_CONCURRENCY: usize = 64;

    /// Number of chunk objects fetched at the same time when downloading a dataset.
    ref DOWNLOAD_CONCURRENCY: usize = 64;

    /// How often the control plane is told an upload is still in progress.
    ref HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

    /// Number of pending writes each pipe between two stages holds before the writer waits.
    ref PIPE_BUFFER_SIZE: usize = 64;

    /// The split polynomial, in hex. Every client uploading to the same project must use the same
    /// value or chunks will not deduplicate.
    ref CHUNKER_POLYNOMIAL: Pol = DEFAULT_POLYNOMIAL;

}
