#![cfg_attr(feature = "strict", deny(warnings))]

mod archive;
mod chunk_uploader;
pub mod configurations;
pub mod constants;
mod download;
pub mod errors;
mod heartbeat;
pub mod logging;
mod ordered;
pub mod run_state;
mod upload_process;

pub use archive::{archive_directory, extract_archive};
pub use chunk_uploader::{upload_chunks, ChunkUploadTarget};
pub use configurations::{DownloadConfig, UploadConfig};
pub use download::{download, get_remote_dataset_size};
pub use errors::{DataTransferError, Result};
pub use heartbeat::run_heartbeat;
pub use run_state::RunState;
pub use upload_process::{count_bytes, upload, upload_index, upload_metadata, UploadSummary};
