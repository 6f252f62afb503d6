use std::fmt::Debug;
use std::io;
use std::path::PathBuf;

use batch_client::BatchClientError;
use cas_client::CasClientError;
use cas_types::CasTypesError;
use chunking::ChunkingError;
use thiserror::Error;
use tokio::task::JoinError;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DataTransferError {
    /// Reading the local directory (or writing the extracted one) failed.
    #[error("failed to archive {path:?}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failure talking to object storage.
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: CasClientError,
    },

    /// Reading from or writing to a pipe between two stages failed. Usually this only echoes the
    /// failure of the stage on the other end.
    #[error("{context}: {source}")]
    Pipe {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("upload failed because the server could not be reached for too long")]
    UploadExpired,

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("Batch client error: {0}")]
    Batch(#[from] BatchClientError),

    #[error("Invalid remote data: {0}")]
    InvalidData(#[from] CasTypesError),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, DataTransferError>;

impl DataTransferError {
    pub fn internal<T: Debug>(value: T) -> Self {
        DataTransferError::InternalError(format!("{value:?}"))
    }

    pub fn transport(context: impl Into<String>, source: CasClientError) -> Self {
        DataTransferError::Transport {
            context: context.into(),
            source,
        }
    }

    pub fn pipe(context: impl Into<String>, source: io::Error) -> Self {
        DataTransferError::Pipe {
            context: context.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DataTransferError::Cancelled)
    }

    pub(crate) fn is_pipe_error(&self) -> bool {
        matches!(self, DataTransferError::Pipe { .. })
    }

    /// An io::Error carrying this error's message, for handing to the reader of a pipe.
    pub(crate) fn to_io_error(&self) -> io::Error {
        io::Error::other(self.to_string())
    }
}

impl From<JoinError> for DataTransferError {
    fn from(err: JoinError) -> Self {
        DataTransferError::internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            DataTransferError::UploadExpired.to_string(),
            "upload failed because the server could not be reached for too long"
        );

        let e = DataTransferError::transport("failed to upload chunk 1307990e", CasClientError::Other("boom".to_owned()));
        assert_eq!(e.to_string(), "failed to upload chunk 1307990e: Error : boom");

        assert!(DataTransferError::Cancelled.is_cancelled());
        assert!(!DataTransferError::UploadExpired.is_cancelled());
        assert!(DataTransferError::pipe("failed to read keys", io::ErrorKind::BrokenPipe.into()).is_pipe_error());
    }
}
