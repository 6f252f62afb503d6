use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{DataTransferError, Result};

/// Shared state of one transfer: a cancellation token observed by every stage and the error
/// that ended the run.
///
/// The first error recorded wins and cancels the token, waking every stage blocked in a
/// `select!` on [`cancelled`](Self::cancelled). Later errors are dropped, except that a
/// [`DataTransferError::Pipe`] error (a stage noticing its neighbour went away) gives way to
/// the error that actually caused it.
pub struct RunState {
    cancellation_token: CancellationToken,
    stored_error: Mutex<Option<DataTransferError>>,
}

impl RunState {
    pub fn new(cancellation_token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            cancellation_token,
            stored_error: Mutex::new(None),
        })
    }

    fn error_guard(&self) -> MutexGuard<'_, Option<DataTransferError>> {
        self.stored_error.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records `error` if it is the first one and cancels the run.
    ///
    /// Cancellation errors are not recorded; they are the consequence of a cancel, not a cause.
    pub fn set_error(&self, error: DataTransferError) {
        if error.is_cancelled() {
            self.cancellation_token.cancel();
            return;
        }

        let mut error_guard = self.error_guard();
        match error_guard.as_ref() {
            None => {
                warn!("Transfer failed: {error}");
                *error_guard = Some(error);
            },
            Some(existing) if existing.is_pipe_error() && !error.is_pipe_error() => {
                debug!("Replacing pipe error {existing} with {error}");
                *error_guard = Some(error);
            },
            Some(_) => {
                debug!("Dropping error after the first: {error}");
            },
        }
        drop(error_guard);
        self.cancellation_token.cancel();
    }

    /// Records the error of a failed result, returning the value of a successful one.
    pub fn record<T>(&self, result: Result<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.set_error(e);
                None
            },
        }
    }

    pub fn has_error(&self) -> bool {
        self.error_guard().is_some()
    }

    /// Ok if the run is still healthy; otherwise the recorded error, or `Cancelled` if the run was
    /// cancelled without one.
    pub fn check(&self) -> Result<()> {
        if let Some(e) = self.error_guard().take() {
            return Err(e);
        }
        if self.is_cancelled() {
            return Err(DataTransferError::Cancelled);
        }
        Ok(())
    }

    /// Cancels without an error.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Future that resolves when cancelled; for use in `select!`.
    pub async fn cancelled(&self) {
        self.cancellation_token.cancelled().await;
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancellation_token
    }
}
