use std::sync::Arc;
use std::time::Duration;

use batch_client::BatchClient;
use error_printer::ErrorPrinter;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{DataTransferError, Result};

/// Tells the control plane the upload of a dataset is alive, once every `interval`.
///
/// The first heartbeat is sent one interval after the start. Failed heartbeats are ignored; an
/// answer saying the upload expired ends the monitor with [`DataTransferError::UploadExpired`].
/// Returns `Ok(())` once the token is cancelled. A zero `interval` is rejected.
pub async fn run_heartbeat(
    client: Arc<dyn BatchClient>,
    project_id: &str,
    dataset_id: &str,
    interval: Duration,
    token: CancellationToken,
) -> Result<()> {
    if interval.is_zero() {
        return Err(DataTransferError::InvalidConfiguration("heartbeat interval must be non-zero".to_owned()));
    }

    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {},
        }

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            r = client.send_upload_heartbeat(project_id, dataset_id) => r,
        };

        match response.debug_error(format!("Heartbeat for dataset {dataset_id} failed")) {
            Ok(out) if out.has_expired => {
                warn!("Upload of dataset {dataset_id} expired on the server");
                return Err(DataTransferError::UploadExpired);
            },
            Ok(_) => debug!("Heartbeat sent for dataset {dataset_id}"),
            Err(_) => {},
        }
    }

    info!("Heartbeat for dataset {dataset_id} stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use batch_client::MockBatchClient;
    use tracing_test::traced_test;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expiry_ends_monitor() {
        let client = MockBatchClient::new();
        client.expire_after(Some(3));

        let start = Instant::now();
        let err = run_heartbeat(client.clone(), "p", "d", Duration::from_secs(60), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DataTransferError::UploadExpired));
        assert_eq!(client.num_heartbeats(), 4);
        assert!(start.elapsed() >= Duration::from_secs(240));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_failures_are_ignored() {
        let client = MockBatchClient::new();
        client.set_heartbeats_failing(true);
        let token = CancellationToken::new();

        let task = tokio::spawn(run_heartbeat(client.clone(), "p", "d", Duration::from_secs(1), token.clone()));

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        token.cancel();

        task.await.unwrap().unwrap();
        assert_eq!(client.num_heartbeats(), 10);
        assert!(logs_contain("Heartbeat for dataset d failed"));
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let client = MockBatchClient::new();
        let err = run_heartbeat(client.clone(), "p", "d", Duration::ZERO, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DataTransferError::InvalidConfiguration(_)));
        assert_eq!(client.num_heartbeats(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_heartbeat_before_first_interval() {
        let client = MockBatchClient::new();
        let token = CancellationToken::new();

        let task = tokio::spawn(run_heartbeat(client.clone(), "p", "d", Duration::from_secs(60), token.clone()));
        tokio::time::sleep(Duration::from_secs(59)).await;
        token.cancel();

        task.await.unwrap().unwrap();
        assert_eq!(client.num_heartbeats(), 0);
    }
}
