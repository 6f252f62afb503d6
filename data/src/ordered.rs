use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::errors::{DataTransferError, Result};

type Slot<T> = oneshot::Receiver<Result<T>>;

/// Runs up to `concurrency` tasks at once while handing their results out in dispatch order.
///
/// Every dispatched task gets a one-shot result slot; the slots travel over a bounded channel to
/// the single [`OrderedResults`] consumer, which awaits them one after the other. A slow task
/// therefore holds back the results behind it, but never their execution.
pub(crate) struct OrderedDispatcher<T> {
    semaphore: Arc<Semaphore>,
    slots: mpsc::Sender<Slot<T>>,
    workers: JoinSet<()>,
    token: CancellationToken,
}

pub(crate) struct OrderedResults<T> {
    slots: mpsc::Receiver<Slot<T>>,
    token: CancellationToken,
}

pub(crate) fn ordered_dispatcher<T: Send + 'static>(
    concurrency: usize,
    token: CancellationToken,
) -> (OrderedDispatcher<T>, OrderedResults<T>) {
    let concurrency = concurrency.max(1);
    let (tx, rx) = mpsc::channel(concurrency);
    (
        OrderedDispatcher {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            slots: tx,
            workers: JoinSet::new(),
            token: token.clone(),
        },
        OrderedResults { slots: rx, token },
    )
}

impl<T: Send + 'static> OrderedDispatcher<T> {
    /// Waits for a free worker, then starts `task`.
    ///
    /// Fails with `Cancelled` once the token is cancelled, or if the consumer went away.
    pub(crate) async fn dispatch<F>(&mut self, task: F) -> Result<()>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let permit = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(DataTransferError::Cancelled),
            p = self.semaphore.clone().acquire_owned() => p.map_err(DataTransferError::internal)?,
        };

        let (tx, rx) = oneshot::channel();
        self.send_slot(rx).await?;

        let token = self.token.clone();
        self.workers.spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(DataTransferError::Cancelled),
                r = task => r,
            };
            // The consumer may have stopped listening; the result is not needed then.
            let _ = tx.send(result);
            drop(permit);
        });

        // Reap finished workers so the set stays bounded by the concurrency.
        while self.workers.try_join_next().is_some() {}

        Ok(())
    }

    /// Queues an error behind the tasks dispatched so far; the consumer fails when it reaches it.
    pub(crate) async fn push_error(&mut self, err: DataTransferError) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        self.send_slot(rx).await
    }

    async fn send_slot(&mut self, slot: Slot<T>) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(DataTransferError::Cancelled),
            r = self.slots.send(slot) => r.map_err(|_| DataTransferError::InternalError("result consumer is gone".to_owned())),
        }
    }

    /// Signals the end of the work and waits until every dispatched task has finished.
    pub(crate) async fn finish(self) {
        let OrderedDispatcher {
            slots,
            mut workers,
            token,
            ..
        } = self;
        drop(slots);

        tokio::select! {
            biased;
            _ = token.cancelled() => {},
            _ = async { while workers.join_next().await.is_some() {} } => {},
        }
    }
}

impl<T> OrderedResults<T> {
    /// The next result in dispatch order, or `None` once the dispatcher finished and every result
    /// was handed out.
    pub(crate) async fn next(&mut self) -> Result<Option<T>> {
        let slot = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(DataTransferError::Cancelled),
            s = self.slots.recv() => s,
        };

        let Some(slot) = slot else {
            return Ok(None);
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(DataTransferError::Cancelled),
            r = slot => match r {
                Ok(result) => result.map(Some),
                Err(_) => Err(DataTransferError::InternalError("worker task ended without a result".to_owned())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[tokio::test]
    async fn test_results_in_dispatch_order() {
        let token = CancellationToken::new();
        let (mut dispatcher, mut results) = ordered_dispatcher::<usize>(8, token);

        let producer = async move {
            let mut rng = ChaCha8Rng::seed_from_u64(3);
            for i in 0..100usize {
                let delay = Duration::from_millis(rng.random_range(0..10));
                dispatcher
                    .dispatch(async move {
                        tokio::time::sleep(delay).await;
                        Ok(i)
                    })
                    .await
                    .unwrap();
            }
            dispatcher.finish().await;
        };

        let consumer = async move {
            let mut out = Vec::new();
            while let Some(i) = results.next().await.unwrap() {
                out.push(i);
            }
            out
        };

        let ((), out) = tokio::join!(producer, consumer);
        assert_eq!(out, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_error_reaches_consumer_in_order() {
        let token = CancellationToken::new();
        let (mut dispatcher, mut results) = ordered_dispatcher::<usize>(4, token);

        dispatcher.dispatch(async { Ok(1) }).await.unwrap();
        dispatcher.push_error(DataTransferError::InternalError("bad".to_owned())).await.unwrap();
        dispatcher.finish().await;

        assert_eq!(results.next().await.unwrap(), Some(1));
        assert!(matches!(results.next().await, Err(DataTransferError::InternalError(_))));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_everything() {
        let token = CancellationToken::new();
        let (mut dispatcher, mut results) = ordered_dispatcher::<usize>(1, token.clone());

        dispatcher
            .dispatch(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(0)
            })
            .await
            .unwrap();

        let consumer = tokio::spawn(async move { results.next().await });

        // The single worker is busy, so the next dispatch has to wait for it.
        let second = tokio::spawn(async move { dispatcher.dispatch(async { Ok(1) }).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let r = tokio::time::timeout(Duration::from_secs(5), consumer).await.unwrap().unwrap();
        assert!(r.unwrap_err().is_cancelled());
        let r = tokio::time::timeout(Duration::from_secs(5), second).await.unwrap().unwrap();
        assert!(r.unwrap_err().is_cancelled());
    }
}
