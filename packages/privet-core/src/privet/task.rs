use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use tokio::task::JoinHandle;

/// Work that is prepared up front, spawned by `start` and aborted on drop
pub(crate) struct DeferredTask {
    pending: Option<BoxFuture<'static, ()>>,
    handle: Option<JoinHandle<()>>,
}

impl DeferredTask {
    pub(crate) fn new(work: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            pending: Some(work.boxed()),
            handle: None,
        }
    }

    /// Spawn the work; later calls are ignored
    pub(crate) fn start(&mut self) {
        if let Some(work) = self.pending.take() {
            self.handle = Some(tokio::spawn(work));
        }
    }
}

impl Drop for DeferredTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_runs_only_after_start() {
        let (tx, mut rx) = oneshot::channel();
        let mut task = DeferredTask::new(async move {
            let _ = tx.send(());
        });

        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        task.start();
        task.start();
        tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_drop_aborts_running_work() {
        let (tx, rx) = oneshot::channel::<()>();
        let mut task = DeferredTask::new(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let _ = tx.send(());
        });
        task.start();
        drop(task);

        // Sender is dropped with the aborted future
        let result = tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap();
        assert!(result.is_err());
    }
}
