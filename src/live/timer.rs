use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Pending delayed work. Dropping the handle aborts it.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `work` after `delay` unless the returned handle goes away first.
pub fn schedule_after<F>(delay: Duration, work: F) -> TimerHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        work.await;
    });
    TimerHandle { task }
}
