use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, Notify, mpsc};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A FIFO task queue consumed by a fixed number of worker tasks. Submission
/// never blocks; coordination happens only through task hand-off. The pool
/// counts queued-plus-running tasks so `drain` can observe completion without
/// polling.
pub struct WorkerPool {
    tx: mpsc::UnboundedSender<Task>,
    outstanding: Arc<Outstanding>,
}

#[derive(Default)]
struct Outstanding {
    count: AtomicUsize,
    idle: Notify,
}

impl Outstanding {
    fn start(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl WorkerPool {
    /// Spawns `workers` consumers; must be called inside a Tokio runtime.
    pub fn new(workers: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Task>();
        let rx = Arc::new(Mutex::new(rx));
        let outstanding = Arc::new(Outstanding::default());
        for _ in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let outstanding = Arc::clone(&outstanding);
            tokio::spawn(async move {
                loop {
                    let task = { rx.lock().await.recv().await };
                    let Some(task) = task else { break };
                    task.await;
                    outstanding.finish();
                }
            });
        }
        Self { tx, outstanding }
    }

    pub fn submit(&self, task: impl Future<Output = ()> + Send + 'static) {
        self.outstanding.start();
        if self.tx.send(Box::pin(task)).is_err() {
            // Workers are gone; the task will never run.
            self.outstanding.finish();
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.count.load(Ordering::Acquire)
    }

    /// Resolves once every submitted task (including tasks submitted by
    /// running tasks) has finished.
    pub async fn drain(&self) {
        loop {
            let notified = self.outstanding.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a finish between the check and the
            // await is not lost.
            notified.as_mut().enable();
            if self.outstanding.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}
