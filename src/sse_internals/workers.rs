use super::error::JanusSSEError;
use std::{
    sync::{
        Mutex,
        mpsc::{Receiver, SyncSender},
    },
    thread::{Scope, ScopedJoinHandle},
};
use tracing::trace;

/// Destination of search results, delivered one by one as soon as they are produced.
///
/// Sinks are shared between workers, so `emit` can be called concurrently and results arrive in no particular order.
pub trait ResultSink<T>: Sync {
    fn emit(&self, item: T);
}

impl<T, F: Fn(T) + Sync> ResultSink<T> for F {
    fn emit(&self, item: T) {
        self(item)
    }
}

impl<T: Send> ResultSink<T> for Mutex<Vec<T>> {
    fn emit(&self, item: T) {
        match self.lock() {
            Ok(mut items) => items.push(item),
            Err(poisoned) => poisoned.into_inner().push(item),
        }
    }
}

/// Blocks while the channel is full. Results emitted after the receiver hung up are dropped.
impl<T: Send> ResultSink<T> for SyncSender<T> {
    fn emit(&self, item: T) {
        if self.send(item).is_err() {
            trace!("result receiver hung up, dropping result");
        }
    }
}

/// Collects what a closure emits into a vector.
pub fn collect_into_vec<T: Send>(f: impl FnOnce(&Mutex<Vec<T>>) -> Result<(), JanusSSEError>) -> Result<Vec<T>, JanusSSEError> {
    let items = Mutex::new(Vec::new());
    f(&items)?;
    items.into_inner().map_err(|_| JanusSSEError::WorkerPanicked)
}

type TaskResult = Result<(), JanusSSEError>;

/// A group of scoped worker threads, joined together.
///
/// `join` waits for every task, even after one of them failed, and reports the first failure in spawn order.
pub struct TaskGroup<'scope, 'env: 'scope> {
    scope: &'scope Scope<'scope, 'env>,
    handles: Vec<ScopedJoinHandle<'scope, TaskResult>>,
}

impl<'scope, 'env> TaskGroup<'scope, 'env> {
    pub fn new(scope: &'scope Scope<'scope, 'env>) -> Self {
        TaskGroup { scope, handles: Vec::new() }
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: FnOnce() -> TaskResult + Send + 'scope,
    {
        self.handles.push(self.scope.spawn(task));
    }

    /// Spawns `count` copies of the task produced by `make_task`, each given its worker index.
    pub fn spawn_n<F, G>(&mut self, count: usize, mut make_task: G)
    where
        G: FnMut(usize) -> F,
        F: FnOnce() -> TaskResult + Send + 'scope,
    {
        for worker_idx in 0..count {
            self.spawn(make_task(worker_idx));
        }
    }

    pub fn join(self) -> TaskResult {
        self.handles.into_iter().fold(Ok(()), |acc, handle| {
            let res = handle.join().unwrap_or(Err(JanusSSEError::WorkerPanicked));
            acc.and(res)
        })
    }
}

/// Receiving end of a bounded queue, shared by all workers of one pipeline stage.
pub struct SharedReceiver<T> {
    inner: Mutex<Receiver<T>>,
}

impl<T> SharedReceiver<T> {
    pub fn new(receiver: Receiver<T>) -> Self {
        SharedReceiver { inner: Mutex::new(receiver) }
    }

    /// Next queued item, or `None` once every sender is gone and the queue is drained.
    pub fn recv(&self) -> Option<T> {
        let receiver = self.inner.lock().ok()?;
        receiver.recv().ok()
    }
}

#[cfg(test)]
mod test {
    use super::{ResultSink, SharedReceiver, TaskGroup, collect_into_vec};
    use crate::JanusSSEError;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
        mpsc::sync_channel,
    };

    #[test]
    fn task_group_joins_all_and_reports_first_failure() {
        let finished = AtomicUsize::new(0);

        let res = std::thread::scope(|s| {
            let mut group = TaskGroup::new(s);
            group.spawn_n(4, |worker_idx| {
                let finished = &finished;
                move || {
                    finished.fetch_add(1, Ordering::SeqCst);
                    if worker_idx == 1 {
                        Err(JanusSSEError::StoreIO(String::from("disk on fire")))
                    } else {
                        Ok(())
                    }
                }
            });
            group.join()
        });

        assert_eq!(res, Err(JanusSSEError::StoreIO(String::from("disk on fire"))));
        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn task_group_turns_panics_into_errors() {
        let res = std::thread::scope(|s| {
            let mut group = TaskGroup::new(s);
            group.spawn(|| panic!("worker bug"));
            group.join()
        });

        assert_eq!(res, Err(JanusSSEError::WorkerPanicked));
    }

    #[test]
    fn shared_receiver_drains_across_workers() {
        let (tx, rx) = sync_channel::<u32>(4);
        let rx = SharedReceiver::new(rx);
        let seen = Mutex::new(Vec::new());

        std::thread::scope(|s| {
            let mut group = TaskGroup::new(s);
            group.spawn_n(3, |_| {
                let (rx, seen) = (&rx, &seen);
                move || {
                    while let Some(item) = rx.recv() {
                        seen.emit(item);
                    }
                    Ok(())
                }
            });
            group.spawn(move || {
                (0..100).for_each(|i| tx.emit(i));
                Ok(())
            });
            group.join()
        })
        .unwrap();

        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn closure_sink_collects() {
        let items = collect_into_vec(|sink| {
            let forward = |i: u32| sink.emit(i * 2);
            (0..4).for_each(|i| forward.emit(i));
            Ok(())
        })
        .unwrap();

        assert_eq!(items, vec![0, 2, 4, 6]);
    }
}
