//! Background tasks with owner-thread completion delivery
//!
//! Work runs on the runtime's blocking pool. The result goes into a
//! single-shot slot owned by the task handle; completion is announced as
//! a [`TaskEvent`] on the owner's channel and picked up when the owner
//! drains it. Workers never call back into owner state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::streaming::node::ChunkNodeId;
use crate::tiles::tile::TileId;

/// Cooperative cancellation flag shared with a worker
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Completion notice delivered to the owning thread
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskEvent {
    /// A content job finished; `serial` identifies the job instance
    ContentLoaded { node: ChunkNodeId, serial: u64 },
    /// A hierarchy fetch finished
    HierarchyFetched { tile: TileId },
}

/// Handle to one unit of background work producing a `T`
pub struct BackgroundTask<T> {
    cancel: CancelToken,
    slot: Arc<Mutex<Option<T>>>,
    finished: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> BackgroundTask<T> {
    /// Start `work` on the runtime's blocking pool. `event` is sent once
    /// the result is in the slot, unless the task was cancelled.
    pub fn spawn<F>(runtime: &Handle, events: UnboundedSender<TaskEvent>, event: TaskEvent, work: F) -> Self
    where
        F: FnOnce(&CancelToken) -> T + Send + 'static,
    {
        let cancel = CancelToken::new();
        let slot = Arc::new(Mutex::new(None));
        let finished = Arc::new(AtomicBool::new(false));

        let join = {
            let cancel = cancel.clone();
            let slot = slot.clone();
            let finished = finished.clone();
            runtime.spawn_blocking(move || {
                let result = work(&cancel);
                if let Ok(mut slot) = slot.lock() {
                    *slot = Some(result);
                }
                finished.store(true, Ordering::SeqCst);
                if !cancel.is_cancelled() {
                    // Owner may already be gone; nothing to do then
                    let _ = events.send(event);
                }
            })
        };

        Self {
            cancel,
            slot,
            finished,
            join: Some(join),
        }
    }
}

impl<T> BackgroundTask<T> {
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ask the worker to stop at its next checkpoint; no completion event
    /// will be sent afterwards
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the worker has exited
    pub fn wait(&mut self) {
        if let Some(join) = self.join.take() {
            if let Err(e) = pollster::block_on(join) {
                log::error!("Background task failed: {}", e);
            }
        }
    }

    /// Take the result; `None` until the task finished, and after the
    /// first successful take
    pub fn take_result(&mut self) -> Option<T> {
        if !self.is_finished() {
            return None;
        }
        self.slot.lock().ok()?.take()
    }
}

impl<T> Drop for BackgroundTask<T> {
    fn drop(&mut self) {
        if self.join.is_some() && !self.is_finished() {
            self.cancel();
        }
        self.wait();
    }
}
