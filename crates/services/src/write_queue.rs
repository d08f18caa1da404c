//! Per-lesson FIFO write lanes.
//!
//! Each lesson key gets one unbounded channel served by one worker task, so
//! writes for the same lesson reach the store strictly in submission order
//! while different lessons proceed independently.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use learn_core::model::LessonId;

pub(crate) type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub(crate) struct WriteQueue {
    runtime: Handle,
    lanes: Mutex<HashMap<LessonId, UnboundedSender<Job>>>,
}

impl WriteQueue {
    /// Creates a queue whose workers run on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Appends `job` to the lesson's lane, starting a worker if needed.
    pub fn submit<F>(&self, lesson: LessonId, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut job: Job = Box::pin(job);
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(tx) = lanes.get(&lesson) {
            match tx.send(job) {
                Ok(()) => return,
                // worker is gone; start a fresh lane below
                Err(mpsc::error::SendError(returned)) => job = returned,
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(job).is_err() {
            return;
        }
        self.runtime.spawn(run_lane(lesson, rx));
        lanes.insert(lesson, tx);
        debug!(%lesson, "write lane started");
    }

    /// Closes a lesson's lane once its queued jobs finish.
    pub fn close(&self, lesson: LessonId) {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&lesson);
    }
}

async fn run_lane(lesson: LessonId, mut rx: UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        job.await;
    }
    debug!(%lesson, "write lane closed");
}
