// SPDX-License-Identifier: MIT OR Apache-2.0
//! Handing work back to the thread that owns a network.
//!
//! A network is not thread-safe. Background work started by a processor
//! posts a closure through a [`PostHandle`]; the owning thread later runs
//! everything queued with `Network::run_posted`.

use crate::network::Network;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type Task = Box<dyn FnOnce(&mut Network) + Send>;

/// Queue shared between a network and its post handles
#[derive(Default, Clone)]
pub(crate) struct PostQueue {
    tasks: Arc<Mutex<Vec<Task>>>,
}

impl PostQueue {
    pub(crate) fn handle(&self) -> PostHandle {
        PostHandle {
            tasks: Arc::clone(&self.tasks),
        }
    }

    pub(crate) fn take(&self) -> Vec<Task> {
        std::mem::take(&mut *self.tasks.lock())
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl fmt::Debug for PostQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostQueue")
            .field("queued", &self.len())
            .finish()
    }
}

/// Cloneable, `Send` handle for queueing work on the owning thread
#[derive(Clone)]
pub struct PostHandle {
    tasks: Arc<Mutex<Vec<Task>>>,
}

impl PostHandle {
    /// Queue `task`; it runs on the next `Network::run_posted`
    pub fn post(&self, task: impl FnOnce(&mut Network) + Send + 'static) {
        self.tasks.lock().push(Box::new(task));
    }
}

impl fmt::Debug for PostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostHandle")
            .field("queued", &self.tasks.lock().len())
            .finish()
    }
}

impl Network {
    /// Handle other threads use to queue work for this network
    pub fn post_handle(&self) -> PostHandle {
        self.posted.handle()
    }

    /// Number of queued tasks
    pub fn posted_count(&self) -> usize {
        self.posted.len()
    }

    /// Run every queued task under one lock; returns how many ran.
    ///
    /// Tasks posted while these run are left for the next call.
    pub fn run_posted(&mut self) -> usize {
        let tasks = self.posted.take();
        if tasks.is_empty() {
            return 0;
        }
        let count = tasks.len();
        tracing::debug!(count, "Running posted tasks");
        self.batch(|network| {
            for task in tasks {
                task(network);
            }
        });
        count
    }
}
