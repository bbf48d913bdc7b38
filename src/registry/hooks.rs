//! Background dispatch of post-mutation hooks.
//!
//! Hooks run on a dedicated thread after the write has committed. Their
//! errors are logged and never reach the caller of the mutation.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{channel, Sender};
use std::thread::{self, JoinHandle};

use crate::error::HookError;

type Job = Box<dyn FnOnce() -> Result<(), HookError> + Send>;

struct Task {
    hook: &'static str,
    resource: String,
    name: String,
    job: Job,
}

/// A background thread that runs queued hook invocations in order.
///
/// Dropping the dispatcher closes the queue; the thread finishes whatever
/// was already queued and exits.
pub struct HookDispatcher {
    tx: Sender<Task>,
    handle: Option<JoinHandle<usize>>,
}

impl HookDispatcher {
    pub fn spawn() -> Self {
        let (tx, rx) = channel::<Task>();

        let handle = thread::spawn(move || {
            let mut failed = 0;
            for task in rx {
                let Task {
                    hook,
                    resource,
                    name,
                    job,
                } = task;
                let error = match panic::catch_unwind(AssertUnwindSafe(job)) {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => err.to_string(),
                    Err(payload) => format!("hook panicked: {}", panic_message(payload.as_ref())),
                };
                failed += 1;
                tracing::warn!(
                    hook,
                    resource = %resource,
                    name = %name,
                    error = %error,
                    "post-mutation hook failed"
                );
            }
            failed
        });

        Self {
            tx,
            handle: Some(handle),
        }
    }

    /// Queue a hook invocation.
    pub fn dispatch<F>(&self, hook: &'static str, resource: String, name: String, job: F)
    where
        F: FnOnce() -> Result<(), HookError> + Send + 'static,
    {
        let task = Task {
            hook,
            resource,
            name,
            job: Box::new(job),
        };
        if let Err(unsent) = self.tx.send(task) {
            tracing::warn!(
                hook = unsent.0.hook,
                resource = %unsent.0.resource,
                name = %unsent.0.name,
                "hook worker is gone; dropping hook"
            );
        }
    }

    /// Close the queue, wait for queued hooks, and return how many failed.
    pub fn shutdown(mut self) -> usize {
        let (replacement, _) = channel();
        drop(std::mem::replace(&mut self.tx, replacement));
        self.handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or(0)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

impl Default for HookDispatcher {
    fn default() -> Self {
        Self::spawn()
    }
}
