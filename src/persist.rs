//! Coalescing background save worker.
//!
//! Mutations post a signal into a channel with room for exactly one pending
//! request. When a request is already queued the new one is dropped, since
//! the queued save will serialize the latest state anyway. A dedicated thread
//! drains the channel and runs the save callback once per signal.

use std::sync::{Mutex, PoisonError};
use std::thread;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::error::{Error, Result};

/// Outcome of [`SaveWorker::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveRequest {
    Queued,
    /// A save was already pending and will pick up this change.
    Coalesced,
    Closed,
}

pub struct SaveWorker {
    signal: Mutex<Option<mpsc::Sender<()>>>,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SaveWorker {
    /// Start the worker thread. `save` runs once per consumed signal.
    pub fn spawn<F>(save: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (signal, mut pending) = mpsc::channel::<()>(1);
        let join = thread::Builder::new()
            .name("mdtasks-save".to_string())
            .spawn(move || {
                while pending.blocking_recv().is_some() {
                    save();
                }
                debug!("save worker stopped");
            })
            .map_err(Error::Io)?;
        Ok(Self {
            signal: Mutex::new(Some(signal)),
            join: Mutex::new(Some(join)),
        })
    }

    /// Ask for a save without blocking.
    pub fn request(&self) -> SaveRequest {
        let signal = self.signal.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = signal.as_ref() else {
            return SaveRequest::Closed;
        };
        match sender.try_send(()) {
            Ok(()) => SaveRequest::Queued,
            Err(TrySendError::Full(())) => SaveRequest::Coalesced,
            Err(TrySendError::Closed(())) => SaveRequest::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Close the channel and wait for the worker to finish any queued save.
    /// Calling it again is a no-op.
    pub fn shutdown(&self) {
        drop(
            self.signal
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let handle = self
            .join
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                debug!("save worker panicked");
            }
        }
    }
}

impl Drop for SaveWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
