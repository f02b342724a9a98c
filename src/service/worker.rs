//! Named background threads.

use std::io;
use std::thread::{self, JoinHandle};

use tracing::{error, info};

/// A pipeline stage running on its own thread.
pub struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl Worker {
    pub fn spawn<F>(name: &'static str, body: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.to_string()).spawn(body)?;
        info!("Thread starting: {}", name);
        Ok(Self { name, handle })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for the thread to exit. Returns `false` if it panicked.
    pub fn join(self) -> bool {
        match self.handle.join() {
            Ok(()) => {
                info!("Thread stopped: {}", self.name);
                true
            }
            Err(_) => {
                error!("Thread panicked: {}", self.name);
                false
            }
        }
    }
}
