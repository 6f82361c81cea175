//! Deferred deallocation for buffers dropped on the render thread
//!
//! Each engine owns one [`Reclaimer`]: a `basedrop` collector living on its
//! own thread. Buffers handed to the render context are wrapped in
//! `basedrop::Shared`/`Owned` created from [`Reclaimer::handle`]; dropping
//! one on the render thread only enqueues the pointer, and the collector
//! thread frees it later.
//!
//! ```ignore
//! let reclaimer = Reclaimer::spawn("sonance-gc")?;
//! let table = Shared::new(&reclaimer.handle(), vec![0.0f32; 2048]);
//! // hand `table` to the render context; freeing happens off the RT thread
//! ```

use basedrop::{Collector, Handle};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the collector thread sweeps
const COLLECT_INTERVAL: Duration = Duration::from_millis(50);

/// Per-engine collector thread
pub struct Reclaimer {
    handle: Handle,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Reclaimer {
    /// Start a collector thread named `name`
    pub fn spawn(name: &str) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let thread = thread::Builder::new().name(name.to_string()).spawn(move || {
            // Collector is !Sync, so it is created and kept on this thread
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }
            log::debug!("Deferred-drop collector started");

            while !thread_stop.load(Ordering::Acquire) {
                collector.collect();
                thread::park_timeout(COLLECT_INTERVAL);
            }

            collector.collect();
            match collector.try_cleanup() {
                Ok(()) => log::debug!("Deferred-drop collector stopped"),
                Err(mut collector) => {
                    // Allocations still alive elsewhere (e.g. zones held by
                    // the control side); sweep what we can and leave the rest
                    collector.collect();
                    log::debug!(
                        "Deferred-drop collector stopped with {} live allocation(s)",
                        collector.alloc_count()
                    );
                }
            }
        })?;

        let handle = rx
            .recv()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "collector thread exited early"))?;

        Ok(Self {
            handle,
            stop,
            thread: Some(thread),
        })
    }

    /// Handle for creating `Shared`/`Owned` allocations
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Stop the collector thread after a final sweep
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        thread.thread().unpark();
        if thread.join().is_err() {
            log::warn!("Deferred-drop collector thread panicked");
        }
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
