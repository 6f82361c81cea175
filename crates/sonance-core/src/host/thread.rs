//! Dedicated render thread
//!
//! The thread owns the render routine outright and calls it once per block
//! period, sleeping to the next deadline in between. Control messages
//! (resume, suspend, stop) arrive over a crossbeam channel; while
//! suspended the thread blocks on that channel and uses no CPU.

use super::{HostError, HostResult, RenderHost};
use crate::engine::RenderContext;
use crate::types::StereoBuffer;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Consumer of rendered blocks
pub type BlockSink = Box<dyn FnMut(&StereoBuffer) + Send>;

/// Blocks the thread may fall behind before it stops catching up
const MAX_CATCH_UP_BLOCKS: u32 = 4;

enum Control {
    Resume,
    Suspend,
    Stop,
}

/// Host running the routine on its own thread
#[derive(Default)]
pub struct ThreadHost {
    control: Option<Sender<Control>>,
    thread: Option<JoinHandle<RenderContext>>,
    sink: Option<BlockSink>,
}

impl ThreadHost {
    /// Render thread whose output is discarded
    pub fn new() -> Self {
        Self::default()
    }

    /// Render thread that hands every block to `sink`
    pub fn with_sink(sink: impl FnMut(&StereoBuffer) + Send + 'static) -> Self {
        Self {
            control: None,
            thread: None,
            sink: Some(Box::new(sink)),
        }
    }

    fn send(&self, control: Control) -> HostResult<()> {
        let sender = self.control.as_ref().ok_or(HostError::NotInstalled)?;
        sender.send(control).map_err(|_| HostError::ThreadTerminated)
    }
}

fn run(
    mut routine: RenderContext,
    mut sink: Option<BlockSink>,
    control: Receiver<Control>,
    block_size: usize,
    sample_rate: u32,
) -> RenderContext {
    let period = Duration::from_secs_f64(block_size as f64 / sample_rate as f64);
    let mut buffer = StereoBuffer::silence(block_size);
    let mut running = false;
    let mut deadline = Instant::now();

    loop {
        let command = if running {
            match control.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            match control.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            }
        };

        match command {
            Some(Control::Resume) if !running => {
                running = true;
                deadline = Instant::now();
            }
            Some(Control::Suspend) => running = false,
            Some(Control::Stop) => break,
            _ => {}
        }
        if !running {
            continue;
        }

        routine.process(&mut buffer);
        if let Some(sink) = sink.as_mut() {
            sink(&buffer);
        }

        deadline += period;
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        } else if now - deadline > period * MAX_CATCH_UP_BLOCKS {
            deadline = now;
        }
    }

    routine
}

impl RenderHost for ThreadHost {
    fn name(&self) -> &'static str {
        "thread"
    }

    fn install(&mut self, routine: RenderContext, block_size: usize, sample_rate: u32) -> HostResult<()> {
        if self.thread.is_some() {
            return Err(HostError::AlreadyInstalled);
        }
        let (tx, rx) = channel::unbounded();
        let sink = self.sink.take();

        let thread = thread::Builder::new()
            .name("sonance-render".to_string())
            .spawn(move || run(routine, sink, rx, block_size, sample_rate))
            .map_err(|e| HostError::ThreadSpawn(e.to_string()))?;

        log::info!(
            "Render thread started ({} frames @ {} Hz)",
            block_size,
            sample_rate
        );
        self.control = Some(tx);
        self.thread = Some(thread);
        Ok(())
    }

    fn resume(&mut self) -> HostResult<()> {
        self.send(Control::Resume)
    }

    fn suspend(&mut self) -> HostResult<()> {
        self.send(Control::Suspend)
    }

    fn detach(&mut self) -> HostResult<Option<RenderContext>> {
        let Some(thread) = self.thread.take() else {
            return Ok(None);
        };
        if let Some(control) = self.control.take() {
            // Fails only if the thread already exited; join reports that
            let _ = control.send(Control::Stop);
        }
        let routine = thread.join().map_err(|_| HostError::ThreadTerminated)?;
        log::info!("Render thread stopped");
        Ok(Some(routine))
    }
}

impl Drop for ThreadHost {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            log::warn!("Render thread shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_before_install_is_rejected() {
        let mut host = ThreadHost::with_sink(|_| {});
        assert!(host.sink.is_some());
        assert!(matches!(host.resume(), Err(HostError::NotInstalled)));
        assert!(matches!(host.suspend(), Err(HostError::NotInstalled)));
        assert!(host.detach().unwrap().is_none());
    }
}
