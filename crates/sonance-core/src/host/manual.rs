//! Caller-driven host
//!
//! Nothing renders on its own: the owner pulls blocks with
//! [`ManualHost::render`]. Used for offline rendering, for embedding in
//! another host's callback, and in tests. Clones share the same routine, so
//! one clone can be given to the engine while another drives it.

use super::{HostError, HostResult, RenderHost};
use crate::engine::RenderContext;
use crate::types::StereoBuffer;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct ManualState {
    routine: Option<RenderContext>,
    running: bool,
    block_size: usize,
}

/// Host whose blocks are rendered on demand
#[derive(Clone, Default)]
pub struct ManualHost {
    state: Arc<Mutex<ManualState>>,
}

impl ManualHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Block size the routine was installed with (0 before install)
    pub fn block_size(&self) -> usize {
        self.state().block_size
    }

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    pub fn is_installed(&self) -> bool {
        self.state().routine.is_some()
    }

    /// Render `output.len()` frames
    ///
    /// Writes silence and returns `false` when nothing is installed or the
    /// host is suspended.
    pub fn render(&self, output: &mut StereoBuffer) -> bool {
        let mut state = self.state();
        if !state.running {
            output.fill_silence();
            return false;
        }
        match state.routine.as_mut() {
            Some(routine) => {
                routine.process(output);
                true
            }
            None => {
                output.fill_silence();
                false
            }
        }
    }

    /// Render one block of the installed block size into a new buffer
    pub fn render_block(&self) -> StereoBuffer {
        let mut block = StereoBuffer::silence(self.block_size());
        self.render(&mut block);
        block
    }
}

impl RenderHost for ManualHost {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn install(&mut self, routine: RenderContext, block_size: usize, _sample_rate: u32) -> HostResult<()> {
        let mut state = self.state();
        if state.routine.is_some() {
            return Err(HostError::AlreadyInstalled);
        }
        state.routine = Some(routine);
        state.block_size = block_size;
        state.running = false;
        Ok(())
    }

    fn resume(&mut self) -> HostResult<()> {
        let mut state = self.state();
        if state.routine.is_none() {
            return Err(HostError::NotInstalled);
        }
        state.running = true;
        Ok(())
    }

    fn suspend(&mut self) -> HostResult<()> {
        self.state().running = false;
        Ok(())
    }

    fn detach(&mut self) -> HostResult<Option<RenderContext>> {
        let mut state = self.state();
        state.running = false;
        Ok(state.routine.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_host_renders_silence() {
        let host = ManualHost::new();
        let mut out = StereoBuffer::silence(64);
        out[0].left = 1.0;
        assert!(!host.render(&mut out));
        assert_eq!(out.peak(), 0.0);
        assert!(!host.is_installed());
    }

    #[test]
    fn test_resume_requires_routine() {
        let mut host = ManualHost::new();
        assert!(matches!(host.resume(), Err(HostError::NotInstalled)));
        assert!(host.detach().unwrap().is_none());
    }
}
