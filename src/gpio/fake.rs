//! In-memory pin controller
//!
//! [`FakePins`] replays scripted line levels and records every call, which
//! makes the sampler, orchestrator and poller testable without hardware.
//! Clones share the same state, so a test can keep one handle while the
//! poller owns another.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::PinController;
use crate::controller::pad_state::Snapshot;

/// A single recorded call on the fake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOp {
    ConfigureInput(u8),
    ConfigureOutput(u8),
    EnablePullUp(u8),
    SetHigh(u32),
    SetLow(u32),
    ReadAll,
}

#[derive(Debug)]
struct FakeState {
    levels: VecDeque<u32>,
    idle_levels: u32,
    driven: u32,
    reads: usize,
    read_delay: Option<Duration>,
    ops: Vec<PinOp>,
}

#[derive(Debug, Clone)]
pub struct FakePins {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakePins {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePins {
    /// Creates a fake whose lines all idle high, the level a pulled-up data
    /// line shows when no button is pressed.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                levels: VecDeque::new(),
                idle_levels: u32::MAX,
                driven: 0,
                reads: 0,
                read_delay: None,
                ops: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues one raw level word to be returned by the next unconsumed `read_all`.
    pub fn push_levels(&self, word: u32) {
        self.lock().levels.push_back(word);
    }

    /// Queues the 24 level words that make the sampler capture `snapshot`.
    ///
    /// The sampler stores the complement of each level word, so the words
    /// queued here are the complement of the snapshot cycles.
    pub fn push_snapshot(&self, snapshot: &Snapshot) {
        let mut state = self.lock();
        for word in snapshot.cycles() {
            state.levels.push_back(!word);
        }
    }

    /// Levels returned once the scripted words are exhausted.
    pub fn set_idle_levels(&self, word: u32) {
        self.lock().idle_levels = word;
    }

    /// Makes every `read_all` block the calling thread for `delay`.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        self.lock().read_delay = delay;
    }

    /// Number of `read_all` calls so far.
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    /// Number of scripted level words not yet consumed.
    pub fn pending_levels(&self) -> usize {
        self.lock().levels.len()
    }

    /// Output levels currently driven through `set_high`/`set_low`.
    pub fn driven(&self) -> u32 {
        self.lock().driven
    }

    pub fn ops(&self) -> Vec<PinOp> {
        self.lock().ops.clone()
    }

    /// Returns and clears the recorded operations.
    pub fn take_ops(&self) -> Vec<PinOp> {
        std::mem::take(&mut self.lock().ops)
    }
}

impl PinController for FakePins {
    fn configure_input(&mut self, pin: u8) {
        self.lock().ops.push(PinOp::ConfigureInput(pin));
    }

    fn configure_output(&mut self, pin: u8) {
        self.lock().ops.push(PinOp::ConfigureOutput(pin));
    }

    fn enable_pull_up(&mut self, pin: u8) {
        self.lock().ops.push(PinOp::EnablePullUp(pin));
    }

    fn set_high(&mut self, mask: u32) {
        let mut state = self.lock();
        state.driven |= mask;
        state.ops.push(PinOp::SetHigh(mask));
    }

    fn set_low(&mut self, mask: u32) {
        let mut state = self.lock();
        state.driven &= !mask;
        state.ops.push(PinOp::SetLow(mask));
    }

    fn read_all(&mut self) -> u32 {
        let delay = self.lock().read_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.lock();
        state.ops.push(PinOp::ReadAll);
        state.reads += 1;
        let idle = state.idle_levels;
        state.levels.pop_front().unwrap_or(idle)
    }
}
