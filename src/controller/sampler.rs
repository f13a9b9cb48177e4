//! Bit-banged capture of the shift register chain
//!
//! Every pad on the bus shares clock and latch, so one pass over 24 clock
//! cycles captures all data lines at once. The per-edge delay is what the
//! 4021 shift registers need for their outputs to settle; shorter delays
//! read stale bits, longer ones only lower the achievable poll rate.

use std::time::{Duration, Instant};

use tracing::debug;

use super::pad_state::{Snapshot, SNAPSHOT_CYCLES};
use crate::config::PinAssignment;
use crate::gpio::PinController;

/// Time between two clock edges.
pub const EDGE_DELAY: Duration = Duration::from_micros(6);

/// Edges the latch pulse is held for.
const LATCH_HOLD_EDGES: u32 = 2;

#[derive(Debug, Clone, Copy)]
pub struct ShiftRegisterSampler {
    clock: u32,
    latch: u32,
}

impl ShiftRegisterSampler {
    pub fn new(assignment: &PinAssignment) -> Self {
        Self {
            clock: assignment.clock_mask(),
            latch: assignment.latch_mask(),
        }
    }

    /// Latches the pads and clocks out one [`Snapshot`].
    ///
    /// Runs to completion without yielding. It must only be called from the
    /// poll task, which is the single writer of the clock and latch lines.
    pub fn sample<P: PinController + ?Sized>(&self, pins: &mut P) -> Snapshot {
        let mut cycles = [0u32; SNAPSHOT_CYCLES];

        pins.set_high(self.clock | self.latch);
        hold(LATCH_HOLD_EDGES);
        pins.set_low(self.latch);

        for word in cycles.iter_mut() {
            hold(1);
            pins.set_low(self.clock);
            // Lines are active low.
            *word = !pins.read_all();
            hold(1);
            pins.set_high(self.clock);
        }

        debug!("Captured {} shift register cycles", SNAPSHOT_CYCLES);
        Snapshot::new(cycles)
    }
}

/// Busy-waits for `edges` edge delays. Sleeping would hand the thread back to
/// the scheduler and stretch the clock far past what the pads tolerate.
fn hold(edges: u32) {
    let deadline = Instant::now() + EDGE_DELAY * edges;
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}
