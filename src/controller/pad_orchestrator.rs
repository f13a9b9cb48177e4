//! Per-tick sample, detect, decode and emit
//!
//! # Modes
//!
//! ```text
//!              adapter flag on and signature seen
//!   Direct ──────────────────────────────────────► Adapter
//!   (one pad per data line,                        (4 two-button pads on
//!    kind picked per tick)  ◄────────────────────   data lines 1 and 2)
//!                           otherwise
//! ```
//!
//! The mode is re-evaluated on every tick. When a tick serves fewer slots
//! than the previous one, each slot that dropped out gets exactly one
//! neutral report so the host does not keep stale buttons held.

use tokio::sync::watch;
use tracing::{debug, info};

use super::adapter_probe::{AdapterProbe, ADAPTER_SLOTS, ADAPTER_WINDOWS};
use super::decoder::{decode, decode_as};
use super::pad_state::{PadKind, PadState, Snapshot};
use super::sampler::ShiftRegisterSampler;
use crate::config::PinAssignment;
use crate::gpio::PinController;
use crate::sink::{emit_state, InputSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    Direct,
    Adapter,
}

pub struct PadOrchestrator {
    pins: Box<dyn PinController>,
    sampler: ShiftRegisterSampler,
    probe: Option<AdapterProbe>,
    data_masks: Vec<u32>,
    sinks: Vec<Box<dyn InputSink>>,
    adapter_enabled: watch::Receiver<bool>,
    states: Vec<PadState>,
    active_slots: usize,
    mode: Option<PollMode>,
}

impl PadOrchestrator {
    /// `sinks[i]` receives the reports of slot `i`. Slots without a sink are
    /// decoded but not reported.
    pub fn new(
        assignment: &PinAssignment,
        pins: Box<dyn PinController>,
        sinks: Vec<Box<dyn InputSink>>,
        adapter_enabled: watch::Receiver<bool>,
    ) -> Self {
        let slots = sinks.len().max(assignment.slot_count());
        Self {
            pins,
            sampler: ShiftRegisterSampler::new(assignment),
            probe: AdapterProbe::new(assignment),
            data_masks: assignment.data_masks(),
            sinks,
            adapter_enabled,
            states: vec![PadState::disconnected(); slots],
            active_slots: 0,
            mode: None,
        }
    }

    /// Slots reported on the last tick.
    pub fn active_slots(&self) -> usize {
        self.active_slots
    }

    pub fn mode(&self) -> Option<PollMode> {
        self.mode
    }

    /// Last state of every slot, active or not.
    pub fn states(&self) -> &[PadState] {
        &self.states
    }

    /// Runs one tick.
    pub fn update(&mut self) {
        let snapshot = self.sampler.sample(&mut self.pins);
        self.apply(&snapshot);
    }

    /// Decodes and reports an already captured snapshot.
    pub fn apply(&mut self, snapshot: &Snapshot) {
        // Read on every tick: the flag may be flipped at any time.
        let adapter_enabled = *self.adapter_enabled.borrow();
        let adapter_seen = adapter_enabled
            && self.sinks.len() >= ADAPTER_SLOTS
            && self.probe.is_some_and(|probe| probe.detect(snapshot));

        let (mode, served) = if adapter_seen {
            (PollMode::Adapter, self.update_adapter(snapshot))
        } else {
            (PollMode::Direct, self.update_direct(snapshot))
        };

        if self.mode != Some(mode) {
            info!("Polling in {:?} mode with {} slots", mode, served);
            self.mode = Some(mode);
        }

        if served < self.active_slots {
            info!(
                "Active slots dropped from {} to {}, clearing the rest",
                self.active_slots, served
            );
            for slot in served..self.active_slots {
                self.clear(slot);
            }
        }
        self.active_slots = served;
    }

    fn update_adapter(&mut self, snapshot: &Snapshot) -> usize {
        for (slot, window) in ADAPTER_WINDOWS.iter().enumerate() {
            let mask = self.data_masks[window.data_line];
            let state = decode_as(PadKind::TwoButton, mask, snapshot, window.offset);
            self.publish(slot, state);
        }
        ADAPTER_SLOTS
    }

    fn update_direct(&mut self, snapshot: &Snapshot) -> usize {
        for slot in 0..self.data_masks.len() {
            let state = decode(self.data_masks[slot], snapshot, 0);
            self.publish(slot, state);
        }
        self.data_masks.len()
    }

    fn publish(&mut self, slot: usize, state: PadState) {
        if let Some(previous) = self.states.get_mut(slot) {
            if previous.kind != state.kind {
                debug!("Slot {} changed from {:?} to {:?}", slot, previous.kind, state.kind);
            }
            *previous = state;
        }
        if let Some(sink) = self.sinks.get_mut(slot) {
            emit_state(sink.as_mut(), &state);
        }
    }

    fn clear(&mut self, slot: usize) {
        self.publish(slot, PadState::disconnected());
    }

    /// Releases the pins and sinks, e.g. for teardown.
    pub fn into_parts(self) -> (Box<dyn PinController>, Vec<Box<dyn InputSink>>) {
        (self.pins, self.sinks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::adapter_probe::signature_snapshot;
    use crate::controller::pad_state::{Button, KIND_CYCLE};
    use crate::gpio::fake::FakePins;
    use crate::sink::memory::{MemoryLog, MemorySink};

    fn orchestrator(
        pins: Vec<u8>,
        adapter: bool,
    ) -> (PadOrchestrator, FakePins, MemoryLog, watch::Sender<bool>) {
        let assignment = PinAssignment::new(pins).unwrap();
        let fake = FakePins::new();
        let log = MemoryLog::default();
        let sinks = (0..assignment.slot_count())
            .map(|slot| Box::new(MemorySink::with_log(slot, log.clone())) as Box<dyn InputSink>)
            .collect();
        let (tx, rx) = watch::channel(adapter);
        let orchestrator = PadOrchestrator::new(&assignment, Box::new(fake.clone()), sinks, rx);
        (orchestrator, fake, log, tx)
    }

    #[test]
    fn direct_mode_reports_one_slot_per_data_line() {
        let (mut orch, fake, log, _tx) = orchestrator(vec![2, 3, 4, 7, 9, 10, 11], false);
        fake.push_snapshot(&Snapshot::neutral().with_asserted(0, 1 << 9));

        orch.update();

        assert_eq!(orch.active_slots(), 5);
        assert_eq!(orch.mode(), Some(PollMode::Direct));
        for slot in 0..5 {
            assert_eq!(log.frame_count(slot), 1);
        }
        assert!(log.last_frame(2).unwrap().pressed(Button::A));
        assert!(log.last_frame(0).unwrap().is_neutral());
    }

    #[test]
    fn adapter_mode_serves_four_two_button_slots() {
        let (mut orch, _fake, log, _tx) = orchestrator(vec![2, 3, 4, 7], true);
        let first = 1 << 4;
        let second = 1 << 7;
        let snapshot = signature_snapshot(first, second)
            .with_asserted(0, first)
            .with_asserted(9, second)
            .with_asserted(13, first);

        orch.apply(&snapshot);

        assert_eq!(orch.mode(), Some(PollMode::Adapter));
        assert_eq!(orch.active_slots(), 4);
        assert!(orch.states().iter().take(4).all(|s| s.kind == PadKind::TwoButton));
        assert!(log.last_frame(0).unwrap().pressed(Button::A));
        assert!(log.last_frame(3).unwrap().pressed(Button::B));
        assert_eq!(log.last_frame(2).unwrap().y, 1);
        assert!(log.last_frame(1).unwrap().is_neutral());
    }

    #[test]
    fn adapter_signature_ignored_while_disabled() {
        let (mut orch, _fake, log, _tx) = orchestrator(vec![2, 3, 4, 7], false);
        orch.apply(&signature_snapshot(1 << 4, 1 << 7));

        assert_eq!(orch.mode(), Some(PollMode::Direct));
        assert_eq!(orch.active_slots(), 2);
        assert_eq!(log.frame_count(2), 0);
    }

    #[test]
    fn flag_is_read_on_every_tick() {
        let (mut orch, _fake, _log, tx) = orchestrator(vec![2, 3, 4, 7], false);
        let snapshot = signature_snapshot(1 << 4, 1 << 7);

        orch.apply(&snapshot);
        assert_eq!(orch.active_slots(), 2);

        tx.send_replace(true);
        orch.apply(&snapshot);
        assert_eq!(orch.active_slots(), 4);
    }

    #[test]
    fn leaving_adapter_mode_clears_dropped_slots_once() {
        let (mut orch, _fake, log, _tx) = orchestrator(vec![2, 3, 4, 7], true);
        let first = 1 << 4;
        let second = 1 << 7;
        orch.apply(&signature_snapshot(first, second).with_asserted(8, first));
        assert!(log.last_frame(2).unwrap().pressed(Button::A));

        orch.apply(&Snapshot::neutral());
        assert_eq!(orch.active_slots(), 2);
        assert_eq!(log.frame_count(2), 2);
        assert_eq!(log.frame_count(3), 2);
        assert!(log.last_frame(2).unwrap().is_neutral());

        orch.apply(&Snapshot::neutral());
        assert_eq!(log.frame_count(2), 2);
        assert_eq!(log.frame_count(3), 2);
    }

    #[test]
    fn entering_adapter_mode_clears_fifth_slot() {
        let (mut orch, _fake, log, _tx) = orchestrator(vec![2, 3, 4, 7, 9, 10, 11], true);
        orch.apply(&Snapshot::neutral());
        assert_eq!(orch.active_slots(), 5);

        orch.apply(&signature_snapshot(1 << 4, 1 << 7));
        assert_eq!(orch.active_slots(), 4);
        assert_eq!(log.frame_count(4), 2);

        orch.apply(&signature_snapshot(1 << 4, 1 << 7));
        assert_eq!(log.frame_count(4), 2);
    }

    #[test]
    fn kind_is_chosen_per_tick_per_line() {
        let (mut orch, _fake, _log, _tx) = orchestrator(vec![2, 3, 0, 7], false);

        orch.apply(&Snapshot::neutral().with_asserted(KIND_CYCLE, 1));
        assert_eq!(orch.states()[0].kind, PadKind::EightButton);
        assert_eq!(orch.states()[1].kind, PadKind::TwoButton);

        orch.apply(&Snapshot::neutral());
        assert_eq!(orch.states()[0].kind, PadKind::TwoButton);
    }
}
