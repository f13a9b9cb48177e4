//! Property-based tests for the pad protocol.
//!
//! Covers the adapter signature match, pad classification, axis decoding,
//! slot counts and the one-shot clearing of dropped slots.

use proptest::prelude::*;
use snescon::config::{DriverConfig, PinAssignment};
use snescon::controller::adapter_probe::{signature_snapshot, AdapterProbe, SIGNATURE_START};
use snescon::controller::decoder::{axis_value, classify, decode};
use snescon::controller::pad_state::{PadKind, Snapshot, KIND_CYCLE, SNAPSHOT_CYCLES};
use snescon::controller::PadOrchestrator;
use snescon::sink::memory::{MemoryLog, MemorySink};
use snescon::sink::InputSink;
use tokio::sync::watch;

fn distinct_pins(len: usize) -> impl Strategy<Value = Vec<u8>> {
    Just((0u8..=27).collect::<Vec<u8>>())
        .prop_shuffle()
        .prop_map(move |pins| pins[..len].to_vec())
}

fn any_snapshot() -> impl Strategy<Value = Snapshot> {
    proptest::array::uniform24(any::<u32>()).prop_map(Snapshot::new)
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    /// Flipping any single signature bit on either port breaks detection.
    #[test]
    fn prop_single_bit_flip_breaks_signature(
        cycle in 0usize..8,
        second_port in any::<bool>(),
        pins in distinct_pins(4),
    ) {
        let assignment = PinAssignment::new(pins).unwrap();
        let masks = assignment.data_masks();
        let probe = AdapterProbe::new(&assignment).unwrap();
        let signature = signature_snapshot(masks[0], masks[1]);
        prop_assert!(probe.detect(&signature));

        let cycle = SIGNATURE_START + cycle;
        let mask = if second_port { masks[1] } else { masks[0] };
        let flipped = if signature.asserted(cycle, mask) {
            signature.with_released(cycle, mask)
        } else {
            signature.with_asserted(cycle, mask)
        };
        prop_assert!(!probe.detect(&flipped));
    }

    /// Bits outside the signature window and outside the two ports never matter.
    #[test]
    fn prop_signature_ignores_other_bits(
        noise in any_snapshot(),
        pins in distinct_pins(4),
    ) {
        let assignment = PinAssignment::new(pins).unwrap();
        let masks = assignment.data_masks();
        let ports = masks[0] | masks[1];
        let probe = AdapterProbe::new(&assignment).unwrap();

        let mut cycles = [0u32; SNAPSHOT_CYCLES];
        let signature = signature_snapshot(masks[0], masks[1]);
        for (i, word) in cycles.iter_mut().enumerate() {
            let noise = noise.cycle(i);
            *word = if i >= SIGNATURE_START {
                (noise & !ports) | signature.cycle(i)
            } else {
                noise
            };
        }
        prop_assert!(probe.detect(&Snapshot::new(cycles)));
    }

    /// Classification is EightButton exactly when the masked word equals 1.
    #[test]
    fn prop_classification_is_literal_one(word in any::<u32>(), pin in 0u8..=27) {
        let mask = 1u32 << pin;
        let snapshot = Snapshot::neutral().with_asserted(KIND_CYCLE, word);
        let expected = if word & mask == 1 {
            PadKind::EightButton
        } else {
            PadKind::TwoButton
        };
        prop_assert_eq!(classify(mask, &snapshot), expected);
        if pin != 0 && word & mask != 0 {
            prop_assert_eq!(classify(mask, &snapshot), PadKind::TwoButton);
        }
    }

    /// Decoded axes are always within -1..=1 and two-button extras stay released.
    #[test]
    fn prop_decoded_state_is_well_formed(snapshot in any_snapshot(), pin in 0u8..=27) {
        let state = decode(1 << pin, &snapshot, 0);
        prop_assert!((-1..=1).contains(&state.x));
        prop_assert!((-1..=1).contains(&state.y));
        if state.kind == PadKind::TwoButton {
            prop_assert!(state.buttons[4..].iter().all(|pressed| !pressed));
        }
    }

    /// Direct mode serves one slot per data line.
    #[test]
    fn prop_direct_mode_slot_count(len in 3usize..=7, seed in any::<u64>()) {
        let pins: Vec<u8> = (0..len as u8).map(|i| (i + (seed % 21) as u8) % 28).collect();
        let assignment = DriverConfig {
            pin_assignment: pins,
            ..DriverConfig::default()
        }
        .validate()
        .unwrap();

        let (mut orchestrator, _log) = orchestrator(&assignment, false);
        orchestrator.apply(&Snapshot::neutral());
        prop_assert_eq!(orchestrator.active_slots(), len - 2);
    }

    /// With the adapter seen, four slots are served regardless of the line count.
    #[test]
    fn prop_adapter_mode_slot_count(pins in (4usize..=7).prop_flat_map(distinct_pins)) {
        let assignment = PinAssignment::new(pins).unwrap();
        let masks = assignment.data_masks();
        let (mut orchestrator, _log) = orchestrator(&assignment, true);

        orchestrator.apply(&signature_snapshot(masks[0], masks[1]));
        prop_assert_eq!(orchestrator.active_slots(), 4);
    }

    /// Every slot that drops out gets exactly one extra report, once.
    #[test]
    fn prop_dropped_slots_cleared_once(adapter_ticks in proptest::collection::vec(any::<bool>(), 1..20)) {
        let assignment = PinAssignment::new(vec![2, 3, 4, 7, 9, 10, 11]).unwrap();
        let masks = assignment.data_masks();
        let (mut orchestrator, log) = orchestrator(&assignment, true);
        let signature = signature_snapshot(masks[0], masks[1]);
        let neutral = Snapshot::neutral();

        let mut expected = [0usize; 5];
        let mut previous = 0usize;
        for adapter in adapter_ticks {
            let served = if adapter { 4 } else { 5 };
            orchestrator.apply(if adapter { &signature } else { &neutral });

            for (slot, count) in expected.iter_mut().enumerate() {
                if slot < served || slot < previous {
                    *count += 1;
                }
            }
            previous = served;
        }

        for (slot, count) in expected.iter().enumerate() {
            prop_assert_eq!(log.frame_count(slot), *count, "slot {}", slot);
        }
    }
}

#[test]
fn axis_truth_table() {
    assert_eq!(axis_value(false, false), 0);
    assert_eq!(axis_value(false, true), 1);
    assert_eq!(axis_value(true, false), -1);
    assert_eq!(axis_value(true, true), 0);
}

#[test]
fn neutral_snapshot_decodes_released_on_every_line() {
    for pin in 0u8..=27 {
        let state = decode(1 << pin, &Snapshot::neutral(), 0);
        assert!(state.is_neutral(), "GPIO {}", pin);
    }
}

fn orchestrator(assignment: &PinAssignment, adapter: bool) -> (PadOrchestrator, MemoryLog) {
    let log = MemoryLog::default();
    let sinks: Vec<Box<dyn InputSink>> = (0..assignment.slot_count())
        .map(|slot| Box::new(MemorySink::with_log(slot, log.clone())) as Box<dyn InputSink>)
        .collect();
    let (tx, rx) = watch::channel(adapter);
    // The flag keeps its last value after the sender is gone.
    drop(tx);
    let orchestrator = PadOrchestrator::new(
        assignment,
        Box::new(snescon::gpio::fake::FakePins::new()),
        sinks,
        rx,
    );
    (orchestrator, log)
}
