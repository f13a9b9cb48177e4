//! Mapping of snapshot bits to pad state
//!
//! A pad occupies an 8-cycle window per report half: buttons on cycles
//! 0..4 and 8..12, the d-pad on 4..8. Two-button pads only shift out the
//! first half; the classification bit on cycle 16 tells the kinds apart.

use super::pad_state::{
    PadKind, PadState, Snapshot, BUTTON_CYCLES, HORIZONTAL_AXIS_CYCLES, KIND_CYCLE,
    TWO_BUTTON_COUNT, VERTICAL_AXIS_CYCLES,
};

/// Classifies the pad on `line_mask` and decodes it at `window_offset`.
pub fn decode(line_mask: u32, snapshot: &Snapshot, window_offset: usize) -> PadState {
    decode_as(classify(line_mask, snapshot), line_mask, snapshot, window_offset)
}

/// Kind of the pad on `line_mask`.
///
/// The masked word is compared against the literal value 1, not tested for
/// being non-zero. Only a data line on GPIO 0 can ever produce that value.
pub fn classify(line_mask: u32, snapshot: &Snapshot) -> PadKind {
    if snapshot.cycle(KIND_CYCLE) & line_mask == 1 {
        PadKind::EightButton
    } else {
        PadKind::TwoButton
    }
}

/// Decodes the pad on `line_mask` as a pad of `kind`, skipping classification.
pub fn decode_as(
    kind: PadKind,
    line_mask: u32,
    snapshot: &Snapshot,
    window_offset: usize,
) -> PadState {
    let button_count = match kind {
        PadKind::EightButton => BUTTON_CYCLES.len(),
        PadKind::TwoButton => TWO_BUTTON_COUNT,
        PadKind::Disconnected => return PadState::disconnected(),
    };

    let mut buttons = [false; 8];
    for (pressed, &cycle) in buttons.iter_mut().zip(BUTTON_CYCLES.iter()).take(button_count) {
        *pressed = snapshot.asserted(window_offset + cycle, line_mask);
    }

    PadState {
        kind,
        buttons,
        x: read_axis(snapshot, line_mask, window_offset, HORIZONTAL_AXIS_CYCLES),
        y: read_axis(snapshot, line_mask, window_offset, VERTICAL_AXIS_CYCLES),
    }
}

fn read_axis(
    snapshot: &Snapshot,
    line_mask: u32,
    window_offset: usize,
    (negative, positive): (usize, usize),
) -> i8 {
    axis_value(
        snapshot.asserted(window_offset + negative, line_mask),
        snapshot.asserted(window_offset + positive, line_mask),
    )
}

/// Tri-state axis from the two direction flags. Both pressed reads as centred.
pub fn axis_value(negative_pressed: bool, positive_pressed: bool) -> i8 {
    i8::from(!negative_pressed) - i8::from(!positive_pressed)
}
