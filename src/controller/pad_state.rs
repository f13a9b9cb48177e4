use serde::{Deserialize, Serialize};

/// Clock cycles captured per tick.
pub const SNAPSHOT_CYCLES: usize = 24;

/// Cycles, relative to a pad window, that carry the eight buttons in report order.
pub const BUTTON_CYCLES: [usize; 8] = [0, 1, 2, 3, 8, 9, 10, 11];

/// Buttons a two-button pad actually shifts out. The rest are forced released.
pub const TWO_BUTTON_COUNT: usize = 4;

/// (negative, positive) cycles of the vertical axis, relative to a pad window.
pub const VERTICAL_AXIS_CYCLES: (usize, usize) = (4, 5);

/// (negative, positive) cycles of the horizontal axis, relative to a pad window.
pub const HORIZONTAL_AXIS_CYCLES: (usize, usize) = (6, 7);

/// Absolute cycle whose bit tells an eight-button pad from a two-button pad.
pub const KIND_CYCLE: usize = 16;

/// One tick's worth of shift register output.
///
/// Word `i` holds the lines sampled on clock cycle `i`, with bit `n` set when
/// GPIO `n` was pulled low. A set bit on a data line therefore means "pressed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot([u32; SNAPSHOT_CYCLES]);

impl Default for Snapshot {
    fn default() -> Self {
        Self::neutral()
    }
}

impl Snapshot {
    pub fn new(cycles: [u32; SNAPSHOT_CYCLES]) -> Self {
        Self(cycles)
    }

    /// Snapshot with nothing asserted on any line.
    pub fn neutral() -> Self {
        Self([0; SNAPSHOT_CYCLES])
    }

    /// Word captured on `cycle`. Panics if `cycle` is not below [`SNAPSHOT_CYCLES`].
    pub fn cycle(&self, cycle: usize) -> u32 {
        self.0[cycle]
    }

    pub fn cycles(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    /// Returns a copy with `mask` asserted on `cycle`.
    pub fn with_asserted(mut self, cycle: usize, mask: u32) -> Self {
        self.0[cycle] |= mask;
        self
    }

    /// Returns a copy with `mask` released on `cycle`.
    pub fn with_released(mut self, cycle: usize, mask: u32) -> Self {
        self.0[cycle] &= !mask;
        self
    }

    /// True if any line of `mask` was asserted on `cycle`.
    pub fn asserted(&self, cycle: usize, mask: u32) -> bool {
        self.0[cycle] & mask != 0
    }
}

/// Logical buttons reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Button {
    A,
    B,
    X,
    Y,
    Select,
    Start,
    TriggerLeft,
    TriggerRight,
}

impl Button {
    /// Linux input event code (`BTN_*`).
    pub fn code(self) -> u16 {
        match self {
            Button::A => 0x130,
            Button::B => 0x131,
            Button::X => 0x133,
            Button::Y => 0x134,
            Button::TriggerLeft => 0x136,
            Button::TriggerRight => 0x137,
            Button::Select => 0x13a,
            Button::Start => 0x13b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Linux absolute axis code (`ABS_*`).
    pub fn code(self) -> u16 {
        match self {
            Axis::X => 0x00,
            Axis::Y => 0x01,
        }
    }
}

/// Report labels of a two-button pad, by button position.
pub const TWO_BUTTON_LABELS: [Button; 8] = [
    Button::A,
    Button::B,
    Button::Select,
    Button::Start,
    Button::X,
    Button::Y,
    Button::TriggerLeft,
    Button::TriggerRight,
];

/// Report labels of an eight-button pad, by button position.
pub const EIGHT_BUTTON_LABELS: [Button; 8] = [
    Button::B,
    Button::Y,
    Button::Select,
    Button::Start,
    Button::A,
    Button::X,
    Button::TriggerLeft,
    Button::TriggerRight,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PadKind {
    TwoButton,
    EightButton,
    Disconnected,
}

impl PadKind {
    /// Label of each button position when a pad of this kind reports.
    pub fn labels(self) -> &'static [Button; 8] {
        match self {
            PadKind::TwoButton => &TWO_BUTTON_LABELS,
            PadKind::EightButton | PadKind::Disconnected => &EIGHT_BUTTON_LABELS,
        }
    }
}

/// Decoded state of one pad slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadState {
    pub kind: PadKind,
    /// Pressed flags by button position, see [`PadKind::labels`].
    pub buttons: [bool; 8],
    /// Horizontal axis, -1 left, +1 right.
    pub x: i8,
    /// Vertical axis, -1 up, +1 down.
    pub y: i8,
}

impl Default for PadState {
    fn default() -> Self {
        Self::disconnected()
    }
}

impl PadState {
    /// All buttons released and the stick centred.
    pub fn disconnected() -> Self {
        Self {
            kind: PadKind::Disconnected,
            buttons: [false; 8],
            x: 0,
            y: 0,
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.x == 0 && self.y == 0 && self.buttons.iter().all(|pressed| !pressed)
    }

    /// (label, pressed) pairs in report order.
    pub fn button_reports(&self) -> impl Iterator<Item = (Button, bool)> + '_ {
        self.kind
            .labels()
            .iter()
            .copied()
            .zip(self.buttons.iter().copied())
    }

    /// Pressed flag of a labelled button, false if the layout has no such button.
    pub fn pressed(&self, button: Button) -> bool {
        self.button_reports()
            .any(|(label, pressed)| label == button && pressed)
    }
}
