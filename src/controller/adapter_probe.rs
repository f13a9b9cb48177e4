//! Detection of the four-player multiplexing adapter
//!
//! With the adapter attached, each of the first two data lines carries two
//! pads back to back (cycles 0..8 and 8..16), and cycles 16..24 shift out a
//! fixed ID signature. The signature is what tells the adapter apart from
//! two plain pads.

use super::pad_state::Snapshot;
use crate::config::PinAssignment;

/// First cycle of the ID signature.
pub const SIGNATURE_START: usize = 16;

/// Expected (first port, second port) asserted flags on cycles 16..24.
pub const ADAPTER_SIGNATURE: [(bool, bool); 8] = [
    (false, false),
    (false, false),
    (false, true),
    (true, false),
    (false, false),
    (false, false),
    (false, false),
    (false, false),
];

/// Where an adapter slot is found in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterWindow {
    /// Index into the data lines of the pin assignment.
    pub data_line: usize,
    /// Offset of the slot's 8-cycle window.
    pub offset: usize,
}

/// Slot layout behind the adapter. Slots 2 and 3 ride on the same lines as
/// slots 0 and 1, one window later.
pub const ADAPTER_WINDOWS: [AdapterWindow; 4] = [
    AdapterWindow { data_line: 0, offset: 0 },
    AdapterWindow { data_line: 1, offset: 0 },
    AdapterWindow { data_line: 0, offset: 8 },
    AdapterWindow { data_line: 1, offset: 8 },
];

/// Number of slots served while the adapter is attached.
pub const ADAPTER_SLOTS: usize = ADAPTER_WINDOWS.len();

#[derive(Debug, Clone, Copy)]
pub struct AdapterProbe {
    first: u32,
    second: u32,
}

impl AdapterProbe {
    /// Probe over the first two data lines, `None` if there are fewer than two.
    pub fn new(assignment: &PinAssignment) -> Option<Self> {
        let masks = assignment.data_masks();
        match masks.as_slice() {
            [first, second, ..] => Some(Self {
                first: *first,
                second: *second,
            }),
            _ => None,
        }
    }

    /// True only if every signature cycle matches on both lines.
    pub fn detect(&self, snapshot: &Snapshot) -> bool {
        ADAPTER_SIGNATURE
            .iter()
            .enumerate()
            .all(|(i, &(first, second))| {
                let cycle = SIGNATURE_START + i;
                snapshot.asserted(cycle, self.first) == first
                    && snapshot.asserted(cycle, self.second) == second
            })
    }
}

/// Snapshot carrying the adapter signature on `first`/`second` and nothing else.
pub fn signature_snapshot(first: u32, second: u32) -> Snapshot {
    ADAPTER_SIGNATURE
        .iter()
        .enumerate()
        .fold(Snapshot::neutral(), |snapshot, (i, &(a, b))| {
            let cycle = SIGNATURE_START + i;
            let snapshot = if a {
                snapshot.with_asserted(cycle, first)
            } else {
                snapshot
            };
            if b {
                snapshot.with_asserted(cycle, second)
            } else {
                snapshot
            }
        })
}
