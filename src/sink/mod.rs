//! Host input device surface
//!
//! Every pad slot is exposed to the host as one input device with eight
//! buttons and a two-axis digital stick. Registration goes through an
//! [`InputRegistry`], reports through the [`InputSink`] it hands back.
//!
//! - [`channel`] forwards synced frames over a tokio channel
//! - [`memory`] records everything for inspection in tests

pub mod channel;
pub mod memory;

use chrono::{DateTime, Local};

use crate::controller::pad_state::{Axis, Button, PadState, EIGHT_BUTTON_LABELS};

/// Bus type reported for the pads (`BUS_PARPORT`).
pub const BUS_PARPORT: u16 = 0x07;
/// Vendor id reported for every pad device.
pub const VENDOR_ID: u16 = 0x0001;
/// Product id reported for every pad device.
pub const PRODUCT_ID: u16 = 0x0001;
/// Device version, 1.0.
pub const VERSION: u16 = 0x0100;

/// Range of both stick axes.
pub const AXIS_RANGE: (i32, i32) = (-1, 1);

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// No device could be allocated for the slot
    #[error("Failed to allocate input device for slot {slot}: {reason}")]
    Allocation { slot: usize, reason: String },

    /// The host refused to register the device
    #[error("Failed to register input device for slot {slot}: {reason}")]
    Registration { slot: usize, reason: String },

    /// Releasing the device failed; teardown carries on regardless
    #[error("Failed to unregister input device for slot {slot}: {reason}")]
    Unregistration { slot: usize, reason: String },
}

/// Static description of a pad device handed to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub slot: usize,
    pub name: String,
    pub phys: String,
    pub bus_type: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
    pub buttons: Vec<Button>,
    pub axes: Vec<Axis>,
    /// (min, max, fuzz, flat) shared by both axes.
    pub axis_params: (i32, i32, i32, i32),
}

impl DeviceDescriptor {
    pub fn for_slot(name: &str, slot: usize) -> Self {
        Self {
            slot,
            name: name.to_string(),
            phys: format!("input_{}", slot),
            bus_type: BUS_PARPORT,
            vendor: VENDOR_ID,
            product: PRODUCT_ID,
            version: VERSION,
            buttons: EIGHT_BUTTON_LABELS.to_vec(),
            axes: vec![Axis::X, Axis::Y],
            axis_params: (AXIS_RANGE.0, AXIS_RANGE.1, 0, 0),
        }
    }
}

/// Report channel of one registered pad device.
///
/// Reports are buffered until `sync`, which publishes them as one frame.
/// Implementations must not block: they are called from the poll task.
pub trait InputSink: Send {
    fn report_button(&mut self, button: Button, pressed: bool);

    fn report_axis(&mut self, axis: Axis, value: i8);

    fn sync(&mut self);
}

/// Allocates and releases the host devices for pad slots.
///
/// Devices are released by slot, so teardown does not depend on getting the
/// sink back. A sink that outlives its unregistration must stay harmless.
pub trait InputRegistry {
    fn register(&mut self, descriptor: &DeviceDescriptor)
        -> Result<Box<dyn InputSink>, SinkError>;

    fn unregister(&mut self, slot: usize) -> Result<(), SinkError>;
}

/// Reports a full pad state and syncs it.
pub fn emit_state(sink: &mut dyn InputSink, state: &PadState) {
    for (button, pressed) in state.button_reports() {
        sink.report_button(button, pressed);
    }
    sink.report_axis(Axis::X, state.x);
    sink.report_axis(Axis::Y, state.y);
    sink.sync();
}

/// One synced set of reports from a pad device.
#[derive(Debug, Clone)]
pub struct PadFrame {
    pub slot: usize,
    pub buttons: Vec<(Button, bool)>,
    pub x: i8,
    pub y: i8,
    pub timestamp: DateTime<Local>,
}

impl PadFrame {
    pub fn pressed(&self, button: Button) -> bool {
        self.buttons
            .iter()
            .any(|&(label, pressed)| label == button && pressed)
    }

    pub fn is_neutral(&self) -> bool {
        self.x == 0 && self.y == 0 && self.buttons.iter().all(|&(_, pressed)| !pressed)
    }

    /// True if both frames carry the same reports, ignoring the timestamp.
    pub fn same_reports(&self, other: &PadFrame) -> bool {
        self.slot == other.slot
            && self.buttons == other.buttons
            && self.x == other.x
            && self.y == other.y
    }
}

/// Accumulates reports between two syncs.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    slot: usize,
    buttons: Vec<(Button, bool)>,
    x: i8,
    y: i8,
}

impl FrameBuilder {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            buttons: Vec::with_capacity(EIGHT_BUTTON_LABELS.len()),
            x: 0,
            y: 0,
        }
    }

    pub fn button(&mut self, button: Button, pressed: bool) {
        match self.buttons.iter_mut().find(|(label, _)| *label == button) {
            Some(entry) => entry.1 = pressed,
            None => self.buttons.push((button, pressed)),
        }
    }

    pub fn axis(&mut self, axis: Axis, value: i8) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
        }
    }

    /// Closes the current frame. Axis values carry over to the next frame.
    pub fn finish(&mut self) -> PadFrame {
        PadFrame {
            slot: self.slot,
            buttons: std::mem::take(&mut self.buttons),
            x: self.x,
            y: self.y,
            timestamp: Local::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::pad_state::PadKind;

    #[test]
    fn descriptor_carries_device_identity() {
        let descriptor = DeviceDescriptor::for_slot("SNES pad", 3);
        assert_eq!(descriptor.phys, "input_3");
        assert_eq!(descriptor.bus_type, BUS_PARPORT);
        assert_eq!(descriptor.version, 0x0100);
        assert_eq!(descriptor.buttons.len(), 8);
        assert_eq!(descriptor.axis_params, (-1, 1, 0, 0));
    }

    #[test]
    fn builder_keeps_last_report_per_button() {
        let mut builder = FrameBuilder::new(0);
        builder.button(Button::A, true);
        builder.button(Button::A, false);
        builder.axis(Axis::Y, -1);

        let frame = builder.finish();
        assert_eq!(frame.buttons, vec![(Button::A, false)]);
        assert_eq!(frame.y, -1);

        let next = builder.finish();
        assert!(next.buttons.is_empty());
        assert_eq!(next.y, -1);
    }

    #[test]
    fn emit_state_reports_every_label_then_syncs() {
        let mut sink = memory::MemorySink::new(0);
        let log = sink.log();
        let state = PadState {
            kind: PadKind::TwoButton,
            buttons: [false, true, false, false, false, false, false, false],
            x: 1,
            y: 0,
        };

        emit_state(&mut sink, &state);

        let frames = log.frames(0);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].buttons.len(), 8);
        assert!(frames[0].pressed(Button::B));
        assert_eq!(frames[0].x, 1);
    }
}
