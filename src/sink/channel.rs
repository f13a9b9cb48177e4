//! Frames over a tokio channel
//!
//! Each registered device gets a [`ChannelSink`] that turns its reports into
//! [`PadFrame`]s on one shared mpsc channel. The binary drains that channel
//! and logs what changed.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::{DeviceDescriptor, FrameBuilder, InputRegistry, InputSink, PadFrame, SinkError};
use crate::controller::pad_state::{Axis, Button};

/// Sink that publishes every synced frame on an mpsc channel.
///
/// Sending never blocks the poll task. When the receiver falls behind, frames
/// with anything held are dropped with a warning. A neutral frame is queued
/// on a separate task instead, so a release such as the clear of a dropped
/// slot always arrives, possibly after frames sent later.
pub struct ChannelSink {
    builder: FrameBuilder,
    sender: mpsc::Sender<PadFrame>,
}

impl ChannelSink {
    fn send_later(&self, frame: PadFrame) {
        let slot = frame.slot;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Dropping neutral frame of slot {}: no runtime", slot);
            return;
        };

        debug!("Channel full, queueing neutral frame of slot {}", slot);
        let sender = self.sender.clone();
        runtime.spawn(async move {
            if sender.send(frame).await.is_err() {
                debug!("Frame channel closed before neutral frame of slot {}", slot);
            }
        });
    }
}

impl InputSink for ChannelSink {
    fn report_button(&mut self, button: Button, pressed: bool) {
        self.builder.button(button, pressed);
    }

    fn report_axis(&mut self, axis: Axis, value: i8) {
        self.builder.axis(axis, value);
    }

    fn sync(&mut self) {
        let frame = self.builder.finish();
        let slot = frame.slot;
        match self.sender.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) if frame.is_neutral() => self.send_later(frame),
            Err(e) => warn!("Dropping frame of slot {}: {}", slot, e),
        }
    }
}

/// Registry handing out [`ChannelSink`]s that share one channel.
pub struct ChannelRegistry {
    sender: mpsc::Sender<PadFrame>,
    devices: Vec<DeviceDescriptor>,
}

impl ChannelRegistry {
    pub fn new(sender: mpsc::Sender<PadFrame>) -> Self {
        Self {
            sender,
            devices: Vec::new(),
        }
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }
}

impl InputRegistry for ChannelRegistry {
    fn register(
        &mut self,
        descriptor: &DeviceDescriptor,
    ) -> Result<Box<dyn InputSink>, SinkError> {
        if self.sender.is_closed() {
            return Err(SinkError::Registration {
                slot: descriptor.slot,
                reason: "frame channel closed".to_string(),
            });
        }

        info!(
            "Registered input device '{}' at {}",
            descriptor.name, descriptor.phys
        );
        self.devices.push(descriptor.clone());
        Ok(Box::new(ChannelSink {
            builder: FrameBuilder::new(descriptor.slot),
            sender: self.sender.clone(),
        }))
    }

    fn unregister(&mut self, slot: usize) -> Result<(), SinkError> {
        self.devices.retain(|d| d.slot != slot);
        debug!("Unregistered input device of slot {}", slot);
        Ok(())
    }
}
