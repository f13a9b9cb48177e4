//! Recording sink and registry
//!
//! Every synced frame and every (un)registration ends up in a shared
//! [`MemoryLog`]. The registry can be told to fail a given registration to
//! exercise the startup rollback path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{DeviceDescriptor, FrameBuilder, InputRegistry, InputSink, PadFrame, SinkError};
use crate::controller::pad_state::{Axis, Button};

#[derive(Debug, Default)]
struct LogInner {
    frames: HashMap<usize, Vec<PadFrame>>,
    registered: Vec<DeviceDescriptor>,
    unregistered: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    inner: Arc<Mutex<LogInner>>,
}

impl MemoryLog {
    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Frames synced by `slot`, oldest first.
    pub fn frames(&self, slot: usize) -> Vec<PadFrame> {
        self.lock().frames.get(&slot).cloned().unwrap_or_default()
    }

    pub fn frame_count(&self, slot: usize) -> usize {
        self.lock().frames.get(&slot).map_or(0, Vec::len)
    }

    pub fn last_frame(&self, slot: usize) -> Option<PadFrame> {
        self.lock()
            .frames
            .get(&slot)
            .and_then(|frames| frames.last().cloned())
    }

    pub fn clear_frames(&self) {
        self.lock().frames.clear();
    }

    /// Descriptors of devices currently registered.
    pub fn registered(&self) -> Vec<DeviceDescriptor> {
        self.lock().registered.clone()
    }

    /// Slots unregistered so far, in order.
    pub fn unregistered(&self) -> Vec<usize> {
        self.lock().unregistered.clone()
    }

    fn push_frame(&self, frame: PadFrame) {
        self.lock().frames.entry(frame.slot).or_default().push(frame);
    }
}

pub struct MemorySink {
    builder: FrameBuilder,
    log: MemoryLog,
}

impl MemorySink {
    pub fn new(slot: usize) -> Self {
        Self::with_log(slot, MemoryLog::default())
    }

    pub fn with_log(slot: usize, log: MemoryLog) -> Self {
        Self {
            builder: FrameBuilder::new(slot),
            log,
        }
    }

    pub fn log(&self) -> MemoryLog {
        self.log.clone()
    }
}

impl InputSink for MemorySink {
    fn report_button(&mut self, button: Button, pressed: bool) {
        self.builder.button(button, pressed);
    }

    fn report_axis(&mut self, axis: Axis, value: i8) {
        self.builder.axis(axis, value);
    }

    fn sync(&mut self) {
        let frame = self.builder.finish();
        self.log.push_frame(frame);
    }
}

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    log: MemoryLog,
    fail_register_slot: Option<usize>,
    fail_unregister: bool,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> MemoryLog {
        self.log.clone()
    }

    /// Makes registration of `slot` fail with an allocation error.
    pub fn fail_register_at(mut self, slot: usize) -> Self {
        self.fail_register_slot = Some(slot);
        self
    }

    /// Makes every unregistration report an error after releasing the device.
    pub fn fail_unregister(mut self) -> Self {
        self.fail_unregister = true;
        self
    }
}

impl InputRegistry for MemoryRegistry {
    fn register(
        &mut self,
        descriptor: &DeviceDescriptor,
    ) -> Result<Box<dyn InputSink>, SinkError> {
        if self.fail_register_slot == Some(descriptor.slot) {
            return Err(SinkError::Allocation {
                slot: descriptor.slot,
                reason: "injected failure".to_string(),
            });
        }

        self.log.lock().registered.push(descriptor.clone());
        Ok(Box::new(MemorySink::with_log(
            descriptor.slot,
            self.log.clone(),
        )))
    }

    fn unregister(&mut self, slot: usize) -> Result<(), SinkError> {
        {
            let mut inner = self.log.lock();
            inner.registered.retain(|d| d.slot != slot);
            inner.unregistered.push(slot);
        }

        if self.fail_unregister {
            return Err(SinkError::Unregistration {
                slot,
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}
