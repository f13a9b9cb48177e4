//! Controller Handle - startup and teardown of the pad driver
//!
//! Startup runs through a small typestate machine so the steps cannot be
//! reordered:
//!
//! ```text
//! DriverConfig ──validate──► PadDriver<Validated> ──acquire GPIO + register──► PadDriver<Registered> ──start──► ControllerHandle
//! ```
//!
//! Any failure before `start` leaves nothing behind: devices registered so
//! far are unregistered again and the pins are released.

use statum::{machine, state};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::pad_orchestrator::PadOrchestrator;
use super::poll_scheduler::{PollError, PollScheduler};
use crate::config::{ConfigError, DriverConfig, PinAssignment};
use crate::gpio::PinController;
use crate::sink::{DeviceDescriptor, InputRegistry, InputSink, SinkError};

/// Errors that can occur while starting or driving the pads
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Pin assignment rejected at startup
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The GPIO register window could not be mapped or a pin claimed
    #[error("GPIO unavailable: {0}")]
    GpioUnavailable(String),

    /// A pad device could not be allocated or registered
    #[error("Input device error: {0}")]
    Sink(#[from] SinkError),

    /// Opening a slot failed, see [`PollError`]
    #[error("Poller error: {0}")]
    Poll(#[from] PollError),

    /// Slot index beyond the registered devices
    #[error("No pad slot {0}")]
    UnknownSlot(usize),
}

#[state]
#[derive(Debug, Clone)]
pub enum DriverState {
    Validated,
    Registered,
}

#[machine]
pub struct PadDriver<S: DriverState> {
    config: DriverConfig,
    assignment: PinAssignment,
    pins: Option<Box<dyn PinController>>,
    sinks: Vec<Box<dyn InputSink>>,
}

impl<S: DriverState> PadDriver<S> {
    pub fn assignment(&self) -> &PinAssignment {
        &self.assignment
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
}

impl PadDriver<Validated> {
    /// Validates `config`. Nothing is touched if this fails.
    pub fn create(config: DriverConfig) -> Result<Self, DriverError> {
        let assignment = match config.validate() {
            Ok(a) => a,
            Err(e) => {
                error!("Rejecting configuration: {}", e);
                return Err(e.into());
            }
        };
        debug!(
            "Validated pins {:?}, adapter enabled: {}",
            assignment.pins(),
            config.adapter_enabled
        );

        Ok(Self::new(config, assignment, None, Vec::new()))
    }

    /// Registers one device per slot, then configures the pins.
    ///
    /// On failure every device registered so far is unregistered again.
    pub fn register(
        mut self,
        pins: Box<dyn PinController>,
        registry: &mut dyn InputRegistry,
    ) -> Result<PadDriver<Registered>, DriverError> {
        let slots = self.assignment.slot_count();
        info!("Registering {} pad devices", slots);

        for slot in 0..slots {
            let descriptor = DeviceDescriptor::for_slot(&self.config.device_name, slot);
            match registry.register(&descriptor) {
                Ok(sink) => self.sinks.push(sink),
                Err(e) => {
                    error!("Could not register device no {}: {}", slot, e);
                    let registered = std::mem::take(&mut self.sinks).len();
                    unregister_all(registered, registry);
                    return Err(e.into());
                }
            }
        }

        self.pins = Some(pins);
        self.setup_pins();
        Ok(self.transition())
    }

    fn setup_pins(&mut self) {
        let Some(pins) = self.pins.as_mut() else {
            return;
        };

        for pin in [self.assignment.clock(), self.assignment.latch()] {
            pins.configure_output(pin);
        }
        pins.set_low(self.assignment.clock_mask() | self.assignment.latch_mask());

        for &pin in self.assignment.data_pins() {
            pins.configure_input(pin);
            pins.enable_pull_up(pin);
        }
        debug!("GPIO lines configured");
    }
}

impl PadDriver<Registered> {
    /// Hands pins and devices to the poller. Polling begins with the first open.
    pub fn start(self) -> Result<ControllerHandle, DriverError> {
        let pins = self.pins.ok_or_else(|| {
            DriverError::GpioUnavailable("pins were not attached".to_string())
        })?;

        let (adapter_tx, adapter_rx) = watch::channel(self.config.adapter_enabled);
        let slots = self.sinks.len();
        let orchestrator = PadOrchestrator::new(&self.assignment, pins, self.sinks, adapter_rx);

        info!("Loaded pad driver with {} slots", slots);
        Ok(ControllerHandle {
            scheduler: PollScheduler::new(orchestrator),
            adapter_tx,
            assignment: self.assignment,
            slots,
        })
    }
}

/// Unregisters slots `0..slots`, logging and skipping failures.
fn unregister_all(slots: usize, registry: &mut dyn InputRegistry) {
    for slot in 0..slots {
        if let Err(e) = registry.unregister(slot) {
            warn!("Ignoring unregister failure of slot {}: {}", slot, e);
        }
    }
}

/// Running pad driver.
///
/// Each registered pad device forwards its open/close callbacks to
/// [`open`](Self::open) and [`close`](Self::close).
pub struct ControllerHandle {
    scheduler: PollScheduler,
    adapter_tx: watch::Sender<bool>,
    assignment: PinAssignment,
    slots: usize,
}

impl ControllerHandle {
    /// Runs the complete startup sequence.
    ///
    /// `acquire_pins` is only called once the configuration has been
    /// validated. If registration fails afterwards, the pins it returned are
    /// dropped again.
    pub fn spawn<F>(
        config: DriverConfig,
        acquire_pins: F,
        registry: &mut dyn InputRegistry,
    ) -> Result<Self, DriverError>
    where
        F: FnOnce(&PinAssignment) -> Result<Box<dyn PinController>, DriverError>,
    {
        info!("Initializing pad driver with config: {:?}", config);

        let driver = PadDriver::create(config)?;
        let pins = match acquire_pins(driver.assignment()) {
            Ok(p) => p,
            Err(e) => {
                error!("Setup of the GPIO handler failed: {}", e);
                return Err(e);
            }
        };

        driver.register(pins, registry)?.start()
    }

    pub fn slot_count(&self) -> usize {
        self.slots
    }

    pub fn assignment(&self) -> &PinAssignment {
        &self.assignment
    }

    pub async fn open(&self, slot: usize) -> Result<(), DriverError> {
        self.check_slot(slot)?;
        Ok(self.scheduler.open(slot).await?)
    }

    /// Open that gives up without side effects once `interrupt` is cancelled.
    pub async fn open_until(
        &self,
        slot: usize,
        interrupt: &CancellationToken,
    ) -> Result<(), DriverError> {
        self.check_slot(slot)?;
        Ok(self.scheduler.open_until(slot, interrupt).await?)
    }

    /// Never fails; returns once any tick in flight has finished.
    pub async fn close(&self, slot: usize) {
        self.scheduler.close(slot).await
    }

    /// Takes effect on the next tick.
    pub fn set_adapter_enabled(&self, enabled: bool) {
        let previous = self.adapter_tx.send_replace(enabled);
        if previous != enabled {
            info!("Adapter detection {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    pub fn adapter_enabled(&self) -> bool {
        *self.adapter_tx.borrow()
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    /// Stops polling and unregisters every device. Errors from the registry
    /// are logged and ignored.
    ///
    /// Every registered slot is unregistered even if the poll task crashed
    /// and took the sinks with it.
    pub async fn shutdown(self, registry: &mut dyn InputRegistry) {
        info!("Shutting down pad driver");

        match self.scheduler.shutdown().await {
            Some(orchestrator) => {
                let (pins, sinks) = orchestrator.into_parts();
                drop(sinks);
                drop(pins);
            }
            None => warn!("Pad sinks were lost with the poll task"),
        }
        unregister_all(self.slots, registry);

        info!("Pad driver exit");
    }

    fn check_slot(&self, slot: usize) -> Result<(), DriverError> {
        if slot < self.slots {
            Ok(())
        } else {
            Err(DriverError::UnknownSlot(slot))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::fake::{FakePins, PinOp};
    use crate::sink::memory::MemoryRegistry;

    fn fake_pins(pins: &FakePins) -> impl FnOnce(&PinAssignment) -> Result<Box<dyn PinController>, DriverError> {
        let pins = pins.clone();
        move |_| Ok(Box::new(pins) as Box<dyn PinController>)
    }

    #[test]
    fn invalid_config_creates_nothing() {
        let mut registry = MemoryRegistry::new();
        let log = registry.log();
        let config = DriverConfig {
            pin_assignment: vec![2, 3],
            ..DriverConfig::default()
        };

        let mut acquired = false;
        let result = ControllerHandle::spawn(
            config,
            |_| {
                acquired = true;
                Ok(Box::new(FakePins::new()) as Box<dyn PinController>)
            },
            &mut registry,
        );

        assert!(matches!(result, Err(DriverError::Config(_))));
        assert!(!acquired);
        assert!(log.registered().is_empty());
    }

    #[test]
    fn gpio_failure_registers_nothing() {
        let mut registry = MemoryRegistry::new();
        let log = registry.log();

        let result = ControllerHandle::spawn(
            DriverConfig::default(),
            |_| Err(DriverError::GpioUnavailable("io remap failed".to_string())),
            &mut registry,
        );

        assert!(matches!(result, Err(DriverError::GpioUnavailable(_))));
        assert!(log.registered().is_empty());
    }

    #[test]
    fn registration_failure_rolls_back() {
        let mut registry = MemoryRegistry::new().fail_register_at(3);
        let log = registry.log();
        let pins = FakePins::new();

        let result = ControllerHandle::spawn(DriverConfig::default(), fake_pins(&pins), &mut registry);

        assert!(matches!(result, Err(DriverError::Sink(_))));
        assert!(log.registered().is_empty());
        assert_eq!(log.unregistered(), vec![0, 1, 2]);
        assert!(pins.ops().is_empty());
    }

    #[test]
    fn pins_are_configured_after_registration() {
        let mut registry = MemoryRegistry::new();
        let pins = FakePins::new();
        let config = DriverConfig {
            pin_assignment: vec![2, 3, 4, 7],
            ..DriverConfig::default()
        };

        let handle = ControllerHandle::spawn(config, fake_pins(&pins), &mut registry).unwrap();

        assert_eq!(handle.slot_count(), 4);
        assert_eq!(
            pins.ops(),
            vec![
                PinOp::ConfigureOutput(2),
                PinOp::ConfigureOutput(3),
                PinOp::SetLow((1 << 2) | (1 << 3)),
                PinOp::ConfigureInput(4),
                PinOp::EnablePullUp(4),
                PinOp::ConfigureInput(7),
                PinOp::EnablePullUp(7),
            ]
        );
    }

    #[tokio::test]
    async fn teardown_ignores_unregister_errors() {
        let mut registry = MemoryRegistry::new().fail_unregister();
        let log = registry.log();
        let handle =
            ControllerHandle::spawn(DriverConfig::default(), fake_pins(&FakePins::new()), &mut registry)
                .unwrap();

        handle.open(0).await.unwrap();
        handle.shutdown(&mut registry).await;

        assert_eq!(log.unregistered(), vec![0, 1, 2, 3, 4]);
    }

    struct PanickingSink;

    impl InputSink for PanickingSink {
        fn report_button(&mut self, _: crate::controller::Button, _: bool) {}

        fn report_axis(&mut self, _: crate::controller::Axis, _: i8) {}

        fn sync(&mut self) {
            panic!("device went away");
        }
    }

    #[derive(Default)]
    struct PanickingRegistry {
        unregistered: Vec<usize>,
    }

    impl InputRegistry for PanickingRegistry {
        fn register(&mut self, _: &DeviceDescriptor) -> Result<Box<dyn InputSink>, SinkError> {
            Ok(Box::new(PanickingSink))
        }

        fn unregister(&mut self, slot: usize) -> Result<(), SinkError> {
            self.unregistered.push(slot);
            Ok(())
        }
    }

    #[tokio::test]
    async fn teardown_after_crashed_poll_task_unregisters_every_slot() {
        let mut registry = PanickingRegistry::default();
        let handle = ControllerHandle::spawn(
            DriverConfig {
                pin_assignment: vec![2, 3, 4, 7],
                ..DriverConfig::default()
            },
            fake_pins(&FakePins::new()),
            &mut registry,
        )
        .unwrap();

        handle.open(0).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        handle.shutdown(&mut registry).await;

        assert_eq!(registry.unregistered, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn open_rejects_unknown_slot() {
        let mut registry = MemoryRegistry::new();
        let handle = ControllerHandle::spawn(
            DriverConfig {
                pin_assignment: vec![2, 3, 4],
                ..DriverConfig::default()
            },
            fake_pins(&FakePins::new()),
            &mut registry,
        )
        .unwrap();

        assert!(matches!(handle.open(1).await, Err(DriverError::UnknownSlot(1))));
        assert_eq!(handle.scheduler().usage().await, 0);
    }
}
