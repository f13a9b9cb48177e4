//! GPIO access for the shift register lines
//!
//! The poller only needs a handful of primitives on the BCM2835 GPIO block:
//! pin direction, pull-up enable, bulk set/clear by bit mask and a bulk read
//! of all line levels. [`PinController`] captures exactly that surface.
//!
//! Two implementations exist:
//!
//! - [`rppal_pins::RppalPins`] drives the real header through `rppal`
//! - [`fake::FakePins`] is an in-memory stand-in that replays scripted line
//!   levels and records every operation
//!
//! Once a controller has been constructed all operations are infallible.
//! Acquiring the hardware is the only step that can fail.

pub mod fake;
pub mod rppal_pins;

/// Pins on the P1 header that can be used for clock, latch or data lines.
pub const VALID_PINS: std::ops::RangeInclusive<u8> = 0..=27;

/// Returns true if `pin` is part of the supported pin set.
pub fn is_valid_pin(pin: u8) -> bool {
    VALID_PINS.contains(&pin)
}

/// Bit in the level/set/clear registers that corresponds to `pin`.
pub fn pin_bit(pin: u8) -> u32 {
    1 << pin
}

/// Primitive operations on the GPIO block.
///
/// `configure_input` must be called on a pin before `enable_pull_up`.
pub trait PinController: Send {
    fn configure_input(&mut self, pin: u8);

    fn configure_output(&mut self, pin: u8);

    fn enable_pull_up(&mut self, pin: u8);

    /// Drives every pin whose bit is set in `mask` high. Other pins are untouched.
    fn set_high(&mut self, mask: u32);

    /// Drives every pin whose bit is set in `mask` low. Other pins are untouched.
    fn set_low(&mut self, mask: u32);

    /// Levels of all lines, bit `n` set when GPIO `n` reads high.
    fn read_all(&mut self) -> u32;
}

impl<P: PinController + ?Sized> PinController for Box<P> {
    fn configure_input(&mut self, pin: u8) {
        (**self).configure_input(pin)
    }

    fn configure_output(&mut self, pin: u8) {
        (**self).configure_output(pin)
    }

    fn enable_pull_up(&mut self, pin: u8) {
        (**self).enable_pull_up(pin)
    }

    fn set_high(&mut self, mask: u32) {
        (**self).set_high(mask)
    }

    fn set_low(&mut self, mask: u32) {
        (**self).set_low(mask)
    }

    fn read_all(&mut self) -> u32 {
        (**self).read_all()
    }
}
