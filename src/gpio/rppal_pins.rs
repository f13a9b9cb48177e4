//! Raspberry Pi GPIO through `rppal`
//!
//! Every pin of the assignment is claimed as an [`IoPin`] when the
//! controller is opened. Direction changes, pull-up and level writes then
//! go straight to the claimed pins.

use rppal::gpio::{Bias, Gpio, IoPin, Mode};
use tracing::{debug, error, info};

use super::{pin_bit, PinController};

/// Bias applied by [`PinController::enable_pull_up`].
pub const DATA_LINE_BIAS: Bias = Bias::PullUp;

/// Hardware pin controller backed by `rppal`.
///
/// All pins of the assignment are claimed up front in [`RppalPins::open`], so
/// the trait operations never fail afterwards. Lines that were not claimed
/// read as low and ignore set/clear requests.
pub struct RppalPins {
    pins: Vec<(u8, IoPin)>,
}

impl RppalPins {
    /// Maps the GPIO block and claims every pin in `pins`.
    pub fn open(pins: &[u8]) -> Result<Self, rppal::gpio::Error> {
        info!("Mapping GPIO register window for pins {:?}", pins);
        let gpio = match Gpio::new() {
            Ok(g) => g,
            Err(e) => {
                error!("Failed to map GPIO registers: {}", e);
                return Err(e);
            }
        };

        let mut claimed = Vec::with_capacity(pins.len());
        for &pin in pins {
            let io = gpio.get(pin)?.into_io(Mode::Input);
            debug!("Claimed GPIO {}", pin);
            claimed.push((pin, io));
        }

        Ok(Self { pins: claimed })
    }

    fn pin_mut(&mut self, pin: u8) -> Option<&mut IoPin> {
        self.pins
            .iter_mut()
            .find(|(id, _)| *id == pin)
            .map(|(_, io)| io)
    }
}

/// Packs per-pin levels into one word, bit `n` set when GPIO `n` is high.
pub fn level_word(levels: impl IntoIterator<Item = (u8, bool)>) -> u32 {
    levels
        .into_iter()
        .filter(|&(_, high)| high)
        .fold(0, |word, (pin, _)| word | pin_bit(pin))
}

impl PinController for RppalPins {
    fn configure_input(&mut self, pin: u8) {
        if let Some(io) = self.pin_mut(pin) {
            io.set_mode(Mode::Input);
        }
    }

    fn configure_output(&mut self, pin: u8) {
        if let Some(io) = self.pin_mut(pin) {
            io.set_mode(Mode::Output);
        }
    }

    fn enable_pull_up(&mut self, pin: u8) {
        if let Some(io) = self.pin_mut(pin) {
            io.set_bias(DATA_LINE_BIAS);
        }
    }

    fn set_high(&mut self, mask: u32) {
        for (pin, io) in self.pins.iter_mut() {
            if mask & pin_bit(*pin) != 0 {
                io.set_high();
            }
        }
    }

    fn set_low(&mut self, mask: u32) {
        for (pin, io) in self.pins.iter_mut() {
            if mask & pin_bit(*pin) != 0 {
                io.set_low();
            }
        }
    }

    fn read_all(&mut self) -> u32 {
        level_word(self.pins.iter().map(|(pin, io)| (*pin, io.is_high())))
    }
}
