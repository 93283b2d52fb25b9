//! `embedded-hal` digital pin adapters.
//!
//! Driver crates written against the `embedded_hal::digital` traits can run
//! on top of this crate: [`Gpio::output_pin`] / [`Gpio::input_pin`] claim
//! and configure a pin, returning a handle over a cloned context.

use embedded_hal::digital::{self, ErrorType, StatefulOutputPin};

use crate::error::{Error, Result};
use crate::gpio::{Direction, Gpio, Level};
use crate::registers::Pull;

impl digital::Error for Error {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

/// Push-pull output handle for one pin.
pub struct OutputPin {
    gpio: Gpio,
    pin: u8,
}

/// Input handle for one pin.
pub struct InputPin {
    gpio: Gpio,
    pin: u8,
}

impl Gpio {
    /// Claim `pin` as a plain output (no pull) and hand out an
    /// `embedded-hal` output handle.
    pub fn output_pin(&self, pin: u8) -> Result<OutputPin> {
        self.set_pin_mode(pin, Direction::Out, Pull::Off)?;
        Ok(OutputPin {
            gpio: self.clone(),
            pin,
        })
    }

    /// Claim `pin` as an input with the given pull and hand out an
    /// `embedded-hal` input handle.
    pub fn input_pin(&self, pin: u8, pull: Pull) -> Result<InputPin> {
        self.set_pin_mode(pin, Direction::In, pull)?;
        Ok(InputPin {
            gpio: self.clone(),
            pin,
        })
    }
}

impl ErrorType for OutputPin {
    type Error = Error;
}

impl digital::OutputPin for OutputPin {
    fn set_low(&mut self) -> Result<()> {
        self.gpio.write_pin(self.pin, Level::Low)
    }

    fn set_high(&mut self) -> Result<()> {
        self.gpio.write_pin(self.pin, Level::High)
    }
}

impl StatefulOutputPin for OutputPin {
    fn is_set_high(&mut self) -> Result<bool> {
        Ok(self.gpio.read_pin(self.pin)?.is_high())
    }

    fn is_set_low(&mut self) -> Result<bool> {
        Ok(!self.gpio.read_pin(self.pin)?.is_high())
    }
}

impl ErrorType for InputPin {
    type Error = Error;
}

impl digital::InputPin for InputPin {
    fn is_high(&mut self) -> Result<bool> {
        Ok(self.gpio.read_pin(self.pin)?.is_high())
    }

    fn is_low(&mut self) -> Result<bool> {
        Ok(!self.gpio.read_pin(self.pin)?.is_high())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::digital::{InputPin as _, OutputPin as _};

    #[test]
    fn output_handle_drives_and_reads_back() {
        let gpio = Gpio::simulated();
        gpio.setup().unwrap();
        let mut led = gpio.output_pin(17).unwrap();

        led.set_high().unwrap();
        assert!(led.is_set_high().unwrap());
        assert_eq!(gpio.read_pin(17), Ok(Level::High));

        led.set_low().unwrap();
        assert!(led.is_set_low().unwrap());
    }

    #[test]
    fn input_handle_reads_level() {
        let gpio = Gpio::simulated();
        gpio.setup().unwrap();
        let mut button = gpio.input_pin(22, Pull::Up).unwrap();
        assert!(button.is_low().unwrap());
        assert!(!button.is_high().unwrap());
    }

    #[test]
    fn handles_require_setup() {
        let gpio = Gpio::simulated();
        assert!(gpio.output_pin(17).is_err());
    }
}
