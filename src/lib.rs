//! Userspace memory-mapped GPIO control for Raspberry-Pi-class boards,
//! with software PWM on arbitrary pins.
//!
//! The [`Gpio`] context owns a mapped view of the BCM283x GPIO register
//! block (`/dev/gpiomem`, falling back to `/dev/mem`) and a per-pin
//! ownership table. Soft-PWM channels run one background worker thread per
//! pin, toggling through the shared mapping.
//!
//! Contexts built with [`Gpio::simulated`] use an in-memory register block
//! and a canned board identity, so the full API is exercisable in host
//! tests and on non-Linux development machines.

#![deny(unused_must_use)]

pub mod board;
pub mod config;
pub mod layout;

mod ehal;
mod error;
mod gpio;
mod ownership;
mod pwm;
mod registers;

pub use board::BoardInfo;
pub use config::Config;
pub use ehal::{InputPin, OutputPin};
pub use error::{Error, PinError, PwmError, Result, SetupError};
pub use gpio::{Direction, Gpio, Level};
pub use ownership::PinUse;
pub use registers::{FunctionMode, Pull};
