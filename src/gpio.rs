//! The GPIO context: one-time setup, pin operations, soft PWM, teardown.
//!
//! [`Gpio`] is an explicit context object rather than ambient module state:
//! clones share one register mapping and one ownership table behind a
//! single process-wide lock, and independent instances (used by the tests)
//! are fully isolated from each other.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use heapless::FnvIndexMap;
use log::{info, warn};

use crate::board::BoardInfo;
use crate::config::Config;
use crate::error::{Error, PinError, PwmError, Result};
use crate::layout::PIN_COUNT;
use crate::ownership::{PinRegistry, PinUse};
use crate::pwm::{PinDriver, PwmChannel};
use crate::registers::{FunctionMode, GpioRegisters, Pull};

/// Channel-table capacity: smallest power of two above the pin count
/// (`heapless` requires a power of two).
const MAX_CHANNELS: usize = 64;

// ---------------------------------------------------------------------------
// Pin-facing value types
// ---------------------------------------------------------------------------

/// Requested direction for [`Gpio::set_pin_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// Logical pin level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Self::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }
}

// ---------------------------------------------------------------------------
// Shared context state
// ---------------------------------------------------------------------------

struct Inner {
    config: Config,
    /// Latched by the first successful `setup()` and deliberately never
    /// cleared again, matching the reference behavior: repeated `setup()`
    /// calls are no-ops, including after `cleanup()`.
    setup_done: bool,
    /// Heap-backed registers and a canned board identity instead of real
    /// hardware.
    simulate: bool,
    board: Option<BoardInfo>,
    registers: Option<GpioRegisters>,
    registry: PinRegistry,
    channels: FnvIndexMap<u8, PwmChannel, MAX_CHANNELS>,
}

struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Register-map delegate handed to PWM workers. Holds a weak reference so
/// a worker can never keep the context alive on its own; once every user
/// handle is gone the worker exits at its next phase transition.
struct RegisterDriver {
    shared: Weak<Shared>,
}

impl PinDriver for RegisterDriver {
    fn write_level(&self, pin: u8, high: bool) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let mut inner = shared.lock();
        match inner.registers.as_mut() {
            Some(regs) => {
                regs.write_level(pin, high);
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Public context
// ---------------------------------------------------------------------------

/// Handle to the shared GPIO context. Cheap to clone; all clones operate on
/// the same mapping, ownership table and PWM channels.
#[derive(Clone)]
pub struct Gpio {
    shared: Arc<Shared>,
}

impl Default for Gpio {
    fn default() -> Self {
        Self::new()
    }
}

impl Gpio {
    /// Context with default configuration. No hardware is touched until
    /// [`setup`](Self::setup).
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::build(config, false)
    }

    /// Context backed by an in-memory register block and a canned board
    /// identity: the host-test twin of the real thing.
    pub fn simulated() -> Self {
        Self::build(Config::default(), true)
    }

    fn build(config: Config, simulate: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    config,
                    setup_done: false,
                    simulate,
                    board: None,
                    registers: None,
                    registry: PinRegistry::new(),
                    channels: FnvIndexMap::new(),
                }),
            }),
        }
    }

    // ── Setup / teardown ──────────────────────────────────────────

    /// One-time privileged initialisation: board detection, then register
    /// mapping, in that order, surfacing the first failure. A no-op once it
    /// has succeeded.
    pub fn setup(&self) -> Result<()> {
        let mut inner = self.shared.lock();
        if inner.setup_done {
            return Ok(());
        }

        let board = match inner.board {
            Some(board) => board,
            None => {
                let board = if inner.simulate {
                    BoardInfo::simulated()
                } else {
                    BoardInfo::detect(&inner.config.cpuinfo_path)?
                };
                inner.board = Some(board);
                board
            }
        };

        let registers = if inner.simulate {
            GpioRegisters::simulated()
        } else {
            GpioRegisters::open(&board, &inner.config)?
        };
        inner.registers = Some(registers);
        inner.setup_done = true;
        info!("setup complete on {}", board.board_type);
        Ok(())
    }

    /// Stop and join every PWM worker, return every claimed pin to input,
    /// clear the ownership table, unmap the registers. Safe to call when
    /// setup never ran; does not clear the setup-done latch.
    pub fn cleanup(&self) {
        // Channels are taken out under the lock but dropped (joined)
        // without it, since a worker may need the lock for its parting low
        // write.
        let channels: Vec<PwmChannel> = {
            let mut inner = self.shared.lock();
            let pins: Vec<u8> = inner.channels.keys().copied().collect();
            pins.iter()
                .filter_map(|pin| inner.channels.remove(pin))
                .collect()
        };
        let stopped = channels.len();
        drop(channels);

        let mut inner = self.shared.lock();
        let Inner {
            registers, registry, ..
        } = &mut *inner;
        if let Some(regs) = registers.as_mut() {
            for pin in registry.claimed_pins() {
                regs.set_function(pin, FunctionMode::Input);
            }
        }
        registry.clear();
        inner.registers = None;
        if stopped > 0 {
            info!("cleanup: stopped {stopped} PWM channel(s)");
        }
        info!("cleanup complete");
    }

    // ── Pin operations ────────────────────────────────────────────

    /// Configure a pin's direction and pull resistor, claiming it for
    /// plain GPIO use. A soft-PWM channel on the pin is stopped first.
    pub fn set_pin_mode(&self, pin: u8, direction: Direction, pull: Pull) -> Result<()> {
        check_pin(pin)?;
        if self.take_channel(pin).is_some() {
            warn!("pin {pin} reclaimed from soft PWM");
        }
        self.with_registers(pin, |regs, registry| {
            regs.set_pull(pin, pull);
            let (mode, claim) = match direction {
                Direction::In => (FunctionMode::Input, PinUse::Input),
                Direction::Out => (FunctionMode::Output, PinUse::Output),
            };
            regs.set_function(pin, mode);
            registry.claim(pin, claim);
        })
    }

    /// Current level of a pin (input reading, or output readback).
    pub fn read_pin(&self, pin: u8) -> Result<Level> {
        self.with_registers(pin, |regs, _| Level::from(regs.read_level(pin)))
    }

    /// Drive an output pin.
    pub fn write_pin(&self, pin: u8, level: Level) -> Result<()> {
        self.with_registers(pin, |regs, _| regs.write_level(pin, level.is_high()))
    }

    /// Raw function-select value of a pin.
    pub fn pin_function(&self, pin: u8) -> Result<FunctionMode> {
        self.with_registers(pin, |regs, _| regs.read_function(pin))
    }

    /// What this context currently uses the pin for.
    pub fn pin_use(&self, pin: u8) -> Result<PinUse> {
        check_pin(pin)?;
        Ok(self.shared.lock().registry.query(pin))
    }

    /// Resolved board identity; detected lazily and cached.
    pub fn board_info(&self) -> Result<BoardInfo> {
        let mut inner = self.shared.lock();
        if let Some(board) = inner.board {
            return Ok(board);
        }
        let board = if inner.simulate {
            BoardInfo::simulated()
        } else {
            BoardInfo::detect(&inner.config.cpuinfo_path)?
        };
        inner.board = Some(board);
        Ok(board)
    }

    // ── Software PWM ──────────────────────────────────────────────

    /// Start a soft-PWM channel on `pin` (duty 0, configured frequency).
    /// The pin is claimed for PWM (reclaiming it from plain GPIO use if
    /// necessary) and configured as a low output before the worker runs.
    pub fn pwm_start(&self, pin: u8) -> Result<()> {
        check_pin(pin)?;
        let mut inner = self.shared.lock();
        if inner.channels.contains_key(&pin) {
            return Err(PwmError::AlreadyRunning.into());
        }
        // The configured start frequency feeds the worker's period math,
        // so it gets the same domain check as a retune.
        let frequency_hz = inner.config.pwm_frequency_hz;
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            return Err(PwmError::FrequencyOutOfRange.into());
        }
        let Inner {
            registers, registry, ..
        } = &mut *inner;
        let Some(regs) = registers.as_mut() else {
            return Err(Error::NotInitialized);
        };

        let prev = registry.claim(pin, PinUse::SoftPwm);
        if prev != PinUse::Unused {
            warn!("pwm: pin {pin} reclaimed from {prev:?}");
        }
        regs.set_function(pin, FunctionMode::Output);
        regs.write_level(pin, false);

        let driver = RegisterDriver {
            shared: Arc::downgrade(&self.shared),
        };
        // Capacity exceeds the pin count, so the insert cannot be full.
        inner
            .channels
            .insert(pin, PwmChannel::start(pin, frequency_hz, driver))
            .ok();
        Ok(())
    }

    /// Retune the duty cycle (percent, `0..=100`); lands on the next cycle
    /// boundary.
    pub fn pwm_set_duty_cycle(&self, pin: u8, percent: f32) -> Result<()> {
        check_pin(pin)?;
        let inner = self.shared.lock();
        match inner.channels.get(&pin) {
            Some(ch) => ch.shared().set_duty_cycle(percent),
            None => Err(PwmError::NotRunning.into()),
        }
    }

    /// Retune the frequency (Hz, `> 0`); lands on the next cycle boundary.
    pub fn pwm_set_frequency(&self, pin: u8, hz: f32) -> Result<()> {
        check_pin(pin)?;
        let inner = self.shared.lock();
        match inner.channels.get(&pin) {
            Some(ch) => ch.shared().set_frequency(hz),
            None => Err(PwmError::NotRunning.into()),
        }
    }

    /// Stop the channel on `pin`, join its worker (bounded by about one
    /// cycle) and release the pin. No-op when no channel exists.
    pub fn pwm_stop(&self, pin: u8) {
        let Some(channel) = self.take_channel(pin) else {
            return;
        };
        // Signal + join happens here, outside the lock; the worker parks
        // the pin low on its way out.
        drop(channel);
        self.shared.lock().registry.release(pin);
        info!("pwm: stopped on pin {pin}");
    }

    // ── Internals ─────────────────────────────────────────────────

    fn take_channel(&self, pin: u8) -> Option<PwmChannel> {
        self.shared.lock().channels.remove(&pin)
    }

    fn with_registers<T>(
        &self,
        pin: u8,
        op: impl FnOnce(&mut GpioRegisters, &mut PinRegistry) -> T,
    ) -> Result<T> {
        check_pin(pin)?;
        let mut inner = self.shared.lock();
        let Inner {
            registers, registry, ..
        } = &mut *inner;
        match registers.as_mut() {
            Some(regs) => Ok(op(regs, registry)),
            None => Err(Error::NotInitialized),
        }
    }
}

fn check_pin(pin: u8) -> Result<()> {
    if pin >= PIN_COUNT {
        return Err(PinError::InvalidPin(pin).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_before_setup_are_rejected() {
        let gpio = Gpio::simulated();
        assert_eq!(gpio.read_pin(4), Err(Error::NotInitialized));
        assert_eq!(gpio.write_pin(4, Level::High), Err(Error::NotInitialized));
        assert_eq!(gpio.pwm_start(4), Err(Error::NotInitialized));
    }

    #[test]
    fn invalid_pin_is_rejected_before_state_checks() {
        let gpio = Gpio::simulated();
        assert_eq!(gpio.read_pin(54), Err(PinError::InvalidPin(54).into()));
        assert_eq!(gpio.pwm_start(200), Err(PinError::InvalidPin(200).into()));
    }

    #[test]
    fn setup_is_idempotent_and_survives_cleanup() {
        let gpio = Gpio::simulated();
        gpio.setup().unwrap();
        gpio.setup().unwrap();
        assert!(gpio.read_pin(4).is_ok());

        gpio.cleanup();
        // The done-latch holds: setup stays a no-op, operations stay
        // rejected until a fresh context is built.
        gpio.setup().unwrap();
        assert_eq!(gpio.read_pin(4), Err(Error::NotInitialized));
    }

    #[test]
    fn cleanup_without_setup_is_a_noop() {
        let gpio = Gpio::simulated();
        gpio.cleanup();
    }

    #[test]
    fn clones_share_one_context() {
        let gpio = Gpio::simulated();
        gpio.setup().unwrap();
        let other = gpio.clone();
        other.set_pin_mode(17, Direction::Out, Pull::Off).unwrap();
        other.write_pin(17, Level::High).unwrap();
        assert_eq!(gpio.read_pin(17), Ok(Level::High));
        assert_eq!(gpio.pin_use(17), Ok(PinUse::Output));
    }

    #[test]
    fn board_info_is_cached() {
        let gpio = Gpio::simulated();
        let first = gpio.board_info().unwrap();
        let second = gpio.board_info().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.processor, "BCM2837");
    }
}
