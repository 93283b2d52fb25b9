//! Unified error types for the GPIO crate.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! caller's error handling uniform. All variants are `Copy` so they can be
//! passed across the PWM worker boundary without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level crate error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Board detection or register mapping failed.
    Setup(SetupError),
    /// A pin-level operation was rejected.
    Pin(PinError),
    /// A software-PWM operation was rejected.
    Pwm(PwmError),
    /// Operation before `setup()` or after `cleanup()` closed the mapping.
    NotInitialized,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup(e) => write!(f, "setup: {e}"),
            Self::Pin(e) => write!(f, "pin: {e}"),
            Self::Pwm(e) => write!(f, "pwm: {e}"),
            Self::NotInitialized => write!(f, "GPIO registers are not mapped"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Setup errors
// ---------------------------------------------------------------------------

/// Failures during one-time privileged initialisation. These are
/// environmental: the caller has to fix permissions or run on supported
/// hardware, so none of them are retried internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupError {
    /// The memory device could not be opened (usually insufficient
    /// privilege for `/dev/mem`).
    PermissionDenied,
    /// Backing memory for the register mapping could not be reserved.
    AllocationFailed,
    /// The `mmap` syscall itself failed.
    MapFailed,
    /// The CPU identification source could not be read.
    CpuInfoUnreadable,
    /// The revision code does not match any known board.
    UnsupportedBoard,
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "no access to the GPIO memory device"),
            Self::AllocationFailed => write!(f, "could not reserve memory for the register map"),
            Self::MapFailed => write!(f, "mmap of GPIO registers failed"),
            Self::CpuInfoUnreadable => write!(f, "unable to read CPU identification"),
            Self::UnsupportedBoard => write!(f, "not running on a recognised board"),
        }
    }
}

impl From<SetupError> for Error {
    fn from(e: SetupError) -> Self {
        Self::Setup(e)
    }
}

// ---------------------------------------------------------------------------
// Pin errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinError {
    /// BCM pin number outside the register block.
    InvalidPin(u8),
}

impl fmt::Display for PinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPin(pin) => write!(f, "pin {pin} is out of range"),
        }
    }
}

impl From<PinError> for Error {
    fn from(e: PinError) -> Self {
        Self::Pin(e)
    }
}

// ---------------------------------------------------------------------------
// Software-PWM errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmError {
    /// Duty cycle outside [0, 100] percent.
    DutyCycleOutOfRange,
    /// Frequency not strictly positive.
    FrequencyOutOfRange,
    /// A channel already exists for this pin.
    AlreadyRunning,
    /// No channel exists for this pin.
    NotRunning,
    /// The worker thread for this channel died (register map torn down
    /// underneath it); `pwm_stop` clears the channel.
    WorkerFault,
}

impl fmt::Display for PwmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DutyCycleOutOfRange => write!(f, "duty cycle must be 0..=100"),
            Self::FrequencyOutOfRange => write!(f, "frequency must be greater than 0"),
            Self::AlreadyRunning => write!(f, "soft PWM already running on this pin"),
            Self::NotRunning => write!(f, "no soft PWM channel on this pin"),
            Self::WorkerFault => write!(f, "soft PWM worker terminated abnormally"),
        }
    }
}

impl From<PwmError> for Error {
    fn from(e: PwmError) -> Self {
        Self::Pwm(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
