//! Memory-mapped view of the GPIO register block.
//!
//! On Linux the block is a real `mmap` of `/dev/gpiomem` (unprivileged,
//! GPIO-only window) or `/dev/mem` at the board's physical base. All word
//! access is bounds-checked and volatile.
//!
//! ## Dual-target design
//!
//! On non-Linux targets, and for contexts created with
//! [`Gpio::simulated`](crate::Gpio::simulated), the backing is a
//! heap-allocated block that mimics the write-1-to-set/clear level
//! semantics, so the full pin API is exercisable in host tests.

use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::layout::{self, BLOCK_WORDS};

// ---------------------------------------------------------------------------
// Pin-level register encodings
// ---------------------------------------------------------------------------

/// Function-select field values (3 bits per pin).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FunctionMode {
    Input = 0b000,
    Output = 0b001,
    Alt0 = 0b100,
    Alt1 = 0b101,
    Alt2 = 0b110,
    Alt3 = 0b111,
    Alt4 = 0b011,
    Alt5 = 0b010,
}

impl FunctionMode {
    pub(crate) fn from_bits(bits: u32) -> Self {
        match bits & layout::FSEL_FIELD_MASK {
            0b000 => Self::Input,
            0b001 => Self::Output,
            0b100 => Self::Alt0,
            0b101 => Self::Alt1,
            0b110 => Self::Alt2,
            0b111 => Self::Alt3,
            0b011 => Self::Alt4,
            _ => Self::Alt5,
        }
    }

    pub(crate) fn bits(self) -> u32 {
        self as u32
    }
}

/// Pull-up/down configuration (GPPUD encodings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum Pull {
    #[default]
    Off = 0,
    Down = 1,
    Up = 2,
}

// ---------------------------------------------------------------------------
// Register block
// ---------------------------------------------------------------------------

enum Backing {
    /// Live hardware mapping. Sole access path is through the owning
    /// context's lock, so no further synchronisation is layered on top.
    #[cfg(target_os = "linux")]
    Mapped { ptr: *mut u32 },
    /// In-memory stand-in with hardware-like set/clear behavior.
    Heap(Box<[u32; BLOCK_WORDS]>),
}

/// Owned view of the 4 KiB GPIO register block.
pub(crate) struct GpioRegisters {
    backing: Backing,
}

// SAFETY: the raw mapping pointer is only dereferenced by the thread
// currently holding the context mutex; the mapping itself lives until Drop.
unsafe impl Send for GpioRegisters {}

impl GpioRegisters {
    /// Heap-backed block, every pin an input, every level low.
    pub(crate) fn simulated() -> Self {
        info!("registers: simulated in-memory block");
        Self {
            backing: Backing::Heap(Box::new([0; BLOCK_WORDS])),
        }
    }

    // ── Word accessors ────────────────────────────────────────────

    fn read_word(&self, index: usize) -> u32 {
        assert!(index < BLOCK_WORDS, "register index out of block");
        match &self.backing {
            #[cfg(target_os = "linux")]
            // SAFETY: index is bounds-checked against the mapped length.
            Backing::Mapped { ptr } => unsafe { ptr.add(index).read_volatile() },
            Backing::Heap(words) => words[index],
        }
    }

    fn write_word(&mut self, index: usize, value: u32) {
        assert!(index < BLOCK_WORDS, "register index out of block");
        match &mut self.backing {
            #[cfg(target_os = "linux")]
            // SAFETY: index is bounds-checked against the mapped length.
            Backing::Mapped { ptr } => unsafe { ptr.add(index).write_volatile(value) },
            Backing::Heap(words) => {
                // Mimic the hardware's write-1-to-set/clear registers so a
                // simulated write is observable through GPLEV.
                if index == layout::SET0 || index == layout::SET0 + 1 {
                    words[layout::LEV0 + (index - layout::SET0)] |= value;
                } else if index == layout::CLR0 || index == layout::CLR0 + 1 {
                    words[layout::LEV0 + (index - layout::CLR0)] &= !value;
                } else {
                    words[index] = value;
                }
            }
        }
    }

    // ── Pin-level operations ──────────────────────────────────────

    /// Current function-select value for `pin`.
    pub(crate) fn read_function(&self, pin: u8) -> FunctionMode {
        let word = self.read_word(layout::fsel_word(pin));
        FunctionMode::from_bits(word >> layout::fsel_shift(pin))
    }

    /// Read-modify-write of `pin`'s 3-bit function field, leaving the other
    /// nine fields in the word untouched.
    pub(crate) fn set_function(&mut self, pin: u8, mode: FunctionMode) {
        let index = layout::fsel_word(pin);
        let shift = layout::fsel_shift(pin);
        let word = self.read_word(index);
        let word = (word & !(layout::FSEL_FIELD_MASK << shift)) | (mode.bits() << shift);
        self.write_word(index, word);
        debug!("registers: pin {pin} function {mode:?}");
    }

    /// Level of `pin` from GPLEV.
    pub(crate) fn read_level(&self, pin: u8) -> bool {
        self.read_word(layout::LEV0 + layout::bank(pin)) & layout::bank_bit(pin) != 0
    }

    /// Drive `pin` via GPSET/GPCLR.
    pub(crate) fn write_level(&mut self, pin: u8, high: bool) {
        let base = if high { layout::SET0 } else { layout::CLR0 };
        self.write_word(base + layout::bank(pin), layout::bank_bit(pin));
    }

    /// GPPUD/GPPUDCLK clock-pulse sequence for `pin`.
    ///
    /// The step ordering and settle delays come from the datasheet and are
    /// not reorderable. The caller holds the context lock for the whole
    /// sequence, so no other thread of this process can interleave register
    /// writes with it.
    pub(crate) fn set_pull(&mut self, pin: u8, pull: Pull) {
        let clk = layout::PUDCLK0 + layout::bank(pin);
        self.write_word(layout::PUD, pull as u32);
        thread::sleep(Duration::from_micros(layout::PUD_SETTLE_MICROS));
        self.write_word(clk, layout::bank_bit(pin));
        thread::sleep(Duration::from_micros(layout::PUD_SETTLE_MICROS));
        self.write_word(layout::PUD, 0);
        self.write_word(clk, 0);
        debug!("registers: pin {pin} pull {pull:?}");
    }
}

impl Drop for GpioRegisters {
    fn drop(&mut self) {
        #[cfg(target_os = "linux")]
        if let Backing::Mapped { ptr } = &self.backing {
            // SAFETY: ptr/BLOCK_SIZE are exactly what mmap returned.
            unsafe {
                libc::munmap(ptr.cast::<libc::c_void>(), layout::BLOCK_SIZE);
            }
            info!("registers: unmapped");
        }
    }
}

// ---------------------------------------------------------------------------
// Hardware mapping (Linux)
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
mod mapping {
    use std::fs::OpenOptions;
    use std::os::unix::fs::OpenOptionsExt;
    use std::os::unix::io::AsRawFd;
    use std::path::Path;

    use log::info;

    use super::{Backing, GpioRegisters};
    use crate::board::BoardInfo;
    use crate::config::Config;
    use crate::error::{Result, SetupError};
    use crate::layout;

    const GPIOMEM_PATH: &str = "/dev/gpiomem";
    const MEM_PATH: &str = "/dev/mem";

    impl GpioRegisters {
        /// Map the GPIO block. `/dev/gpiomem` exposes the block at offset 0
        /// without privilege; `/dev/mem` needs root and the board's
        /// physical base.
        pub(crate) fn open(board: &BoardInfo, config: &Config) -> Result<Self> {
            if let Some(path) = &config.mem_device_override {
                return Self::map_device(path, 0);
            }
            match Self::map_device(Path::new(GPIOMEM_PATH), 0) {
                Ok(regs) => Ok(regs),
                Err(_) => Self::map_device(Path::new(MEM_PATH), board.gpio_base()),
            }
        }

        fn map_device(path: &Path, offset: u64) -> Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags(libc::O_SYNC)
                .open(path)
                .map_err(|_| SetupError::PermissionDenied)?;

            // SAFETY: mapping one page of a device file we just opened;
            // length and offset are page aligned. mmap64 keeps the >2 GiB
            // physical offsets representable on 32-bit userlands.
            let ptr = unsafe {
                libc::mmap64(
                    std::ptr::null_mut(),
                    layout::BLOCK_SIZE,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    file.as_raw_fd(),
                    offset as libc::off64_t,
                )
            };
            if ptr == libc::MAP_FAILED {
                let err = std::io::Error::last_os_error();
                let kind = if err.raw_os_error() == Some(libc::ENOMEM) {
                    SetupError::AllocationFailed
                } else {
                    SetupError::MapFailed
                };
                return Err(kind.into());
            }

            info!("registers: mapped {} at offset {offset:#x}", path.display());
            Ok(Self {
                backing: Backing::Mapped { ptr: ptr.cast() },
            })
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl GpioRegisters {
    /// No memory-mapped GPIO on this target; fall back to the simulated
    /// block so the rest of the crate stays exercisable.
    pub(crate) fn open(
        _board: &crate::board::BoardInfo,
        _config: &crate::config::Config,
    ) -> crate::error::Result<Self> {
        log::info!("registers(sim): no /dev/gpiomem on this target");
        Ok(Self::simulated())
    }
}
