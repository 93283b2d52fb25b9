//! Board identification from the CPU revision code.
//!
//! Raspberry Pi boards publish a hex revision code in `/proc/cpuinfo`.
//! Newer boards use a bitfield scheme (type / processor / manufacturer /
//! RAM packed into the code); the original 2011-2014 boards use a small
//! enumerated table. The decoded processor selects the physical peripheral
//! base address for the register mapping.

use std::path::Path;

use log::info;
use serde::Serialize;

use crate::error::{Result, SetupError};
use crate::layout;

/// Bit 23 distinguishes the bitfield revision scheme from the old table.
const NEW_STYLE_FLAG: u32 = 1 << 23;
/// Warranty / overvolt flags above the code proper.
const OLD_STYLE_CODE_MASK: u32 = 0x00FF_FFFF;

// ---------------------------------------------------------------------------
// Decoded board identity
// ---------------------------------------------------------------------------

/// Resolved identity of the host board.
///
/// Immutable once resolved; the [`Gpio`](crate::Gpio) context caches it for
/// its lifetime after the first successful detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoardInfo {
    /// Raw revision code as published by the firmware.
    pub revision_code: u32,
    /// Marketing name, e.g. `"Pi 3 Model B"`.
    pub board_type: &'static str,
    /// SoC name, e.g. `"BCM2837"`.
    pub processor: &'static str,
    /// Assembly plant.
    pub manufacturer: &'static str,
    /// Fitted memory, e.g. `"1G"`.
    pub ram: &'static str,
}

impl BoardInfo {
    /// Read and decode the identification file (conventionally
    /// `/proc/cpuinfo`).
    pub fn detect(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|_| SetupError::CpuInfoUnreadable)?;
        let info = Self::from_cpuinfo(&text)?;
        info!(
            "board: {} ({}, {}, {})",
            info.board_type, info.processor, info.ram, info.manufacturer
        );
        Ok(info)
    }

    /// Decode from the text of an identification file. The last `Revision`
    /// line wins (some kernels emit one per core before the board line).
    pub fn from_cpuinfo(text: &str) -> Result<Self> {
        let code = text
            .lines()
            .filter_map(revision_value)
            .last()
            .ok_or(SetupError::UnsupportedBoard)?;
        Self::from_revision(code)
    }

    /// Decode a raw revision code.
    pub fn from_revision(code: u32) -> Result<Self> {
        if code & NEW_STYLE_FLAG != 0 {
            Self::from_new_style(code)
        } else {
            Self::from_old_style(code)
        }
    }

    fn from_new_style(code: u32) -> Result<Self> {
        let processor = match (code >> 12) & 0xF {
            0 => "BCM2835",
            1 => "BCM2836",
            2 => "BCM2837",
            3 => "BCM2711",
            // BCM2712 moved GPIO to the RP1 southbridge; this register
            // block no longer exists there.
            _ => return Err(SetupError::UnsupportedBoard.into()),
        };
        let board_type = match (code >> 4) & 0xFF {
            0x00 => "Model A",
            0x01 => "Model B",
            0x02 => "Model A+",
            0x03 => "Model B+",
            0x04 => "Pi 2 Model B",
            0x06 => "Compute Module 1",
            0x08 => "Pi 3 Model B",
            0x09 => "Zero",
            0x0A => "Compute Module 3",
            0x0C => "Zero W",
            0x0D => "Pi 3 Model B+",
            0x0E => "Pi 3 Model A+",
            0x10 => "Compute Module 3+",
            0x11 => "Pi 4 Model B",
            0x12 => "Zero 2 W",
            0x13 => "Pi 400",
            0x14 => "Compute Module 4",
            _ => "Unknown",
        };
        let manufacturer = match (code >> 16) & 0xF {
            0 => "Sony UK",
            1 => "Egoman",
            2 | 4 => "Embest",
            3 => "Sony Japan",
            5 => "Stadium",
            _ => "Unknown",
        };
        let ram = match (code >> 20) & 0x7 {
            0 => "256M",
            1 => "512M",
            2 => "1G",
            3 => "2G",
            4 => "4G",
            5 => "8G",
            _ => "Unknown",
        };
        Ok(Self {
            revision_code: code,
            board_type,
            processor,
            manufacturer,
            ram,
        })
    }

    fn from_old_style(code: u32) -> Result<Self> {
        let (board_type, ram, manufacturer) = match code & OLD_STYLE_CODE_MASK {
            0x02 | 0x03 => ("Model B", "256M", "Egoman"),
            0x04 => ("Model B", "256M", "Sony UK"),
            0x05 => ("Model B", "256M", "Qisda"),
            0x06 => ("Model B", "256M", "Egoman"),
            0x07 => ("Model A", "256M", "Egoman"),
            0x08 => ("Model A", "256M", "Sony UK"),
            0x09 => ("Model A", "256M", "Qisda"),
            0x0D => ("Model B", "512M", "Egoman"),
            0x0E => ("Model B", "512M", "Sony UK"),
            0x0F => ("Model B", "512M", "Qisda"),
            0x10 => ("Model B+", "512M", "Sony UK"),
            0x11 => ("Compute Module 1", "512M", "Sony UK"),
            0x12 => ("Model A+", "256M", "Sony UK"),
            0x13 => ("Model B+", "512M", "Embest"),
            0x14 => ("Compute Module 1", "512M", "Embest"),
            0x15 => ("Model A+", "256M", "Embest"),
            _ => return Err(SetupError::UnsupportedBoard.into()),
        };
        Ok(Self {
            revision_code: code,
            board_type,
            processor: "BCM2835",
            manufacturer,
            ram,
        })
    }

    /// Physical address of the SoC peripheral window.
    pub fn peripheral_base(&self) -> u64 {
        match self.processor {
            "BCM2835" => 0x2000_0000,
            "BCM2836" | "BCM2837" => 0x3F00_0000,
            // BCM2711; decoding rejects everything else.
            _ => 0xFE00_0000,
        }
    }

    /// Physical address of the GPIO register block.
    pub fn gpio_base(&self) -> u64 {
        self.peripheral_base() + layout::GPIO_BLOCK_OFFSET
    }

    /// Canned identity used by simulated contexts (host tests and
    /// non-Linux targets).
    pub(crate) fn simulated() -> Self {
        Self {
            revision_code: 0x00A0_2082, // Pi 3 Model B, 1G, Sony UK
            board_type: "Pi 3 Model B",
            processor: "BCM2837",
            manufacturer: "Sony UK",
            ram: "1G",
        }
    }
}

/// Extract the hex code from a `Revision\t: xxxx` line.
fn revision_value(line: &str) -> Option<u32> {
    let rest = line.strip_prefix("Revision")?;
    let value = rest.trim_start_matches([' ', '\t']).strip_prefix(':')?;
    u32::from_str_radix(value.trim(), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PI3_CPUINFO: &str = "\
processor\t: 0
model name\t: ARMv7 Processor rev 4 (v7l)
BogoMIPS\t: 38.40

Hardware\t: BCM2835
Revision\t: a02082
Serial\t\t: 00000000cafe1234
";

    #[test]
    fn decodes_new_style_pi3() {
        let info = BoardInfo::from_cpuinfo(PI3_CPUINFO).unwrap();
        assert_eq!(info.board_type, "Pi 3 Model B");
        assert_eq!(info.processor, "BCM2837");
        assert_eq!(info.ram, "1G");
        assert_eq!(info.manufacturer, "Sony UK");
        assert_eq!(info.gpio_base(), 0x3F20_0000);
    }

    #[test]
    fn decodes_new_style_pi4() {
        let info = BoardInfo::from_revision(0x00C0_3111).unwrap();
        assert_eq!(info.board_type, "Pi 4 Model B");
        assert_eq!(info.processor, "BCM2711");
        assert_eq!(info.ram, "4G");
        assert_eq!(info.gpio_base(), 0xFE20_0000);
    }

    #[test]
    fn decodes_old_style_model_b() {
        let info = BoardInfo::from_revision(0x000E).unwrap();
        assert_eq!(info.board_type, "Model B");
        assert_eq!(info.processor, "BCM2835");
        assert_eq!(info.ram, "512M");
        assert_eq!(info.gpio_base(), 0x2020_0000);
    }

    #[test]
    fn old_style_ignores_warranty_bit() {
        let with_flag = BoardInfo::from_revision(0x0100_000E).unwrap();
        let plain = BoardInfo::from_revision(0x000E).unwrap();
        assert_eq!(with_flag.board_type, plain.board_type);
        assert_eq!(with_flag.ram, plain.ram);
    }

    #[test]
    fn pi5_is_rejected() {
        // BCM2712 (processor field 4): GPIO lives behind RP1, not here.
        let err = BoardInfo::from_revision(0x00D0_4170).unwrap_err();
        assert_eq!(err, SetupError::UnsupportedBoard.into());
    }

    #[test]
    fn non_pi_cpuinfo_is_rejected() {
        let text = "processor\t: 0\nvendor_id\t: GenuineIntel\n";
        let err = BoardInfo::from_cpuinfo(text).unwrap_err();
        assert_eq!(err, SetupError::UnsupportedBoard.into());
    }

    #[test]
    fn last_revision_line_wins() {
        let text = "Revision\t: 0002\nRevision\t: a02082\n";
        let info = BoardInfo::from_cpuinfo(text).unwrap();
        assert_eq!(info.board_type, "Pi 3 Model B");
    }

    #[test]
    fn unknown_revision_is_rejected() {
        let err = BoardInfo::from_revision(0x0001).unwrap_err();
        assert_eq!(err, SetupError::UnsupportedBoard.into());
    }
}
