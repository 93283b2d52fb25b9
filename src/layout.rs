//! BCM283x GPIO register block layout.
//!
//! Single source of truth: every register access goes through the word
//! offsets and packing helpers here rather than hard-coding magic numbers.
//!
//! Offsets are word indices into the 4 KiB GPIO block (peripheral base +
//! 0x20_0000) as given in the BCM2835 ARM Peripherals datasheet; the same
//! layout is carried forward through BCM2836/7 and BCM2711.

// ---------------------------------------------------------------------------
// Block geometry
// ---------------------------------------------------------------------------

/// Size of the mapped GPIO register block in bytes (one page).
pub const BLOCK_SIZE: usize = 4096;
/// Number of 32-bit words in the block.
pub const BLOCK_WORDS: usize = BLOCK_SIZE / 4;
/// Number of GPIO lines exposed by the register block.
pub const PIN_COUNT: u8 = 54;
/// Offset of the GPIO block from the SoC peripheral base.
pub const GPIO_BLOCK_OFFSET: u64 = 0x20_0000;

// ---------------------------------------------------------------------------
// Register word offsets
// ---------------------------------------------------------------------------

/// GPFSEL0: function select, 10 pins per word, 3 bits per pin.
pub const FSEL0: usize = 0x00 / 4;
/// GPSET0: output set, 32 pins per word, write-1-to-set.
pub const SET0: usize = 0x1C / 4;
/// GPCLR0: output clear, 32 pins per word, write-1-to-clear.
pub const CLR0: usize = 0x28 / 4;
/// GPLEV0: pin level, 32 pins per word, read-only.
pub const LEV0: usize = 0x34 / 4;
/// GPPUD: pull-up/down control value.
pub const PUD: usize = 0x94 / 4;
/// GPPUDCLK0: pull-up/down clock, 32 pins per word.
pub const PUDCLK0: usize = 0x98 / 4;

// ---------------------------------------------------------------------------
// Field packing
// ---------------------------------------------------------------------------

/// Function-select fields packed per word.
pub const FSEL_PINS_PER_WORD: u8 = 10;
/// Width of one function-select field.
pub const FSEL_FIELD_BITS: u8 = 3;
/// Mask for one function-select field.
pub const FSEL_FIELD_MASK: u32 = 0b111;

/// Word index of the GPFSEL register holding `pin`'s field.
pub const fn fsel_word(pin: u8) -> usize {
    FSEL0 + (pin / FSEL_PINS_PER_WORD) as usize
}

/// Bit shift of `pin`'s function-select field within its word.
pub const fn fsel_shift(pin: u8) -> u32 {
    ((pin % FSEL_PINS_PER_WORD) * FSEL_FIELD_BITS) as u32
}

/// Word index offset (0 or 1) for the 32-pins-per-word registers.
pub const fn bank(pin: u8) -> usize {
    (pin / 32) as usize
}

/// Bit mask for `pin` within its 32-pins-per-word register.
pub const fn bank_bit(pin: u8) -> u32 {
    1 << (pin % 32)
}

// ---------------------------------------------------------------------------
// Pull sequence timing
// ---------------------------------------------------------------------------

/// Settle time between the steps of the GPPUD/GPPUDCLK clock-pulse
/// sequence. The datasheet asks for 150 core cycles; at any plausible core
/// clock that is well under 10 µs.
pub const PUD_SETTLE_MICROS: u64 = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fsel_packing_matches_datasheet() {
        // GPIO 0-9 in GPFSEL0, GPIO 17 in GPFSEL1 at bits 21-23.
        assert_eq!(fsel_word(0), 0);
        assert_eq!(fsel_word(9), 0);
        assert_eq!(fsel_word(10), 1);
        assert_eq!(fsel_word(17), 1);
        assert_eq!(fsel_shift(17), 21);
        assert_eq!(fsel_word(53), 5);
        assert_eq!(fsel_shift(53), 9);
    }

    #[test]
    fn bank_split_at_pin_32() {
        assert_eq!(bank(31), 0);
        assert_eq!(bank(32), 1);
        assert_eq!(bank_bit(31), 1 << 31);
        assert_eq!(bank_bit(32), 1);
        assert_eq!(bank_bit(53), 1 << 21);
    }

    #[test]
    fn register_offsets_match_datasheet() {
        assert_eq!(SET0, 7);
        assert_eq!(CLR0, 10);
        assert_eq!(LEV0, 13);
        assert_eq!(PUD, 37);
        assert_eq!(PUDCLK0, 38);
        assert!(PUDCLK0 + 1 < BLOCK_WORDS);
    }
}
