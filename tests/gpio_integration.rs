//! Integration tests for the pin-level API and the setup/cleanup
//! lifecycle, driven against simulated contexts (no hardware required).

use std::io::Write;

use gpiomem::{
    Config, Direction, Error, FunctionMode, Gpio, Level, PinUse, Pull, SetupError,
};

#[test]
fn output_write_reads_back() {
    let gpio = Gpio::simulated();
    gpio.setup().unwrap();

    gpio.set_pin_mode(17, Direction::Out, Pull::Off).unwrap();
    gpio.write_pin(17, Level::High).unwrap();
    assert_eq!(gpio.read_pin(17), Ok(Level::High));

    gpio.write_pin(17, Level::Low).unwrap();
    assert_eq!(gpio.read_pin(17), Ok(Level::Low));
}

#[test]
fn function_round_trip_preserves_word_neighbors() {
    let gpio = Gpio::simulated();
    gpio.setup().unwrap();

    // 17 and 18 share a function-select word; preset 17 to a different
    // mode and check it survives 18's reconfiguration.
    gpio.set_pin_mode(17, Direction::Out, Pull::Off).unwrap();
    gpio.set_pin_mode(18, Direction::In, Pull::Up).unwrap();
    assert_eq!(gpio.pin_function(17), Ok(FunctionMode::Output));
    assert_eq!(gpio.pin_function(18), Ok(FunctionMode::Input));

    gpio.set_pin_mode(18, Direction::Out, Pull::Off).unwrap();
    assert_eq!(gpio.pin_function(17), Ok(FunctionMode::Output));
    assert_eq!(gpio.pin_function(18), Ok(FunctionMode::Output));
}

#[test]
fn second_setup_does_not_remap() {
    let gpio = Gpio::simulated();
    gpio.setup().unwrap();
    gpio.set_pin_mode(23, Direction::Out, Pull::Off).unwrap();
    gpio.write_pin(23, Level::High).unwrap();

    // If setup mapped again this state would be wiped.
    gpio.setup().unwrap();
    assert_eq!(gpio.read_pin(23), Ok(Level::High));
    assert_eq!(gpio.pin_function(23), Ok(FunctionMode::Output));
}

#[test]
fn cleanup_restores_claimed_pins_to_input() {
    let gpio = Gpio::simulated();
    gpio.setup().unwrap();
    gpio.set_pin_mode(5, Direction::Out, Pull::Off).unwrap();
    gpio.set_pin_mode(6, Direction::In, Pull::Down).unwrap();
    assert_eq!(gpio.pin_use(5), Ok(PinUse::Output));

    gpio.cleanup();
    assert_eq!(gpio.pin_use(5), Ok(PinUse::Unused));
    assert_eq!(gpio.pin_use(6), Ok(PinUse::Unused));
    // The mapping is gone; pin operations now fail instead of touching
    // freed memory.
    assert_eq!(gpio.read_pin(5), Err(Error::NotInitialized));
}

#[test]
fn detection_failure_surfaces_cpuinfo_error() {
    let mut config = Config::default();
    config.cpuinfo_path = "/nonexistent/cpuinfo".into();
    let gpio = Gpio::with_config(config);
    assert_eq!(
        gpio.setup(),
        Err(Error::Setup(SetupError::CpuInfoUnreadable))
    );
    // Setup failed, so the done-latch is not set and a later attempt
    // retries detection.
    assert_eq!(
        gpio.setup(),
        Err(Error::Setup(SetupError::CpuInfoUnreadable))
    );
}

#[test]
fn foreign_cpuinfo_is_not_a_supported_board() {
    let mut fixture = tempfile::NamedTempFile::new().unwrap();
    writeln!(fixture, "processor\t: 0").unwrap();
    writeln!(fixture, "vendor_id\t: GenuineIntel").unwrap();
    writeln!(fixture, "model name\t: Intel(R) Core(TM) i7").unwrap();
    fixture.flush().unwrap();

    let mut config = Config::default();
    config.cpuinfo_path = fixture.path().to_path_buf();
    let gpio = Gpio::with_config(config);
    assert_eq!(gpio.setup(), Err(Error::Setup(SetupError::UnsupportedBoard)));
}

#[test]
fn board_info_resolves_from_cpuinfo_fixture() {
    let mut fixture = tempfile::NamedTempFile::new().unwrap();
    writeln!(fixture, "Hardware\t: BCM2835").unwrap();
    writeln!(fixture, "Revision\t: a02082").unwrap();
    fixture.flush().unwrap();

    let mut config = Config::default();
    config.cpuinfo_path = fixture.path().to_path_buf();
    let gpio = Gpio::with_config(config);

    let info = gpio.board_info().unwrap();
    assert_eq!(info.board_type, "Pi 3 Model B");
    assert_eq!(info.processor, "BCM2837");
    assert_eq!(info.ram, "1G");
}

#[test]
fn contexts_are_isolated_from_each_other() {
    let a = Gpio::simulated();
    let b = Gpio::simulated();
    a.setup().unwrap();
    b.setup().unwrap();

    a.set_pin_mode(12, Direction::Out, Pull::Off).unwrap();
    a.write_pin(12, Level::High).unwrap();

    assert_eq!(b.read_pin(12), Ok(Level::Low));
    assert_eq!(b.pin_use(12), Ok(PinUse::Unused));
}
