//! # Peripheral examples for MAX32 microcontrollers
//!
//! Demonstrations of the MAX32 peripherals written against the [`embedded-hal`] traits: UART,
//! I2C, SPI, timers, watchdog, RTC, I2S, the external memory cache, a flash command line and
//! USB mass storage and keyboard devices.
//!
//! Every example is a function or a small state machine that takes its peripherals as trait
//! objects. Where `embedded-hal` has no trait for a peripheral (I2C target mode, SPI slave,
//! windowed watchdog, RTC alarms, I2S, USB device) the module defines one, to be implemented
//! on top of the vendor peripheral driver.
//!
//! [`embedded-hal`]: https://crates.io/crates/embedded-hal
//!
//! # Usage
//!
//! A board crate provides the entry point, brings up clocks and pins and hands the peripherals
//! to an example:
//!
//! ```rust,ignore
//! let mut console = Console::new(uart0_tx);
//! console::banner(&mut console, "SPI Example");
//!
//! let mut leds = StatusLeds::new(led_red, led_green)?;
//! let result = spi::run(&mut spi1, &mut spi0_target, &mut buffers, &mut console);
//! leds.report(&result).ok();
//! ```
//!
//! Interrupt handlers talk to the main loop through [`signal::Signal`] and
//! [`signal::Status`] statics.

#![no_std]

pub mod button;
pub mod checksum;
pub mod console;
pub mod eeprom;
pub mod emcc;
pub mod flash_cli;
pub mod i2c;
pub mod i2s;
pub mod led;
pub mod rtc;
pub mod signal;
pub mod spi;
pub mod timer;
pub mod uart;
pub mod usb;
pub mod watchdog;

/// Crate prelude
pub mod prelude {
    pub use crate::console::Console;
    pub use crate::led::StatusLeds;
    pub use crate::signal::{Signal, Status};
    pub use core::fmt::Write as _msdk_examples_fmt_Write;
    pub use embedded_time::rate::Extensions;
}
