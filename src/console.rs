/*!
  # Console
  Every demonstration reports its progress on the console UART. `Console` wraps any
  [`embedded_hal_nb::serial::Write`] transmitter so the usual `write!` / `writeln!` macros
  can be used on it, translating `\n` into `\r\n` for terminal programs.

  ## Example
  ```rust,ignore
    let mut console = Console::new(uart0_tx);
    banner(&mut console, "UART Example");
    writeln!(console, "UART Baud \t: {} Hz", 115_200).ok();
  ```
*/

use core::fmt::{self, Write};
use embedded_hal_nb::serial;

/// Blocking console on top of a non-blocking serial transmitter.
pub struct Console<W> {
    tx: W,
}

impl<W> Console<W>
where
    W: serial::Write<u8>,
{
    pub fn new(tx: W) -> Self {
        Console { tx }
    }

    /// Writes a single byte, waiting until the transmitter accepts it
    pub fn write_byte(&mut self, byte: u8) -> Result<(), W::Error> {
        nb::block!(self.tx.write(byte))
    }

    /// Waits until everything queued so far has left the transmitter.
    ///
    /// Call this before shutting down the console UART, e.g. when its pins are about to be
    /// shared with another peripheral.
    pub fn flush(&mut self) -> Result<(), W::Error> {
        nb::block!(self.tx.flush())
    }

    /// Releases the transmitter
    pub fn free(self) -> W {
        self.tx
    }
}

impl<W> Write for Console<W>
where
    W: serial::Write<u8>,
{
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r').map_err(|_| fmt::Error)?;
            }
            self.write_byte(byte).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}

/// Prints the title banner every example starts with.
pub fn banner(out: &mut impl Write, title: &str) -> fmt::Result {
    writeln!(out, "\n***** {} *****", title)
}

/// Prints `label` followed by every byte of `data` as two hex digits.
pub fn hex_dump(out: &mut impl Write, label: &str, data: &[u8]) -> fmt::Result {
    write!(out, "\n-->{}: ", label)?;
    for byte in data {
        write!(out, "{:02x} ", byte)?;
    }
    writeln!(out)
}

/// Final line printed by the examples that have a pass/fail verdict.
pub fn verdict<T, E>(out: &mut impl Write, result: &Result<T, E>) -> fmt::Result {
    match result {
        Ok(_) => writeln!(out, "\n-->Example Succeeded"),
        Err(_) => writeln!(out, "\n-->Example Failed"),
    }
}
