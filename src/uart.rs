/*!
  # UART loopback
  Sends a known pattern out of one UART and receives it on another. For this example the TX
  pin of the sending UART must be jumpered to the RX pin of the receiving one.

  ## Example
  ```rust,ignore
    let cfg = Config::default();
    let mut tx_buf = [0u8; BUFF_SIZE];
    let mut rx_buf = [0u8; BUFF_SIZE];
    let result = run(&mut uart2_tx, &mut uart1_rx, &cfg, &mut tx_buf, &mut rx_buf, &mut console);
    leds.report(&result).ok();
  ```
*/

use core::fmt::Write;
use embedded_hal_nb::serial;
use embedded_time::rate::Baud;

/// Length of the test pattern
pub const BUFF_SIZE: usize = 512;

/// UART error
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<TE, RE> {
    /// The transmitter reported an error
    Tx(TE),
    /// The receiver reported an error
    Rx(RE),
    /// Nothing was received for `idle_polls` polls after the whole pattern was sent
    Timeout { received: usize },
    /// Received data differs from what was sent, starting at `index`
    Mismatch { index: usize },
}

/// Loopback parameters
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub baudrate: Baud,
    pub len: usize,
    /// Receiver polls without data, after the last byte went out, before giving up.
    pub idle_polls: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            baudrate: Baud(115_200),
            len: BUFF_SIZE,
            idle_polls: 1_000_000,
        }
    }
}

impl Config {
    pub fn len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    pub fn idle_polls(mut self, polls: u32) -> Self {
        self.idle_polls = polls;
        self
    }
}

/// Fills `buf` with the counting pattern used by every loopback example.
pub fn fill_pattern(buf: &mut [u8]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = i as u8;
    }
}

/// Index of the first byte that differs, if any.
pub fn first_mismatch(expected: &[u8], actual: &[u8]) -> Option<usize> {
    expected
        .iter()
        .zip(actual)
        .position(|(e, a)| e != a)
        .or_else(|| (expected.len() != actual.len()).then(|| expected.len().min(actual.len())))
}

/// Pushes `tx_buf` through `tx` while draining `rx` into `rx_buf`.
///
/// Both sides are polled in turn so the receive FIFO never overflows, which is what the
/// interrupt and DMA variants achieve in hardware.
pub fn transfer<TX, RX>(
    tx: &mut TX,
    rx: &mut RX,
    tx_buf: &[u8],
    rx_buf: &mut [u8],
    idle_polls: u32,
) -> Result<(), Error<TX::Error, RX::Error>>
where
    TX: serial::Write<u8>,
    RX: serial::Read<u8>,
{
    let len = tx_buf.len().min(rx_buf.len());
    let mut sent = 0;
    let mut received = 0;
    let mut idle = 0;

    while received < len {
        if sent < len {
            match tx.write(tx_buf[sent]) {
                Ok(()) => sent += 1,
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(e)) => return Err(Error::Tx(e)),
            }
        }

        match rx.read() {
            Ok(byte) => {
                rx_buf[received] = byte;
                received += 1;
                idle = 0;
            }
            Err(nb::Error::WouldBlock) => {
                if sent == len {
                    idle += 1;
                    if idle > idle_polls {
                        return Err(Error::Timeout { received });
                    }
                }
            }
            Err(nb::Error::Other(e)) => return Err(Error::Rx(e)),
        }
    }

    nb::block!(tx.flush()).map_err(Error::Tx)
}

/// Runs the loopback example and prints its progress on `out`.
pub fn run<TX, RX, W>(
    tx: &mut TX,
    rx: &mut RX,
    cfg: &Config,
    tx_buf: &mut [u8],
    rx_buf: &mut [u8],
    out: &mut W,
) -> Result<(), Error<TX::Error, RX::Error>>
where
    TX: serial::Write<u8>,
    RX: serial::Read<u8>,
    W: Write,
{
    let len = cfg.len.min(tx_buf.len()).min(rx_buf.len());
    let tx_buf = &mut tx_buf[..len];
    let rx_buf = &mut rx_buf[..len];

    writeln!(out, "\nUART Baud \t: {} Hz", cfg.baudrate.0).ok();
    writeln!(out, "Test Length \t: {} bytes\n", len).ok();

    fill_pattern(tx_buf);
    rx_buf.fill(0);

    if let Err(e) = transfer(tx, rx, tx_buf, rx_buf, cfg.idle_polls) {
        writeln!(out, "-->Error during transfer").ok();
        return Err(e);
    }

    match first_mismatch(tx_buf, rx_buf) {
        Some(index) => {
            writeln!(out, "-->Error verifying Data: {}", index).ok();
            Err(Error::Mismatch { index })
        }
        None => {
            writeln!(out, "-->Data verified").ok();
            Ok(())
        }
    }
}
