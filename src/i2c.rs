/*!
  # Inter-Integrated Circuit (I2C) master/target transaction
  One I2C peripheral acts as master and writes a block of data to a second peripheral acting
  as target, then reads a block back. The master SCL and SDA pins must be wired to the target
  SCL and SDA pins and the pull-ups must be enabled.

  The master side uses any [`embedded_hal::i2c::I2c`] implementation. The target side is driven
  from the target interrupt: the handler translates the peripheral flags into a
  [`TargetEvent`] and hands it to [`LoopbackTarget::handle`].

  ## Example
  ```rust,ignore
    // I2C1 interrupt
    if let TargetResponse::Finished(result) = TARGET.handle(event, &mut i2c1) {
        I2C_DONE.complete(result.map_err(|_| -1));
    }

    // main
    let result = i2c::run(&mut i2c0, &Config::default(), &mut tx, &mut rx, &mut console);
  ```
*/

use core::fmt::Write;
use embedded_hal::i2c::{I2c, SevenBitAddress};
use embedded_time::rate::Hertz;

use crate::{console, uart::fill_pattern};

/// Address the target answers to
pub const TARGET_ADDR: SevenBitAddress = 0x51;

/// Bytes written and read back
pub const I2C_BYTES: usize = 255;

/// I2C error
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Error reported by the master peripheral
    Bus(E),
    /// `count` bytes read back differ from the ones written
    Verify { count: usize },
    /// The target saw a bus error
    Comm,
}

/// Transaction parameters
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub frequency: Hertz,
    pub address: SevenBitAddress,
    pub len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            frequency: Hertz(100_000),
            address: TARGET_ADDR,
            len: I2C_BYTES,
        }
    }
}

/// FIFO access of an I2C peripheral configured as target
pub trait TargetFifo {
    /// Bytes waiting in the receive FIFO
    fn rx_available(&self) -> usize;
    /// Moves up to `buf.len()` bytes out of the receive FIFO, returning how many were read
    fn read_rx_fifo(&mut self, buf: &mut [u8]) -> usize;
    /// Free space in the transmit FIFO
    fn tx_available(&self) -> usize;
    /// Queues up to `data.len()` bytes, returning how many were accepted
    fn write_tx_fifo(&mut self, data: &[u8]) -> usize;
}

/// Events reported by the target interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TargetEvent {
    /// The master addressed us for writing
    MasterWrite,
    /// The master addressed us for reading
    MasterRead,
    /// The receive FIFO reached its threshold
    RxThreshold,
    /// The receive FIFO overflowed
    Overflow,
    /// The transmit FIFO dropped below its threshold
    TxThreshold,
    /// The transmit FIFO ran empty
    Underflow,
    /// Stop condition, the transaction is over
    Done,
    /// Bus error
    Error,
}

/// What the interrupt handler should do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetResponse {
    /// Keep the transaction running
    Continue,
    /// The transaction ended, report the result to the main loop
    Finished(Result<(), Error<()>>),
}

/// Target that stores what it is written and answers reads with `tx`.
pub struct LoopbackTarget<'a> {
    tx: &'a [u8],
    rx: &'a mut [u8],
    rx_count: usize,
    tx_count: usize,
    tx_len: usize,
}

impl<'a> LoopbackTarget<'a> {
    pub fn new(tx: &'a [u8], rx: &'a mut [u8]) -> Self {
        LoopbackTarget {
            tx,
            rx,
            rx_count: 0,
            tx_count: 0,
            tx_len: 0,
        }
    }

    /// Bytes received in the current write
    pub fn received(&self) -> &[u8] {
        &self.rx[..self.rx_count]
    }

    /// Bytes handed to the master in the current read
    pub fn sent(&self) -> usize {
        self.tx_count
    }

    fn drain_rx<F: TargetFifo>(&mut self, fifo: &mut F) {
        let space = self.rx.len() - self.rx_count;
        let n = fifo.rx_available().min(space);
        let n = fifo.read_rx_fifo(&mut self.rx[self.rx_count..self.rx_count + n]);
        self.rx_count += n;
    }

    fn fill_tx<F: TargetFifo>(&mut self, fifo: &mut F) {
        if self.tx_count >= self.tx_len {
            return;
        }
        let n = fifo.tx_available().min(self.tx_len - self.tx_count);
        self.tx_count += fifo.write_tx_fifo(&self.tx[self.tx_count..self.tx_count + n]);
    }

    /// Reacts to one target event.
    pub fn handle<F: TargetFifo>(&mut self, event: TargetEvent, fifo: &mut F) -> TargetResponse {
        match event {
            TargetEvent::MasterWrite => {
                self.rx_count = 0;
            }
            TargetEvent::MasterRead => {
                self.tx_len = self.tx.len();
                self.tx_count = 0;
                self.fill_tx(fifo);
            }
            TargetEvent::RxThreshold | TargetEvent::Overflow => self.drain_rx(fifo),
            TargetEvent::TxThreshold | TargetEvent::Underflow => self.fill_tx(fifo),
            TargetEvent::Done => {
                self.drain_rx(fifo);
                return TargetResponse::Finished(Ok(()));
            }
            TargetEvent::Error => return TargetResponse::Finished(Err(Error::Comm)),
        }
        TargetResponse::Continue
    }
}

/// Counts the bytes of `rx` that differ from `tx`.
pub fn verify(tx: &[u8], rx: &[u8]) -> usize {
    tx.iter().zip(rx).filter(|(t, r)| t != r).count() + tx.len().abs_diff(rx.len())
}

/// Writes the test pattern to the target and reads it back.
pub fn run<I, W>(
    i2c: &mut I,
    cfg: &Config,
    tx: &mut [u8],
    rx: &mut [u8],
    out: &mut W,
) -> Result<(), Error<I::Error>>
where
    I: I2c,
    W: Write,
{
    let len = cfg.len.min(tx.len()).min(rx.len());
    let tx = &mut tx[..len];
    let rx = &mut rx[..len];

    fill_pattern(tx);
    rx.fill(0);

    writeln!(out, "\n-->Writing data to slave, and reading the data back").ok();
    i2c.write(cfg.address, tx).map_err(Error::Bus)?;
    i2c.read(cfg.address, rx).map_err(Error::Bus)?;

    writeln!(out, "\n-->Result: ").ok();
    console::hex_dump(out, "TxData", tx).ok();
    console::hex_dump(out, "RxData", rx).ok();

    match verify(tx, rx) {
        0 => {
            writeln!(out, "\n-->I2C Transaction Successful").ok();
            Ok(())
        }
        count => {
            writeln!(out, "\n-->I2C Transaction Failed").ok();
            Err(Error::Verify { count })
        }
    }
}
