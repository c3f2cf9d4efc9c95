/*!
  # SPI master/slave exchange
  Two SPI peripherals of the same chip are wired together, one configured as master and one as
  slave. Both shift out a buffer at the same time; each side must receive exactly what the
  other one sent.

  The master is any [`embedded_hal::spi::SpiBus`]. The slave runs its transaction from its
  interrupt and is reached through [`SpiTarget`].

  ## Example
  ```rust,ignore
    let result = spi::run(&mut spi1, &mut spi0, &mut buffers, &mut console);
    leds.report(&result).ok();
  ```
*/

use core::fmt::Write;
use embedded_hal::spi::{Mode, SpiBus, MODE_0};
use embedded_time::rate::Hertz;

use crate::uart::{fill_pattern, first_mismatch};

/// Bytes exchanged in each direction
pub const DATA_LEN: usize = 1024;

/// SPI error
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<ME, TE> {
    /// Error reported by the master
    Master(ME),
    /// Error reported by the slave
    Target(TE),
    /// The slave did not receive what the master sent
    SlaveRx { index: usize },
    /// The master did not receive what the slave sent
    MasterRx { index: usize },
}

/// Bus parameters shared by master and slave
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub mode: Mode,
    pub frequency: Hertz,
    /// Bits per frame
    pub data_size: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: MODE_0,
            frequency: Hertz(100_000),
            data_size: 8,
        }
    }
}

/// An SPI peripheral operating as slave
pub trait SpiTarget {
    type Error;

    /// Loads `tx` to be shifted out during the next transaction and starts listening.
    fn arm(&mut self, tx: &[u8]) -> Result<(), Self::Error>;

    /// Copies what the master clocked in once the transaction is over.
    fn received(&mut self, rx: &mut [u8]) -> nb::Result<usize, Self::Error>;
}

/// Buffers of both sides
pub struct Buffers<const N: usize> {
    pub master_tx: [u8; N],
    pub master_rx: [u8; N],
    pub slave_tx: [u8; N],
    pub slave_rx: [u8; N],
}

impl<const N: usize> Buffers<N> {
    pub const fn new() -> Self {
        Buffers {
            master_tx: [0; N],
            master_rx: [0; N],
            slave_tx: [0; N],
            slave_rx: [0; N],
        }
    }

    /// Both transmit buffers get the counting pattern, both receive buffers are cleared.
    pub fn reset(&mut self) {
        fill_pattern(&mut self.master_tx);
        fill_pattern(&mut self.slave_tx);
        self.master_rx.fill(0);
        self.slave_rx.fill(0);
    }
}

impl<const N: usize> Default for Buffers<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks both directions, master to slave first.
pub fn verify<const N: usize, ME, TE>(buffers: &Buffers<N>) -> Result<(), Error<ME, TE>> {
    if let Some(index) = first_mismatch(&buffers.master_tx, &buffers.slave_rx) {
        return Err(Error::SlaveRx { index });
    }
    if let Some(index) = first_mismatch(&buffers.slave_tx, &buffers.master_rx) {
        return Err(Error::MasterRx { index });
    }
    Ok(())
}

/// Performs one full-duplex exchange and verifies it.
pub fn run<const N: usize, M, T, W>(
    master: &mut M,
    target: &mut T,
    buffers: &mut Buffers<N>,
    out: &mut W,
) -> Result<(), Error<M::Error, T::Error>>
where
    M: SpiBus<u8>,
    T: SpiTarget,
    W: Write,
{
    buffers.reset();

    target.arm(&buffers.slave_tx).map_err(Error::Target)?;
    master
        .transfer(&mut buffers.master_rx, &buffers.master_tx)
        .map_err(Error::Master)?;
    master.flush().map_err(Error::Master)?;
    nb::block!(target.received(&mut buffers.slave_rx)).map_err(Error::Target)?;

    let result = verify(buffers);
    match &result {
        Err(Error::SlaveRx { .. }) => writeln!(out, "\nSlave failed to receive data.").ok(),
        Err(Error::MasterRx { .. }) => writeln!(out, "\nMaster failed to receive data.").ok(),
        _ => writeln!(out, "\nExample Succeeded").ok(),
    };
    result
}
