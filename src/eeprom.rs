//! I2C EEPROM emulator
//!
//! Makes an I2C peripheral in target mode behave like a serial EEPROM with two address bytes.
//! A write transaction starts with the big-endian memory address followed by the data to
//! store. A read transaction streams data starting at the current address. The address
//! auto-increments and wraps around at the end of the memory, like on the real parts.
//!
//! A sync pin tells the master when the emulator is ready for the next transaction: it is
//! driven low while a transaction is being processed and high once the emulator is idle.

use embedded_hal::digital::OutputPin;

use crate::i2c::{TargetEvent, TargetFifo};

/// Number of address bytes at the start of every write
pub const ADDRESS_BYTES: usize = 2;

/// Emulator error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Driving the sync pin failed
    Pin(E),
    /// The backing memory has no bytes
    EmptyMemory,
    /// The bus reported an error during the transaction
    Comm,
}

/// Emulator state after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Busy,
    /// The transaction is complete, start the next one
    Done,
}

pub struct Emulator<'a, P> {
    mem: &'a mut [u8],
    sync: P,
    pointer: usize,
    address: [u8; ADDRESS_BYTES],
    address_len: usize,
}

impl<'a, P> Emulator<'a, P>
where
    P: OutputPin,
{
    /// Creates the emulator on top of `mem` and signals readiness on `sync`.
    pub fn new(mem: &'a mut [u8], mut sync: P) -> Result<Self, Error<P::Error>> {
        if mem.is_empty() {
            return Err(Error::EmptyMemory);
        }
        sync.set_high().map_err(Error::Pin)?;
        Ok(Emulator {
            mem,
            sync,
            pointer: 0,
            address: [0; ADDRESS_BYTES],
            address_len: 0,
        })
    }

    /// Current address pointer
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn memory(&self) -> &[u8] {
        &self.mem[..]
    }

    pub fn release(self) -> P {
        self.sync
    }

    fn advance(&mut self) {
        self.pointer = (self.pointer + 1) % self.mem.len();
    }

    fn store(&mut self, byte: u8) {
        if self.address_len < ADDRESS_BYTES {
            self.address[self.address_len] = byte;
            self.address_len += 1;
            if self.address_len == ADDRESS_BYTES {
                self.pointer = usize::from(u16::from_be_bytes(self.address)) % self.mem.len();
            }
            return;
        }
        self.mem[self.pointer] = byte;
        self.advance();
    }

    fn drain_rx<F: TargetFifo>(&mut self, fifo: &mut F) {
        let mut byte = [0u8; 1];
        while fifo.rx_available() > 0 && fifo.read_rx_fifo(&mut byte) == 1 {
            self.store(byte[0]);
        }
    }

    fn fill_tx<F: TargetFifo>(&mut self, fifo: &mut F) {
        while fifo.tx_available() > 0 {
            if fifo.write_tx_fifo(&self.mem[self.pointer..=self.pointer]) == 0 {
                break;
            }
            self.advance();
        }
    }

    /// Reacts to one target event.
    pub fn handle<F: TargetFifo>(
        &mut self,
        event: TargetEvent,
        fifo: &mut F,
    ) -> Result<Progress, Error<P::Error>> {
        match event {
            TargetEvent::MasterWrite => {
                self.sync.set_low().map_err(Error::Pin)?;
                self.address_len = 0;
            }
            TargetEvent::MasterRead => {
                self.sync.set_low().map_err(Error::Pin)?;
                self.fill_tx(fifo);
            }
            TargetEvent::RxThreshold | TargetEvent::Overflow => self.drain_rx(fifo),
            TargetEvent::TxThreshold | TargetEvent::Underflow => self.fill_tx(fifo),
            TargetEvent::Done => {
                self.drain_rx(fifo);
                self.sync.set_high().map_err(Error::Pin)?;
                return Ok(Progress::Done);
            }
            TargetEvent::Error => {
                self.sync.set_high().map_err(Error::Pin)?;
                return Err(Error::Comm);
            }
        }
        Ok(Progress::Busy)
    }
}
