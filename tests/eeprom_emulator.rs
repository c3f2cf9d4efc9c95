//! EEPROM emulator driven by the target events a master would cause.

use std::collections::VecDeque;

use embedded_hal_mock::eh1::digital::{Mock as PinMock, State as PinState, Transaction as PinTransaction};
use msdk_examples::eeprom::{Emulator, Error, Progress};
use msdk_examples::i2c::{TargetEvent, TargetFifo};

const FIFO_DEPTH: usize = 8;

#[derive(Default)]
struct Fifo {
    rx: VecDeque<u8>,
    tx: VecDeque<u8>,
}

impl TargetFifo for Fifo {
    fn rx_available(&self) -> usize {
        self.rx.len()
    }

    fn read_rx_fifo(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(byte) => buf[n] = byte,
                None => break,
            }
            n += 1;
        }
        n
    }

    fn tx_available(&self) -> usize {
        FIFO_DEPTH - self.tx.len()
    }

    fn write_tx_fifo(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.tx_available());
        self.tx.extend(&data[..n]);
        n
    }
}

/// Emulates a master write of `bytes`, address included.
fn master_write(eeprom: &mut Emulator<'_, PinMock>, fifo: &mut Fifo, bytes: &[u8]) -> Progress {
    assert_eq!(eeprom.handle(TargetEvent::MasterWrite, fifo), Ok(Progress::Busy));
    fifo.rx.extend(bytes);
    eeprom.handle(TargetEvent::Done, fifo).unwrap()
}

fn toggles(n: usize) -> Vec<PinTransaction> {
    let mut transactions = vec![PinTransaction::set(PinState::High)];
    for _ in 0..n {
        transactions.push(PinTransaction::set(PinState::Low));
        transactions.push(PinTransaction::set(PinState::High));
    }
    transactions
}

#[test]
fn write_then_read_back() {
    let mut mem = [0u8; 32];
    let mut fifo = Fifo::default();
    let mut eeprom = Emulator::new(&mut mem, PinMock::new(&toggles(3))).unwrap();

    assert_eq!(
        master_write(&mut eeprom, &mut fifo, &[0x00, 0x10, b'h', b'i']),
        Progress::Done
    );
    assert_eq!(&eeprom.memory()[16..18], b"hi");
    assert_eq!(eeprom.pointer(), 18);

    // address only, moves the pointer
    master_write(&mut eeprom, &mut fifo, &[0x00, 0x10]);
    assert_eq!(eeprom.pointer(), 16);

    assert_eq!(eeprom.handle(TargetEvent::MasterRead, &mut fifo), Ok(Progress::Busy));
    assert_eq!(fifo.tx.iter().take(2).copied().collect::<Vec<_>>(), b"hi");
    assert_eq!(fifo.tx.len(), FIFO_DEPTH);
    assert_eq!(eeprom.handle(TargetEvent::Done, &mut fifo), Ok(Progress::Done));

    eeprom.release().done();
}

#[test]
fn address_and_pointer_wrap() {
    let mut mem = [0u8; 32];
    let mut fifo = Fifo::default();
    let mut eeprom = Emulator::new(&mut mem, PinMock::new(&toggles(2))).unwrap();

    master_write(&mut eeprom, &mut fifo, &[0x00, 0x1f, b'a', b'b']);
    assert_eq!(eeprom.memory()[31], b'a');
    assert_eq!(eeprom.memory()[0], b'b');
    assert_eq!(eeprom.pointer(), 1);

    // 0x0021 lies past the end of a 32 byte memory
    master_write(&mut eeprom, &mut fifo, &[0x00, 0x21]);
    assert_eq!(eeprom.pointer(), 1);

    eeprom.release().done();
}

#[test]
fn bus_error_releases_sync() {
    let mut mem = [0u8; 32];
    let mut fifo = Fifo::default();
    let mut eeprom = Emulator::new(&mut mem, PinMock::new(&toggles(1))).unwrap();

    assert_eq!(eeprom.handle(TargetEvent::MasterWrite, &mut fifo), Ok(Progress::Busy));
    assert_eq!(eeprom.handle(TargetEvent::Error, &mut fifo), Err(Error::Comm));

    eeprom.release().done();
}

#[test]
fn empty_memory_is_refused() {
    let mut sync = PinMock::new(&[]);
    assert!(matches!(
        Emulator::new(&mut [], sync.clone()),
        Err(Error::EmptyMemory)
    ));
    sync.done();
}
