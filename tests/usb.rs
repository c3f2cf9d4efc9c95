//! USB device state machine, mass storage backends and the HID keyboard.

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};
use msdk_examples::usb::hid::{self, Action, Keyboard, Typist, RELEASE_REPORT, TEXT};
use msdk_examples::usb::msc::{
    BlockDevice, Error as DiskError, RamDisk, SectorCache, LBA_SIZE, SECTOR_SIZE,
};
use msdk_examples::usb::{
    self, ClassDriver, ConfigDescriptor, EndpointConfig, EndpointDescriptor, Error, EventFlags,
    Speed, UsbApp, UsbController, UsbEvent, FEATURE_REMOTE_WAKE,
};

#[derive(Default)]
struct FakeUsb {
    speed: Option<Speed>,
    enabled: Vec<UsbEvent>,
    connected: bool,
    config_clears: u32,
    selected: Option<Speed>,
    wakeups: u32,
}

impl UsbController for FakeUsb {
    fn connect(&mut self) {
        self.connected = true;
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn clear_event(&mut self, _event: UsbEvent) {}

    fn enable_event(&mut self, event: UsbEvent) {
        if !self.enabled.contains(&event) {
            self.enabled.push(event);
        }
    }

    fn disable_event(&mut self, event: UsbEvent) {
        self.enabled.retain(|&e| e != event);
    }

    fn clear_config(&mut self) {
        self.config_clears += 1;
    }

    fn speed(&self) -> Speed {
        self.speed.unwrap_or(Speed::Full)
    }

    fn select_config_descriptors(&mut self, speed: Speed) {
        self.selected = Some(speed);
    }

    fn remote_wakeup(&mut self) {
        self.wakeups += 1;
    }
}

/// Class driver recording its endpoints and every report sent
#[derive(Default)]
struct FakeClass {
    endpoints: Option<EndpointConfig>,
    deconfigures: u32,
    reports: Vec<[u8; 8]>,
    /// `send_report` calls answered with `WouldBlock` before one is accepted
    busy: u32,
}

impl ClassDriver for FakeClass {
    type Error = Infallible;

    fn configure(&mut self, endpoints: &EndpointConfig) -> Result<(), Infallible> {
        self.endpoints = Some(*endpoints);
        Ok(())
    }

    fn deconfigure(&mut self) -> Result<(), Infallible> {
        self.endpoints = None;
        self.deconfigures += 1;
        Ok(())
    }
}

impl Keyboard for FakeClass {
    fn send_report(&mut self, report: &[u8; 8]) -> nb::Result<(), Infallible> {
        if self.busy > 0 {
            self.busy -= 1;
            return Err(nb::Error::WouldBlock);
        }
        self.reports.push(*report);
        Ok(())
    }
}

fn descriptor(max_packet: u16) -> ConfigDescriptor {
    ConfigDescriptor {
        value: 1,
        ep_out: Some(EndpointDescriptor {
            address: 0x01,
            max_packet,
        }),
        ep_in: Some(EndpointDescriptor {
            address: 0x82,
            max_packet,
        }),
    }
}

/// Runs the events of a host attaching and selecting configuration 1
fn enumerate(app: &mut UsbApp<'_, FakeClass>, usb: &mut FakeUsb) {
    for event in [UsbEvent::Vbus, UsbEvent::BusReset, UsbEvent::BusResetDone] {
        app.on_event(usb, event).unwrap();
    }
    app.on_set_config(1).unwrap();
}

#[test]
fn attach_and_enumerate_at_full_speed() {
    let events = EventFlags::new();
    let mut usb = FakeUsb::default();
    let mut app = UsbApp::new(FakeClass::default(), &events, descriptor(64));

    app.start(&mut usb);
    assert_eq!(usb.enabled, [UsbEvent::NoVbus, UsbEvent::Vbus]);
    assert!(app.is_suspended());
    assert!(!app.status_led());

    enumerate(&mut app, &mut usb);

    assert!(usb.connected);
    assert!(!usb.enabled.contains(&UsbEvent::BusResetDone));
    assert_eq!(usb.selected, None);
    assert!(app.is_configured());
    assert!(app.status_led());
    assert_eq!(
        app.class().endpoints,
        Some(EndpointConfig {
            out_ep: 1,
            out_max_packet: 64,
            in_ep: 2,
            in_max_packet: 64,
        })
    );

    let mut out = String::new();
    while let Some(event) = events.take_next() {
        usb::report(event, app.speed(), &mut out).unwrap();
    }
    assert_eq!(
        out,
        "VBUS Connect\nBus Reset\nBus Reset Done: Full speed\nEnumeration complete.\n"
    );
}

#[test]
fn high_speed_uses_its_own_descriptor() {
    let events = EventFlags::new();
    let mut usb = FakeUsb {
        speed: Some(Speed::High),
        ..FakeUsb::default()
    };
    let mut app =
        UsbApp::new(FakeClass::default(), &events, descriptor(64)).high_speed(descriptor(512));

    app.start(&mut usb);
    enumerate(&mut app, &mut usb);

    assert!(usb.enabled.contains(&UsbEvent::BusResetDone));
    assert_eq!(usb.selected, Some(Speed::High));
    assert_eq!(app.speed(), Speed::High);
    assert_eq!(app.class().endpoints.map(|ep| ep.in_max_packet), Some(512));
}

#[test]
fn set_config_zero_and_unknown() {
    let events = EventFlags::new();
    let mut usb = FakeUsb::default();
    let mut app = UsbApp::new(FakeClass::default(), &events, descriptor(64));
    enumerate(&mut app, &mut usb);

    assert_eq!(app.on_set_config(2), Err(Error::Stall));
    assert!(app.is_configured());

    app.on_set_config(0).unwrap();
    assert!(!app.is_configured());
    assert_eq!(app.class().endpoints, None);
}

#[test]
fn vbus_loss_tears_down() {
    let events = EventFlags::new();
    let mut usb = FakeUsb::default();
    let mut app = UsbApp::new(FakeClass::default(), &events, descriptor(64));
    app.start(&mut usb);
    enumerate(&mut app, &mut usb);
    let clears = usb.config_clears;

    app.on_event(&mut usb, UsbEvent::NoVbus).unwrap();

    assert!(!usb.connected);
    assert!(!app.is_configured());
    assert!(app.is_suspended());
    assert_eq!(usb.config_clears, clears + 1);
    assert_eq!(usb.enabled, [UsbEvent::NoVbus, UsbEvent::Vbus]);
    assert!(events.is_set(UsbEvent::NoVbus));
}

#[test]
fn suspend_and_resume_drive_the_led() {
    let events = EventFlags::new();
    let mut usb = FakeUsb::default();
    let mut app = UsbApp::new(FakeClass::default(), &events, descriptor(64));
    enumerate(&mut app, &mut usb);

    app.on_event(&mut usb, UsbEvent::Suspend).unwrap();
    assert!(!app.status_led());
    app.on_event(&mut usb, UsbEvent::Resume).unwrap();
    assert!(app.status_led());
}

#[test]
fn remote_wake_feature() {
    let events = EventFlags::new();
    let mut app = UsbApp::new(FakeClass::default(), &events, descriptor(64));

    assert_eq!(app.on_set_feature(0), Err(Error::Stall));
    app.on_set_feature(FEATURE_REMOTE_WAKE).unwrap();
    assert!(app.remote_wake_enabled());
    app.on_clear_feature(FEATURE_REMOTE_WAKE).unwrap();
    assert!(!app.remote_wake_enabled());
    assert_eq!(app.on_clear_feature(2), Err(Error::Stall));
}

#[test]
fn typist_types_text_and_wraps() {
    let events = EventFlags::new();
    let mut usb = FakeUsb::default();
    let mut app = UsbApp::new(FakeClass::default(), &events, descriptor(8));
    let mut typist = Typist::new();

    assert_eq!(typist.on_button(&mut app, &mut usb), Ok(Action::Ignored));

    enumerate(&mut app, &mut usb);
    app.class_mut().busy = 2;
    assert_eq!(typist.on_button(&mut app, &mut usb), Ok(Action::Typed(b'M')));
    assert_eq!(
        app.class().reports,
        [hid::ascii_to_key(b'M').unwrap().report(), RELEASE_REPORT]
    );

    for &c in &TEXT[1..] {
        assert_eq!(typist.on_button(&mut app, &mut usb), Ok(Action::Typed(c)));
    }
    assert_eq!(typist.next_char(), TEXT[0]);
    assert_eq!(app.class().reports.len(), 2 * TEXT.len());
}

#[test]
fn typist_wakes_suspended_host() {
    let events = EventFlags::new();
    let mut usb = FakeUsb::default();
    let mut app = UsbApp::new(FakeClass::default(), &events, descriptor(8));
    let mut typist = Typist::new();
    enumerate(&mut app, &mut usb);
    app.on_event(&mut usb, UsbEvent::Suspend).unwrap();

    // wakeup not allowed, the press types as usual
    assert_eq!(typist.on_button(&mut app, &mut usb), Ok(Action::Typed(b'M')));

    app.on_set_feature(FEATURE_REMOTE_WAKE).unwrap();
    assert_eq!(typist.on_button(&mut app, &mut usb), Ok(Action::Woke));
    assert_eq!(usb.wakeups, 1);
    assert!(!app.is_suspended());
    assert!(events.is_set(UsbEvent::RemoteWake));
    assert_eq!(typist.next_char(), b'a');
}

const SECTORS: u32 = 4;

#[derive(Clone, Copy, PartialEq)]
enum Failure {
    /// Reads copy half of the data, then fail
    Read,
    Erase,
}

/// NOR flash counting erases per sector
struct Flash {
    mem: Vec<u8>,
    erases: Vec<u32>,
    fail: Rc<Cell<Option<Failure>>>,
}

impl Flash {
    fn new() -> Self {
        Flash {
            mem: vec![0xff; SECTORS as usize * SECTOR_SIZE],
            erases: Vec::new(),
            fail: Rc::default(),
        }
    }
}

impl ErrorType for Flash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for Flash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), NorFlashErrorKind> {
        let start = offset as usize;
        let data = self
            .mem
            .get(start..start + bytes.len())
            .ok_or(NorFlashErrorKind::OutOfBounds)?;
        if self.fail.get() == Some(Failure::Read) {
            let half = bytes.len() / 2;
            bytes[..half].copy_from_slice(&data[..half]);
            return Err(NorFlashErrorKind::Other);
        }
        bytes.copy_from_slice(data);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.mem.len()
    }
}

impl NorFlash for Flash {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), NorFlashErrorKind> {
        if self.fail.get() == Some(Failure::Erase) {
            return Err(NorFlashErrorKind::Other);
        }
        self.mem
            .get_mut(from as usize..to as usize)
            .ok_or(NorFlashErrorKind::OutOfBounds)?
            .fill(0xff);
        self.erases.push(from / SECTOR_SIZE as u32);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), NorFlashErrorKind> {
        let start = offset as usize;
        let cells = self
            .mem
            .get_mut(start..start + bytes.len())
            .ok_or(NorFlashErrorKind::OutOfBounds)?;
        for (cell, byte) in cells.iter_mut().zip(bytes) {
            *cell &= byte;
        }
        Ok(())
    }
}

#[test]
fn sector_cache_writes_back_on_sector_change() {
    let mut disk = SectorCache::with_sectors(Flash::new(), SECTORS);
    disk.start().unwrap();
    assert!(disk.ready());
    assert_eq!(disk.size(), 32);

    disk.write(9, &[0x5a; LBA_SIZE]).unwrap();
    assert_eq!(disk.cached_sector(), Some(1));
    assert!(disk.is_dirty());

    let mut block = [0u8; LBA_SIZE];
    disk.read(8, &mut block).unwrap();
    assert_eq!(block, [0xff; LBA_SIZE]);
    assert!(disk.is_dirty());

    disk.read(0, &mut block).unwrap();
    assert_eq!(disk.cached_sector(), Some(0));
    assert!(!disk.is_dirty());

    disk.read(9, &mut block).unwrap();
    assert_eq!(block, [0x5a; LBA_SIZE]);

    let flash = disk.free();
    assert_eq!(flash.erases, [1]);
    assert!(flash.mem[SECTOR_SIZE + LBA_SIZE..SECTOR_SIZE + 2 * LBA_SIZE]
        .iter()
        .all(|&b| b == 0x5a));
}

#[test]
fn sector_cache_flushes_on_stop() {
    let mut disk = SectorCache::with_sectors(Flash::new(), SECTORS);
    disk.start().unwrap();
    disk.write(31, &[0; LBA_SIZE]).unwrap();
    disk.stop().unwrap();

    assert!(!disk.ready());
    assert!(!disk.is_dirty());
    assert_eq!(disk.cached_sector(), Some(3));
    assert_eq!(disk.free().erases, [3]);
}

#[test]
fn sector_cache_rejects_blocks_past_the_end() {
    let mut disk = SectorCache::with_sectors(Flash::new(), SECTORS);
    let mut block = [0u8; LBA_SIZE];
    assert_eq!(disk.read(32, &mut block), Err(DiskError::OutOfRange));
    assert_eq!(disk.cached_sector(), None);
}

#[test]
fn failed_sector_read_drops_the_cache() {
    let mut flash = Flash::new();
    flash.mem[..SECTOR_SIZE].fill(0x11);
    flash.mem[SECTOR_SIZE..2 * SECTOR_SIZE].fill(0x22);
    let fail = flash.fail.clone();
    let mut disk = SectorCache::with_sectors(flash, SECTORS);
    let mut block = [0u8; LBA_SIZE];

    disk.read(0, &mut block).unwrap();
    assert_eq!(block, [0x11; LBA_SIZE]);

    fail.set(Some(Failure::Read));
    assert_eq!(
        disk.read(8, &mut block),
        Err(DiskError::Memory(NorFlashErrorKind::Other))
    );
    assert_eq!(disk.cached_sector(), None);

    fail.set(None);
    disk.read(0, &mut block).unwrap();
    assert_eq!(block, [0x11; LBA_SIZE]);
    assert_eq!(disk.cached_sector(), Some(0));
}

#[test]
fn failed_write_back_keeps_dirty_sector() {
    let flash = Flash::new();
    let fail = flash.fail.clone();
    let mut disk = SectorCache::with_sectors(flash, SECTORS);
    disk.write(1, &[0x33; LBA_SIZE]).unwrap();

    fail.set(Some(Failure::Erase));
    let mut block = [0u8; LBA_SIZE];
    assert_eq!(
        disk.read(8, &mut block),
        Err(DiskError::Memory(NorFlashErrorKind::Other))
    );
    assert_eq!(disk.cached_sector(), Some(0));
    assert!(disk.is_dirty());
    assert_eq!(disk.stop(), Err(DiskError::Memory(NorFlashErrorKind::Other)));

    fail.set(None);
    disk.stop().unwrap();
    let flash = disk.free();
    assert_eq!(flash.erases, [0]);
    assert!(flash.mem[LBA_SIZE..2 * LBA_SIZE].iter().all(|&b| b == 0x33));
}

#[test]
fn ram_disk_keeps_blocks() {
    let mut disk = RamDisk::<8>::default();
    assert!(!disk.ready());
    disk.start().unwrap();
    assert_eq!(disk.size(), 8);

    disk.write(7, &[0x11; LBA_SIZE]).unwrap();
    let mut block = [0xffu8; LBA_SIZE];
    disk.read(6, &mut block).unwrap();
    assert_eq!(block, [0; LBA_SIZE]);
    disk.read(7, &mut block).unwrap();
    assert_eq!(block, [0x11; LBA_SIZE]);

    disk.stop().unwrap();
    assert!(!disk.ready());
}
