/*!
  # USB device
  Application side of the USB device examples. The vendor USB stack handles the controller and
  enumeration and calls back into the application for bus events, `SET_CONFIGURATION` and
  `SET/CLEAR_FEATURE` requests. [`UsbApp`] implements those callbacks on top of a
  [`UsbController`] and a [`ClassDriver`], tracks whether the device is configured, suspended
  and allowed to wake the host, and records every event in [`EventFlags`] for the main loop
  to print.

  The class drivers are in [`msc`] (mass storage backed by flash or RAM) and [`hid`] (a
  keyboard typing a fixed text).

  ## Example
  ```rust,ignore
    static EVENTS: EventFlags = EventFlags::new();

    // USB interrupt, from the vendor event dispatcher
    app.on_event(&mut usb, event)?;

    // main
    loop {
        led.set_state(app.status_led().into()).ok();
        if let Some(event) = EVENTS.take_next() {
            usb::report(event, app.speed(), &mut console).ok();
        }
    }
  ```
*/

pub mod hid;
pub mod msc;

use core::cell::Cell;
use core::fmt::{self, Write};
use critical_section::Mutex;

/// `wValue` of the device remote wakeup feature
pub const FEATURE_REMOTE_WAKE: u16 = 1;

/// Bits of an endpoint address holding the endpoint number
pub const EP_NUM_MASK: u8 = 0x7;

/// USB application error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The request is not supported, the control endpoint must stall
    Stall,
    /// Error reported by the class driver
    Class(E),
}

/// Bus events reported by the controller, followed by the events the application adds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbEvent {
    NoVbus,
    Vbus,
    BusReset,
    BusResetDone,
    Suspend,
    Resume,
    /// The host selected our configuration
    EnumComplete,
    /// The device woke the host
    RemoteWake,
}

impl UsbEvent {
    /// Order in which pending events are reported
    pub const PRIORITY: [UsbEvent; 8] = [
        UsbEvent::NoVbus,
        UsbEvent::Vbus,
        UsbEvent::BusReset,
        UsbEvent::BusResetDone,
        UsbEvent::Suspend,
        UsbEvent::Resume,
        UsbEvent::EnumComplete,
        UsbEvent::RemoteWake,
    ];

    const fn bit(self) -> u32 {
        1 << self as u32
    }
}

/// Bus speed negotiated during reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Speed {
    Full,
    High,
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speed::Full => f.write_str("Full"),
            Speed::High => f.write_str("High"),
        }
    }
}

/// Events raised by the USB interrupt and not yet reported by the main loop
pub struct EventFlags {
    bits: Mutex<Cell<u32>>,
}

impl EventFlags {
    pub const fn new() -> Self {
        EventFlags {
            bits: Mutex::new(Cell::new(0)),
        }
    }

    pub fn set(&self, event: UsbEvent) {
        critical_section::with(|cs| {
            let bits = self.bits.borrow(cs);
            bits.set(bits.get() | event.bit());
        });
    }

    pub fn is_set(&self, event: UsbEvent) -> bool {
        critical_section::with(|cs| self.bits.borrow(cs).get() & event.bit() != 0)
    }

    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.bits.borrow(cs).get() == 0)
    }

    /// Clears and returns the pending event that comes first in [`UsbEvent::PRIORITY`].
    pub fn take_next(&self) -> Option<UsbEvent> {
        critical_section::with(|cs| {
            let bits = self.bits.borrow(cs);
            let pending = bits.get();
            let event = UsbEvent::PRIORITY
                .iter()
                .copied()
                .find(|event| pending & event.bit() != 0)?;
            bits.set(pending & !event.bit());
            Some(event)
        })
    }
}

impl Default for EventFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Prints the message the examples show for `event`.
pub fn report<W: Write>(event: UsbEvent, speed: Speed, out: &mut W) -> fmt::Result {
    match event {
        UsbEvent::NoVbus => writeln!(out, "VBUS Disconnect"),
        UsbEvent::Vbus => writeln!(out, "VBUS Connect"),
        UsbEvent::BusReset => writeln!(out, "Bus Reset"),
        UsbEvent::BusResetDone => writeln!(out, "Bus Reset Done: {} speed", speed),
        UsbEvent::Suspend => writeln!(out, "Suspended"),
        UsbEvent::Resume => writeln!(out, "Resume"),
        UsbEvent::EnumComplete => writeln!(out, "Enumeration complete."),
        UsbEvent::RemoteWake => writeln!(out, "Remote Wakeup"),
    }
}

/// Endpoint as listed in a configuration descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// `bEndpointAddress`, direction bit included
    pub address: u8,
    pub max_packet: u16,
}

impl EndpointDescriptor {
    pub const fn number(&self) -> u8 {
        self.address & EP_NUM_MASK
    }
}

/// The parts of a configuration descriptor the application needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigDescriptor {
    /// `bConfigurationValue`
    pub value: u8,
    pub ep_out: Option<EndpointDescriptor>,
    pub ep_in: Option<EndpointDescriptor>,
}

/// Endpoints handed to the class driver when the host configures the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointConfig {
    pub out_ep: u8,
    pub out_max_packet: u16,
    pub in_ep: u8,
    pub in_max_packet: u16,
}

impl From<&ConfigDescriptor> for EndpointConfig {
    fn from(desc: &ConfigDescriptor) -> Self {
        let (out_ep, out_max_packet) = desc
            .ep_out
            .map_or((0, 0), |ep| (ep.number(), ep.max_packet));
        let (in_ep, in_max_packet) = desc
            .ep_in
            .map_or((0, 0), |ep| (ep.number(), ep.max_packet));
        EndpointConfig {
            out_ep,
            out_max_packet,
            in_ep,
            in_max_packet,
        }
    }
}

/// Controller and enumeration services of the vendor USB stack
pub trait UsbController {
    fn connect(&mut self);
    fn disconnect(&mut self);
    fn clear_event(&mut self, event: UsbEvent);
    fn enable_event(&mut self, event: UsbEvent);
    fn disable_event(&mut self, event: UsbEvent);
    /// Forgets the configuration selected by the host
    fn clear_config(&mut self);
    fn speed(&self) -> Speed;
    /// Registers the configuration descriptor for `speed` as the active one and the other as
    /// the other-speed configuration.
    fn select_config_descriptors(&mut self, speed: Speed);
    /// Signals resume to a suspended host.
    fn remote_wakeup(&mut self);
}

/// A USB device class driver
pub trait ClassDriver {
    type Error;

    fn configure(&mut self, endpoints: &EndpointConfig) -> Result<(), Self::Error>;
    fn deconfigure(&mut self) -> Result<(), Self::Error>;
}

/// Device state and callbacks of a USB example
pub struct UsbApp<'a, C> {
    class: C,
    events: &'a EventFlags,
    full_speed: ConfigDescriptor,
    high_speed: Option<ConfigDescriptor>,
    speed: Speed,
    configured: bool,
    suspended: bool,
    remote_wake_enabled: bool,
}

impl<'a, C> UsbApp<'a, C>
where
    C: ClassDriver,
{
    /// Creates the application state. The device starts out unconfigured and in low power.
    pub fn new(class: C, events: &'a EventFlags, full_speed: ConfigDescriptor) -> Self {
        UsbApp {
            class,
            events,
            full_speed,
            high_speed: None,
            speed: Speed::Full,
            configured: false,
            suspended: true,
            remote_wake_enabled: false,
        }
    }

    /// Enables high speed operation with its own configuration descriptor.
    pub fn high_speed(mut self, desc: ConfigDescriptor) -> Self {
        self.high_speed = Some(desc);
        self
    }

    /// Enables the VBUS events the rest of the state machine starts from.
    pub fn start<U: UsbController>(&mut self, usb: &mut U) {
        usb.enable_event(UsbEvent::NoVbus);
        usb.enable_event(UsbEvent::Vbus);
        self.sleep();
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn remote_wake_enabled(&self) -> bool {
        self.remote_wake_enabled
    }

    /// Speed seen at the last bus reset
    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn class(&self) -> &C {
        &self.class
    }

    pub fn class_mut(&mut self) -> &mut C {
        &mut self.class
    }

    pub fn events(&self) -> &'a EventFlags {
        self.events
    }

    /// The status LED is lit while the device is configured and awake.
    pub fn status_led(&self) -> bool {
        self.configured && !self.suspended
    }

    fn sleep(&mut self) {
        self.suspended = true;
    }

    fn wakeup(&mut self) {
        self.suspended = false;
    }

    /// Bus event callback
    pub fn on_event<U: UsbController>(
        &mut self,
        usb: &mut U,
        event: UsbEvent,
    ) -> Result<(), Error<C::Error>> {
        self.events.set(event);

        match event {
            UsbEvent::NoVbus => {
                usb.disable_event(UsbEvent::BusReset);
                usb.disable_event(UsbEvent::Suspend);
                usb.disable_event(UsbEvent::Resume);
                usb.disconnect();
                self.configured = false;
                usb.clear_config();
                self.sleep();
                self.class.deconfigure().map_err(Error::Class)?;
            }
            UsbEvent::Vbus => {
                usb.clear_event(UsbEvent::BusReset);
                usb.enable_event(UsbEvent::BusReset);
                if self.high_speed.is_some() {
                    usb.clear_event(UsbEvent::BusResetDone);
                    usb.enable_event(UsbEvent::BusResetDone);
                }
                usb.clear_event(UsbEvent::Suspend);
                usb.enable_event(UsbEvent::Suspend);
                usb.connect();
                self.sleep();
            }
            UsbEvent::BusReset => {
                self.wakeup();
                usb.clear_config();
                self.configured = false;
                self.class.deconfigure().map_err(Error::Class)?;
            }
            UsbEvent::BusResetDone => {
                self.speed = usb.speed();
                if self.high_speed.is_some() {
                    usb.select_config_descriptors(self.speed);
                }
            }
            UsbEvent::Suspend => self.sleep(),
            UsbEvent::Resume => self.wakeup(),
            UsbEvent::EnumComplete | UsbEvent::RemoteWake => {}
        }
        Ok(())
    }

    fn active_descriptor(&self) -> &ConfigDescriptor {
        match (self.speed, &self.high_speed) {
            (Speed::High, Some(desc)) => desc,
            _ => &self.full_speed,
        }
    }

    /// `SET_CONFIGURATION` callback
    pub fn on_set_config(&mut self, value: u16) -> Result<(), Error<C::Error>> {
        if value == u16::from(self.full_speed.value) {
            self.configured = true;
            self.events.set(UsbEvent::EnumComplete);
            let endpoints = EndpointConfig::from(self.active_descriptor());
            self.class.configure(&endpoints).map_err(Error::Class)
        } else if value == 0 {
            self.configured = false;
            self.class.deconfigure().map_err(Error::Class)
        } else {
            Err(Error::Stall)
        }
    }

    /// `SET_FEATURE` callback
    pub fn on_set_feature(&mut self, feature: u16) -> Result<(), Error<C::Error>> {
        match feature {
            FEATURE_REMOTE_WAKE => {
                self.remote_wake_enabled = true;
                Ok(())
            }
            _ => Err(Error::Stall),
        }
    }

    /// `CLEAR_FEATURE` callback
    pub fn on_clear_feature(&mut self, feature: u16) -> Result<(), Error<C::Error>> {
        match feature {
            FEATURE_REMOTE_WAKE => {
                self.remote_wake_enabled = false;
                Ok(())
            }
            _ => Err(Error::Stall),
        }
    }

    /// Wakes a suspended host if it allowed remote wakeup. Returns whether it did.
    pub fn remote_wake<U: UsbController>(&mut self, usb: &mut U) -> bool {
        if !(self.configured && self.suspended && self.remote_wake_enabled) {
            return false;
        }
        self.wakeup();
        usb.remote_wakeup();
        self.events.set(UsbEvent::RemoteWake);
        true
    }
}
