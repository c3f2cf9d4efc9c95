/*!
  # HID keyboard
  Every confirmed button press types the next character of [`TEXT`] on the host, starting
  over at the end. If the host has suspended the bus and allowed remote wakeup, the press
  wakes the host instead.

  ## Example
  ```rust,ignore
    // button interrupt
    if debouncer.confirm(&mut button)? {
        led.toggle().ok();
        typist.on_button(&mut app, &mut usb)?;
    }
  ```
*/

use super::{ClassDriver, Error, UsbApp, UsbController};

/// Text typed by the example
pub const TEXT: &[u8] = b"Maxim Integrated\n";

/// Left shift bit of the modifier byte
pub const MOD_LEFT_SHIFT: u8 = 0x02;

/// Keyboard page usage IDs
pub mod usage {
    pub const A: u8 = 0x04;
    pub const ONE: u8 = 0x1e;
    pub const ZERO: u8 = 0x27;
    pub const ENTER: u8 = 0x28;
    pub const ESCAPE: u8 = 0x29;
    pub const BACKSPACE: u8 = 0x2a;
    pub const TAB: u8 = 0x2b;
    pub const SPACE: u8 = 0x2c;
}

/// Modifier and usage ID producing one character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub modifier: u8,
    pub usage: u8,
}

impl KeyPress {
    const fn plain(usage: u8) -> Option<Self> {
        Some(KeyPress { modifier: 0, usage })
    }

    const fn shifted(usage: u8) -> Option<Self> {
        Some(KeyPress {
            modifier: MOD_LEFT_SHIFT,
            usage,
        })
    }

    /// Boot protocol input report with this key held
    pub const fn report(&self) -> [u8; 8] {
        [self.modifier, 0, self.usage, 0, 0, 0, 0, 0]
    }
}

/// Input report with every key released
pub const RELEASE_REPORT: [u8; 8] = [0; 8];

/// Key producing the ASCII character `c` on a US layout
pub const fn ascii_to_key(c: u8) -> Option<KeyPress> {
    match c {
        b'a'..=b'z' => KeyPress::plain(usage::A + (c - b'a')),
        b'A'..=b'Z' => KeyPress::shifted(usage::A + (c - b'A')),
        b'1'..=b'9' => KeyPress::plain(usage::ONE + (c - b'1')),
        b'0' => KeyPress::plain(usage::ZERO),
        b'\n' | b'\r' => KeyPress::plain(usage::ENTER),
        0x1b => KeyPress::plain(usage::ESCAPE),
        0x08 => KeyPress::plain(usage::BACKSPACE),
        b'\t' => KeyPress::plain(usage::TAB),
        b' ' => KeyPress::plain(usage::SPACE),
        b'-' => KeyPress::plain(0x2d),
        b'=' => KeyPress::plain(0x2e),
        b'[' => KeyPress::plain(0x2f),
        b']' => KeyPress::plain(0x30),
        b'\\' => KeyPress::plain(0x31),
        b';' => KeyPress::plain(0x33),
        b'\'' => KeyPress::plain(0x34),
        b'`' => KeyPress::plain(0x35),
        b',' => KeyPress::plain(0x36),
        b'.' => KeyPress::plain(0x37),
        b'/' => KeyPress::plain(0x38),
        b'!' => KeyPress::shifted(0x1e),
        b'@' => KeyPress::shifted(0x1f),
        b'#' => KeyPress::shifted(0x20),
        b'$' => KeyPress::shifted(0x21),
        b'%' => KeyPress::shifted(0x22),
        b'^' => KeyPress::shifted(0x23),
        b'&' => KeyPress::shifted(0x24),
        b'*' => KeyPress::shifted(0x25),
        b'(' => KeyPress::shifted(0x26),
        b')' => KeyPress::shifted(0x27),
        b'_' => KeyPress::shifted(0x2d),
        b'+' => KeyPress::shifted(0x2e),
        b'{' => KeyPress::shifted(0x2f),
        b'}' => KeyPress::shifted(0x30),
        b'|' => KeyPress::shifted(0x31),
        b':' => KeyPress::shifted(0x33),
        b'"' => KeyPress::shifted(0x34),
        b'~' => KeyPress::shifted(0x35),
        b'<' => KeyPress::shifted(0x36),
        b'>' => KeyPress::shifted(0x37),
        b'?' => KeyPress::shifted(0x38),
        _ => None,
    }
}

/// HID keyboard class driver
pub trait Keyboard: ClassDriver {
    /// Queues an input report on the interrupt IN endpoint.
    fn send_report(&mut self, report: &[u8; 8]) -> nb::Result<(), Self::Error>;

    /// Sends a press and a release report for `c`. Characters without a key are skipped.
    fn keypress(&mut self, c: u8) -> Result<(), Self::Error> {
        if let Some(key) = ascii_to_key(c) {
            nb::block!(self.send_report(&key.report()))?;
            nb::block!(self.send_report(&RELEASE_REPORT))?;
        }
        Ok(())
    }
}

/// What a button press did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// The device is not configured
    Ignored,
    /// The suspended host was woken
    Woke,
    Typed(u8),
}

/// Position in [`TEXT`]
#[derive(Debug, Default)]
pub struct Typist {
    index: usize,
}

impl Typist {
    pub const fn new() -> Self {
        Typist { index: 0 }
    }

    /// Next character to type
    pub fn next_char(&self) -> u8 {
        TEXT[self.index]
    }

    /// Handles one confirmed button press.
    pub fn on_button<K, U>(
        &mut self,
        app: &mut UsbApp<'_, K>,
        usb: &mut U,
    ) -> Result<Action, Error<K::Error>>
    where
        K: Keyboard,
        U: UsbController,
    {
        if !app.is_configured() {
            return Ok(Action::Ignored);
        }
        if app.remote_wake(usb) {
            return Ok(Action::Woke);
        }

        let c = TEXT[self.index];
        self.index = (self.index + 1) % TEXT.len();
        app.class_mut().keypress(c).map_err(Error::Class)?;
        Ok(Action::Typed(c))
    }
}
