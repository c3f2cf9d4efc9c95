//! Push buttons
//!
//! Examples that need the user to connect jumpers first wait for a push button before they
//! start. Buttons read high while pressed.

use embedded_hal::digital::InputPin;

/// Number of consecutive pressed samples after which a press counts as real.
pub const DEBOUNCE_SAMPLES: u32 = 1000;

/// Busy-waits until `button` is pressed.
pub fn wait_for_press<P: InputPin>(button: &mut P) -> Result<(), P::Error> {
    while !button.is_high()? {}
    Ok(())
}

/// Filters contact bounce by counting consecutive pressed samples.
#[derive(Debug, Default)]
pub struct Debouncer {
    count: u32,
}

impl Debouncer {
    pub const fn new() -> Self {
        Debouncer { count: 0 }
    }

    /// Feeds one sample. Returns `true` once the button has been seen pressed for more than
    /// [`DEBOUNCE_SAMPLES`] samples in a row.
    pub fn sample(&mut self, pressed: bool) -> bool {
        if pressed {
            self.count = self.count.saturating_add(1);
        } else {
            self.count = 0;
        }
        self.count > DEBOUNCE_SAMPLES
    }

    /// Samples `button` until it is released or the press is confirmed.
    ///
    /// Call this from the button interrupt to tell a bounce from a real press.
    pub fn confirm<P: InputPin>(&mut self, button: &mut P) -> Result<bool, P::Error> {
        self.count = 0;
        while button.is_high()? {
            if self.sample(true) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
