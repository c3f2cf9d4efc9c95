//! Status LEDs
//!
//! The evaluation kits have (at least) two LEDs. By convention LED0 lights up when an example
//! fails and LED1 when it succeeds.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

/// The pass/fail LED pair
pub struct StatusLeds<FAIL, PASS> {
    fail: FAIL,
    pass: PASS,
}

impl<FAIL, PASS, E> StatusLeds<FAIL, PASS>
where
    FAIL: OutputPin<Error = E>,
    PASS: OutputPin<Error = E>,
{
    /// Takes both pins and turns them off.
    pub fn new(mut fail: FAIL, mut pass: PASS) -> Result<Self, E> {
        fail.set_low()?;
        pass.set_low()?;
        Ok(StatusLeds { fail, pass })
    }

    pub fn pass(&mut self) -> Result<(), E> {
        self.pass.set_high()
    }

    pub fn fail(&mut self) -> Result<(), E> {
        self.fail.set_high()
    }

    /// Lights the LED matching the outcome of an example.
    pub fn report<T, R>(&mut self, result: &Result<T, R>) -> Result<(), E> {
        match result {
            Ok(_) => self.pass(),
            Err(_) => self.fail(),
        }
    }

    pub fn release(self) -> (FAIL, PASS) {
        (self.fail, self.pass)
    }
}

/// Blinks `led` `times` times, staying on and off for `half_period_ms` each.
///
/// The LED is left off.
pub fn blink<P, D>(led: &mut P, delay: &mut D, times: u32, half_period_ms: u32) -> Result<(), P::Error>
where
    P: OutputPin,
    D: DelayNs,
{
    for _ in 0..times {
        led.set_high()?;
        delay.delay_ms(half_period_ms);
        led.set_low()?;
        delay.delay_ms(half_period_ms);
    }
    Ok(())
}
