/*!
  # Windowed watchdog
  The watchdog runs in windowed mode: it must be fed after the lower window boundary and
  before the upper one. Feeding too late is an *overflow*, feeding too early an *underflow*.
  Both raise the watchdog interrupt first and then reset the chip.

  After the reset, [`startup`] finds the reset flag, reports which boundary was violated and
  re-arms the watchdog. Pressing the button in the main loop provokes the violation selected
  with [`TestMode`].

  ## Example
  ```rust,ignore
    watchdog::startup(&mut wdt, &WindowConfig::default(), &mut console)?;
    led::blink(&mut led0, &mut delay, 3, 100).ok();
    wdt.enable();

    loop {
        delay.delay_ms(500);
        let pressed = BUTTON.take();
        if watchdog::step(&mut wdt, TestMode::Overflow, pressed, &mut delay, &mut console) == Step::Hold {
            loop {}
        }
    }
  ```
*/

use core::fmt::Write;
use embedded_hal::delay::DelayNs;
use embedded_hal_zero::watchdog::{Watchdog, WatchdogDisable};
use paste::paste;

/// Watchdog error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WatchdogError {
    /// The interrupt periods must precede the reset periods and the lower window must close
    /// before the upper one opens
    InvalidWindow,
}

macro_rules! periods {
    ($($exp:literal),+) => {
        paste! {
            /// Watchdog period in watchdog clock cycles
            #[allow(non_camel_case_types)]
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
            pub enum Period {
                $(
                    #[doc = "2^" $exp " clock cycles"]
                    [<Pow2_ $exp>],
                )+
            }

            impl Period {
                pub const fn exponent(&self) -> u32 {
                    match self {
                        $(Period::[<Pow2_ $exp>] => $exp,)+
                    }
                }
            }
        }
    };
}

periods!(16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31);

impl Period {
    pub const fn cycles(&self) -> u32 {
        1 << self.exponent()
    }
}

/// Window boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Reset when not fed within this period
    pub upper_reset: Period,
    /// Interrupt when not fed within this period
    pub upper_int: Period,
    /// Reset when fed before this period
    pub lower_reset: Period,
    /// Interrupt when fed before this period
    pub lower_int: Period,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            upper_reset: Period::Pow2_28,
            upper_int: Period::Pow2_27,
            lower_reset: Period::Pow2_24,
            lower_int: Period::Pow2_23,
        }
    }
}

impl WindowConfig {
    pub fn validate(&self) -> Result<(), WatchdogError> {
        if self.upper_int < self.upper_reset
            && self.lower_int < self.lower_reset
            && self.lower_reset < self.upper_int
        {
            Ok(())
        } else {
            Err(WatchdogError::InvalidWindow)
        }
    }
}

/// Why the watchdog reset the chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetCause {
    /// Fed too late
    Overflow,
    /// Fed too early
    Underflow,
}

/// Which window violation the button provokes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestMode {
    Overflow,
    Underflow,
}

/// A watchdog peripheral running in windowed mode
pub trait WindowedWatchdog: Watchdog + WatchdogDisable {
    /// Reset flag left by the watchdog, `None` after any other reset
    fn reset_cause(&self) -> Option<ResetCause>;
    fn clear_reset_flag(&mut self);
    fn clear_int_flag(&mut self);
    fn set_window(&mut self, window: &WindowConfig);
    fn enable_reset(&mut self);
    fn enable_int(&mut self);
    fn enable(&mut self);
}

/// Outcome of [`startup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// The chip came out of a watchdog reset
    Recovered(ResetCause),
    /// Cold start, the window has been programmed
    Configured,
}

/// Inspects the reset flag and brings the watchdog into a known state.
pub fn startup<WD, W>(
    wdt: &mut WD,
    window: &WindowConfig,
    out: &mut W,
) -> Result<Startup, WatchdogError>
where
    WD: WindowedWatchdog,
    W: Write,
{
    if let Some(cause) = wdt.reset_cause() {
        writeln!(out, "\nRecovering from watchdog reset...").ok();
        let reason = match cause {
            ResetCause::Overflow => "too late (OVERFLOW)",
            ResetCause::Underflow => "too soon (UNDERFLOW)",
        };
        writeln!(out, "Watchdog Reset occured {}", reason).ok();

        wdt.disable();
        wdt.clear_reset_flag();
        wdt.clear_int_flag();
        wdt.enable_reset();
        return Ok(Startup::Recovered(cause));
    }

    window.validate()?;
    wdt.disable();
    wdt.set_window(window);
    wdt.enable_reset();
    wdt.enable_int();
    wdt.enable();
    Ok(Startup::Configured)
}

/// Watchdog interrupt body
pub fn on_interrupt<WD: WindowedWatchdog, W: Write>(wdt: &mut WD, out: &mut W) {
    wdt.clear_int_flag();
    writeln!(out, "\nWATCHDOG INTERRUPT TRIGGERED! ").ok();
}

/// What one main loop iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Fed inside the window
    Fed,
    /// Stopped feeding, the watchdog will overflow
    Hold,
    /// Fed twice right away, the second feed underflows
    FedEarly,
}

/// One iteration of the demo loop. `pressed` tells whether the button was pushed since the
/// last iteration.
pub fn step<WD, D, W>(wdt: &mut WD, mode: TestMode, pressed: bool, delay: &mut D, out: &mut W) -> Step
where
    WD: WindowedWatchdog,
    D: DelayNs,
    W: Write,
{
    if !pressed {
        writeln!(out, "Feeding watchdog...").ok();
        wdt.feed();
        return Step::Fed;
    }

    match mode {
        TestMode::Overflow => {
            writeln!(out, "\nHolding to trigger overflow condition...").ok();
            Step::Hold
        }
        TestMode::Underflow => {
            writeln!(out, "\nFeeding watchdog early to trigger underflow condition...").ok();
            delay.delay_ms(50);
            wdt.feed();
            wdt.feed();
            Step::FedEarly
        }
    }
}
