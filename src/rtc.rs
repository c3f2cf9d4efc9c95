/*!
  # Real Time Clock
  The RTC counts seconds plus a 12-bit sub-second counter running at 4096 Hz. It has two
  alarms:

  - the time-of-day alarm fires when the seconds counter reaches a value,
  - the sub-second alarm fires periodically; its register counts up from the programmed value
    and fires on overflow, see [`msec_to_rssa`].

  Two demonstrations use it. [`SubSecondAlarm`] toggles an LED on every sub-second alarm and
  switches between a 250 ms and a 500 ms rate every time the time-of-day alarm fires.
  [`backup_cycle`] wakes the chip from backup mode with the time-of-day alarm every
  [`TIME_OF_DAY_SEC`] seconds and prints the time.

  ## Initialisation example
  ```rust,ignore
    if !woke_from_backup {
        rtc::configure(&mut rtc, TIME_OF_DAY_SEC, &mut console)?;
    }
    rtc::backup_cycle(&mut rtc, woke_from_backup, &mut led, &mut delay, &mut console)?;
    // enter backup mode
  ```
*/

use core::fmt::{self, Write};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{OutputPin, StatefulOutputPin};
use embedded_time::{clock, fraction::Fraction, Clock, Instant};

/// Wake-up period of the backup mode example
pub const TIME_OF_DAY_SEC: u32 = 7;

/// Time-of-day alarm period of the sub-second alarm example
pub const ALARM_SEC: u32 = 2;

/// Sub-second alarm rates the example switches between
pub const SUBSECOND_FAST_MS: u32 = 250;
pub const SUBSECOND_SLOW_MS: u32 = 500;

/// Sub-second counter frequency
pub const SUBSECOND_HZ: u32 = 4096;

pub const SECS_PER_MIN: u32 = 60;
pub const SECS_PER_HR: u32 = 60 * SECS_PER_MIN;
pub const SECS_PER_DAY: u32 = 24 * SECS_PER_HR;

/// RTC error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    Rtc(E),
}

/// RTC interrupt flags and interrupt enables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(pub u32);

impl Flags {
    pub const NONE: Flags = Flags(0);
    pub const TIME_OF_DAY: Flags = Flags(1 << 0);
    pub const SUBSECOND: Flags = Flags(1 << 1);
    pub const READY: Flags = Flags(1 << 2);
    pub const ALL: Flags = Flags(0b111);

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn union(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }
}

/// Sub-second alarm register value for an alarm every `ms` milliseconds
pub const fn msec_to_rssa(ms: u32) -> u32 {
    0u32.wrapping_sub(ms.wrapping_mul(SUBSECOND_HZ) / 1000)
}

/// The RTC of the vendor HAL. Interrupt enable changes are refused with
/// [`nb::Error::WouldBlock`] while the RTC is synchronising its registers.
pub trait RealTimeClock {
    type Error;

    fn init(&mut self, seconds: u32, subseconds: u32) -> Result<(), Self::Error>;
    fn start(&mut self) -> Result<(), Self::Error>;
    fn seconds(&self) -> u32;
    /// Sub-second counter, in 1/4096 s
    fn subseconds(&self) -> u32;
    fn flags(&self) -> Flags;
    fn clear_flags(&mut self, flags: Flags);
    fn set_time_of_day_alarm(&mut self, seconds: u32) -> Result<(), Self::Error>;
    fn set_subsecond_alarm(&mut self, rssa: u32) -> Result<(), Self::Error>;
    fn enable_interrupts(&mut self, which: Flags) -> nb::Result<(), Self::Error>;
    fn disable_interrupts(&mut self, which: Flags) -> nb::Result<(), Self::Error>;
}

/// Elapsed time split up for printing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl TimeOfDay {
    pub const fn from_seconds(mut sec: u32) -> Self {
        let days = sec / SECS_PER_DAY;
        sec -= days * SECS_PER_DAY;
        let hours = sec / SECS_PER_HR;
        sec -= hours * SECS_PER_HR;
        let minutes = sec / SECS_PER_MIN;
        sec -= minutes * SECS_PER_MIN;
        TimeOfDay {
            days,
            hours,
            minutes,
            seconds: sec,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

/// Prints the current RTC time as `dd:hh:mm:ss`.
pub fn print_time<R: RealTimeClock, W: Write>(rtc: &R, out: &mut W) -> fmt::Result {
    writeln!(
        out,
        "\nCurrent Time (dd:hh:mm:ss): {}\n",
        TimeOfDay::from_seconds(rtc.seconds())
    )
}

/// Starts the RTC from zero with the time-of-day alarm armed `alarm_sec` seconds ahead.
pub fn configure<R, W>(rtc: &mut R, alarm_sec: u32, out: &mut W) -> Result<(), Error<R::Error>>
where
    R: RealTimeClock,
    W: Write,
{
    rtc.init(0, 0).map_err(Error::Rtc)?;
    rtc.start().map_err(Error::Rtc)?;
    writeln!(out, "RTC started").ok();

    // reset interrupt state
    nb::block!(rtc.disable_interrupts(Flags::ALL)).map_err(Error::Rtc)?;
    let pending = rtc.flags();
    rtc.clear_flags(pending);

    rtc.set_time_of_day_alarm(alarm_sec).map_err(Error::Rtc)?;
    nb::block!(rtc.enable_interrupts(Flags::TIME_OF_DAY)).map_err(Error::Rtc)?;
    rtc.start().map_err(Error::Rtc)
}

/// Re-arms the time-of-day alarm `period_sec` seconds from now if it has fired.
///
/// Returns whether the alarm had fired.
pub fn reschedule_alarm<R>(rtc: &mut R, period_sec: u32) -> Result<bool, Error<R::Error>>
where
    R: RealTimeClock,
{
    if !rtc.flags().contains(Flags::TIME_OF_DAY) {
        return Ok(false);
    }
    rtc.clear_flags(Flags::TIME_OF_DAY);

    let now = rtc.seconds();
    nb::block!(rtc.disable_interrupts(Flags::TIME_OF_DAY)).map_err(Error::Rtc)?;
    rtc.set_time_of_day_alarm(now.wrapping_add(period_sec))
        .map_err(Error::Rtc)?;
    nb::block!(rtc.enable_interrupts(Flags::TIME_OF_DAY)).map_err(Error::Rtc)?;
    Ok(true)
}

/// Everything the backup mode example does between two wake-ups, up to the point where it
/// enters backup mode again.
pub fn backup_cycle<R, P, D, W>(
    rtc: &mut R,
    woke_from_backup: bool,
    led: &mut P,
    delay: &mut D,
    out: &mut W,
) -> Result<(), Error<R::Error>>
where
    R: RealTimeClock,
    P: OutputPin,
    D: DelayNs,
    W: Write,
{
    if woke_from_backup {
        led.set_high().ok();
        print_time(rtc, out).ok();
    }

    reschedule_alarm(rtc, TIME_OF_DAY_SEC)?;

    delay.delay_ms(1000);
    led.set_low().ok();
    Ok(())
}

/// Sub-second alarm example state
#[derive(Debug)]
pub struct SubSecondAlarm {
    interval_ms: u32,
}

impl SubSecondAlarm {
    /// Arms both alarms, starting at the fast rate.
    pub fn start<R: RealTimeClock>(rtc: &mut R) -> Result<Self, Error<R::Error>> {
        let alarm = SubSecondAlarm {
            interval_ms: SUBSECOND_FAST_MS,
        };
        rtc.set_subsecond_alarm(msec_to_rssa(alarm.interval_ms))
            .map_err(Error::Rtc)?;
        rtc.set_time_of_day_alarm(rtc.seconds().wrapping_add(ALARM_SEC))
            .map_err(Error::Rtc)?;
        nb::block!(rtc.enable_interrupts(Flags::TIME_OF_DAY.union(Flags::SUBSECOND)))
            .map_err(Error::Rtc)?;
        Ok(alarm)
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// RTC interrupt body
    pub fn on_interrupt<R, P>(&mut self, rtc: &mut R, led: &mut P) -> Result<(), Error<R::Error>>
    where
        R: RealTimeClock,
        P: StatefulOutputPin,
    {
        let flags = rtc.flags();

        if flags.contains(Flags::SUBSECOND) {
            rtc.clear_flags(Flags::SUBSECOND);
            led.toggle().ok();
        }

        if flags.contains(Flags::TIME_OF_DAY) {
            rtc.clear_flags(Flags::TIME_OF_DAY);

            self.interval_ms = match self.interval_ms {
                SUBSECOND_FAST_MS => SUBSECOND_SLOW_MS,
                _ => SUBSECOND_FAST_MS,
            };

            nb::block!(rtc.disable_interrupts(Flags::SUBSECOND)).map_err(Error::Rtc)?;
            rtc.set_subsecond_alarm(msec_to_rssa(self.interval_ms))
                .map_err(Error::Rtc)?;
            nb::block!(rtc.enable_interrupts(Flags::SUBSECOND)).map_err(Error::Rtc)?;

            let now = rtc.seconds();
            nb::block!(rtc.disable_interrupts(Flags::TIME_OF_DAY)).map_err(Error::Rtc)?;
            rtc.set_time_of_day_alarm(now.wrapping_add(ALARM_SEC))
                .map_err(Error::Rtc)?;
            nb::block!(rtc.enable_interrupts(Flags::TIME_OF_DAY)).map_err(Error::Rtc)?;
        }

        Ok(())
    }
}

/// Exposes an RTC as an [`embedded_time::Clock`] ticking at the sub-second rate.
pub struct RtcClock<R> {
    rtc: R,
}

impl<R: RealTimeClock> RtcClock<R> {
    pub fn new(rtc: R) -> Self {
        RtcClock { rtc }
    }

    pub fn free(self) -> R {
        self.rtc
    }

    /// Ticks of 1/4096 s since the RTC was started
    pub fn ticks(&self) -> u64 {
        (u64::from(self.rtc.seconds()) << 12) | u64::from(self.rtc.subseconds() & 0xfff)
    }
}

impl<R: RealTimeClock> Clock for RtcClock<R> {
    type T = u64;

    const SCALING_FACTOR: Fraction = Fraction::new(1, SUBSECOND_HZ);

    fn try_now(&self) -> Result<Instant<Self>, clock::Error> {
        Ok(Instant::new(self.ticks()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rssa_counts_up_to_overflow() {
        assert_eq!(msec_to_rssa(250), 0u32.wrapping_sub(1024));
        assert_eq!(msec_to_rssa(500), 0xFFFF_F800);
        assert_eq!(msec_to_rssa(0), 0);
    }

    #[test]
    fn rssa_wraps_for_long_periods() {
        // 2_000_000 * 4096 wraps to 0xE848_0000 in 32 bits
        assert_eq!(msec_to_rssa(2_000_000), 0u32.wrapping_sub(0xE848_0000 / 1000));
    }

    #[test]
    fn flags_contains() {
        let flags = Flags::TIME_OF_DAY.union(Flags::READY);
        assert!(flags.contains(Flags::TIME_OF_DAY));
        assert!(!flags.contains(Flags::SUBSECOND));
        assert!(!flags.contains(Flags::NONE));
    }
}
