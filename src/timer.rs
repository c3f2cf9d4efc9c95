/*!
  # Timer
  Three timers run side by side:

  - a PWM timer outputs a 1 kHz, 50 % duty cycle signal on its output pin,
  - a continuous timer interrupts at 4 Hz and toggles LED0,
  - a 16-bit one-shot timer interrupts once after 1 s and toggles LED1.

  The tick values are derived from the timer clock, the prescaler and the requested frequency.

  ## Example
  ```rust,ignore
    timer::start(&mut tmr2, &Config::pwm())?;
    timer::start(&mut tmr3, &Config::continuous())?;
    timer::start(&mut tmr1, &Config::oneshot())?;

    // TMR3 interrupt
    timer::on_interrupt(&mut tmr3, &mut led0).ok();
  ```
*/

use embedded_hal::digital::StatefulOutputPin;
use embedded_time::rate::Hertz;
use paste::paste;

/// Highest PWM frequency the example accepts
pub const MAX_PWM_FREQ: Hertz = Hertz(100_000);

/// Timer error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// A frequency of 0 Hz was requested
    ZeroFrequency,
    /// PWM frequency above [`MAX_PWM_FREQ`]
    FrequencyTooHigh,
    /// Duty cycle above 100 %
    DutyOutOfRange,
    /// The timer clock is too slow for the requested frequency
    ZeroPeriod,
    /// The period does not fit a 16-bit timer
    Overflow,
    /// Error reported by the timer peripheral
    Timer(E),
}

/// Clock sources for a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    /// Peripheral clock
    Pclk(Hertz),
    /// 8 MHz internal oscillator
    Clock8Mhz,
    /// 32.768 kHz external crystal
    Ertco,
}

impl ClockSource {
    pub fn hertz(&self) -> Hertz {
        match self {
            ClockSource::Pclk(freq) => *freq,
            ClockSource::Clock8Mhz => Hertz(8_000_000),
            ClockSource::Ertco => Hertz(32_768),
        }
    }
}

macro_rules! prescalers {
    ($($div:literal),+) => {
        paste! {
            /// Timer clock prescaler
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub enum Prescaler {
                $(
                    #[doc = "Divide the timer clock by " $div]
                    [<Div $div>],
                )+
            }

            impl Prescaler {
                pub const fn divisor(&self) -> u32 {
                    match self {
                        $(Prescaler::[<Div $div>] => $div,)+
                    }
                }
            }
        }
    };
}

prescalers!(1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096);

/// Counting mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Count to the compare value once, then stop
    OneShot,
    /// Count to the compare value, reload and repeat
    Continuous,
    /// Continuous mode driving the timer output with a duty cycle
    Pwm,
}

/// Counter width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitMode {
    ThirtyTwo,
    Sixteen,
}

/// Tick values programmed into the timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticks {
    /// Compare value
    pub period: u32,
    /// PWM transition point, 0 outside of PWM mode
    pub duty: u32,
}

/// Timer configuration
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub clock: ClockSource,
    pub prescaler: Prescaler,
    pub mode: Mode,
    pub bit_mode: BitMode,
    pub frequency: Hertz,
    /// Duty cycle in percent, used in PWM mode
    pub duty_cycle: u8,
    /// Output polarity
    pub polarity: bool,
}

impl Config {
    /// PWM output, 1 kHz at 50 %
    pub fn pwm() -> Self {
        Config {
            clock: ClockSource::Clock8Mhz,
            prescaler: Prescaler::Div16,
            mode: Mode::Pwm,
            bit_mode: BitMode::ThirtyTwo,
            frequency: Hertz(1_000),
            duty_cycle: 50,
            polarity: true,
        }
    }

    /// Continuous 4 Hz interrupt
    pub fn continuous() -> Self {
        Config {
            clock: ClockSource::Clock8Mhz,
            prescaler: Prescaler::Div128,
            mode: Mode::Continuous,
            bit_mode: BitMode::ThirtyTwo,
            frequency: Hertz(4),
            duty_cycle: 0,
            polarity: false,
        }
    }

    /// 16-bit one-shot firing after one second
    pub fn oneshot() -> Self {
        Config {
            clock: ClockSource::Clock8Mhz,
            prescaler: Prescaler::Div128,
            mode: Mode::OneShot,
            bit_mode: BitMode::Sixteen,
            frequency: Hertz(1),
            duty_cycle: 0,
            polarity: false,
        }
    }

    pub fn frequency(mut self, frequency: impl Into<Hertz>) -> Self {
        self.frequency = frequency.into();
        self
    }

    pub fn duty_cycle(mut self, percent: u8) -> Self {
        self.duty_cycle = percent;
        self
    }

    pub fn prescaler(mut self, prescaler: Prescaler) -> Self {
        self.prescaler = prescaler;
        self
    }

    /// Checks the configuration and computes its tick values.
    pub fn ticks<E>(&self) -> Result<Ticks, Error<E>> {
        if self.frequency.0 == 0 {
            return Err(Error::ZeroFrequency);
        }
        if self.mode == Mode::Pwm {
            if self.frequency.0 > MAX_PWM_FREQ.0 {
                return Err(Error::FrequencyTooHigh);
            }
            if self.duty_cycle > 100 {
                return Err(Error::DutyOutOfRange);
            }
        }

        let period = period_ticks(self.clock.hertz(), self.prescaler, self.frequency);
        if period == 0 {
            return Err(Error::ZeroPeriod);
        }
        if self.bit_mode == BitMode::Sixteen && period > u32::from(u16::MAX) {
            return Err(Error::Overflow);
        }

        let duty = match self.mode {
            Mode::Pwm => duty_ticks(period, self.duty_cycle),
            _ => 0,
        };
        Ok(Ticks { period, duty })
    }
}

/// Timer ticks in one period of `freq`
pub fn period_ticks(clock: Hertz, prescaler: Prescaler, freq: Hertz) -> u32 {
    clock.0 / prescaler.divisor() / freq.0
}

/// Ticks the output spends active for a duty cycle of `percent`
pub fn duty_ticks(period: u32, percent: u8) -> u32 {
    (u64::from(period) * u64::from(percent) / 100) as u32
}

/// A timer instance of the vendor HAL
pub trait TimerPeripheral {
    type Error;

    /// Stops the timer and resets its configuration
    fn shutdown(&mut self);
    /// Programs mode, prescaler, polarity and compare value
    fn init(&mut self, cfg: &Config, ticks: Ticks) -> Result<(), Self::Error>;
    /// Programs the PWM transition point
    fn set_pwm(&mut self, duty: u32) -> Result<(), Self::Error>;
    fn enable_interrupt(&mut self);
    /// Acknowledges the compare interrupt
    fn clear_flags(&mut self);
    fn start(&mut self);
}

/// Configures and starts `timer` following the usual sequence: disable the timer, set the
/// prescaler, polarity and compare values, configure the mode, enable it.
pub fn start<T>(timer: &mut T, cfg: &Config) -> Result<Ticks, Error<T::Error>>
where
    T: TimerPeripheral,
{
    let ticks = cfg.ticks()?;

    timer.shutdown();
    timer.init(cfg, ticks).map_err(Error::Timer)?;
    match cfg.mode {
        Mode::Pwm => timer.set_pwm(ticks.duty).map_err(Error::Timer)?,
        Mode::Continuous | Mode::OneShot => timer.enable_interrupt(),
    }
    timer.start();

    Ok(ticks)
}

/// Timer interrupt body: acknowledge and toggle the LED
pub fn on_interrupt<T, P>(timer: &mut T, led: &mut P) -> Result<(), P::Error>
where
    T: TimerPeripheral,
    P: StatefulOutputPin,
{
    timer.clear_flags();
    led.toggle()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_tick_values() {
        assert_eq!(
            Config::pwm().ticks::<()>(),
            Ok(Ticks {
                period: 500,
                duty: 250
            })
        );
        assert_eq!(Config::continuous().ticks::<()>().map(|t| t.period), Ok(15_625));
        assert_eq!(Config::oneshot().ticks::<()>().map(|t| t.period), Ok(62_500));
    }

    #[test]
    fn prescaler_divisors() {
        assert_eq!(Prescaler::Div1.divisor(), 1);
        assert_eq!(Prescaler::Div4096.divisor(), 4096);
    }
}
