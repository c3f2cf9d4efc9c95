/*!
  # External memory cache
  Measures reads from an external SPI RAM mapped into the address space, once with the
  external memory cache enabled and once with it disabled.

  Each pass configures the RAM interface, writes [`BUFFER_SIZE`] pseudo-random bytes, then
  reads them back [`ITERATIONS`] times, verifying every read, and reports the elapsed time.
  The pseudo-random sequence continues across passes.

  ## Example
  ```rust,ignore
    let clock = RtcClock::new(rtc);
    let result = emcc::run(&mut ram, &clock, &mut console);
    console::verdict(&mut console, &result).ok();
  ```
*/

use core::fmt::Write;
use embedded_time::duration::Milliseconds;
use embedded_time::Clock;

/// Bytes written and read back on every pass
pub const BUFFER_SIZE: usize = 512;

/// Read-back iterations per pass
pub const ITERATIONS: usize = 100;

/// EMCC error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The RAM interface could not be configured
    Setup(E),
    /// Data read back differed from what was written
    Verify { iteration: usize },
    /// The clock could not be read
    Clock,
    /// Number of failed passes
    Failed(u32),
}

/// Pseudo-random generator matching glibc's `rand_r`
///
/// newlib, the usual bare-metal C library, implements `rand_r` differently, so the byte
/// sequence matches the vendor example only when that was built against glibc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RandR {
    seed: u32,
}

impl RandR {
    pub const fn new(seed: u32) -> Self {
        RandR { seed }
    }

    fn step(&mut self) -> u32 {
        self.seed = self.seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        self.seed / 65_536
    }

    /// Next value in `0..2^31`
    pub fn next(&mut self) -> u32 {
        let mut result = self.step() % 2048;
        result = (result << 10) ^ (self.step() % 1024);
        (result << 10) ^ (self.step() % 1024)
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }
}

/// An external RAM behind the memory cache
pub trait ExternalRam {
    type Error;

    /// Configures the interface and puts the RAM into quad mode.
    fn setup(&mut self) -> Result<(), Self::Error>;
    fn write(&mut self, offset: usize, byte: u8);
    fn read(&mut self, offset: usize) -> u8;
    /// Turns the interface off at the end of a pass.
    fn disable(&mut self);
    fn enable_cache(&mut self);
    fn disable_cache(&mut self);
}

/// One write/read-back pass. Returns the time spent reading.
pub fn test_pass<R, C>(
    ram: &mut R,
    rng: &mut RandR,
    clock: &C,
) -> Result<Milliseconds<u64>, Error<R::Error>>
where
    R: ExternalRam,
    C: Clock,
    u64: TryFrom<C::T>,
{
    ram.setup().map_err(Error::Setup)?;

    let mut written = [0u8; BUFFER_SIZE];
    for (i, byte) in written.iter_mut().enumerate() {
        *byte = rng.next() as u8;
        ram.write(i, *byte);
    }

    let start = match clock.try_now() {
        Ok(start) => start,
        Err(_) => {
            ram.disable();
            return Err(Error::Clock);
        }
    };
    let mut result = Ok(());
    let mut read = [0u8; BUFFER_SIZE];
    for iteration in 0..ITERATIONS {
        for (i, byte) in read.iter_mut().enumerate() {
            *byte = ram.read(i);
        }
        if read != written {
            result = Err(Error::Verify { iteration });
            break;
        }
    }
    let end = clock.try_now();

    ram.disable();
    result?;
    let end = end.map_err(|_| Error::Clock)?;

    let elapsed = end.checked_duration_since(&start).ok_or(Error::Clock)?;
    Milliseconds::<u64>::try_from(elapsed).map_err(|_| Error::Clock)
}

/// Runs one pass with the cache enabled and one with it disabled.
pub fn run<R, C, W>(ram: &mut R, clock: &C, out: &mut W) -> Result<(), Error<R::Error>>
where
    R: ExternalRam,
    C: Clock,
    u64: TryFrom<C::T>,
    W: Write,
{
    let mut rng = RandR::new(0);
    let mut failed = 0;

    for cached in [true, false] {
        if cached {
            write!(out, "Running test reads with data cache enabled.   ").ok();
            ram.enable_cache();
        } else {
            write!(out, "Running test reads with data cache disabled.  ").ok();
            ram.disable_cache();
        }

        match test_pass(ram, &mut rng, clock) {
            Ok(Milliseconds(ms)) => {
                writeln!(out, "Time elapsed: {}.{:03} ", ms / 1000, ms % 1000).ok();
            }
            Err(Error::Verify { .. }) => {
                writeln!(out, "FAILED: Data was not read properly.\n").ok();
                failed += 1;
            }
            Err(Error::Setup(_)) => {
                writeln!(out, "FAILED: SPIXR was not initialized properly.").ok();
                failed += 1;
            }
            Err(_) => failed += 1,
        }
    }

    match failed {
        0 => Ok(()),
        n => Err(Error::Failed(n)),
    }
}
