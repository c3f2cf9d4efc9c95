//! External RAM read-back through the memory cache.

use std::cell::Cell;

use embedded_time::{clock, fraction::Fraction, Clock, Instant};
use msdk_examples::emcc::{self, Error, ExternalRam, RandR, BUFFER_SIZE, ITERATIONS};

/// Millisecond clock advancing by `step` on every read
struct StepClock {
    now: Cell<u64>,
    step: u64,
}

impl Clock for StepClock {
    type T = u64;

    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000);

    fn try_now(&self) -> Result<Instant<Self>, clock::Error> {
        let now = self.now.get();
        self.now.set(now + self.step);
        Ok(Instant::new(now))
    }
}

/// Clock that stops working after `reads` successful reads
struct BrokenClock {
    reads: Cell<u32>,
}

impl Clock for BrokenClock {
    type T = u64;

    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000);

    fn try_now(&self) -> Result<Instant<Self>, clock::Error> {
        match self.reads.get() {
            0 => Err(clock::Error::Unspecified),
            n => {
                self.reads.set(n - 1);
                Ok(Instant::new(0))
            }
        }
    }
}

#[derive(Default)]
struct FakeRam {
    mem: Vec<u8>,
    cache_enabled: bool,
    cache_toggles: Vec<bool>,
    setups: u32,
    disables: u32,
    reads: usize,
    /// Reads from this one on return flipped bits, while the cache is disabled
    flaky_from: Option<usize>,
    fail_setup: bool,
}

impl ExternalRam for FakeRam {
    type Error = ();

    fn setup(&mut self) -> Result<(), ()> {
        self.setups += 1;
        if self.fail_setup {
            return Err(());
        }
        self.mem.resize(BUFFER_SIZE, 0);
        Ok(())
    }

    fn write(&mut self, offset: usize, byte: u8) {
        self.mem[offset] = byte;
    }

    fn read(&mut self, offset: usize) -> u8 {
        self.reads += 1;
        match self.flaky_from {
            Some(from) if !self.cache_enabled && self.reads > from => !self.mem[offset],
            _ => self.mem[offset],
        }
    }

    fn disable(&mut self) {
        self.disables += 1;
    }

    fn enable_cache(&mut self) {
        self.cache_enabled = true;
        self.cache_toggles.push(true);
    }

    fn disable_cache(&mut self) {
        self.cache_enabled = false;
        self.cache_toggles.push(false);
    }
}

#[test]
fn both_passes_succeed() {
    let mut ram = FakeRam::default();
    let clock = StepClock {
        now: Cell::new(0),
        step: 1_234,
    };
    let mut out = String::new();

    assert_eq!(emcc::run(&mut ram, &clock, &mut out), Ok(()));
    assert_eq!(ram.cache_toggles, [true, false]);
    assert_eq!(ram.setups, 2);
    assert_eq!(ram.disables, 2);
    assert_eq!(ram.reads, 2 * ITERATIONS * BUFFER_SIZE);
    assert!(out.contains("data cache enabled.   Time elapsed: 1.234"));
    assert!(out.contains("data cache disabled.  Time elapsed: 1.234"));
}

#[test]
fn random_sequence_continues_across_passes() {
    let mut ram = FakeRam::default();
    let clock = StepClock {
        now: Cell::new(0),
        step: 1,
    };
    let mut rng = RandR::new(0);

    emcc::test_pass(&mut ram, &mut rng, &clock).unwrap();
    let first = ram.mem.clone();
    emcc::test_pass(&mut ram, &mut rng, &clock).unwrap();

    let mut expected = RandR::new(0);
    for _ in 0..BUFFER_SIZE {
        expected.next();
    }
    assert_eq!(ram.mem[0], expected.next() as u8);
    assert_ne!(ram.mem, first);
}

#[test]
fn uncached_corruption_fails_second_pass() {
    let mut ram = FakeRam {
        flaky_from: Some(ITERATIONS * BUFFER_SIZE + 10 * BUFFER_SIZE),
        ..FakeRam::default()
    };
    let clock = StepClock {
        now: Cell::new(0),
        step: 5,
    };
    let mut out = String::new();

    assert_eq!(emcc::run(&mut ram, &clock, &mut out), Err(Error::Failed(1)));
    assert!(out.contains("FAILED: Data was not read properly."));
    assert_eq!(ram.disables, 2);
}

#[test]
fn verify_error_names_iteration() {
    let mut ram = FakeRam {
        flaky_from: Some(3 * BUFFER_SIZE),
        ..FakeRam::default()
    };
    let clock = StepClock {
        now: Cell::new(0),
        step: 5,
    };

    assert_eq!(
        emcc::test_pass(&mut ram, &mut RandR::new(0), &clock),
        Err(Error::Verify { iteration: 3 })
    );
}

#[test]
fn setup_failure_counts_as_failed_pass() {
    let mut ram = FakeRam {
        fail_setup: true,
        ..FakeRam::default()
    };
    let clock = StepClock {
        now: Cell::new(0),
        step: 5,
    };
    let mut out = String::new();

    assert_eq!(emcc::run(&mut ram, &clock, &mut out), Err(Error::Failed(2)));
    assert!(out.contains("FAILED: SPIXR was not initialized properly."));
}

#[test]
fn clock_failure_still_turns_ram_off() {
    for reads in [0, 1] {
        let mut ram = FakeRam::default();
        let clock = BrokenClock {
            reads: Cell::new(reads),
        };

        assert_eq!(
            emcc::test_pass(&mut ram, &mut RandR::new(0), &clock),
            Err(Error::Clock)
        );
        assert_eq!(ram.disables, 1);
    }
}
