/*!
  # Interrupt signals
  The examples hand results from interrupt handlers to the main loop through statics that the
  main loop busy-waits on. Access goes through a critical section, as outlined in the rust
  embedded handbook chapter on concurrency.

  ## Example
  ```rust,ignore
    static DMA_DONE: Signal = Signal::new();

    #[interrupt]
    fn DMA0() {
        DMA_DONE.raise();
    }

    // main
    DMA_DONE.wait();
  ```
*/

use core::cell::Cell;
use critical_section::Mutex;

/// A flag raised by an interrupt handler and consumed by the main loop.
pub struct Signal {
    raised: Mutex<Cell<bool>>,
}

impl Signal {
    pub const fn new() -> Self {
        Signal {
            raised: Mutex::new(Cell::new(false)),
        }
    }

    pub fn raise(&self) {
        critical_section::with(|cs| self.raised.borrow(cs).set(true));
    }

    pub fn is_raised(&self) -> bool {
        critical_section::with(|cs| self.raised.borrow(cs).get())
    }

    /// Clears the flag, returning whether it was raised.
    pub fn take(&self) -> bool {
        critical_section::with(|cs| self.raised.borrow(cs).replace(false))
    }

    /// Spins until the flag is raised, then clears it.
    pub fn wait(&self) {
        while !self.take() {}
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion code of an asynchronous request, written by its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Completion {
    Pending,
    Done(Result<(), i32>),
}

/// Holds the [`Completion`] of one in-flight request.
pub struct Status {
    state: Mutex<Cell<Completion>>,
}

impl Status {
    pub const fn new() -> Self {
        Status {
            state: Mutex::new(Cell::new(Completion::Pending)),
        }
    }

    /// Marks a new request as in flight.
    pub fn arm(&self) {
        critical_section::with(|cs| self.state.borrow(cs).set(Completion::Pending));
    }

    /// Called from the request callback.
    pub fn complete(&self, result: Result<(), i32>) {
        critical_section::with(|cs| self.state.borrow(cs).set(Completion::Done(result)));
    }

    pub fn get(&self) -> Completion {
        critical_section::with(|cs| self.state.borrow(cs).get())
    }

    /// Spins until the request completes and returns its result.
    pub fn wait(&self) -> Result<(), i32> {
        loop {
            if let Completion::Done(result) = self.get() {
                return result;
            }
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}
