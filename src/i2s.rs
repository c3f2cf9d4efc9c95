/*!
  # Inter-IC Sound
  Two demonstrations:

  - transmit: a 64-sample sine tone is streamed out once, then the example waits for the
    transmit FIFO to drain before shutting the interface down,
  - receive: samples from a digital microphone are copied from the receive FIFO into a ring
    buffer from the FIFO threshold interrupt.

  The microphone delivers 18-bit samples in the most significant bits of a 32-bit word, so
  every word is shifted right by 14 with sign extension.

  ## Example
  ```rust,ignore
    let cfg = Config::tone();
    i2s::transmit_tone(&mut i2s, &cfg)?;

    let mut capture = MicCapture::<256>::new();
    loop {
        I2S_FLAG.wait();
        if capture.drain(&mut i2s) {
            writeln!(console, "Receiving microphone data!").ok();
        }
    }
  ```
*/

use embedded_time::rate::Hertz;

/// One period of a 16-bit unsigned sine
pub const TONE: [u16; 64] = [
    0x8000, 0x8c8b, 0x98f8, 0xa527, 0xb0fb, 0xbc56, 0xc71c, 0xd133, 0xda82, 0xe2f1, 0xea6d,
    0xf0e2, 0xf641, 0xfa7c, 0xfd89, 0xff61, 0xffff, 0xff61, 0xfd89, 0xfa7c, 0xf641, 0xf0e2,
    0xea6d, 0xe2f1, 0xda82, 0xd133, 0xc71c, 0xbc56, 0xb0fb, 0xa527, 0x98f8, 0x8c8b, 0x8000,
    0x7374, 0x6707, 0x5ad8, 0x4f04, 0x43a9, 0x38e3, 0x2ecc, 0x257d, 0x1d0e, 0x1592, 0x0f1d,
    0x09be, 0x0583, 0x0276, 0x009e, 0x0000, 0x009e, 0x0276, 0x0583, 0x09be, 0x0f1d, 0x1592,
    0x1d0e, 0x257d, 0x2ecc, 0x38e3, 0x43a9, 0x4f04, 0x5ad8, 0x6707, 0x7374,
];

/// Receive ring buffer length used by the microphone example
pub const RX_BUFFER_SIZE: usize = 256;

/// Receive FIFO level raising the threshold interrupt
pub const RX_THRESHOLD: u8 = 4;

/// I2S error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The clock divider yields a zero sample rate
    InvalidClock,
    /// Error reported by the I2S peripheral
    I2s(E),
}

/// FIFO word size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordSize {
    Byte,
    HalfWord,
    Word,
}

/// Bits per sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSize {
    Eight,
    Sixteen,
    TwentyFour,
    ThirtyTwo,
}

/// Sample position inside a frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justify {
    Msb,
    Lsb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StereoMode {
    Stereo,
    MonoLeft,
    MonoRight,
}

/// I2S configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub word_size: WordSize,
    pub sample_size: SampleSize,
    /// Bit clocks per channel slot
    pub bits_per_word: u8,
    pub justify: Justify,
    pub stereo: StereoMode,
    /// Bit clock = master clock / (2 * (clkdiv + 1))
    pub clkdiv: u16,
}

impl Config {
    /// 16-bit tone transmission
    pub fn tone() -> Self {
        Config {
            word_size: WordSize::HalfWord,
            sample_size: SampleSize::Sixteen,
            bits_per_word: 16,
            justify: Justify::Lsb,
            stereo: StereoMode::Stereo,
            clkdiv: 100,
        }
    }

    /// 32-bit words from a mono microphone on the left channel, 16 kHz from 12.288 MHz
    pub fn microphone() -> Self {
        Config {
            word_size: WordSize::Word,
            sample_size: SampleSize::ThirtyTwo,
            bits_per_word: 32,
            justify: Justify::Msb,
            stereo: StereoMode::MonoLeft,
            clkdiv: 5,
        }
    }

    pub fn clkdiv(mut self, clkdiv: u16) -> Self {
        self.clkdiv = clkdiv;
        self
    }
}

/// Frame rate for a master clock of `mclk`
pub fn sample_rate(mclk: Hertz, cfg: &Config) -> Hertz {
    let bit_clock = mclk.0 / (2 * (u32::from(cfg.clkdiv) + 1));
    match cfg.bits_per_word {
        0 => Hertz(0),
        bits => Hertz(bit_clock / (2 * u32::from(bits))),
    }
}

/// The I2S peripheral of the vendor HAL
pub trait I2s {
    type Error;

    fn init(&mut self, cfg: &Config) -> Result<(), Self::Error>;
    /// Streams `samples` out and returns once the last one has been queued.
    fn transmit(&mut self, samples: &[u16]) -> Result<(), Self::Error>;
    /// Words still waiting in the transmit FIFO
    fn tx_level(&self) -> usize;
    /// Words waiting in the receive FIFO
    fn rx_level(&self) -> usize;
    /// Pops one word from the receive FIFO
    fn read_fifo(&mut self) -> u32;
    fn enable_rx(&mut self, threshold: u8) -> Result<(), Self::Error>;
    fn clear_rx_threshold_flag(&mut self);
    fn shutdown(&mut self) -> Result<(), Self::Error>;
}

/// Sends [`TONE`] once and shuts the interface down when the FIFO is empty.
pub fn transmit_tone<I: I2s>(i2s: &mut I, cfg: &Config) -> Result<(), Error<I::Error>> {
    if cfg.bits_per_word == 0 {
        return Err(Error::InvalidClock);
    }
    i2s.init(cfg).map_err(Error::I2s)?;
    i2s.transmit(&TONE).map_err(Error::I2s)?;
    while i2s.tx_level() > 0 {}
    i2s.shutdown().map_err(Error::I2s)
}

/// 18-bit microphone sample held in the upper bits of a FIFO word
pub fn mic_sample(word: u32) -> i32 {
    (word as i32) >> 14
}

/// Ring buffer filled from the receive FIFO
pub struct MicCapture<const N: usize> {
    samples: [i32; N],
    head: usize,
    receiving: bool,
}

impl<const N: usize> MicCapture<N> {
    pub const fn new() -> Self {
        MicCapture {
            samples: [0; N],
            head: 0,
            receiving: false,
        }
    }

    /// Stores one FIFO word. Returns `true` the first time a non-zero sample arrives.
    pub fn push(&mut self, word: u32) -> bool {
        let sample = mic_sample(word);
        self.samples[self.head] = sample;
        self.head = (self.head + 1) % N;

        if !self.receiving && sample != 0 {
            self.receiving = true;
            return true;
        }
        false
    }

    /// Moves everything in the receive FIFO into the buffer.
    ///
    /// Returns `true` the first time microphone data shows up.
    pub fn drain<I: I2s>(&mut self, i2s: &mut I) -> bool {
        i2s.clear_rx_threshold_flag();
        let mut first = false;
        for _ in 0..i2s.rx_level() {
            let word = i2s.read_fifo();
            first |= self.push(word);
        }
        first
    }

    pub fn is_receiving(&self) -> bool {
        self.receiving
    }

    /// Index the next sample will be written to
    pub fn head(&self) -> usize {
        self.head
    }

    pub fn samples(&self) -> &[i32; N] {
        &self.samples
    }
}

impl<const N: usize> Default for MicCapture<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Configures the microphone interface and enables the threshold interrupt.
pub fn start_capture<I: I2s>(i2s: &mut I, cfg: &Config) -> Result<(), Error<I::Error>> {
    i2s.init(cfg).map_err(Error::I2s)?;
    i2s.enable_rx(RX_THRESHOLD).map_err(Error::I2s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn microphone_runs_at_16khz() {
        assert_eq!(
            sample_rate(Hertz(12_288_000), &Config::microphone()),
            Hertz(16_000u32)
        );
    }

    #[test]
    fn samples_are_sign_extended() {
        assert_eq!(mic_sample(0xFFFF_C000), -1);
        assert_eq!(mic_sample(0x0000_4000), 1);
        assert_eq!(mic_sample(0x0000_3FFF), 0);
    }

    #[test]
    fn tone_is_symmetric() {
        for i in 1..32 {
            assert_eq!(TONE[i], TONE[32 - i]);
        }
        assert_eq!(TONE[16], 0xffff);
        assert_eq!(TONE[48], 0);
    }
}
