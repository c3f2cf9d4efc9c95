/*!
  # Flash command line
  A small command interpreter reading lines from the console and operating on one page of
  flash reserved for storage:

  | Command                     | Effect                                                   |
  |-----------------------------|----------------------------------------------------------|
  | `erase`                     | erases the storage page unless it is already erased       |
  | `write <word_offset> <text>` | stores every character of `text` in its own 32-bit word  |
  | `read <word_offset> <len>`  | prints `len` words starting at `word_offset`             |
  | `crc`                       | prints the CRC-32 of the whole storage page              |

  Words are stored little endian. An erased word reads `0xFFFF_FFFF`; writes are refused unless
  every target word is erased.

  ## Example
  ```rust,ignore
    let mut cli = FlashCli::new(flash, STORAGE_OFFSET);
    let mut line = LineBuffer::<64>::new();
    loop {
        let byte = nb::block!(rx.read())?;
        if line.feed(byte) {
            cli.execute_line(line.as_str(), &mut console).ok();
            line.clear();
        }
    }
  ```
*/

use core::fmt::Write;
use embedded_storage::nor_flash::NorFlash;
use heapless::String;

use crate::checksum::Checksum;

/// Value of an erased flash word
pub const ERASED: u32 = 0xFFFF_FFFF;

/// Most words a single `read` accepts
pub const MAX_READ: usize = 256;

/// Flash CLI error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Error reported by the flash
    Flash(E),
    /// Unknown command or wrong arguments
    InvalidCommand,
    /// The words touched lie outside the storage page, or a read exceeds [`MAX_READ`]
    OutOfRange,
    /// A target word of `write` is not erased
    NotErased,
    /// Data read back after writing differs
    Verify { offset: u32 },
}

/// One parsed command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Erase,
    Write { word_offset: u32, text: &'a str },
    Read { word_offset: u32, len: u32 },
    Crc,
}

impl<'a> Command<'a> {
    pub fn parse<E>(line: &'a str) -> Result<Self, Error<E>> {
        let mut args = line.split_ascii_whitespace();
        let command = match args.next() {
            Some("erase") => Command::Erase,
            Some("crc") => Command::Crc,
            Some("write") => {
                let word_offset = parse_number(args.next())?;
                let text = args.next().ok_or(Error::InvalidCommand)?;
                Command::Write { word_offset, text }
            }
            Some("read") => {
                let word_offset = parse_number(args.next())?;
                let len = parse_number(args.next())?;
                Command::Read { word_offset, len }
            }
            _ => return Err(Error::InvalidCommand),
        };

        if args.next().is_some() {
            return Err(Error::InvalidCommand);
        }
        Ok(command)
    }
}

fn parse_number<E>(arg: Option<&str>) -> Result<u32, Error<E>> {
    arg.and_then(|s| s.parse().ok())
        .ok_or(Error::InvalidCommand)
}

/// Collects console input up to the end of a line
pub struct LineBuffer<const N: usize> {
    line: String<N>,
    complete: bool,
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        LineBuffer {
            line: String::new(),
            complete: false,
        }
    }

    /// Adds one received byte. Returns `true` once a line is complete.
    ///
    /// Backspace removes the last character, non-ASCII bytes and characters beyond the
    /// capacity are dropped.
    pub fn feed(&mut self, byte: u8) -> bool {
        if self.complete {
            return true;
        }
        match byte {
            b'\r' | b'\n' => self.complete = !self.line.is_empty(),
            0x08 | 0x7f => {
                self.line.pop();
            }
            b if b.is_ascii() && !b.is_ascii_control() => {
                self.line.push(char::from(b)).ok();
            }
            _ => {}
        }
        self.complete
    }

    pub fn as_str(&self) -> &str {
        self.line.as_str()
    }

    pub fn clear(&mut self) {
        self.line.clear();
        self.complete = false;
    }
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Command interpreter working on the page starting at `base`
pub struct FlashCli<F> {
    flash: F,
    base: u32,
}

impl<F> FlashCli<F>
where
    F: NorFlash,
{
    pub fn new(flash: F, base: u32) -> Self {
        FlashCli { flash, base }
    }

    pub fn free(self) -> F {
        self.flash
    }

    /// Words in the storage page
    pub fn page_words(&self) -> u32 {
        F::ERASE_SIZE as u32 / 4
    }

    fn address(&self, word_offset: u32) -> u32 {
        self.base + word_offset * 4
    }

    fn check_range(&self, word_offset: u32, len: u32) -> Result<(), Error<F::Error>> {
        match word_offset.checked_add(len) {
            Some(end) if end <= self.page_words() => Ok(()),
            _ => Err(Error::OutOfRange),
        }
    }

    /// Reads the word at `word_offset` of the storage page.
    pub fn read_word(&mut self, word_offset: u32) -> Result<u32, Error<F::Error>> {
        let mut bytes = [0u8; 4];
        self.flash
            .read(self.address(word_offset), &mut bytes)
            .map_err(Error::Flash)?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn is_erased(&mut self, word_offset: u32, len: u32) -> Result<bool, Error<F::Error>> {
        for i in word_offset..word_offset + len {
            if self.read_word(i)? != ERASED {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Parses and executes one line, printing the outcome.
    pub fn execute_line<W: Write>(&mut self, line: &str, out: &mut W) -> Result<(), Error<F::Error>> {
        let result = Command::parse(line).and_then(|command| self.execute(command, out));
        match &result {
            Err(Error::InvalidCommand) => writeln!(out, "Invalid command format.").ok(),
            Err(Error::OutOfRange) => writeln!(out, "Address out of range.").ok(),
            Err(Error::NotErased) => writeln!(out, "Flash is not erased. Aborting flash write.").ok(),
            Err(Error::Flash(_)) => writeln!(out, "Flash operation failed.").ok(),
            _ => None,
        };
        result
    }

    pub fn execute<W: Write>(&mut self, command: Command<'_>, out: &mut W) -> Result<(), Error<F::Error>> {
        match command {
            Command::Erase => self.erase(out),
            Command::Write { word_offset, text } => self.write(word_offset, text, out),
            Command::Read { word_offset, len } => self.read(word_offset, len, out),
            Command::Crc => self.crc(out).map(|_| ()),
        }
    }

    /// Erases the storage page unless it already is.
    pub fn erase<W: Write>(&mut self, out: &mut W) -> Result<(), Error<F::Error>> {
        if !self.is_erased(0, self.page_words())? {
            self.flash
                .erase(self.base, self.base + F::ERASE_SIZE as u32)
                .map_err(Error::Flash)?;
        }
        writeln!(out, "Success").ok();
        Ok(())
    }

    /// Stores one character per word starting at `word_offset`.
    pub fn write<W: Write>(
        &mut self,
        word_offset: u32,
        text: &str,
        out: &mut W,
    ) -> Result<(), Error<F::Error>> {
        let len = text.len() as u32;
        self.check_range(word_offset, len)?;
        if !self.is_erased(word_offset, len)? {
            return Err(Error::NotErased);
        }

        for (i, byte) in text.bytes().enumerate() {
            let address = self.address(word_offset + i as u32);
            self.flash
                .write(address, &u32::from(byte).to_le_bytes())
                .map_err(Error::Flash)?;
            writeln!(out, "Write addr 0x{:08X}: {}", address, char::from(byte)).ok();
        }

        for (i, byte) in text.bytes().enumerate() {
            let offset = word_offset + i as u32;
            let stored = self.read_word(offset)?;
            if stored != u32::from(byte) {
                writeln!(
                    out,
                    "Verify failed at 0x{:x} (0x{:x} != 0x{:x})",
                    self.address(offset),
                    stored,
                    byte
                )
                .ok();
                return Err(Error::Verify { offset });
            }
        }

        writeln!(out, "Success").ok();
        Ok(())
    }

    /// Prints `len` words starting at `word_offset` and the text they hold.
    ///
    /// At most [`MAX_READ`] words are read at once.
    pub fn read<W: Write>(
        &mut self,
        word_offset: u32,
        len: u32,
        out: &mut W,
    ) -> Result<(), Error<F::Error>> {
        if len as usize > MAX_READ {
            return Err(Error::OutOfRange);
        }
        self.check_range(word_offset, len)?;

        let mut text: String<MAX_READ> = String::new();
        for i in word_offset..word_offset + len {
            let address = self.address(i);
            let word = self.read_word(i)?;
            if word == ERASED {
                writeln!(out, "Read addr 0x{:08X}: empty", address).ok();
                continue;
            }
            let c = char::from(word as u8);
            writeln!(out, "Read addr 0x{:08X}: {}", address, c).ok();
            text.push(c).ok();
        }

        writeln!(out, "Success:").ok();
        writeln!(out, "{}", text).ok();
        Ok(())
    }

    /// Computes and prints the CRC-32 of the storage page.
    pub fn crc<W: Write>(&mut self, out: &mut W) -> Result<u32, Error<F::Error>> {
        let mut checksum = Checksum::new();
        for i in 0..self.page_words() {
            checksum.write_words(&[self.read_word(i)?]);
        }
        let crc = checksum.result();
        writeln!(out, "CRC: 0x{:08X}", crc).ok();
        Ok(crc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse::<()>("erase"), Ok(Command::Erase));
        assert_eq!(Command::parse::<()>("  crc "), Ok(Command::Crc));
        assert_eq!(
            Command::parse::<()>("write 4 hello"),
            Ok(Command::Write {
                word_offset: 4,
                text: "hello"
            })
        );
        assert_eq!(
            Command::parse::<()>("read 0 12"),
            Ok(Command::Read {
                word_offset: 0,
                len: 12
            })
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        assert_eq!(Command::parse::<()>("write 4"), Err(Error::InvalidCommand));
        assert_eq!(Command::parse::<()>("read x 1"), Err(Error::InvalidCommand));
        assert_eq!(Command::parse::<()>("erase now"), Err(Error::InvalidCommand));
        assert_eq!(Command::parse::<()>(""), Err(Error::InvalidCommand));
    }

    #[test]
    fn line_buffer_handles_backspace() {
        let mut line = LineBuffer::<16>::new();
        for &b in b"crx\x08c" {
            assert!(!line.feed(b));
        }
        assert!(line.feed(b'\r'));
        assert_eq!(line.as_str(), "crc");
        line.clear();
        assert!(!line.feed(b'\n'));
    }
}
