/*!
  # Mass storage memory
  Storage behind the mass storage class. The host addresses the disk in 512-byte logical
  blocks (LBAs). Two backends are provided:

  - [`SectorCache`] puts the disk on a NOR flash with 4 KiB erase sectors. One sector is kept
    in RAM; blocks are read from and written to that copy, and a modified copy is written back
    (erase, then program) when another sector is needed or the disk is stopped.
  - [`RamDisk`] keeps every block in RAM.

  ## Example
  ```rust,ignore
    let mut disk = SectorCache::new(ext_flash);
    disk.init()?;
    disk.start()?;

    let mut block = [0u8; LBA_SIZE];
    disk.read(0, &mut block)?;
  ```
*/

use core::convert::Infallible;
use embedded_storage::nor_flash::NorFlash;

/// Logical block size
pub const LBA_SIZE: usize = 512;
const LBA_SIZE_SHIFT: u32 = 9;

/// Erase sector size of the external flash
pub const SECTOR_SIZE: usize = 4096;
const SECTOR_SIZE_SHIFT: u32 = 12;

/// Sectors in the external flash
pub const NUM_SECTORS: u32 = 2048;

pub const LBA_PER_SECTOR: u32 = (SECTOR_SIZE >> LBA_SIZE_SHIFT) as u32;

/// Identification strings reported in the SCSI INQUIRY response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdStrings {
    /// At most 8 bytes
    pub vendor: &'static str,
    /// At most 16 bytes
    pub product: &'static str,
    /// At most 4 bytes
    pub version: &'static str,
}

impl Default for IdStrings {
    fn default() -> Self {
        IdStrings {
            vendor: "MAXIM",
            product: "MSC Example",
            version: "1.0",
        }
    }
}

/// Disk error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Error reported by the backing memory
    Memory(E),
    /// The block lies past the end of the disk
    OutOfRange,
}

/// Memory the mass storage class reads and writes blocks from
pub trait BlockDevice {
    type Error;

    fn init(&mut self) -> Result<(), Self::Error>;
    /// Starts serving requests, initialising the memory first if needed.
    fn start(&mut self) -> Result<(), Self::Error>;
    /// Stops serving requests. Pending data is written out.
    fn stop(&mut self) -> Result<(), Self::Error>;
    fn ready(&self) -> bool;
    /// Disk size in logical blocks
    fn size(&self) -> u32;
    fn read(&mut self, lba: u32, block: &mut [u8; LBA_SIZE]) -> Result<(), Self::Error>;
    fn write(&mut self, lba: u32, block: &[u8; LBA_SIZE]) -> Result<(), Self::Error>;
}

/// Flash sector holding `lba`
pub const fn sector_num(lba: u32) -> u32 {
    lba >> (SECTOR_SIZE_SHIFT - LBA_SIZE_SHIFT)
}

/// Byte offset of `lba` inside its sector
pub const fn sector_offset(lba: u32) -> usize {
    ((lba & (LBA_PER_SECTOR - 1)) << LBA_SIZE_SHIFT) as usize
}

/// Disk on a NOR flash with a single cached sector
pub struct SectorCache<F> {
    flash: F,
    sectors: u32,
    sector: [u8; SECTOR_SIZE],
    cached: Option<u32>,
    dirty: bool,
    initialized: bool,
    running: bool,
}

impl<F> SectorCache<F>
where
    F: NorFlash,
{
    pub fn new(flash: F) -> Self {
        Self::with_sectors(flash, NUM_SECTORS)
    }

    /// Disk spanning the first `sectors` sectors of `flash`
    pub fn with_sectors(flash: F, sectors: u32) -> Self {
        SectorCache {
            flash,
            sectors,
            sector: [0; SECTOR_SIZE],
            cached: None,
            dirty: false,
            initialized: false,
            running: false,
        }
    }

    pub fn free(self) -> F {
        self.flash
    }

    /// Sector currently held in RAM
    pub fn cached_sector(&self) -> Option<u32> {
        self.cached
    }

    /// Whether the cached sector differs from flash
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn flush(&mut self) -> Result<(), Error<F::Error>> {
        if let (Some(num), true) = (self.cached, self.dirty) {
            let addr = num << SECTOR_SIZE_SHIFT;
            self.flash
                .erase(addr, addr + SECTOR_SIZE as u32)
                .map_err(Error::Memory)?;
            self.flash.write(addr, &self.sector).map_err(Error::Memory)?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Makes `num` the cached sector, writing back the previous one if it was modified.
    /// `None` only writes back.
    fn load(&mut self, num: Option<u32>) -> Result<(), Error<F::Error>> {
        if self.cached == num {
            return Ok(());
        }
        self.flush()?;
        if let Some(num) = num {
            // cache contents are invalid until the read completes
            self.cached = None;
            self.dirty = false;
            self.flash
                .read(num << SECTOR_SIZE_SHIFT, &mut self.sector)
                .map_err(Error::Memory)?;
            self.cached = Some(num);
        }
        Ok(())
    }

    fn load_block(&mut self, lba: u32) -> Result<usize, Error<F::Error>> {
        if lba >= self.size() {
            return Err(Error::OutOfRange);
        }
        self.load(Some(sector_num(lba)))?;
        Ok(sector_offset(lba))
    }
}

impl<F> BlockDevice for SectorCache<F>
where
    F: NorFlash,
{
    type Error = Error<F::Error>;

    fn init(&mut self) -> Result<(), Self::Error> {
        self.initialized = true;
        Ok(())
    }

    fn start(&mut self) -> Result<(), Self::Error> {
        if !self.initialized {
            self.init()?;
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        self.flush()?;
        self.running = false;
        Ok(())
    }

    fn ready(&self) -> bool {
        self.running
    }

    fn size(&self) -> u32 {
        LBA_PER_SECTOR * self.sectors
    }

    fn read(&mut self, lba: u32, block: &mut [u8; LBA_SIZE]) -> Result<(), Self::Error> {
        let offset = self.load_block(lba)?;
        block.copy_from_slice(&self.sector[offset..offset + LBA_SIZE]);
        Ok(())
    }

    fn write(&mut self, lba: u32, block: &[u8; LBA_SIZE]) -> Result<(), Self::Error> {
        let offset = self.load_block(lba)?;
        self.sector[offset..offset + LBA_SIZE].copy_from_slice(block);
        self.dirty = true;
        Ok(())
    }
}

/// Disk of `N` blocks in RAM
pub struct RamDisk<const N: usize> {
    blocks: [[u8; LBA_SIZE]; N],
    initialized: bool,
    running: bool,
}

impl<const N: usize> RamDisk<N> {
    pub const fn new() -> Self {
        RamDisk {
            blocks: [[0; LBA_SIZE]; N],
            initialized: false,
            running: false,
        }
    }

    fn block(&mut self, lba: u32) -> Result<&mut [u8; LBA_SIZE], Error<Infallible>> {
        self.blocks
            .get_mut(lba as usize)
            .ok_or(Error::OutOfRange)
    }
}

impl<const N: usize> Default for RamDisk<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> BlockDevice for RamDisk<N> {
    type Error = Error<Infallible>;

    fn init(&mut self) -> Result<(), Self::Error> {
        self.initialized = true;
        Ok(())
    }

    fn start(&mut self) -> Result<(), Self::Error> {
        if !self.initialized {
            self.init()?;
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        self.running = false;
        Ok(())
    }

    fn ready(&self) -> bool {
        self.running
    }

    fn size(&self) -> u32 {
        N as u32
    }

    fn read(&mut self, lba: u32, block: &mut [u8; LBA_SIZE]) -> Result<(), Self::Error> {
        block.copy_from_slice(&self.block(lba)?[..]);
        Ok(())
    }

    fn write(&mut self, lba: u32, block: &[u8; LBA_SIZE]) -> Result<(), Self::Error> {
        self.block(lba)?.copy_from_slice(block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lba_to_sector() {
        assert_eq!(sector_num(0), 0);
        assert_eq!(sector_num(7), 0);
        assert_eq!(sector_num(8), 1);
        assert_eq!(sector_offset(9), 512);
        assert_eq!(sector_offset(15), 7 * 512);
    }

    #[test]
    fn ram_disk_rejects_blocks_past_the_end() {
        let mut disk = RamDisk::<4>::new();
        let mut block = [0u8; LBA_SIZE];
        assert_eq!(disk.read(4, &mut block), Err(Error::OutOfRange));
        assert_eq!(disk.write(3, &[0xa5; LBA_SIZE]), Ok(()));
        assert_eq!(disk.read(3, &mut block), Ok(()));
        assert_eq!(block, [0xa5; LBA_SIZE]);
    }
}
