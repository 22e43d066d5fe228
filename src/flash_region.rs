//! The user flash area: sector-respecting erase, word-wise programming, and
//! the write cursor used by the update session.

use crate::{
    consts::{FLASH_USER_END, FLASH_USER_START},
    sector_map::{sectors_between, Sector},
};

/// Raw access to the non-volatile memory.
///
/// Implementations unlock and relock the controller around every call.
/// Nothing else may erase or program while a call is in flight, the single
/// session loop guarantees that.
pub trait SectorFlash {
    type Error;

    fn erase_sector(&mut self, sector: Sector) -> Result<(), Self::Error>;

    /// Programs one 32-bit word at a 4-byte aligned address.
    fn program_word(&mut self, address: u32, word: u32) -> Result<(), Self::Error>;

    fn read(&self, address: u32, buf: &mut [u8]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum FlashError {
    /// Erasing this sector failed. Anything before it is already erased.
    Erase { sector: Sector },
    /// Programming the word at this address failed, or the source ran out.
    Program { address: u32 },
    /// The range leaves the user area or is not word aligned.
    OutOfRegion { address: u32 },
    /// Read back differs from what was written.
    Verify { address: u32 },
}

/// Bytes to word, in the target's in-memory order.
///
/// Cortex-M4 is little endian, so the image bytes land in flash exactly as
/// they came over the wire.
#[inline]
pub fn word_from_bytes(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

/// Inverse of [`word_from_bytes`].
#[inline]
pub fn word_to_bytes(word: u32) -> [u8; 4] {
    word.to_le_bytes()
}

pub struct FlashRegion<F: SectorFlash> {
    flash: F,
}

impl<F: SectorFlash> FlashRegion<F> {
    pub fn new(flash: F) -> Self {
        Self { flash }
    }

    pub fn inner(&self) -> &F {
        &self.flash
    }

    pub fn inner_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Erases every sector from the one holding `FLASH_USER_START` through the
    /// one holding `FLASH_USER_END`. Stops at the first failure.
    pub fn erase_user_region(&mut self) -> Result<(), FlashError> {
        self.erase_between(FLASH_USER_START, FLASH_USER_END)
    }

    /// Erases the sectors holding `first` through `last`, inclusive.
    pub fn erase_between(&mut self, first: u32, last: u32) -> Result<(), FlashError> {
        let sectors = sectors_between(first, last).ok_or_else(|| {
            sboot_log!(error, "No sectors for {=u32:X}..={=u32:X}!", first, last);
            FlashError::OutOfRegion { address: first }
        })?;

        for sector in sectors {
            sboot_log!(info, "erasing sector {=u8}...", sector.0);
            self.flash.erase_sector(sector).map_err(|_| {
                sboot_log!(error, "Erase failed at sector {=u8}!", sector.0);
                FlashError::Erase { sector }
            })?;
        }
        Ok(())
    }

    /// Programs `[start, end)` one word at a time from `source`.
    ///
    /// Aborts on the first failing word; no retries here, the host resends.
    pub fn program_range(&mut self, start: u32, end: u32, source: &[u8]) -> Result<(), FlashError> {
        check_range(start, end)?;

        let mut address = start;
        for chunk in source.chunks_exact(4) {
            if address >= end {
                break;
            }
            let mut word = [0u8; 4];
            word.copy_from_slice(chunk);

            self.flash
                .program_word(address, word_from_bytes(word))
                .map_err(|_| {
                    sboot_log!(error, "Write failed at {=u32:X}!", address);
                    FlashError::Program { address }
                })?;
            address += 4;
        }

        if address < end {
            // Source ran out before the range did.
            sboot_log!(error, "Source too short, stopped at {=u32:X}", address);
            return Err(FlashError::Program { address });
        }

        Ok(())
    }

    /// Reads `[start, start + buf.len())` back into `buf`, word by word.
    pub fn read_back(&self, start: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        let end = start
            .checked_add(buf.len() as u32)
            .ok_or(FlashError::OutOfRegion { address: start })?;
        check_range(start, end)?;

        let mut address = start;
        for chunk in buf.chunks_exact_mut(4) {
            self.flash.read(address, chunk);
            address += 4;
        }
        Ok(())
    }

    /// Fills `[start, end)` with `word` and checks every word reads back.
    pub fn write_test(&mut self, start: u32, end: u32, word: u32) -> Result<(), FlashError> {
        check_range(start, end)?;

        let mut address = start;
        while address < end {
            self.flash
                .program_word(address, word)
                .map_err(|_| FlashError::Program { address })?;

            let mut readback = [0u8; 4];
            self.flash.read(address, &mut readback);
            if word_from_bytes(readback) != word {
                sboot_log!(error, "Verify failed at {=u32:X}", address);
                return Err(FlashError::Verify { address });
            }
            address += 4;
        }
        Ok(())
    }
}

fn check_range(start: u32, end: u32) -> Result<(), FlashError> {
    if start % 4 != 0 || end % 4 != 0 {
        return Err(FlashError::OutOfRegion { address: start });
    }
    if start < FLASH_USER_START || start > end {
        return Err(FlashError::OutOfRegion { address: start });
    }
    if end > FLASH_USER_END + 1 {
        return Err(FlashError::OutOfRegion { address: end });
    }
    Ok(())
}

/// Write position of the image, plus the value to roll back to when a
/// packet turns out to be corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashCursor {
    pub current: u32,
    pub backup: u32,
}

impl FlashCursor {
    pub const fn new(start: u32) -> Self {
        Self {
            current: start,
            backup: start,
        }
    }

    /// Remembers the current address and moves past `len` bytes. Returns the
    /// range the packet occupies.
    pub fn advance(&mut self, len: u32) -> (u32, u32) {
        self.backup = self.current;
        self.current = self.current.wrapping_add(len);
        (self.backup, self.current)
    }

    pub fn rollback(&mut self) {
        self.current = self.backup;
    }
}
