//! Erase sector geometry of the STM32F42x/F43x 2MiB dual bank flash.
//!
//! Sectors are not uniform: each bank starts with four 16KiB sectors, then
//! one 64KiB sector, then seven 128KiB sectors.

pub const FLASH_BASE: u32 = 0x0800_0000;

pub const TOTAL_SECTORS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct Sector(pub u8);

pub const SECTOR_STARTS: [u32; TOTAL_SECTORS] = [
    // Bank 1
    0x0800_0000, // 16 KiB
    0x0800_4000, // 16 KiB
    0x0800_8000, // 16 KiB
    0x0800_C000, // 16 KiB
    0x0801_0000, // 64 KiB
    0x0802_0000, // 128 KiB
    0x0804_0000, // 128 KiB
    0x0806_0000, // 128 KiB
    0x0808_0000, // 128 KiB
    0x080A_0000, // 128 KiB
    0x080C_0000, // 128 KiB
    0x080E_0000, // 128 KiB
    // Bank 2
    0x0810_0000, // 16 KiB
    0x0810_4000, // 16 KiB
    0x0810_8000, // 16 KiB
    0x0810_C000, // 16 KiB
    0x0811_0000, // 64 KiB
    0x0812_0000, // 128 KiB
    0x0814_0000, // 128 KiB
    0x0816_0000, // 128 KiB
    0x0818_0000, // 128 KiB
    0x081A_0000, // 128 KiB
    0x081C_0000, // 128 KiB
    0x081E_0000, // 128 KiB
];

/// Size in bytes of the given sector.
pub const fn sector_size(sector: Sector) -> u32 {
    match sector.0 {
        0 | 1 | 2 | 3 | 12 | 13 | 14 | 15 => 16 * 1024,
        4 | 16 => 64 * 1024,
        _ => 128 * 1024,
    }
}

/// First address of the given sector.
///
/// Sector ids past the table clamp to the last sector.
pub fn sector_start(sector: Sector) -> u32 {
    let idx = (sector.0 as usize).min(TOTAL_SECTORS - 1);
    SECTOR_STARTS[idx]
}

/// The sector whose half-open range contains `address`.
///
/// The last sector is the fallback for anything at or above its start, there
/// is no upper bound check. Addresses below the flash base have no sector.
pub fn sector_of(address: u32) -> Option<Sector> {
    if address < FLASH_BASE {
        return None;
    }

    // First sector starting past the address, minus one.
    let idx = SECTOR_STARTS
        .iter()
        .position(|start| *start > address)
        .unwrap_or(TOTAL_SECTORS);

    Some(Sector((idx - 1) as u8))
}

/// Iterates the sectors from the one containing `first` through the one
/// containing `last`, inclusive.
///
/// `None` when either address is below flash or the range runs backwards.
pub fn sectors_between(first: u32, last: u32) -> Option<impl Iterator<Item = Sector>> {
    let a = sector_of(first)?;
    let b = sector_of(last)?;
    if b < a {
        return None;
    }
    Some((a.0..=b.0).map(Sector))
}
