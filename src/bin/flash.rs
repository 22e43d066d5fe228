//! Flash bring-up check: erase the user region, fill the first user sector
//! with a test word, verify it, and dump the first bytes.
//!
//! Build with `--features defmt-log` to see the results.

#![no_main]
#![no_std]

use serial_boot::{
    self as _, // global logger + memory layout
    board::Stm32Flash,
    consts::FIRST_USER_SECTOR,
    flash_region::FlashRegion,
    sboot_log,
    sector_map::{sector_size, sector_start},
};
use stm32f4xx_hal::pac;

#[cfg(not(feature = "defmt-log"))]
use panic_reset as _;
#[cfg(feature = "defmt-log")]
use panic_probe as _;

const WRITE_TEST_WORD: u32 = 0x0000_0000;

#[cortex_m_rt::entry]
fn main() -> ! {
    let board = match pac::Peripherals::take() {
        Some(b) => b,
        None => serial_boot::exit(),
    };

    let mut region = FlashRegion::new(Stm32Flash::new(board.FLASH));

    let start = sector_start(FIRST_USER_SECTOR);
    let end = start + sector_size(FIRST_USER_SECTOR);

    let mut head = [0u8; 16];
    if region.read_back(start, &mut head).is_ok() {
        sboot_log!(info, "before: {}", head);
    }

    if let Err(e) = region.erase_user_region() {
        sboot_log!(error, "Erase failed: {}", e);
        serial_boot::exit()
    }
    sboot_log!(info, "Erase completed.");

    match region.write_test(start, end, WRITE_TEST_WORD) {
        Ok(()) => sboot_log!(info, "Write test passed, {=u32:X}..{=u32:X}", start, end),
        Err(e) => sboot_log!(error, "Write test failed: {}", e),
    }

    if region.read_back(start, &mut head).is_ok() {
        sboot_log!(info, "after: {}", head);
    }

    serial_boot::exit()
}
