//! STM32F429 implementations of the session's capabilities.

use core::cell::RefCell;

use cortex_m::{
    interrupt::{CriticalSection, Mutex},
    peripheral::{NVIC, SCB},
};
use embedded_hal::serial;
use stm32f4xx_hal::{
    flash::{Error as HalFlashError, FlashExt},
    pac::{self, Interrupt},
};

use crate::{
    arbiter::Platform,
    consts::SKIP_FLASH,
    flash_region::{word_to_bytes, SectorFlash},
    frame::ReceiveBuffer,
    link::{ByteLink, StatusDisplay},
    sector_map::{Sector, FLASH_BASE},
};

/// Filled by the USART2 interrupt, drained by the session.
pub static RX_BUFFER: Mutex<RefCell<ReceiveBuffer>> =
    Mutex::new(RefCell::new(ReceiveBuffer::new()));

/// Called from the USART2 interrupt for every received byte. A full buffer
/// drops the byte; the session clears it on the next poll.
pub fn receive_byte(cs: &CriticalSection, byte: u8) {
    let _ = RX_BUFFER.borrow(cs).borrow_mut().push(byte);
}

pub struct UsartLink<TX> {
    tx: TX,
}

impl<TX> UsartLink<TX>
where
    TX: serial::Write<u8>,
{
    pub fn new(tx: TX) -> Self {
        Self { tx }
    }
}

impl<TX> ByteLink for UsartLink<TX>
where
    TX: serial::Write<u8>,
{
    fn pause_rx(&mut self) {
        NVIC::mask(Interrupt::USART2);
    }

    fn resume_rx(&mut self) {
        // SAFETY: the handler only touches RX_BUFFER inside a critical section
        unsafe { NVIC::unmask(Interrupt::USART2) }
    }

    fn with_rx<R>(&mut self, f: impl FnOnce(&mut ReceiveBuffer) -> R) -> R {
        cortex_m::interrupt::free(|cs| f(&mut RX_BUFFER.borrow(cs).borrow_mut()))
    }

    fn send_line(&mut self, line: &[u8]) {
        for byte in line {
            if nb::block!(self.tx.write(*byte)).is_err() {
                sboot_log!(error, "UART write failed!");
                return;
            }
        }
        if nb::block!(self.tx.flush()).is_err() {
            sboot_log!(error, "UART flush failed!");
        }
    }
}

/// The on-chip flash controller, unlocked for the duration of each call.
pub struct Stm32Flash {
    flash: pac::FLASH,
}

impl Stm32Flash {
    pub fn new(flash: pac::FLASH) -> Self {
        Self { flash }
    }
}

impl SectorFlash for Stm32Flash {
    type Error = HalFlashError;

    fn erase_sector(&mut self, sector: Sector) -> Result<(), HalFlashError> {
        if SKIP_FLASH {
            sboot_log!(warn, "Skipped actual erase of {=u8}! Pretend it's good.", sector.0);
            return Ok(());
        }

        self.flash.unlocked().erase(sector.0)
    }

    fn program_word(&mut self, address: u32, word: u32) -> Result<(), HalFlashError> {
        if SKIP_FLASH {
            sboot_log!(trace, "Skipped write of {=u32:X} at {=u32:X}", word, address);
            return Ok(());
        }

        let offset = address.wrapping_sub(FLASH_BASE) as usize;
        let bytes = word_to_bytes(word);
        self.flash.unlocked().program(offset, bytes.iter())
    }

    fn read(&self, address: u32, buf: &mut [u8]) {
        let offset = address.wrapping_sub(FLASH_BASE) as usize;
        let end = offset.saturating_add(buf.len());
        match self.flash.read().get(offset..end) {
            Some(src) => buf.copy_from_slice(src),
            None => buf.iter_mut().for_each(|b| *b = 0xFF),
        }
    }
}

/// No panel on this board revision, status lines go to the log.
pub struct LogDisplay;

impl StatusDisplay for LogDisplay {
    fn show(&mut self, row: u8, col: u8, text: &str) {
        sboot_log!(info, "display[{=u8},{=u8}]: {=str}", row, col, text);
    }
}

pub struct Stm32Platform;

impl Platform for Stm32Platform {
    fn system_reset(&mut self) -> ! {
        SCB::sys_reset()
    }

    unsafe fn launch_application(&mut self, base: u32) -> ! {
        NVIC::mask(Interrupt::USART2);

        let table = base as *const u32;
        let msp = core::ptr::read_volatile(table);
        let rsv = core::ptr::read_volatile(table.add(1));

        if msp == 0xFFFF_FFFF || rsv == 0xFFFF_FFFF {
            // Erased flash, nothing to run. Go around for another update window.
            sboot_log!(warn, "No application at {=u32:X}, rebooting.", base);
            SCB::sys_reset()
        }

        sboot_log!(info, "bootloading!");
        sboot_log!(info, "MSP: {=u32:X}", msp);
        sboot_log!(info, "RSV: {=u32:X}", rsv);

        (*SCB::PTR).vtor.write(base);
        cortex_m::asm::bootstrap(msp as *const u32, rsv as *const u32)
    }
}
