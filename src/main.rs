// Boot flow:
//
// 1. Bring up clocks, TIM2 (rolling microsecond timer) and USART2 on PA2/PA3.
// 2. Beacon `[MCU]READY,ACK` every loop while nobody has sent a valid INFO.
// 3. No INFO within the wait window: jump to the application at 0x0804_0000.
//    Otherwise stay until the image is complete, then reset into it.

#![no_main]
#![no_std]

use core::cell::RefCell;

use cortex_m::{interrupt::Mutex, peripheral::{NVIC, SCB}};
use embedded_hal::serial::Read as _;
use groundhog_stm32f4::GlobalRollingTimer;
use serial_boot::{
    self as _, // global logger + memory layout
    arbiter::BootArbiter,
    board::{self, LogDisplay, Stm32Flash, Stm32Platform, UsartLink},
    sboot_log,
    session::UpdateSession,
};
use stm32f4xx_hal::{
    pac::{self, interrupt, Interrupt},
    prelude::*,
    serial::{Config, Event, Rx, Serial},
};

#[cfg(not(feature = "defmt-log"))]
use panic_reset as _;
#[cfg(feature = "defmt-log")]
use panic_probe as _;

const BAUD_RATE: u32 = 115_200;

static RX: Mutex<RefCell<Option<Rx<pac::USART2>>>> = Mutex::new(RefCell::new(None));

#[cortex_m_rt::entry]
fn main() -> ! {
    let _ = inner_main();
    SCB::sys_reset()
}

fn inner_main() -> Result<(), ()> {
    let board = pac::Peripherals::take().ok_or(())?;

    let rcc = board.RCC.constrain();
    let clocks = rcc.cfgr.sysclk(84.MHz()).freeze();

    GlobalRollingTimer::init(board.TIM2, clocks.timclk1().raw());

    let gpioa = board.GPIOA.split();
    let tx_pin = gpioa.pa2.into_alternate();
    let rx_pin = gpioa.pa3.into_alternate();

    let mut serial: Serial<pac::USART2, _, u8> = Serial::new(
        board.USART2,
        (tx_pin, rx_pin),
        Config::default().baudrate(BAUD_RATE.bps()),
        &clocks,
    )
    .map_err(|_| {
        sboot_log!(error, "Bad UART config!");
    })?;
    serial.listen(Event::Rxne);
    let (tx, rx) = serial.split();

    cortex_m::interrupt::free(|cs| RX.borrow(cs).replace(Some(rx)));
    // SAFETY: RX is in place before the first interrupt can fire
    unsafe { NVIC::unmask(Interrupt::USART2) };

    sboot_log!(info, "Launching bootloader!");

    let session = UpdateSession::new(UsartLink::new(tx), Stm32Flash::new(board.FLASH), LogDisplay);
    let arbiter = BootArbiter::new(session, GlobalRollingTimer::new(), GlobalRollingTimer::new());

    arbiter.run(&mut Stm32Platform)
}

#[interrupt]
fn USART2() {
    cortex_m::interrupt::free(|cs| {
        if let Some(rx) = RX.borrow(cs).borrow_mut().as_mut() {
            // Errors (overrun, framing) are cleared by the read itself and the
            // byte is lost. The host resends on a missing ACK.
            if let Ok(byte) = rx.read() {
                board::receive_byte(cs, byte);
            }
        }
    });
}
