#![no_std]

use groundhog::RollingTimer;
use embedded_hal::blocking::delay::{DelayUs, DelayMs};
use core::sync::atomic::{AtomicPtr, Ordering};
use stm32f4xx_hal::pac::{
    TIM2,
    RCC,
    tim2::RegisterBlock as Tim2Rb,
};

static TIMER_PTR: AtomicPtr<Tim2Rb> = AtomicPtr::new(core::ptr::null_mut());

/// Free running 32-bit microsecond counter on TIM2.
///
/// Wraps after a bit over 71 minutes, `ticks_since` handles that as long as
/// the two instants are closer together than that.
pub struct GlobalRollingTimer;

impl GlobalRollingTimer {
    pub const fn new() -> Self {
        Self
    }

    /// `timer_clock_hz` is the TIM2 kernel clock, which is twice PCLK1
    /// whenever the APB1 prescaler is not 1.
    pub fn init(timer: TIM2, timer_clock_hz: u32) {
        let rcc = unsafe { &*RCC::ptr() };

        rcc.apb1enr.modify(|_, w| w.tim2en().set_bit());
        rcc.apb1rstr.modify(|_, w| w.tim2rst().set_bit());
        rcc.apb1rstr.modify(|_, w| w.tim2rst().clear_bit());

        // pause
        timer.cr1.modify(|_, w| w.cen().clear_bit());
        // reset counter
        timer.cnt.reset();

        // One tick per microsecond
        let psc = (timer_clock_hz / 1_000_000).saturating_sub(1);

        timer.psc.write(|w| unsafe { w.bits(psc) });
        timer.arr.write(|w| unsafe { w.bits(0xFFFF_FFFF) });
        timer.egr.write(|w| w.ug().set_bit());
        timer.cr1.modify(|_, w| w.cen().set_bit().urs().set_bit());

        let old_ptr = TIMER_PTR.swap(TIM2::ptr() as *mut _, Ordering::SeqCst);
        debug_assert!(old_ptr.is_null());
    }
}

impl RollingTimer for GlobalRollingTimer {
    type Tick = u32;
    const TICKS_PER_SECOND: u32 = 1_000_000;

    fn get_ticks(&self) -> u32 {
        if let Some(t0) = unsafe { TIMER_PTR.load(Ordering::SeqCst).as_ref() } {
            t0.cnt.read().bits()
        } else {
            0
        }
    }
}

impl DelayUs<u32> for GlobalRollingTimer {
    fn delay_us(&mut self, us: u32) {
        let start = self.get_ticks();
        while self.ticks_since(start) < us { }
    }
}

impl DelayMs<u32> for GlobalRollingTimer {
    fn delay_ms(&mut self, ms: u32) {
        // Whole seconds first, so `ms * 1000` never overflows
        for _ in 0..(ms / 1000) {
            self.delay_us(1_000_000)
        }
        self.delay_us((ms % 1000) * 1000)
    }
}
