#![cfg_attr(not(test), no_std)]

#[cfg(feature = "board")]
use stm32f4xx_hal as _; // memory layout + interrupt vectors

#[macro_use] pub mod log;
pub mod arbiter;
pub mod consts;
pub mod flash_region;
pub mod frame;
pub mod link;
pub mod packet;
pub mod sector_map;
pub mod session;

#[cfg(feature = "board")]
pub mod board;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(all(feature = "defmt-log", not(test)))]
mod defmt_glue {
    use core::sync::atomic::{AtomicUsize, Ordering};
    use defmt_rtt as _; // global logger

    // same panicking *behavior* as `panic-probe` but doesn't print a panic message
    // this prevents the panic message being printed *twice* when `defmt::panic` is invoked
    #[defmt::panic_handler]
    fn panic() -> ! {
        cortex_m::asm::udf()
    }

    static COUNT: AtomicUsize = AtomicUsize::new(0);

    defmt::timestamp!("{=usize}", {
        // NOTE(no-CAS) `timestamps` runs with interrupts disabled
        let n = COUNT.load(Ordering::Relaxed);
        COUNT.store(n + 1, Ordering::Relaxed);
        n
    });
}

/// Terminates the application and makes `probe-run` exit with exit-code = 0
#[cfg(feature = "board")]
pub fn exit() -> ! {
    loop {
        cortex_m::asm::bkpt();
    }
}

/// XOR-fold of `data`, the protocol's integrity byte.
///
/// Folding from zero is the same as seeding with the first byte, and gives
/// zero for an empty slice instead of leaving it undefined.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}
