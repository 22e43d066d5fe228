//! The boot decision: wait a bounded time for a host, otherwise hand over to
//! the application that is already in flash.

use embedded_hal::blocking::delay::DelayMs;
use groundhog::RollingTimer;

use crate::{
    consts::{APPLICATION_ADDRESS, LOOP_PACING_MS, READY_INTERVAL_MS, UPDATE_WAIT_MS},
    flash_region::SectorFlash,
    link::{ByteLink, StatusDisplay},
    session::{Poll, UpdateSession},
};

/// The two ways out of the bootloader. Neither comes back.
pub trait Platform {
    fn system_reset(&mut self) -> !;

    /// Loads the stack pointer from `base`, the reset vector from `base + 4`,
    /// points the vector table at `base` and jumps.
    ///
    /// # Safety
    ///
    /// `base` must hold a valid vector table, and nothing set up by the
    /// bootloader may still be firing interrupts at the old handlers.
    unsafe fn launch_application(&mut self, base: u32) -> !;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Decision {
    Stay,
    Reset,
    LaunchApp(u32),
}

pub struct BootArbiter<L, F, D, T, W>
where
    L: ByteLink,
    F: SectorFlash,
    D: StatusDisplay,
    T: RollingTimer<Tick = u32>,
    W: DelayMs<u32>,
{
    session: UpdateSession<L, F, D>,
    timer: T,
    delay: W,
    start: u32,
}

impl<L, F, D, T, W> BootArbiter<L, F, D, T, W>
where
    L: ByteLink,
    F: SectorFlash,
    D: StatusDisplay,
    T: RollingTimer<Tick = u32>,
    W: DelayMs<u32>,
{
    /// The wait window starts now.
    pub fn new(session: UpdateSession<L, F, D>, timer: T, delay: W) -> Self {
        let start = timer.get_ticks();
        Self {
            session,
            timer,
            delay,
            start,
        }
    }

    pub fn session(&self) -> &UpdateSession<L, F, D> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut UpdateSession<L, F, D> {
        &mut self.session
    }

    pub fn elapsed_ms(&self) -> u32 {
        let ticks = self.timer.ticks_since(self.start) as u64;
        ((ticks * 1000) / T::TICKS_PER_SECOND as u64) as u32
    }

    /// One loop iteration.
    pub fn step(&mut self) -> Decision {
        if !self.session.started() {
            if self.elapsed_ms() > UPDATE_WAIT_MS {
                sboot_log!(info, "No update requested, booting application.");
                return Decision::LaunchApp(APPLICATION_ADDRESS);
            }
            self.session.advertise();
            self.delay.delay_ms(READY_INTERVAL_MS);
        }

        let poll = self.session.poll();
        self.delay.delay_ms(LOOP_PACING_MS);

        match poll {
            Poll::Continue => Decision::Stay,
            Poll::Reset => Decision::Reset,
        }
    }

    pub fn run<P: Platform>(mut self, platform: &mut P) -> ! {
        self.session.announce();

        loop {
            match self.step() {
                Decision::Stay => {}
                Decision::Reset => platform.system_reset(),
                Decision::LaunchApp(base) => unsafe { platform.launch_application(base) },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        link::Reply,
        testing::{clock, data_body, signed_frame, Clock, FakeDelay, FakeDisplay, FakeFlash, FakeLink, FakeTimer},
    };

    type Arbiter = BootArbiter<FakeLink, FakeFlash, FakeDisplay, FakeTimer, FakeDelay>;

    fn arbiter() -> (Arbiter, Clock) {
        let clk = clock();
        let session = UpdateSession::new(FakeLink::new(), FakeFlash::new(), FakeDisplay::default());
        let arb = BootArbiter::new(session, FakeTimer(clk.clone()), FakeDelay::new(clk.clone()));
        (arb, clk)
    }

    fn feed(arb: &mut Arbiter, bytes: &[u8]) {
        arb.session_mut().link_mut().feed(bytes);
    }

    struct PanickingPlatform;

    impl Platform for PanickingPlatform {
        fn system_reset(&mut self) -> ! {
            panic!("reset");
        }

        unsafe fn launch_application(&mut self, base: u32) -> ! {
            panic!("launch {:#010X}", base);
        }
    }

    #[test]
    fn quiet_line_launches_the_application_after_the_window() {
        let (mut arb, clk) = arbiter();

        let mut steps = 0;
        let decision = loop {
            match arb.step() {
                Decision::Stay => steps += 1,
                other => break other,
            }
            assert!(steps < 100, "never timed out");
        };

        assert_eq!(decision, Decision::LaunchApp(APPLICATION_ADDRESS));
        assert!(clk.get() > UPDATE_WAIT_MS);
        assert!(clk.get() <= UPDATE_WAIT_MS + READY_INTERVAL_MS + LOOP_PACING_MS);

        // One beacon per iteration, nothing else.
        let link = arb.session().link();
        assert_eq!(link.count_sent(Reply::Ready.line()), steps);
        assert_eq!(link.sent.len(), steps);
    }

    #[test]
    fn waiting_iterations_pace_with_beacon_then_loop_delay() {
        let (mut arb, _clk) = arbiter();
        arb.step();
        arb.step();
        assert_eq!(
            arb.delay.calls,
            std::vec![READY_INTERVAL_MS, LOOP_PACING_MS, READY_INTERVAL_MS, LOOP_PACING_MS]
        );
    }

    #[test]
    fn started_session_never_times_out() {
        let (mut arb, clk) = arbiter();
        feed(&mut arb, &signed_frame("INFO", b"16,2"));
        assert_eq!(arb.step(), Decision::Stay);
        assert!(arb.session().started());

        clk.set(clk.get() + 10 * UPDATE_WAIT_MS);
        for _ in 0..5 {
            assert_eq!(arb.step(), Decision::Stay);
        }
        assert_eq!(arb.session().link().count_sent(Reply::Ready.line()), 1);
    }

    #[test]
    fn started_session_only_paces() {
        let (mut arb, _clk) = arbiter();
        feed(&mut arb, &signed_frame("INFO", b"16,2"));
        arb.step();
        arb.delay.calls.clear();

        arb.step();
        assert_eq!(arb.delay.calls, std::vec![LOOP_PACING_MS]);
    }

    #[test]
    fn finished_image_asks_for_reset() {
        let (mut arb, _clk) = arbiter();
        feed(&mut arb, &signed_frame("INFO", b"8,1"));
        arb.step();
        feed(&mut arb, &signed_frame("DATA", &data_body(1, b"12345678")));
        assert_eq!(arb.step(), Decision::Stay);
        assert_eq!(arb.step(), Decision::Reset);
        assert_eq!(arb.session().link().count_sent(Reply::EndAck.line()), 1);
    }

    #[test]
    fn timer_wrap_does_not_shorten_the_window() {
        let clk = clock();
        clk.set(u32::MAX - 100);
        let session = UpdateSession::new(FakeLink::new(), FakeFlash::new(), FakeDisplay::default());
        let mut arb = BootArbiter::new(session, FakeTimer(clk.clone()), FakeDelay::new(clk.clone()));

        assert_eq!(arb.step(), Decision::Stay);
        assert!(arb.elapsed_ms() < UPDATE_WAIT_MS);
    }

    #[test]
    #[should_panic(expected = "launch 0x08040000")]
    fn run_hands_over_to_the_platform() {
        let (arb, _clk) = arbiter();
        arb.run(&mut PanickingPlatform);
    }

    #[test]
    #[should_panic(expected = "reset")]
    fn run_resets_after_the_last_packet() {
        let (mut arb, _clk) = arbiter();
        feed(&mut arb, &signed_frame("INFO", b"8,0"));
        arb.step();
        feed(&mut arb, &signed_frame("DATA", &data_body(0, b"abcdefgh")));
        arb.step();
        arb.run(&mut PanickingPlatform);
    }
}
