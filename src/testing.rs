//! In-memory stand-ins for the hardware, shared by the unit tests.

use std::{cell::Cell, collections::BTreeMap, rc::Rc, string::String, vec::Vec};

use embedded_hal::blocking::delay::DelayMs;
use groundhog::RollingTimer;

use crate::{
    checksum,
    consts::SEPARATOR,
    flash_region::{word_to_bytes, SectorFlash},
    frame::ReceiveBuffer,
    link::{ByteLink, StatusDisplay},
    sector_map::Sector,
};

/// Flash backed by a map of programmed words. Anything never programmed
/// reads as erased.
#[derive(Default)]
pub struct FakeFlash {
    pub erased: Vec<Sector>,
    pub words: BTreeMap<u32, u32>,
    pub fail_erase: Option<Sector>,
    pub fail_program: Option<u32>,
    /// ORed into every stored word, to fake bits that will not clear.
    pub stuck_bits: u32,
}

impl FakeFlash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn word(&self, address: u32) -> Option<u32> {
        self.words.get(&address).copied()
    }

    /// Concatenated bytes of `[start, start + len)`.
    pub fn bytes(&self, start: u32, len: usize) -> Vec<u8> {
        let mut out = std::vec![0u8; len];
        self.read(start, &mut out);
        out
    }
}

impl SectorFlash for FakeFlash {
    type Error = ();

    fn erase_sector(&mut self, sector: Sector) -> Result<(), ()> {
        if self.fail_erase == Some(sector) {
            return Err(());
        }
        self.erased.push(sector);
        Ok(())
    }

    fn program_word(&mut self, address: u32, word: u32) -> Result<(), ()> {
        if self.fail_program == Some(address) {
            return Err(());
        }
        self.words.insert(address, word | self.stuck_bits);
        Ok(())
    }

    fn read(&self, address: u32, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            let addr = address + i as u32;
            let base = addr & !3;
            *byte = match self.word(base) {
                Some(w) => word_to_bytes(w)[(addr - base) as usize],
                None => 0xFF,
            };
        }
    }
}

#[derive(Default)]
pub struct FakeLink {
    pub rx: ReceiveBuffer,
    pub sent: Vec<Vec<u8>>,
    pub paused: bool,
    pub pauses: usize,
}

impl FakeLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// What the receive interrupt would do. Bytes past capacity are lost.
    pub fn feed(&mut self, bytes: &[u8]) {
        assert!(!self.paused, "fed while paused");
        for b in bytes {
            let _ = self.rx.push(*b);
        }
    }

    pub fn sent_lines(&self) -> Vec<&[u8]> {
        self.sent.iter().map(|l| l.as_slice()).collect()
    }

    pub fn count_sent(&self, line: &[u8]) -> usize {
        self.sent.iter().filter(|l| l.as_slice() == line).count()
    }
}

impl ByteLink for FakeLink {
    fn pause_rx(&mut self) {
        self.paused = true;
        self.pauses += 1;
    }

    fn resume_rx(&mut self) {
        self.paused = false;
    }

    fn with_rx<R>(&mut self, f: impl FnOnce(&mut ReceiveBuffer) -> R) -> R {
        f(&mut self.rx)
    }

    fn send_line(&mut self, line: &[u8]) {
        self.sent.push(line.to_vec());
    }
}

#[derive(Default)]
pub struct FakeDisplay {
    pub shown: Vec<(u8, u8, String)>,
}

impl FakeDisplay {
    pub fn last(&self) -> Option<&str> {
        self.shown.last().map(|(_, _, s)| s.as_str())
    }
}

impl StatusDisplay for FakeDisplay {
    fn show(&mut self, row: u8, col: u8, text: &str) {
        self.shown.push((row, col, String::from(text)));
    }
}

/// Millisecond clock shared between a timer and a delay, so that delays
/// move time forward.
pub type Clock = Rc<Cell<u32>>;

pub fn clock() -> Clock {
    Rc::new(Cell::new(0))
}

pub struct FakeTimer(pub Clock);

impl RollingTimer for FakeTimer {
    type Tick = u32;
    const TICKS_PER_SECOND: u32 = 1_000;

    fn get_ticks(&self) -> u32 {
        self.0.get()
    }
}

pub struct FakeDelay {
    pub clock: Clock,
    pub calls: Vec<u32>,
}

impl FakeDelay {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            calls: Vec::new(),
        }
    }
}

impl DelayMs<u32> for FakeDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.calls.push(ms);
        self.clock.set(self.clock.get().wrapping_add(ms));
    }
}

/// Builds `[TAG]body,<xor of body>\r\n`.
pub fn signed_frame(tag: &str, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(b'[');
    out.extend_from_slice(tag.as_bytes());
    out.push(b']');
    out.extend_from_slice(body);
    out.push(SEPARATOR);
    out.push(checksum(body));
    out.extend_from_slice(b"\r\n");
    out
}

/// A DATA body `index,payload`.
pub fn data_body(index: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = std::format!("{}", index).into_bytes();
    out.push(SEPARATOR);
    out.extend_from_slice(payload);
    out
}
