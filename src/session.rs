//! The update session: pulls frames out of the receive buffer, checks them,
//! and drives the flash.
//!
//! You create it, `announce` once, then `poll` it from the boot loop until
//! it asks for a reset. Nothing in here blocks except the flash calls.

use core::fmt::Write;

use heapless::String;

use crate::{
    consts::{FLASH_USER_START, MAX_PACKET_SIZE},
    flash_region::{FlashCursor, FlashError, FlashRegion, SectorFlash},
    frame::{find_frame, Command, Frame},
    link::{ByteLink, Reply, StatusDisplay},
    packet::{decode_data, decode_info, DecodeError, InfoPacket},
};

/// Row the state label is drawn on, below the banner.
const STATE_ROW: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum SessionState {
    /// Fresh out of reset, nothing sent yet.
    Idle,
    /// Advertising `READY`, no INFO accepted yet.
    AwaitingStart,
    Erasing,
    Receiving,
    /// The last packet is in flash. The next poll says goodbye.
    Complete,
    /// Flash refused an erase or a write. Stays here until power cycle.
    Failed(FlashError),
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle | SessionState::AwaitingStart => "Waiting",
            SessionState::Erasing => "Erasing",
            SessionState::Receiving => "Receiving",
            SessionState::Complete => "Complete",
            SessionState::Failed(_) => "Failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum SessionError {
    /// Trailing checksum byte does not match. NACKed for DATA only.
    ChecksumMismatch(Command),
    MalformedFrame(DecodeError),
    /// INFO announced a packet size we cannot program.
    InvalidPacketSize(u32),
    /// Tag is neither INFO nor DATA.
    UnknownCommand,
    /// DATA before any INFO, or INFO once a session is running.
    OutOfSequence(Command),
    Flash(FlashError),
}

/// What the boot loop should do after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Poll {
    Continue,
    Reset,
}

pub struct UpdateSession<L, F, D>
where
    L: ByteLink,
    F: SectorFlash,
    D: StatusDisplay,
{
    link: L,
    region: FlashRegion<F>,
    display: D,
    state: SessionState,
    started: bool,
    info: Option<InfoPacket>,
    cursor: FlashCursor,
}

impl<L, F, D> UpdateSession<L, F, D>
where
    L: ByteLink,
    F: SectorFlash,
    D: StatusDisplay,
{
    pub fn new(link: L, flash: F, display: D) -> Self {
        Self {
            link,
            region: FlashRegion::new(flash),
            display,
            state: SessionState::Idle,
            started: false,
            info: None,
            cursor: FlashCursor::new(FLASH_USER_START),
        }
    }

    /// Draws the banner and the initial state.
    pub fn announce(&mut self) {
        self.display.show(0, 0, "Boot Loader");
        self.display.show(STATE_ROW, 0, self.state.label());
    }

    /// Sends the `READY` beacon. Nothing to advertise once started.
    pub fn advertise(&mut self) {
        if self.started {
            return;
        }
        self.reply(Reply::Ready);
        if self.state == SessionState::Idle {
            self.state = SessionState::AwaitingStart;
        }
    }

    /// True once a valid INFO has been accepted. Suppresses the boot timeout.
    pub fn started(&self) -> bool {
        self.started
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cursor(&self) -> FlashCursor {
        self.cursor
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn flash(&self) -> &F {
        self.region.inner()
    }

    pub fn flash_mut(&mut self) -> &mut F {
        self.region.inner_mut()
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn poll(&mut self) -> Poll {
        match self.state {
            SessionState::Complete => {
                sboot_log!(info, "Image complete, resetting.");
                self.reply(Reply::EndAck);
                return Poll::Reset;
            }
            SessionState::Failed(_) => {
                // Host may keep talking. Nobody is listening.
                self.link.with_rx(|rx| rx.clear());
                return Poll::Continue;
            }
            _ => {}
        }

        let ready = self
            .link
            .with_rx(|rx| rx.is_full() || find_frame(rx.as_slice()).is_some());
        if !ready {
            return Poll::Continue;
        }

        // No new bytes may land between taking the frame and clearing.
        self.link.pause_rx();
        let snapshot = self.link.with_rx(|rx| {
            let copy = rx.clone();
            rx.clear();
            copy
        });

        match find_frame(snapshot.as_slice()) {
            Some(frame) => {
                if let Err(e) = self.dispatch(frame) {
                    self.recover(e);
                }
            }
            None => {
                sboot_log!(warn, "Receive buffer full without a frame, dropped.");
            }
        }

        self.link.resume_rx();
        Poll::Continue
    }

    fn dispatch(&mut self, frame: Frame<'_>) -> Result<(), SessionError> {
        match frame.command() {
            Some(Command::Info) => self.on_info(frame.payload),
            Some(Command::Data) => self.on_data(frame.payload),
            None => Err(SessionError::UnknownCommand),
        }
    }

    fn on_info(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        if self.started {
            return Err(SessionError::OutOfSequence(Command::Info));
        }

        let decoded = decode_info(payload).map_err(SessionError::MalformedFrame)?;
        if !decoded.is_intact() {
            return Err(SessionError::ChecksumMismatch(Command::Info));
        }

        let info = decoded.packet;
        let size = info.total_size;
        if size == 0 || size % 4 != 0 || size as usize > MAX_PACKET_SIZE {
            return Err(SessionError::InvalidPacketSize(size));
        }

        sboot_log!(
            info,
            "INFO: {=u32} bytes per packet, last index {=u32}",
            info.total_size,
            info.total_count
        );

        self.started = true;
        self.info = Some(info);
        self.cursor = FlashCursor::new(FLASH_USER_START);

        self.enter(SessionState::Erasing);
        self.region
            .erase_user_region()
            .map_err(SessionError::Flash)?;
        self.enter(SessionState::Receiving);

        self.reply(Reply::InfoAck);
        Ok(())
    }

    fn on_data(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        let info = match (self.state, self.info) {
            (SessionState::Receiving, Some(info)) => info,
            _ => return Err(SessionError::OutOfSequence(Command::Data)),
        };

        let decoded = decode_data(payload).map_err(SessionError::MalformedFrame)?;
        let (start, end) = self.cursor.advance(info.total_size);

        if !decoded.is_intact() {
            self.cursor.rollback();
            return Err(SessionError::ChecksumMismatch(Command::Data));
        }

        let packet = decoded.packet;
        let size = info.total_size as usize;

        // Pad to the declared size with the erased value, or cut down to it.
        let mut image = [0xFFu8; MAX_PACKET_SIZE];
        let used = packet.payload.len().min(size);
        image[..used].copy_from_slice(&packet.payload[..used]);

        sboot_log!(
            debug,
            "DATA {=u32}: {=usize} bytes at {=u32:X}",
            packet.sequence_index,
            packet.payload.len(),
            start
        );

        self.region
            .program_range(start, end, &image[..size])
            .map_err(SessionError::Flash)?;

        self.reply(Reply::DataAck);

        if packet.sequence_index >= info.total_count {
            self.enter(SessionState::Complete);
        }
        Ok(())
    }

    fn recover(&mut self, err: SessionError) {
        match err {
            SessionError::ChecksumMismatch(Command::Data) => {
                sboot_log!(warn, "DATA checksum mismatch, asking for a resend");
                self.reply(Reply::DataNack);
            }
            SessionError::Flash(e) => {
                sboot_log!(error, "Flash failure, session is dead: {}", e);
                self.report(e);
                self.enter(SessionState::Failed(e));
            }
            other => {
                // No reply is defined for these, the frame is just gone.
                sboot_log!(warn, "Dropped frame: {}", other);
            }
        }
    }

    fn enter(&mut self, state: SessionState) {
        sboot_log!(info, "{} -> {}", self.state, state);
        self.state = state;
        self.display.show(STATE_ROW, 0, state.label());
    }

    fn reply(&mut self, reply: Reply) {
        self.link.send_line(reply.line());
    }

    fn report(&mut self, err: FlashError) {
        let mut line: String<40> = String::new();
        let res = match err {
            FlashError::Erase { sector } => write!(line, "[MCU][ERROR]ERASE,{}\r\n", sector.0),
            FlashError::Program { address }
            | FlashError::OutOfRegion { address }
            | FlashError::Verify { address } => {
                write!(line, "[MCU][ERROR]PROGRAM,{:08X}\r\n", address)
            }
        };
        if res.is_ok() {
            self.link.send_line(line.as_bytes());
        }
    }
}
