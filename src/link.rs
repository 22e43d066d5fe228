//! The capabilities the session is driven through: the serial byte link to
//! the host and the status panel.

use crate::frame::ReceiveBuffer;

/// The interrupt driven serial link to the update host.
pub trait ByteLink {
    /// Stop the producer from appending to the receive buffer.
    fn pause_rx(&mut self);

    /// Re-arm reception after a frame has been consumed.
    fn resume_rx(&mut self);

    /// Run `f` with exclusive access to the receive buffer.
    fn with_rx<R>(&mut self, f: impl FnOnce(&mut ReceiveBuffer) -> R) -> R;

    /// Blocking send of one complete line, terminator included.
    fn send_line(&mut self, line: &[u8]);
}

/// A small text panel. Glyphs and panel commands are the driver's business.
pub trait StatusDisplay {
    fn show(&mut self, row: u8, col: u8, text: &str);
}

/// Fixed device-to-host lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Reply {
    Ready,
    InfoAck,
    DataAck,
    DataNack,
    EndAck,
}

impl Reply {
    pub const fn line(&self) -> &'static [u8] {
        match self {
            Reply::Ready => b"[MCU]READY,ACK\r\n",
            Reply::InfoAck => b"[MCU]INFO,ACK\r\n",
            Reply::DataAck => b"[MCU]DATA,ACK\r\n",
            Reply::DataNack => b"[MCU]DATA,NACK\r\n",
            Reply::EndAck => b"[MCU]END,ACK\r\n",
        }
    }
}
