//! Receive buffer and frame extraction.
//!
//! A frame looks like `[TAG]payload\r\n`. The buffer is cleared after every
//! frame, so there is never more than one frame (plus trailing noise) to look
//! at and no compaction is needed.

use heapless::Vec;

use crate::consts::{RX_BUFFER_LEN, TERMINATOR};

/// Bytes received from the host since the last frame.
///
/// Only the byte-link producer appends. The session reads and clears it, and
/// only while the producer is paused.
#[derive(Clone, Default)]
pub struct ReceiveBuffer {
    bytes: Vec<u8, RX_BUFFER_LEN>,
}

impl ReceiveBuffer {
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Appends one received byte. A full buffer hands the byte back.
    pub fn push(&mut self, byte: u8) -> Result<(), u8> {
        self.bytes.push(byte)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.bytes.is_full()
    }

    /// Resets the write cursor to zero.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Bytes between `[` and the first `]`. Empty when no bracket pair
    /// precedes the terminator.
    pub tag: &'a [u8],
    /// Everything after the first `]` up to the terminator, exclusive.
    pub payload: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Command {
    Info,
    Data,
}

impl<'a> Frame<'a> {
    /// Only the first four tag bytes are compared, case sensitive.
    pub fn command(&self) -> Option<Command> {
        match self.tag.get(..4) {
            Some(b"INFO") => Some(Command::Info),
            Some(b"DATA") => Some(Command::Data),
            _ => None,
        }
    }
}

/// Looks for a complete frame in `buf`.
///
/// The terminator is searched from the top of the buffer down, the closing
/// bracket from the bottom up. `None` means keep waiting for bytes.
pub fn find_frame(buf: &[u8]) -> Option<Frame<'_>> {
    let cr = buf.windows(2).rposition(|w| w == &TERMINATOR[..])?;
    let head = &buf[..cr];

    let (tag, payload) = match head.iter().position(|b| *b == b']') {
        Some(close) => {
            let tag = match head[..close].iter().position(|b| *b == b'[') {
                Some(open) => &head[open + 1..close],
                None => &head[..0],
            };
            (tag, &head[close + 1..])
        }
        // No command tag before the end marker. Still a frame, so that the
        // caller consumes it, but it will not match any command.
        None => (&head[..0], head),
    };

    Some(Frame { tag, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_frames_keep_waiting() {
        assert_eq!(find_frame(b""), None);
        assert_eq!(find_frame(b"[INFO]16,2"), None);
        assert_eq!(find_frame(b"[INFO]16,2,x\r"), None);
    }

    #[test]
    fn splits_tag_and_payload() {
        let frame = find_frame(b"[INFO]16,2,x\r\n").unwrap();
        assert_eq!(frame.tag, b"INFO");
        assert_eq!(frame.payload, b"16,2,x");
        assert_eq!(frame.command(), Some(Command::Info));
    }

    #[test]
    fn payload_may_hold_brackets_and_terminator_lookalikes() {
        let frame = find_frame(b"[DATA]1,a]b\rc\n,z\r\n").unwrap();
        assert_eq!(frame.tag, b"DATA");
        assert_eq!(frame.payload, b"1,a]b\rc\n,z");
    }

    #[test]
    fn uses_the_last_terminator_in_the_buffer() {
        let frame = find_frame(b"[DATA]1,\r\n,q\r\nxx").unwrap();
        assert_eq!(frame.payload, b"1,\r\n,q");
    }

    #[test]
    fn missing_bracket_yields_an_unrecognized_frame() {
        let frame = find_frame(b"INFO16,2,x\r\n").unwrap();
        assert_eq!(frame.tag, b"");
        assert_eq!(frame.command(), None);
    }

    #[test]
    fn command_compare_is_four_bytes_and_case_sensitive() {
        let cmd = |raw: &[u8]| find_frame(raw).unwrap().command();
        assert_eq!(cmd(b"[DATAX]1,a,b\r\n"), Some(Command::Data));
        assert_eq!(cmd(b"[info]1,2,3\r\n"), None);
        assert_eq!(cmd(b"[INF]1,2,3\r\n"), None);
        assert_eq!(cmd(b"[MCU]READY,ACK\r\n"), None);
    }

    #[test]
    fn buffer_refuses_bytes_past_capacity() {
        let mut rx = ReceiveBuffer::new();
        for _ in 0..RX_BUFFER_LEN {
            rx.push(b'a').unwrap();
        }
        assert!(rx.is_full());
        assert_eq!(rx.push(b'b'), Err(b'b'));
        rx.clear();
        assert!(rx.is_empty());
    }
}
