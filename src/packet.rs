//! Field splitting for INFO and DATA payloads.
//!
//! * INFO: `<size>,<count>,<checksum>`
//! * DATA: `<index>,<raw bytes>,<checksum>`
//!
//! The checksum byte is raw, not hex, and covers everything before the
//! second separator.

use crate::{checksum, consts::SEPARATOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum DecodeError {
    /// INFO needs exactly two separators. Carries how many were found.
    SeparatorCount(usize),
    /// DATA needs a separator near the start and a different one near the end.
    MissingSeparator,
    /// A numeric field had no bytes at all.
    EmptyField,
    /// Nothing after the second separator.
    MissingChecksum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct InfoPacket {
    /// Bytes per DATA packet.
    pub total_size: u32,
    /// Index of the last DATA packet.
    pub total_count: u32,
    pub checksum: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPacket<'a> {
    pub sequence_index: u32,
    pub payload: &'a [u8],
    pub checksum: u8,
}

/// A decoded packet together with the bytes its checksum covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded<'a, P> {
    pub packet: P,
    pub covered: &'a [u8],
}

/// A packet that carries its own trailing checksum byte.
pub trait Checksummed {
    fn checksum(&self) -> u8;
}

impl Checksummed for InfoPacket {
    fn checksum(&self) -> u8 {
        self.checksum
    }
}

impl Checksummed for DataPacket<'_> {
    fn checksum(&self) -> u8 {
        self.checksum
    }
}

impl<P: Checksummed> Decoded<'_, P> {
    /// The received checksum matches the covered bytes.
    pub fn is_intact(&self) -> bool {
        checksum(self.covered) == self.packet.checksum()
    }
}

pub fn decode_info(payload: &[u8]) -> Result<Decoded<'_, InfoPacket>, DecodeError> {
    // Size and count are digits only, so a plain forward scan is enough. A
    // checksum byte that happens to be a separator makes the count wrong.
    let mut seps = payload
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == SEPARATOR)
        .map(|(i, _)| i);

    let (first, second) = match (seps.next(), seps.next(), seps.count()) {
        (Some(a), Some(b), 0) => (a, b),
        (a, b, rest) => {
            let found = a.is_some() as usize + b.is_some() as usize + rest;
            return Err(DecodeError::SeparatorCount(found));
        }
    };

    let total_size = parse_decimal(&payload[..first])?;
    let total_count = parse_decimal(&payload[first + 1..second])?;
    let checksum = *payload.get(second + 1).ok_or(DecodeError::MissingChecksum)?;

    Ok(Decoded {
        packet: InfoPacket {
            total_size,
            total_count,
            checksum,
        },
        covered: &payload[..second],
    })
}

pub fn decode_data(payload: &[u8]) -> Result<Decoded<'_, DataPacket<'_>>, DecodeError> {
    let first = payload
        .iter()
        .position(|b| *b == SEPARATOR)
        .ok_or(DecodeError::MissingSeparator)?;

    // Image bytes may contain separators, so the second one is searched
    // backwards. The last byte is the checksum (possibly a separator too)
    // and is skipped.
    let search_end = payload.len().saturating_sub(1);
    let second = payload[..search_end]
        .iter()
        .rposition(|b| *b == SEPARATOR)
        .ok_or(DecodeError::MissingSeparator)?;

    if second <= first {
        return Err(DecodeError::MissingSeparator);
    }

    let sequence_index = parse_decimal(&payload[..first])?;
    let checksum = *payload.get(second + 1).ok_or(DecodeError::MissingChecksum)?;

    Ok(Decoded {
        packet: DataPacket {
            sequence_index,
            payload: &payload[first + 1..second],
            checksum,
        },
        covered: &payload[..second],
    })
}

/// ASCII decimal to integer, stopping at the first non-digit.
///
/// The first byte is taken as a digit without checking it. A non-digit
/// there gives a meaningless (but deterministic) value, hosts are expected
/// to send digits.
pub fn parse_decimal(field: &[u8]) -> Result<u32, DecodeError> {
    let (first, rest) = field.split_first().ok_or(DecodeError::EmptyField)?;

    let mut value = (*first as u32).wrapping_sub(b'0' as u32);
    for b in rest.iter().take_while(|b| b.is_ascii_digit()) {
        value = value.wrapping_mul(10).wrapping_add((b - b'0') as u32);
    }
    Ok(value)
}
