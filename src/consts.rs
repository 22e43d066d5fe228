use crate::sector_map::{sector_size, Sector, SECTOR_STARTS};

pub const SKIP_FLASH: bool = cfg!(feature = "skip-flash");

// NOTE: Make sure this is in sync with the bootloader section in memory.x!
// Sectors 0..=5 (256KiB) belong to the bootloader.
pub const FIRST_USER_SECTOR: Sector = Sector(6);
pub const LAST_USER_SECTOR: Sector = Sector(23);

/// Start of the user (application) flash area.
pub const FLASH_USER_START: u32 = SECTOR_STARTS[FIRST_USER_SECTOR.0 as usize];

/// Last byte of the user flash area: sector start + sector size - 1.
pub const FLASH_USER_END: u32 =
    SECTOR_STARTS[LAST_USER_SECTOR.0 as usize] + sector_size(LAST_USER_SECTOR) - 1;

/// Where the application's vector table lives.
pub const APPLICATION_ADDRESS: u32 = FLASH_USER_START;

/// Capacity of the UART receive buffer, and so the longest frame we accept.
pub const RX_BUFFER_LEN: usize = 256;

/// Worst-case DATA framing around the image bytes: `[DATA]`, a ten digit
/// index, two separators, the checksum byte and CR LF.
pub const DATA_FRAME_OVERHEAD: usize = 6 + 10 + 2 + 1 + 2;

/// Largest per-packet image chunk an INFO frame may announce, so that any
/// DATA frame carrying it fits the receive buffer. Whole words only.
pub const MAX_PACKET_SIZE: usize = (RX_BUFFER_LEN - DATA_FRAME_OVERHEAD) & !3;

/// How long we wait for an INFO frame before booting the application.
pub const UPDATE_WAIT_MS: u32 = 5000;

/// Delay at the end of every loop iteration, paces flash writes and
/// serial turnaround.
pub const LOOP_PACING_MS: u32 = 75;

/// Cadence of the `READY` beacon while nobody has started an update.
pub const READY_INTERVAL_MS: u32 = 500;

/// Field separator inside a frame payload.
pub const SEPARATOR: u8 = b',';

/// Every frame ends with CR LF.
pub const TERMINATOR: [u8; 2] = *b"\r\n";
